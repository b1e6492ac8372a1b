//! The Project container and its lifecycle.

use std::path::{Path, PathBuf};

use aq_core::Warn;
use aq_core::units::{FlowUnits, HeadlossModel, Ucf};
use aq_hydraul::HydEngine;
use aq_io::hydfile::{HydReader, HydWriter};
use aq_io::outfile::{OutWriter, PeriodResults};
use aq_io::report::{ReportOptions, ReportWriter};
use aq_network::Network;
use aq_quality::QualEngine;
use aq_rules::RuleSet;
use tempfile::TempDir;

use crate::error::{ProjectError, ProjectResult};

/// Where hydraulic snapshots come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HydSource {
    /// Scratch file written by this project's own solver.
    Scratch,
    /// External file adopted with `use_hyd_file`.
    External,
}

/// One water-distribution model plus its simulation engines and files.
/// Multiple projects are fully independent.
pub struct Project {
    pub network: Network,
    pub rules: RuleSet,
    pub(crate) hyd: HydEngine,
    pub(crate) qual: QualEngine,
    pub report_opts: ReportOptions,
    pub(crate) ucf: Ucf,

    // files
    pub(crate) temp: TempDir,
    pub(crate) hyd_path: PathBuf,
    pub(crate) out_path: PathBuf,
    pub(crate) stats_path: PathBuf,
    pub(crate) rpt: ReportWriter,
    pub(crate) inp_path: Option<PathBuf>,

    // lifecycle flags
    pub(crate) opened: bool,
    pub(crate) hyd_source: HydSource,
    pub(crate) hyd_save: bool,
    pub(crate) hyd_results: bool,

    // streaming state
    pub(crate) hyd_writer: Option<HydWriter>,
    pub(crate) hyd_reader: Option<HydReader>,
    pub(crate) current_snap: Option<aq_io::hydfile::HydSnapshot>,
    pub(crate) next_snap: Option<aq_io::hydfile::HydSnapshot>,
    pub(crate) out_writer: Option<OutWriter>,
    pub(crate) qual_save: bool,
    pub(crate) stat_buffer: Vec<PeriodResults>,
    pub(crate) out_written: bool,
}

impl Project {
    /// Create an empty project with three unique scratch-file paths.
    pub fn new() -> ProjectResult<Self> {
        let temp = TempDir::new().map_err(|_| ProjectError::Io(aq_io::IoError::OutputOpen))?;
        let hyd_path = temp.path().join("hydraulics.bin");
        let out_path = temp.path().join("output.bin");
        let stats_path = temp.path().join("stats.bin");
        Ok(Self {
            network: Network::new(),
            rules: RuleSet::new(),
            hyd: HydEngine::new(),
            qual: QualEngine::new(),
            report_opts: ReportOptions::default(),
            ucf: Ucf::default(),
            temp,
            hyd_path,
            out_path,
            stats_path,
            rpt: ReportWriter::disabled(),
            inp_path: None,
            opened: false,
            hyd_source: HydSource::Scratch,
            hyd_save: false,
            hyd_results: false,
            hyd_writer: None,
            hyd_reader: None,
            current_snap: None,
            next_snap: None,
            out_writer: None,
            qual_save: false,
            stat_buffer: Vec::new(),
            out_written: false,
        })
    }

    /// Prepare an empty network with the given units and headloss formula.
    /// Legal only on a fresh project.
    pub fn init(
        &mut self,
        rpt_name: &str,
        out_name: &str,
        flow_units: FlowUnits,
        headloss: HeadlossModel,
    ) -> ProjectResult<()> {
        if self.opened {
            return Err(ProjectError::AlreadyOpen);
        }
        self.check_distinct_files(None, rpt_name, out_name)?;
        self.network.options.flow_units = flow_units;
        if flow_units.is_si() {
            self.network.options.pressure_units = aq_core::units::PressureUnits::Meters;
        }
        self.network.options.headloss = headloss;
        let def = self.network.add_pattern("1")?;
        self.network.options.def_pattern = Some(def);
        self.open_outputs(rpt_name, out_name)?;
        self.refresh_ucf();
        self.opened = true;
        Ok(())
    }

    /// Load a network from an INP file. Legal only on a fresh project.
    pub fn open(&mut self, inp_name: &str, rpt_name: &str, out_name: &str) -> ProjectResult<()> {
        if self.opened {
            return Err(ProjectError::AlreadyOpen);
        }
        self.check_distinct_files(Some(inp_name), rpt_name, out_name)?;
        let model = aq_io::read_inp(Path::new(inp_name))?;
        let mut network = model.network;
        let mut rules = model.rules;
        let ucf = Ucf::new(
            network.options.flow_units,
            network.options.pressure_units,
            network.options.qual,
            network.options.spgrav,
        );
        aq_io::convert::to_internal(&mut network, &mut rules, &ucf);
        self.network = network;
        self.rules = rules;
        self.report_opts = model.report;
        self.ucf = ucf;
        self.inp_path = Some(PathBuf::from(inp_name));
        self.open_outputs(rpt_name, out_name)?;
        if self.report_opts.summary {
            let _ = self.rpt.write_summary(&self.network);
        }
        self.opened = true;
        tracing::info!(
            nodes = self.network.n_nodes(),
            links = self.network.n_links(),
            "project opened"
        );
        Ok(())
    }

    /// Convenience driver: open, solve hydraulics and quality, report,
    /// close. Returns the worst solver warning.
    pub fn run_project(
        &mut self,
        inp_name: &str,
        rpt_name: &str,
        out_name: &str,
    ) -> ProjectResult<Option<Warn>> {
        self.open(inp_name, rpt_name, out_name)?;
        let warn_h = self.solve_h()?;
        let warn_q = self.solve_q()?;
        self.report()?;
        self.close()?;
        Ok(Warn::max(warn_h, warn_q))
    }

    /// Serialize the current model back to INP text.
    pub fn save_inp_file(&mut self, path: &str) -> ProjectResult<()> {
        if !self.opened {
            return Err(ProjectError::NotOpen);
        }
        aq_io::write_inp(
            Path::new(path),
            &self.network,
            &self.rules,
            &self.report_opts,
            &self.ucf,
        )?;
        Ok(())
    }

    /// Release files and clear the network; the project shell remains
    /// usable for a subsequent `open` or `init`. Calling `close` twice is a
    /// no-op on the second call.
    pub fn close(&mut self) -> ProjectResult<()> {
        if !self.opened {
            return Ok(());
        }
        let _ = self.rpt.flush();
        self.rpt = ReportWriter::disabled();
        self.hyd.close();
        self.qual.close();
        self.hyd_writer = None;
        self.hyd_reader = None;
        self.out_writer = None;
        self.current_snap = None;
        self.next_snap = None;
        self.network = Network::new();
        self.rules = RuleSet::new();
        self.hyd_results = false;
        self.hyd_source = HydSource::Scratch;
        self.out_written = false;
        self.inp_path = None;
        self.opened = false;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    /// The conversion-factor table currently in force.
    pub fn ucf(&self) -> &Ucf {
        &self.ucf
    }

    pub(crate) fn refresh_ucf(&mut self) {
        self.ucf = Ucf::new(
            self.network.options.flow_units,
            self.network.options.pressure_units,
            self.network.options.qual,
            self.network.options.spgrav,
        );
    }

    pub(crate) fn require_open(&self) -> ProjectResult<()> {
        if self.opened {
            Ok(())
        } else {
            Err(ProjectError::NotOpen)
        }
    }

    fn check_distinct_files(
        &self,
        inp: Option<&str>,
        rpt: &str,
        out: &str,
    ) -> ProjectResult<()> {
        let mut names: Vec<&str> = Vec::new();
        for name in [inp.unwrap_or(""), rpt, out] {
            if name.is_empty() {
                continue;
            }
            if names.contains(&name) {
                return Err(ProjectError::SameFileNames);
            }
            names.push(name);
        }
        Ok(())
    }

    fn open_outputs(&mut self, rpt_name: &str, out_name: &str) -> ProjectResult<()> {
        self.rpt = if rpt_name.is_empty() {
            ReportWriter::disabled()
        } else {
            ReportWriter::create(Path::new(rpt_name))?
        };
        if !out_name.is_empty() {
            self.out_path = PathBuf::from(out_name);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("opened", &self.opened)
            .field("input", &self.inp_path)
            .field("nodes", &self.network.n_nodes())
            .field("links", &self.network.n_links())
            .field("rules", &self.rules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_project_is_empty() {
        let p = Project::new().unwrap();
        assert!(!p.is_open());
        assert_eq!(p.network.n_nodes(), 0);
        // the three scratch names are distinct by construction
        assert_ne!(p.hyd_path, p.out_path);
        assert_ne!(p.out_path, p.stats_path);
    }

    #[test]
    fn init_rejects_second_call() {
        let mut p = Project::new().unwrap();
        p.init("", "", FlowUnits::Gpm, HeadlossModel::HazenWilliams)
            .unwrap();
        assert!(matches!(
            p.init("", "", FlowUnits::Gpm, HeadlossModel::HazenWilliams),
            Err(ProjectError::AlreadyOpen)
        ));
    }

    #[test]
    fn close_twice_is_noop() {
        let mut p = Project::new().unwrap();
        p.init("", "", FlowUnits::Cfs, HeadlossModel::HazenWilliams)
            .unwrap();
        p.close().unwrap();
        p.close().unwrap();
        assert!(!p.is_open());
    }

    #[test]
    fn duplicate_file_names_rejected() {
        let mut p = Project::new().unwrap();
        assert!(matches!(
            p.open("same.inp", "same.inp", ""),
            Err(ProjectError::SameFileNames)
        ));
    }
}
