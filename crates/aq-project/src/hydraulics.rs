//! Hydraulic solution phases.

use std::path::Path;

use aq_core::Warn;
use aq_core::time::Seconds;
use aq_io::hydfile::{HydHeader, HydReader, HydSnapshot, HydWriter};

use crate::enums::InitHydFlag;
use crate::error::{ProjectError, ProjectResult};
use crate::project::{HydSource, Project};

impl Project {
    /// Full extended-period hydraulic solution with results saved for the
    /// quality solver. Returns the worst warning raised.
    pub fn solve_h(&mut self) -> ProjectResult<Option<Warn>> {
        if self.hyd_source == HydSource::External {
            return Err(ProjectError::HydFileInUse);
        }
        self.open_h()?;
        self.init_h(InitHydFlag::SaveAndInit)?;
        loop {
            self.run_h()?;
            if self.next_h()? == 0 {
                break;
            }
        }
        let warning = self.hyd.run_warning;
        self.close_h()?;
        Ok(warning)
    }

    pub fn open_h(&mut self) -> ProjectResult<()> {
        self.require_open()?;
        if self.hyd_source == HydSource::External {
            return Err(ProjectError::HydOpenWhenUsingFile);
        }
        self.hyd.open(&mut self.network)?;
        Ok(())
    }

    pub fn init_h(&mut self, flag: InitHydFlag) -> ProjectResult<()> {
        if !self.hyd.is_open() {
            return Err(ProjectError::HydNotOpen);
        }
        let (save, init_flows) = match flag {
            InitHydFlag::NoSave => (false, false),
            InitHydFlag::Save => (true, false),
            InitHydFlag::InitFlow => (false, true),
            InitHydFlag::SaveAndInit => (true, true),
        };
        self.hyd.init(&self.network, init_flows)?;
        self.hyd_save = save;
        self.hyd_results = false;
        self.hyd_writer = if save {
            let header = HydHeader::of(&self.network, self.network.times.duration);
            Some(HydWriter::create(&self.hyd_path, &header)?)
        } else {
            None
        };
        Ok(())
    }

    /// Solve the current period; returns its clock time.
    pub fn run_h(&mut self) -> ProjectResult<Seconds> {
        if !self.hyd.is_initialized() {
            return Err(ProjectError::HydNotOpen);
        }
        let (t, _warn) = self.hyd.run(&self.network)?;
        if self.hyd_writer.is_some() {
            let snap = self.snapshot();
            if let Some(writer) = &mut self.hyd_writer {
                writer.write_snapshot(&snap)?;
            }
        }
        Ok(t)
    }

    /// Advance the clock; returns the step taken (zero at the end).
    pub fn next_h(&mut self) -> ProjectResult<Seconds> {
        if !self.hyd.is_initialized() {
            return Err(ProjectError::HydNotOpen);
        }
        Ok(self.hyd.next(&self.network, &self.rules)?)
    }

    pub fn close_h(&mut self) -> ProjectResult<()> {
        if !self.hyd.is_open() {
            return Err(ProjectError::HydNotOpen);
        }
        if let Some(writer) = self.hyd_writer.take() {
            writer.finish()?;
            self.hyd_results = true;
        }
        self.hyd.close();
        Ok(())
    }

    /// Transfer saved hydraulic results to the output file so a report can
    /// be produced without a water-quality run. Quality columns are zero.
    pub fn save_h(&mut self) -> ProjectResult<()> {
        if !self.hyd_results {
            return Err(ProjectError::NoHydResults);
        }
        let mut reader = HydReader::open(&self.hyd_path, &self.network)?;
        let mut writer = aq_io::outfile::OutWriter::create(
            &self.out_path,
            &self.network,
            &self.out_meta(),
        )?;
        let saved = self.current_snap.take();
        let mut rtime = self.network.times.rstart;
        while let Some(snap) = reader.read_snapshot()? {
            if snap.time >= rtime {
                self.current_snap = Some(snap);
                writer.write_period(&self.period_results())?;
                rtime += self.network.times.rstep.max(1);
            }
        }
        self.current_snap = saved;
        self.out_writer = Some(writer);
        self.finish_output()?;
        Ok(())
    }

    /// Copy the scratch hydraulics file to a named file.
    pub fn save_hyd_file(&mut self, path: &str) -> ProjectResult<()> {
        if !self.hyd_results {
            return Err(ProjectError::NoHydResults);
        }
        std::fs::copy(&self.hyd_path, path).map_err(|_| {
            ProjectError::Io(aq_io::IoError::HydOpen)
        })?;
        Ok(())
    }

    /// Adopt a previously saved hydraulics file in place of running the
    /// solver. The file's shape header must match the current network.
    pub fn use_hyd_file(&mut self, path: &str) -> ProjectResult<()> {
        self.require_open()?;
        if self.hyd.is_open() {
            return Err(ProjectError::HydOpenWhenUsingFile);
        }
        // validates magic, version and all six shape fields
        let _probe = HydReader::open(Path::new(path), &self.network)?;
        self.hyd_path = path.into();
        self.hyd_source = HydSource::External;
        self.hyd_results = true;
        Ok(())
    }

    /// Current hydraulic state as a scratch-file record.
    pub(crate) fn snapshot(&self) -> HydSnapshot {
        let st = &self.hyd.state;
        HydSnapshot {
            time: st.htime,
            demands: st.demand.clone(),
            heads: st.head.clone(),
            flows: st.flow.clone(),
            statuses: st.status.clone(),
            settings: st.setting.clone(),
        }
    }

    /// Post-run solver statistics.
    pub fn statistic(&self, which: crate::enums::StatisticType) -> ProjectResult<f64> {
        use crate::enums::StatisticType::*;
        Ok(match which {
            Iterations => self.hyd.outcome.iterations as f64,
            RelativeError => self.hyd.outcome.relative_error,
            MaxHeadError => self.hyd.outcome.max_head_error * self.ucf().head,
            MaxFlowChange => self.hyd.outcome.max_flow_change * self.ucf().flow,
            MassBalance => self.qual.mass_ratio(),
        })
    }
}
