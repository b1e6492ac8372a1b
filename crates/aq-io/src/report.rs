//! Text report writer.
//!
//! The report file is an explicit output of the engine, separate from
//! diagnostic logging. It receives the title, an optional network summary,
//! error and warning messages, an optional energy-usage table and per-period
//! result tables as configured by `[REPORT]` directives.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use aq_core::time::format_clock;
use aq_network::Network;

use crate::error::{IoError, IoResult};
use crate::outfile::OutReader;

/// How much hydraulic status detail the report carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusLevel {
    #[default]
    None,
    Normal,
    Full,
}

/// `[REPORT]` configuration.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub page_size: usize,
    pub summary: bool,
    pub energy: bool,
    pub status: StatusLevel,
    pub all_nodes: bool,
    pub all_links: bool,
    /// Whether error/warning messages are echoed to the report file.
    pub messages: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            page_size: 0,
            summary: true,
            energy: false,
            status: StatusLevel::None,
            all_nodes: false,
            all_links: false,
            messages: true,
        }
    }
}

/// Append-mode writer over the report file. A writer with no file swallows
/// output, so reporting calls are unconditional at the call sites.
pub struct ReportWriter {
    out: Option<BufWriter<File>>,
}

impl ReportWriter {
    pub fn disabled() -> Self {
        Self { out: None }
    }

    pub fn create(path: &Path) -> IoResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|_| IoError::ReportOpen)?;
        Ok(Self {
            out: Some(BufWriter::new(file)),
        })
    }

    pub fn is_open(&self) -> bool {
        self.out.is_some()
    }

    pub fn write_line(&mut self, line: &str) -> IoResult<()> {
        if let Some(out) = &mut self.out {
            writeln!(out, "  {line}").map_err(|_| IoError::ReportWrite)?;
        }
        Ok(())
    }

    pub fn blank(&mut self) -> IoResult<()> {
        self.write_line("")
    }

    pub fn flush(&mut self) -> IoResult<()> {
        if let Some(out) = &mut self.out {
            out.flush().map_err(|_| IoError::ReportWrite)?;
        }
        Ok(())
    }

    /// Network size summary, written after a successful open.
    pub fn write_summary(&mut self, net: &Network) -> IoResult<()> {
        for line in &net.title {
            self.write_line(line)?;
        }
        self.blank()?;
        self.write_line(&format!(
            "Number of Junctions................ {}",
            net.n_juncs()
        ))?;
        let reservoirs = net.tanks.iter().filter(|t| t.is_reservoir()).count();
        self.write_line(&format!(
            "Number of Reservoirs............... {reservoirs}"
        ))?;
        self.write_line(&format!(
            "Number of Tanks ................... {}",
            net.n_tanks() - reservoirs
        ))?;
        self.write_line(&format!(
            "Number of Pipes ................... {}",
            net.n_pipes()
        ))?;
        self.write_line(&format!(
            "Number of Pumps ................... {}",
            net.n_pumps()
        ))?;
        self.write_line(&format!(
            "Number of Valves .................. {}",
            net.n_valves()
        ))?;
        self.blank()
    }

    /// Pump energy-usage table from the output file epilog.
    pub fn write_energy(&mut self, out: &OutReader) -> IoResult<()> {
        if out.pump_energy.is_empty() {
            return Ok(());
        }
        self.write_line("Energy Usage:")?;
        self.write_line(
            "Pump      Usage    Avg.      Kw-hr     Avg.      Peak      Cost",
        )?;
        self.write_line(
            "         Factor   Effic.    /Volume     Kw        Kw      /day",
        )?;
        self.write_line("----------------------------------------------------------------")?;
        for rec in &out.pump_energy {
            let id = out
                .link_ids
                .get(rec.link_position as usize - 1)
                .map(String::as_str)
                .unwrap_or("?");
            self.write_line(&format!(
                "{:<8} {:>7.2} {:>8.2} {:>9.4} {:>9.2} {:>9.2} {:>9.2}",
                id,
                rec.time_online_pct,
                rec.avg_efficiency,
                rec.kwhrs_per_vol,
                rec.avg_kw,
                rec.peak_kw,
                rec.total_cost
            ))?;
        }
        self.blank()
    }

    /// Per-period node and link tables.
    pub fn write_results(
        &mut self,
        net: &Network,
        out: &OutReader,
        opts: &ReportOptions,
    ) -> IoResult<()> {
        for (p, period) in out.periods.iter().enumerate() {
            let t = out.report_start + p as i64 * out.report_step;
            if opts.all_nodes || net.nodes().iter().any(|n| n.report) {
                self.write_line(&format!("Node Results at {}:", format_clock(t)))?;
                self.write_line("Node            Demand      Head  Pressure   Quality")?;
                self.write_line("-----------------------------------------------------")?;
                for (i, node) in net.nodes().iter().enumerate() {
                    if !(opts.all_nodes || node.report) {
                        continue;
                    }
                    self.write_line(&format!(
                        "{:<12} {:>9.2} {:>9.2} {:>9.2} {:>9.2}",
                        node.id(),
                        period.node_demand[i],
                        period.node_head[i],
                        period.node_pressure[i],
                        period.node_quality[i]
                    ))?;
                }
                self.blank()?;
            }
            if opts.all_links || net.links().iter().any(|l| l.report) {
                self.write_line(&format!("Link Results at {}:", format_clock(t)))?;
                self.write_line("Link              Flow  Velocity  Headloss    Status")?;
                self.write_line("-----------------------------------------------------")?;
                for (i, link) in net.links().iter().enumerate() {
                    if !(opts.all_links || link.report) {
                        continue;
                    }
                    let status = if period.link_status[i] <= 2.0 {
                        "CLOSED"
                    } else if period.link_status[i] == 4.0 {
                        "ACTIVE"
                    } else {
                        "OPEN"
                    };
                    self.write_line(&format!(
                        "{:<12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                        link.id(),
                        period.link_flow[i],
                        period.link_velocity[i],
                        period.link_headloss[i],
                        status
                    ))?;
                }
                self.blank()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_writer_accepts_lines() {
        let mut w = ReportWriter::disabled();
        w.write_line("nothing happens").unwrap();
        w.flush().unwrap();
        assert!(!w.is_open());
    }

    #[test]
    fn file_writer_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.rpt");
        let mut w = ReportWriter::create(&path).unwrap();
        w.write_line("hello").unwrap();
        w.flush().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("hello"));
    }
}
