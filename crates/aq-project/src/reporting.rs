//! Report-file operations.

use aq_io::outfile::OutReader;
use aq_io::report::StatusLevel;

use crate::error::{ProjectError, ProjectResult};
use crate::project::Project;

impl Project {
    /// Write the configured report from the saved output results.
    pub fn report(&mut self) -> ProjectResult<()> {
        self.require_open()?;
        if !self.out_written {
            return Err(ProjectError::NoResults);
        }
        let out = OutReader::open(&self.out_path)?;
        if self.report_opts.summary {
            self.rpt.write_summary(&self.network)?;
        }
        if self.report_opts.energy {
            self.rpt.write_energy(&out)?;
        }
        let opts = self.report_opts.clone();
        self.rpt.write_results(&self.network, &out, &opts)?;
        self.rpt.flush()?;
        Ok(())
    }

    /// Append one line of text to the report file.
    pub fn write_line(&mut self, line: &str) -> ProjectResult<()> {
        self.require_open()?;
        self.rpt.write_line(line)?;
        Ok(())
    }

    /// Restore default reporting options and per-element report flags.
    pub fn reset_report(&mut self) -> ProjectResult<()> {
        self.require_open()?;
        self.report_opts = Default::default();
        for i in 0..self.network.n_nodes() {
            if let Some(node) = self.network.node_mut(aq_core::Idx::from_index(i)) {
                node.report = false;
            }
        }
        for i in 0..self.network.n_links() {
            if let Some(link) = self.network.link_mut(aq_core::Idx::from_index(i)) {
                link.report = false;
            }
        }
        Ok(())
    }

    /// Process one `[REPORT]`-style directive, e.g. `"NODES ALL"`.
    pub fn set_report(&mut self, directive: &str) -> ProjectResult<()> {
        self.require_open()?;
        let tokens: Vec<&str> = directive.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(ProjectError::Io(aq_io::IoError::Syntax(
                "empty report directive".into(),
                0,
            )));
        }
        match tokens[0].to_ascii_uppercase().as_str() {
            "SUMMARY" => self.report_opts.summary = yes_no(tokens.get(1))?,
            "ENERGY" => self.report_opts.energy = yes_no(tokens.get(1))?,
            "MESSAGES" => self.report_opts.messages = yes_no(tokens.get(1))?,
            "STATUS" => {
                self.report_opts.status = match tokens.get(1).map(|s| s.to_ascii_uppercase()) {
                    Some(ref s) if s == "YES" => StatusLevel::Normal,
                    Some(ref s) if s == "NO" => StatusLevel::None,
                    Some(ref s) if s == "FULL" => StatusLevel::Full,
                    _ => return Err(ProjectError::BadValue),
                };
            }
            "PAGE" | "PAGESIZE" => {
                let size: usize = tokens
                    .get(1)
                    .and_then(|s| s.parse().ok())
                    .ok_or(ProjectError::BadValue)?;
                self.report_opts.page_size = size;
            }
            "NODES" => match tokens.get(1).map(|s| s.to_ascii_uppercase()).as_deref() {
                Some("ALL") => self.report_opts.all_nodes = true,
                Some("NONE") => self.report_opts.all_nodes = false,
                _ => {
                    for id in &tokens[1..] {
                        let idx = self
                            .network
                            .find_node(id)
                            .ok_or(aq_network::NetworkError::UndefinedNode)?;
                        self.network.node_mut(idx).expect("node").report = true;
                    }
                }
            },
            "LINKS" => match tokens.get(1).map(|s| s.to_ascii_uppercase()).as_deref() {
                Some("ALL") => self.report_opts.all_links = true,
                Some("NONE") => self.report_opts.all_links = false,
                _ => {
                    for id in &tokens[1..] {
                        let idx = self
                            .network
                            .find_link(id)
                            .ok_or(aq_network::NetworkError::UndefinedLink)?;
                        self.network.link_mut(idx).expect("link").report = true;
                    }
                }
            },
            _ => return Err(ProjectError::BadValue),
        }
        Ok(())
    }

    /// Status-report level: 0 none, 1 normal, 2 full.
    pub fn set_status_report(&mut self, level: i32) -> ProjectResult<()> {
        self.report_opts.status = match level {
            0 => StatusLevel::None,
            1 => StatusLevel::Normal,
            2 => StatusLevel::Full,
            _ => return Err(ProjectError::CodeOutOfRange),
        };
        Ok(())
    }
}

fn yes_no(token: Option<&&str>) -> ProjectResult<bool> {
    match token.map(|s| s.to_ascii_uppercase()).as_deref() {
        Some("YES") => Ok(true),
        Some("NO") => Ok(false),
        _ => Err(ProjectError::BadValue),
    }
}
