//! Simple-control operations.

use aq_core::MISSING;
use aq_network::{Control, ControlKind, LinkKind, LinkStatus, NetworkError};

use crate::error::{ProjectError, ProjectResult};
use crate::project::Project;

/// A simple control exposed at the boundary: indices 1-based, values in
/// user units (pressure for junctions, level for tanks, seconds for time).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSpec {
    pub kind: ControlKind,
    pub link: usize,
    /// Controlling node position (0 for time-based controls).
    pub node: usize,
    /// 1 to open the link, 0 to close it; ignored when `setting` applies.
    pub open: bool,
    pub setting: f64,
    pub level: f64,
}

impl Project {
    /// Add a simple control; returns its 1-based index.
    pub fn add_control(&mut self, spec: ControlSpec) -> ProjectResult<usize> {
        self.require_open()?;
        let control = self.control_from_spec(&spec)?;
        let at = self.network.add_control(control)?;
        Ok(at + 1)
    }

    pub fn control_count(&self) -> usize {
        self.network.controls.len()
    }

    pub fn control(&self, index: usize) -> ProjectResult<ControlSpec> {
        self.require_open()?;
        let control = self
            .network
            .controls
            .get(index.wrapping_sub(1))
            .ok_or(ProjectError::UndefinedControl)?;
        let ucf = self.ucf();
        let (node, level) = match control.node {
            Some(n) => {
                let elevation = self.network.node(n).expect("control node").elevation;
                let level = if self.network.is_junction(n) {
                    (control.grade - elevation) * ucf.pressure
                } else {
                    (control.grade - elevation) * ucf.elev
                };
                (n.position(), level)
            }
            None => (0, control.time as f64),
        };
        let link_kind = self
            .network
            .link(control.link)
            .expect("control link")
            .kind;
        let setting = if control.setting == MISSING {
            0.0
        } else {
            aq_io::convert::setting_to_user(link_kind, control.setting, ucf)
        };
        Ok(ControlSpec {
            kind: control.kind,
            link: control.link.position(),
            node,
            open: control.status.is_open(),
            setting,
            level,
        })
    }

    pub fn set_control(&mut self, index: usize, spec: ControlSpec) -> ProjectResult<()> {
        self.require_open()?;
        if index == 0 || index > self.network.controls.len() {
            return Err(ProjectError::UndefinedControl);
        }
        let control = self.control_from_spec(&spec)?;
        self.network.controls[index - 1] = control;
        Ok(())
    }

    pub fn delete_control(&mut self, index: usize) -> ProjectResult<()> {
        self.require_open()?;
        self.network
            .delete_control(index.wrapping_sub(1))
            .map_err(|_| ProjectError::UndefinedControl)?;
        Ok(())
    }

    fn control_from_spec(&self, spec: &ControlSpec) -> ProjectResult<Control> {
        let link = self.link_idx(spec.link)?;
        let kind = self.network.link(link).expect("checked").kind;
        if kind == LinkKind::CvPipe {
            return Err(NetworkError::ControlOnCheckValve.into());
        }
        let ucf = self.ucf();
        let (node, grade, time) = match spec.kind {
            ControlKind::Timer | ControlKind::TimeOfDay => {
                if spec.level < 0.0 {
                    return Err(ProjectError::BadValue);
                }
                (None, 0.0, spec.level as i64)
            }
            _ => {
                let node = self.node_idx(spec.node)?;
                let elevation = self.network.node(node).expect("checked").elevation;
                let grade = if self.network.is_junction(node) {
                    elevation + spec.level / ucf.pressure
                } else {
                    elevation + spec.level / ucf.elev
                };
                (Some(node), grade, 0)
            }
        };
        let status = if spec.open {
            LinkStatus::Open
        } else {
            LinkStatus::Closed
        };
        let setting = match kind {
            LinkKind::Pump if spec.setting > 0.0 => spec.setting,
            k if k.is_valve() && spec.setting != 0.0 => {
                aq_io::convert::setting_to_internal(k, spec.setting, ucf)
            }
            _ => MISSING,
        };
        Ok(Control {
            kind: spec.kind,
            link,
            node,
            status,
            setting,
            grade,
            time,
        })
    }
}
