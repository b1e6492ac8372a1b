//! Link operations: CRUD, properties, node reassignment, type changes.

use aq_core::Idx;
use aq_core::time::SECS_PER_DAY;
use aq_hydraul::resist::set_link_resistance;
use aq_io::convert::{setting_to_internal, setting_to_user};
use aq_network::{LinkKind, LinkStatus, NetworkError, PumpKind};

use crate::enums::{ActionCode, LinkProperty};
use crate::error::{ProjectError, ProjectResult};
use crate::project::Project;

impl Project {
    /// Add a link between two named nodes; returns its 1-based index.
    pub fn add_link(
        &mut self,
        id: &str,
        kind: LinkKind,
        from_node: &str,
        to_node: &str,
    ) -> ProjectResult<usize> {
        self.require_open()?;
        let n1 = self
            .network
            .find_node(from_node)
            .ok_or(NetworkError::UndefinedNode)?;
        let n2 = self
            .network
            .find_node(to_node)
            .ok_or(NetworkError::UndefinedNode)?;
        let idx = self.network.add_link(id, kind, n1, n2)?;
        set_link_resistance(&mut self.network, idx);
        Ok(idx.position())
    }

    /// Delete a link. Conditional deletion refuses when controls or rules
    /// reference it; unconditional deletion purges them.
    pub fn delete_link(&mut self, index: usize, action: ActionCode) -> ProjectResult<()> {
        let idx = self.link_idx(index)?;
        if action == ActionCode::Conditional
            && (self.network.controls_reference_link(idx) || self.rules.references_link(idx))
        {
            return Err(ProjectError::ElementUndeletable);
        }
        self.rules.purge_link(idx);
        self.network.delete_link(idx)?;
        self.rules.shift_link_down(idx.index());
        Ok(())
    }

    pub fn link_index(&self, id: &str) -> ProjectResult<usize> {
        self.require_open()?;
        self.network
            .find_link(id)
            .map(|i| i.position())
            .ok_or_else(|| NetworkError::UndefinedLink.into())
    }

    pub fn link_id(&self, index: usize) -> ProjectResult<String> {
        let idx = self.link_idx(index)?;
        Ok(self.network.link(idx).expect("checked").id().to_string())
    }

    pub fn set_link_id(&mut self, index: usize, new_id: &str) -> ProjectResult<()> {
        let idx = self.link_idx(index)?;
        self.network.set_link_id(idx, new_id)?;
        Ok(())
    }

    pub fn link_type(&self, index: usize) -> ProjectResult<LinkKind> {
        let idx = self.link_idx(index)?;
        Ok(self.network.link(idx).expect("checked").kind)
    }

    /// End nodes as 1-based positions.
    pub fn link_nodes(&self, index: usize) -> ProjectResult<(usize, usize)> {
        let idx = self.link_idx(index)?;
        let link = self.network.link(idx).expect("checked");
        Ok((link.n1().position(), link.n2().position()))
    }

    pub fn set_link_nodes(&mut self, index: usize, node1: usize, node2: usize) -> ProjectResult<()> {
        let idx = self.link_idx(index)?;
        let n1 = self.node_idx(node1)?;
        let n2 = self.node_idx(node2)?;
        self.network.set_link_nodes(idx, n1, n2)?;
        Ok(())
    }

    /// Change a link's type, preserving its ID and end nodes. Within the
    /// pipe family this is an in-place flag change; otherwise the link is
    /// deleted and re-added, so its index moves to the end of the list.
    /// Returns the link's new 1-based index.
    pub fn set_link_type(
        &mut self,
        index: usize,
        kind: LinkKind,
        action: ActionCode,
    ) -> ProjectResult<usize> {
        let idx = self.link_idx(index)?;
        let old = self.network.link(idx).expect("checked").clone();
        if old.kind == kind {
            return Ok(index);
        }
        if old.kind.is_pipe() && kind.is_pipe() {
            self.network.link_mut(idx).expect("checked").kind = kind;
            return Ok(index);
        }
        self.network.valve_check(kind, old.n1(), old.n2(), Some(idx))?;
        if action == ActionCode::Conditional
            && (self.network.controls_reference_link(idx) || self.rules.references_link(idx))
        {
            return Err(ProjectError::ElementUndeletable);
        }

        let id = old.id().to_string();
        let (n1, n2) = (old.n1(), old.n2());
        self.rules.purge_link(idx);
        self.network.delete_link(idx)?;
        self.rules.shift_link_down(idx.index());
        let new_idx = self.network.add_link(&id, kind, n1, n2)?;
        // carry over the shared geometry
        {
            let link = self.network.link_mut(new_idx).expect("just added");
            if old.diameter > 0.0 {
                link.diameter = old.diameter;
            }
            if kind.is_pipe() {
                link.length = old.length;
            }
            link.kb = old.kb;
            link.kw = old.kw;
        }
        set_link_resistance(&mut self.network, new_idx);
        Ok(new_idx.position())
    }

    /// Read one link property in user units.
    pub fn link_value(&self, index: usize, prop: LinkProperty) -> ProjectResult<f64> {
        let idx = self.link_idx(index)?;
        let k = idx.index();
        let ucf = self.ucf();
        let link = self.network.link(idx).expect("checked");
        use LinkProperty::*;
        let value = match prop {
            Diameter => {
                if link.kind == LinkKind::Pump {
                    0.0
                } else {
                    link.diameter * ucf.diam
                }
            }
            Length => link.length * ucf.length,
            Roughness => {
                if self.network.options.headloss
                    == aq_core::units::HeadlossModel::DarcyWeisbach
                    && link.kind.is_pipe()
                {
                    link.kc * 1000.0 * ucf.elev
                } else {
                    link.kc
                }
            }
            MinorLoss => {
                if link.kind == LinkKind::Pump || link.diameter == 0.0 {
                    0.0
                } else {
                    link.km * link.diameter.powi(4) / 0.02517
                }
            }
            InitStatus => (link.init_status.is_open() as u8) as f64,
            InitSetting => match link.kind {
                LinkKind::Pipe | LinkKind::CvPipe => link.kc,
                _ => setting_to_user(link.kind, link.kc, ucf),
            },
            KBulk => {
                if link.kb == aq_core::MISSING {
                    0.0
                } else {
                    link.kb * SECS_PER_DAY as f64
                }
            }
            KWall => {
                if link.kw == aq_core::MISSING {
                    0.0
                } else {
                    link.kw * SECS_PER_DAY as f64
                }
            }
            Flow => self.hyd.state.flow.get(k).copied().unwrap_or(0.0) * ucf.flow,
            Velocity => {
                let q = self.hyd.state.flow.get(k).copied().unwrap_or(0.0).abs();
                let area = std::f64::consts::PI / 4.0 * link.diameter * link.diameter;
                if area > 0.0 { q / area * ucf.velocity } else { 0.0 }
            }
            Headloss => {
                let h1 = self.hyd.state.head.get(link.n1().index()).copied().unwrap_or(0.0);
                let h2 = self.hyd.state.head.get(link.n2().index()).copied().unwrap_or(0.0);
                (h1 - h2).abs() * ucf.headloss
            }
            Status => {
                let status = self
                    .hyd
                    .state
                    .status
                    .get(k)
                    .copied()
                    .unwrap_or(link.init_status);
                (status.is_open() as u8) as f64
            }
            Setting => {
                let setting = self
                    .hyd
                    .state
                    .setting
                    .get(k)
                    .copied()
                    .unwrap_or(link.kc);
                if setting == aq_core::MISSING {
                    0.0
                } else if link.kind.is_pipe() {
                    setting
                } else {
                    setting_to_user(link.kind, setting, ucf)
                }
            }
            Energy => {
                let p = self
                    .network
                    .pump_index(idx)
                    .ok_or(NetworkError::UndefinedLink)?;
                self.hyd
                    .state
                    .energy
                    .get(p)
                    .map(|e| e.total_kwhrs)
                    .unwrap_or(0.0)
            }
            LinkQual => self.qual.link_quality(k) * ucf.quality,
            LinkPattern => self
                .pump_ref(idx)?
                .upat
                .map(|p| p.position() as f64)
                .unwrap_or(0.0),
            PumpHCurve => self
                .pump_ref(idx)?
                .hcurve
                .map(|c| c.position() as f64)
                .unwrap_or(0.0),
            PumpECurve => self
                .pump_ref(idx)?
                .ecurve
                .map(|c| c.position() as f64)
                .ok_or(ProjectError::NoEfficiencyCurve)?,
            PumpECost => self.pump_ref(idx)?.ecost,
            PumpEPattern => self
                .pump_ref(idx)?
                .epat
                .map(|p| p.position() as f64)
                .unwrap_or(0.0),
        };
        Ok(value)
    }

    /// Write one link property in user units.
    pub fn set_link_value(
        &mut self,
        index: usize,
        prop: LinkProperty,
        value: f64,
    ) -> ProjectResult<()> {
        let idx = self.link_idx(index)?;
        let k = idx.index();
        if !value.is_finite() {
            return Err(ProjectError::BadValue);
        }
        let ucf = *self.ucf();
        let kind = self.network.link(idx).expect("checked").kind;
        use LinkProperty::*;
        match prop {
            Diameter => {
                if value <= 0.0 || kind == LinkKind::Pump {
                    return Err(ProjectError::BadValue);
                }
                let link = self.network.link_mut(idx).expect("checked");
                let new_d = value / ucf.diam;
                // minor-loss coefficient scales with the diameter change
                let ratio = (link.diameter / new_d).powi(4);
                link.km *= ratio;
                link.diameter = new_d;
                set_link_resistance(&mut self.network, idx);
            }
            Length => {
                if value <= 0.0 || !kind.is_pipe() {
                    return Err(ProjectError::BadValue);
                }
                self.network.link_mut(idx).expect("checked").length = value / ucf.length;
                set_link_resistance(&mut self.network, idx);
            }
            Roughness => {
                if value <= 0.0 || !kind.is_pipe() {
                    return Err(ProjectError::BadValue);
                }
                let dw = self.network.options.headloss
                    == aq_core::units::HeadlossModel::DarcyWeisbach;
                let link = self.network.link_mut(idx).expect("checked");
                link.kc = if dw { value / (1000.0 * ucf.elev) } else { value };
                set_link_resistance(&mut self.network, idx);
            }
            MinorLoss => {
                if value < 0.0 {
                    return Err(ProjectError::BadValue);
                }
                let link = self.network.link_mut(idx).expect("checked");
                link.km = 0.02517 * value / link.diameter.powi(4);
            }
            InitStatus => {
                if kind == LinkKind::CvPipe {
                    return Err(NetworkError::ControlOnCheckValve.into());
                }
                self.network.link_mut(idx).expect("checked").init_status = if value == 0.0 {
                    LinkStatus::Closed
                } else if kind.is_valve() {
                    LinkStatus::Active
                } else {
                    LinkStatus::Open
                };
            }
            InitSetting => {
                let internal = if kind.is_pipe() {
                    if value <= 0.0 {
                        return Err(ProjectError::BadValue);
                    }
                    value
                } else {
                    setting_to_internal(kind, value, &ucf)
                };
                let link = self.network.link_mut(idx).expect("checked");
                link.kc = internal;
                if kind.is_pipe() {
                    set_link_resistance(&mut self.network, idx);
                }
            }
            KBulk => {
                self.network.link_mut(idx).expect("checked").kb =
                    value / SECS_PER_DAY as f64;
            }
            KWall => {
                self.network.link_mut(idx).expect("checked").kw =
                    value / SECS_PER_DAY as f64;
            }
            Status => {
                if kind == LinkKind::CvPipe {
                    return Err(NetworkError::ControlOnCheckValve.into());
                }
                if let Some(status) = self.hyd.state.status.get_mut(k) {
                    *status = if value == 0.0 {
                        LinkStatus::Closed
                    } else {
                        LinkStatus::Open
                    };
                }
            }
            Setting => {
                if kind == LinkKind::CvPipe {
                    return Err(NetworkError::ControlOnCheckValve.into());
                }
                let internal = if kind.is_pipe() {
                    value
                } else {
                    setting_to_internal(kind, value, &ucf)
                };
                if let Some(setting) = self.hyd.state.setting.get_mut(k) {
                    *setting = internal;
                    if kind.is_valve() {
                        if let Some(status) = self.hyd.state.status.get_mut(k) {
                            *status = LinkStatus::Active;
                        }
                    }
                }
            }
            LinkPattern => {
                let pattern = self.pattern_opt(value)?;
                self.pump_mut(idx)?.upat = pattern;
            }
            PumpHCurve => {
                let curve = self.curve_opt(value)?;
                let p = self
                    .network
                    .pump_index(idx)
                    .ok_or(NetworkError::UndefinedLink)?;
                self.network.pumps[p].hcurve = curve;
                if let Some(c) = curve {
                    self.assign_curve_kind(c, aq_network::CurveKind::Pump);
                    self.network.pumps[p].kind = PumpKind::NoCurve;
                    self.network.update_pump_params(p)?;
                }
            }
            PumpECurve => {
                let curve = self.curve_opt(value)?;
                let p = self
                    .network
                    .pump_index(idx)
                    .ok_or(NetworkError::UndefinedLink)?;
                self.network.pumps[p].ecurve = curve;
                if let Some(c) = curve {
                    self.assign_curve_kind(c, aq_network::CurveKind::Effic);
                }
            }
            PumpECost => {
                if value < 0.0 {
                    return Err(ProjectError::BadValue);
                }
                self.pump_mut(idx)?.ecost = value;
            }
            PumpEPattern => {
                let pattern = self.pattern_opt(value)?;
                self.pump_mut(idx)?.epat = pattern;
            }
            Flow | Velocity | Headloss | Energy | LinkQual => {
                return Err(ProjectError::CodeOutOfRange);
            }
        }
        Ok(())
    }

    /// Head-curve index assigned to a pump (0 when none).
    pub fn head_curve_index(&self, index: usize) -> ProjectResult<usize> {
        let idx = self.link_idx(index)?;
        Ok(self
            .pump_ref(idx)?
            .hcurve
            .map(|c| c.position())
            .unwrap_or(0))
    }

    pub fn set_head_curve_index(&mut self, index: usize, curve: usize) -> ProjectResult<()> {
        self.set_link_value(index, LinkProperty::PumpHCurve, curve as f64)
    }

    /// The pump's characteristic-curve classification.
    pub fn pump_type(&self, index: usize) -> ProjectResult<PumpKind> {
        let idx = self.link_idx(index)?;
        Ok(self.pump_ref(idx)?.kind)
    }

    // --- helpers ---

    pub(crate) fn link_idx(&self, index: usize) -> ProjectResult<Idx> {
        self.require_open()?;
        Idx::from_position(index as i64)
            .filter(|i| i.index() < self.network.n_links())
            .ok_or_else(|| NetworkError::UndefinedLink.into())
    }

    fn pump_ref(&self, idx: Idx) -> ProjectResult<&aq_network::Pump> {
        let p = self
            .network
            .pump_index(idx)
            .ok_or(NetworkError::UndefinedLink)?;
        Ok(&self.network.pumps[p])
    }

    fn pump_mut(&mut self, idx: Idx) -> ProjectResult<&mut aq_network::Pump> {
        let p = self
            .network
            .pump_index(idx)
            .ok_or(NetworkError::UndefinedLink)?;
        Ok(&mut self.network.pumps[p])
    }

    pub(crate) fn curve_opt(&self, value: f64) -> ProjectResult<Option<Idx>> {
        if value == 0.0 {
            return Ok(None);
        }
        let idx = Idx::from_position(value as i64)
            .filter(|c| c.index() < self.network.curves.len())
            .ok_or(NetworkError::UndefinedCurve)?;
        Ok(Some(idx))
    }
}
