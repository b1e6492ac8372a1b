//! Node operations: CRUD, properties, coordinates, demands, sources.

use aq_core::Idx;
use aq_core::time::SECS_PER_DAY;
use aq_network::{Demand, NetworkError, NodeKind, Source, SourceKind};

use crate::enums::{ActionCode, NodeProperty};
use crate::error::{ProjectError, ProjectResult};
use crate::project::Project;

impl Project {
    /// Add a node; returns its 1-based index. Adding a junction renumbers
    /// every tank and reservoir upward, including rule references.
    pub fn add_node(&mut self, id: &str, kind: NodeKind) -> ProjectResult<usize> {
        self.require_open()?;
        let idx = self.network.add_node(id, kind)?;
        if kind == NodeKind::Junction {
            self.rules.shift_node_up(idx.index());
        }
        Ok(idx.position())
    }

    /// Delete a node and its attached links. Conditional deletion refuses
    /// when controls or rules reference the node or any attached link.
    pub fn delete_node(&mut self, index: usize, action: ActionCode) -> ProjectResult<()> {
        self.require_open()?;
        let idx = self.node_idx(index)?;
        if self.network.options.trace_node == Some(idx) {
            return Err(ProjectError::TraceNodeUndeletable);
        }
        let adjacent = self.network.adjacent_links(idx);
        if action == ActionCode::Conditional {
            let mut referenced = self.network.controls_reference_node(idx)
                || self.rules.references_node(idx);
            for link in &adjacent {
                referenced = referenced
                    || self.network.controls_reference_link(*link)
                    || self.rules.references_link(*link);
            }
            if referenced {
                return Err(ProjectError::ElementUndeletable);
            }
        }
        // attached links go first, highest index first so the others stay valid
        let mut adjacent = adjacent;
        adjacent.sort_by_key(|l| std::cmp::Reverse(l.index()));
        for link in adjacent {
            self.rules.purge_link(link);
            self.network.delete_link(link)?;
            self.rules.shift_link_down(link.index());
        }
        self.rules.purge_node(idx);
        self.network.delete_node(idx)?;
        self.rules.shift_node_down(idx.index());
        Ok(())
    }

    pub fn node_index(&self, id: &str) -> ProjectResult<usize> {
        self.require_open()?;
        self.network
            .find_node(id)
            .map(|i| i.position())
            .ok_or_else(|| NetworkError::UndefinedNode.into())
    }

    pub fn node_id(&self, index: usize) -> ProjectResult<String> {
        let idx = self.node_idx(index)?;
        Ok(self.network.node(idx).expect("checked").id().to_string())
    }

    pub fn set_node_id(&mut self, index: usize, new_id: &str) -> ProjectResult<()> {
        let idx = self.node_idx(index)?;
        self.network.set_node_id(idx, new_id)?;
        Ok(())
    }

    pub fn node_type(&self, index: usize) -> ProjectResult<NodeKind> {
        let idx = self.node_idx(index)?;
        Ok(self.network.node_kind(idx).expect("checked"))
    }

    pub fn coord(&self, index: usize) -> ProjectResult<(f64, f64)> {
        let idx = self.node_idx(index)?;
        self.network
            .node(idx)
            .expect("checked")
            .coords
            .ok_or(ProjectError::NoCoordinates)
    }

    pub fn set_coord(&mut self, index: usize, x: f64, y: f64) -> ProjectResult<()> {
        let idx = self.node_idx(index)?;
        if !x.is_finite() || !y.is_finite() {
            return Err(ProjectError::BadValue);
        }
        self.network.node_mut(idx).expect("checked").coords = Some((x, y));
        Ok(())
    }

    /// Read one node property in user units.
    pub fn node_value(&self, index: usize, prop: NodeProperty) -> ProjectResult<f64> {
        let idx = self.node_idx(index)?;
        let i = idx.index();
        let ucf = self.ucf();
        let node = self.network.node(idx).expect("checked");
        let qexp = self.network.options.emit_expon;
        use NodeProperty::*;
        let value = match prop {
            Elevation => node.elevation * ucf.elev,
            BaseDemand => node.primary_demand().map(|d| d.base).unwrap_or(0.0) * ucf.flow,
            DemandPattern => node
                .primary_demand()
                .and_then(|d| d.pattern)
                .map(|p| p.position() as f64)
                .unwrap_or(0.0),
            Emitter => node.emitter * ucf.flow / ucf.pressure.powf(qexp),
            InitQual => node.init_qual * ucf.quality,
            SourceQual | SourcePattern | SourceType | SourceMass => {
                let source = node.source.as_ref().ok_or(ProjectError::NoSourceAtNode)?;
                match prop {
                    SourceQual => {
                        if source.kind == SourceKind::Mass {
                            source.base
                        } else {
                            source.base * ucf.quality
                        }
                    }
                    SourcePattern => source
                        .pattern
                        .map(|p| p.position() as f64)
                        .unwrap_or(0.0),
                    SourceType => source.kind as u8 as f64,
                    _ => {
                        let factor = source
                            .pattern
                            .and_then(|p| self.network.pattern(p))
                            .map(|p| {
                                let period = (self.qual.qtime
                                    / self.network.times.pstep.max(1))
                                    as usize;
                                p.value(period)
                            })
                            .unwrap_or(1.0);
                        source.base * factor
                    }
                }
            }
            TankLevel => {
                let tank = self.tank_ref(idx)?;
                (tank.h0 - node.elevation) * ucf.elev
            }
            Demand => self.hyd.state.demand.get(i).copied().unwrap_or(0.0) * ucf.flow,
            Head => self.hyd.state.head.get(i).copied().unwrap_or(0.0) * ucf.head,
            Pressure => {
                (self.hyd.state.head.get(i).copied().unwrap_or(0.0) - node.elevation)
                    * ucf.pressure
            }
            Quality => self.qual.quality_at(i) * ucf.quality,
            InitVolume => self.tank_ref(idx)?.v0 * ucf.volume,
            MixModel => self.tank_ref(idx)?.mix_model as u8 as f64,
            MixZoneVol => self.tank_ref(idx)?.v1max() * ucf.volume,
            TankDiam => {
                let area = self.tank_ref(idx)?.area;
                (4.0 * area / std::f64::consts::PI).sqrt() * ucf.elev
            }
            MinVolume => self.tank_ref(idx)?.vmin * ucf.volume,
            VolCurve => self
                .tank_ref(idx)?
                .vol_curve
                .map(|c| c.position() as f64)
                .unwrap_or(0.0),
            MinLevel => (self.tank_ref(idx)?.hmin - node.elevation) * ucf.elev,
            MaxLevel => (self.tank_ref(idx)?.hmax - node.elevation) * ucf.elev,
            MixFraction => self.tank_ref(idx)?.v1_frac,
            TankKBulk => {
                let kb = self.tank_ref(idx)?.kb;
                if kb == aq_core::MISSING {
                    0.0
                } else {
                    kb * SECS_PER_DAY as f64
                }
            }
            TankVolume => {
                let t = self
                    .network
                    .tank_index(idx)
                    .ok_or(NetworkError::UndefinedNode)?;
                self.hyd
                    .state
                    .tank_volume
                    .get(t)
                    .copied()
                    .unwrap_or(self.network.tanks[t].v0)
                    * ucf.volume
            }
            MaxVolume => self.tank_ref(idx)?.vmax * ucf.volume,
        };
        Ok(value)
    }

    /// Write one node property in user units.
    pub fn set_node_value(
        &mut self,
        index: usize,
        prop: NodeProperty,
        value: f64,
    ) -> ProjectResult<()> {
        let idx = self.node_idx(index)?;
        if !value.is_finite() {
            return Err(ProjectError::BadValue);
        }
        let ucf = *self.ucf();
        let qexp = self.network.options.emit_expon;
        let elevation = self.network.node(idx).expect("checked").elevation;
        use NodeProperty::*;
        match prop {
            Elevation => {
                let new_elev = value / ucf.elev;
                let delta = new_elev - elevation;
                self.network.node_mut(idx).expect("checked").elevation = new_elev;
                if let Some(t) = self.network.tank_index(idx) {
                    let tank = &mut self.network.tanks[t];
                    tank.h0 += delta;
                    tank.hmin += delta;
                    tank.hmax += delta;
                }
            }
            BaseDemand => {
                let node = self.network.node_mut(idx).expect("checked");
                let base = value / ucf.flow;
                match node.primary_demand_mut() {
                    Some(demand) => demand.base = base,
                    None => node.demands.push(aq_network::Demand {
                        base,
                        pattern: None,
                        name: String::new(),
                    }),
                }
            }
            DemandPattern => {
                let pattern = self.pattern_opt(value)?;
                let node = self.network.node_mut(idx).expect("checked");
                match node.primary_demand_mut() {
                    Some(demand) => demand.pattern = pattern,
                    None => node.demands.push(aq_network::Demand {
                        base: 0.0,
                        pattern,
                        name: String::new(),
                    }),
                }
            }
            Emitter => {
                if value < 0.0 {
                    return Err(ProjectError::BadValue);
                }
                if !self.network.is_junction(idx) {
                    return Err(NetworkError::UndefinedNode.into());
                }
                self.network.node_mut(idx).expect("checked").emitter =
                    value * ucf.pressure.powf(qexp) / ucf.flow;
            }
            InitQual => {
                if value < 0.0 {
                    return Err(ProjectError::BadValue);
                }
                self.network.node_mut(idx).expect("checked").init_qual = value / ucf.quality;
            }
            SourceQual | SourcePattern | SourceType => {
                let pattern = if prop == SourcePattern {
                    self.pattern_opt(value)?
                } else {
                    None
                };
                let node = self.network.node_mut(idx).expect("checked");
                let source = node.source.get_or_insert(Source {
                    kind: SourceKind::Concen,
                    base: 0.0,
                    pattern: None,
                });
                match prop {
                    SourceQual => {
                        if value < 0.0 {
                            return Err(ProjectError::BadValue);
                        }
                        source.base = if source.kind == SourceKind::Mass {
                            value
                        } else {
                            value / ucf.quality
                        };
                    }
                    SourcePattern => source.pattern = pattern,
                    _ => {
                        let kind = SourceKind::from_value(value as u8)
                            .ok_or(ProjectError::CodeOutOfRange)?;
                        source.kind = kind;
                    }
                }
            }
            TankLevel => {
                let t = self.tank_index_checked(idx)?;
                let h0 = elevation + value / ucf.elev;
                let tank = &mut self.network.tanks[t];
                if h0 < tank.hmin || h0 > tank.hmax {
                    return Err(ProjectError::BadValue);
                }
                tank.h0 = h0;
                self.network.update_tank_volumes(t, true);
            }
            MixModel => {
                let t = self.tank_index_checked(idx)?;
                self.network.tanks[t].mix_model =
                    aq_network::MixModel::from_value(value as u8).ok_or(ProjectError::CodeOutOfRange)?;
            }
            MixFraction => {
                if !(0.0..=1.0).contains(&value) {
                    return Err(ProjectError::BadValue);
                }
                let t = self.tank_index_checked(idx)?;
                self.network.tanks[t].v1_frac = value;
            }
            TankDiam => {
                if value <= 0.0 {
                    return Err(ProjectError::BadValue);
                }
                let t = self.tank_index_checked(idx)?;
                let d = value / ucf.elev;
                self.network.tanks[t].area = std::f64::consts::PI / 4.0 * d * d;
                self.network.update_tank_volumes(t, false);
            }
            MinVolume => {
                if value < 0.0 {
                    return Err(ProjectError::BadValue);
                }
                let t = self.tank_index_checked(idx)?;
                self.network.tanks[t].vmin = value / ucf.volume;
                self.network.update_tank_volumes(t, true);
            }
            MinLevel => {
                let t = self.tank_index_checked(idx)?;
                let hmin = elevation + value / ucf.elev;
                let tank = &mut self.network.tanks[t];
                if hmin > tank.h0 || hmin > tank.hmax {
                    return Err(ProjectError::BadValue);
                }
                tank.hmin = hmin;
                self.network.update_tank_volumes(t, false);
            }
            MaxLevel => {
                let t = self.tank_index_checked(idx)?;
                let hmax = elevation + value / ucf.elev;
                let tank = &mut self.network.tanks[t];
                if hmax < tank.h0 || hmax < tank.hmin {
                    return Err(ProjectError::BadValue);
                }
                tank.hmax = hmax;
                self.network.update_tank_volumes(t, true);
            }
            VolCurve => {
                let t = self.tank_index_checked(idx)?;
                let curve = if value == 0.0 {
                    None
                } else {
                    let c = Idx::from_position(value as i64)
                        .filter(|c| c.index() < self.network.curves.len())
                        .ok_or(NetworkError::UndefinedCurve)?;
                    Some(c)
                };
                self.network.tanks[t].vol_curve = curve;
                if let Some(c) = curve {
                    self.assign_curve_kind(c, aq_network::CurveKind::Volume);
                }
                self.network.update_tank_volumes(t, false);
            }
            TankKBulk => {
                let t = self.tank_index_checked(idx)?;
                self.network.tanks[t].kb = value / SECS_PER_DAY as f64;
            }
            Demand | Head | Pressure | Quality | SourceMass | InitVolume | MixZoneVol
            | TankVolume | MaxVolume => return Err(ProjectError::CodeOutOfRange),
        }
        Ok(())
    }

    // --- demand categories ---

    /// Number of demand categories at a junction.
    pub fn demand_count(&self, index: usize) -> ProjectResult<usize> {
        let idx = self.node_idx(index)?;
        Ok(self.network.node(idx).expect("checked").demands.len())
    }

    pub fn base_demand(&self, index: usize, demand: usize) -> ProjectResult<f64> {
        let d = self.demand_ref(index, demand)?;
        Ok(d.base * self.ucf().flow)
    }

    pub fn set_base_demand(
        &mut self,
        index: usize,
        demand: usize,
        value: f64,
    ) -> ProjectResult<()> {
        let flow_ucf = self.ucf().flow;
        let d = self.demand_mut(index, demand)?;
        d.base = value / flow_ucf;
        Ok(())
    }

    pub fn demand_pattern(&self, index: usize, demand: usize) -> ProjectResult<usize> {
        let d = self.demand_ref(index, demand)?;
        Ok(d.pattern.map(|p| p.position()).unwrap_or(0))
    }

    pub fn set_demand_pattern(
        &mut self,
        index: usize,
        demand: usize,
        pattern: usize,
    ) -> ProjectResult<()> {
        let pattern = self.pattern_opt(pattern as f64)?;
        let d = self.demand_mut(index, demand)?;
        d.pattern = pattern;
        Ok(())
    }

    pub fn demand_name(&self, index: usize, demand: usize) -> ProjectResult<String> {
        Ok(self.demand_ref(index, demand)?.name.clone())
    }

    pub fn set_demand_name(
        &mut self,
        index: usize,
        demand: usize,
        name: &str,
    ) -> ProjectResult<()> {
        let d = self.demand_mut(index, demand)?;
        d.name = name.to_string();
        Ok(())
    }

    // --- helpers ---

    pub(crate) fn node_idx(&self, index: usize) -> ProjectResult<Idx> {
        self.require_open()?;
        Idx::from_position(index as i64)
            .filter(|i| i.index() < self.network.n_nodes())
            .ok_or_else(|| NetworkError::UndefinedNode.into())
    }

    fn tank_ref(&self, idx: Idx) -> ProjectResult<&aq_network::Tank> {
        self.network
            .tank_of(idx)
            .ok_or_else(|| NetworkError::UndefinedNode.into())
    }

    fn tank_index_checked(&self, idx: Idx) -> ProjectResult<usize> {
        self.network
            .tank_index(idx)
            .ok_or_else(|| NetworkError::UndefinedNode.into())
    }

    pub(crate) fn pattern_opt(&self, value: f64) -> ProjectResult<Option<Idx>> {
        if value == 0.0 {
            return Ok(None);
        }
        let idx = Idx::from_position(value as i64)
            .filter(|p| p.index() < self.network.patterns.len())
            .ok_or(NetworkError::UndefinedPattern)?;
        Ok(Some(idx))
    }

    fn demand_ref(&self, index: usize, demand: usize) -> ProjectResult<&Demand> {
        let idx = self.node_idx(index)?;
        self.network
            .node(idx)
            .expect("checked")
            .demands
            .get(demand.wrapping_sub(1))
            .ok_or(ProjectError::UndefinedDemand)
    }

    fn demand_mut(&mut self, index: usize, demand: usize) -> ProjectResult<&mut Demand> {
        let idx = self.node_idx(index)?;
        self.network
            .node_mut(idx)
            .expect("checked")
            .demands
            .get_mut(demand.wrapping_sub(1))
            .ok_or(ProjectError::UndefinedDemand)
    }
}
