//! The network store.
//!
//! Element arrays are 0-based `Vec`s addressed by compact `Idx` values.
//! Junctions occupy positions `0..njuncs`; tanks and reservoirs follow, and
//! their side-records in `tanks` keep the same relative order, so the tank
//! record for node `i` is `tanks[i - njuncs]`.
//!
//! Every mutating operation leaves the store consistent: ID hash maps match
//! the arrays, and all stored cross-references (link end nodes, tank
//! back-links, control targets, the trace node) are rewritten in the same
//! call that moves elements.

use std::collections::HashMap;

use aq_core::{CurveIdx, Idx, LinkIdx, NodeIdx, PatternIdx};

use crate::control::Control;
use crate::curve::{Curve, CurveKind};
use crate::error::{NetworkError, NetworkResult};
use crate::link::{Link, LinkKind, Pump, PumpKind, Valve};
use crate::node::{Node, NodeKind, Tank};
use crate::options::{Options, Times};
use crate::pattern::Pattern;

/// Longest legal element ID.
pub const MAX_ID_LEN: usize = 31;

#[derive(Debug, Clone, Default)]
pub struct Network {
    pub title: Vec<String>,

    nodes: Vec<Node>,
    pub tanks: Vec<Tank>,
    links: Vec<Link>,
    pub pumps: Vec<Pump>,
    pub valves: Vec<Valve>,
    pub patterns: Vec<Pattern>,
    pub curves: Vec<Curve>,
    pub controls: Vec<Control>,

    node_ids: HashMap<String, NodeIdx>,
    link_ids: HashMap<String, LinkIdx>,
    pattern_ids: HashMap<String, PatternIdx>,
    curve_ids: HashMap<String, CurveIdx>,

    njuncs: usize,

    pub options: Options,
    pub times: Times,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    // --- counts ---

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_juncs(&self) -> usize {
        self.njuncs
    }

    pub fn n_tanks(&self) -> usize {
        self.tanks.len()
    }

    pub fn n_links(&self) -> usize {
        self.links.len()
    }

    pub fn n_pumps(&self) -> usize {
        self.pumps.len()
    }

    pub fn n_valves(&self) -> usize {
        self.valves.len()
    }

    pub fn n_pipes(&self) -> usize {
        self.links.len() - self.pumps.len() - self.valves.len()
    }

    // --- lookup ---

    pub fn find_node(&self, id: &str) -> Option<NodeIdx> {
        self.node_ids.get(id).copied()
    }

    pub fn find_link(&self, id: &str) -> Option<LinkIdx> {
        self.link_ids.get(id).copied()
    }

    pub fn find_pattern(&self, id: &str) -> Option<PatternIdx> {
        self.pattern_ids.get(id).copied()
    }

    pub fn find_curve(&self, id: &str) -> Option<CurveIdx> {
        self.curve_ids.get(id).copied()
    }

    pub fn node(&self, idx: NodeIdx) -> Option<&Node> {
        self.nodes.get(idx.index())
    }

    pub fn node_mut(&mut self, idx: NodeIdx) -> Option<&mut Node> {
        self.nodes.get_mut(idx.index())
    }

    pub fn link(&self, idx: LinkIdx) -> Option<&Link> {
        self.links.get(idx.index())
    }

    pub fn link_mut(&mut self, idx: LinkIdx) -> Option<&mut Link> {
        self.links.get_mut(idx.index())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node_kind(&self, idx: NodeIdx) -> Option<NodeKind> {
        let i = idx.index();
        if i >= self.nodes.len() {
            return None;
        }
        if i < self.njuncs {
            Some(NodeKind::Junction)
        } else if self.tanks[i - self.njuncs].is_reservoir() {
            Some(NodeKind::Reservoir)
        } else {
            Some(NodeKind::Tank)
        }
    }

    pub fn is_junction(&self, idx: NodeIdx) -> bool {
        idx.index() < self.njuncs
    }

    /// Index into `tanks` for a tank/reservoir node.
    pub fn tank_index(&self, idx: NodeIdx) -> Option<usize> {
        let i = idx.index();
        if i >= self.njuncs && i < self.nodes.len() {
            Some(i - self.njuncs)
        } else {
            None
        }
    }

    pub fn tank_of(&self, idx: NodeIdx) -> Option<&Tank> {
        self.tank_index(idx).map(|t| &self.tanks[t])
    }

    pub fn tank_of_mut(&mut self, idx: NodeIdx) -> Option<&mut Tank> {
        self.tank_index(idx).map(|t| &mut self.tanks[t])
    }

    /// Pump side-record position for a pump link.
    pub fn pump_index(&self, link: LinkIdx) -> Option<usize> {
        self.pumps.iter().position(|p| p.link == link)
    }

    pub fn valve_index(&self, link: LinkIdx) -> Option<usize> {
        self.valves.iter().position(|v| v.link == link)
    }

    /// All links incident to a node.
    pub fn adjacent_links(&self, node: NodeIdx) -> Vec<LinkIdx> {
        self.links
            .iter()
            .enumerate()
            .filter(|(_, l)| l.n1 == node || l.n2 == node)
            .map(|(i, _)| Idx::from_index(i))
            .collect()
    }

    // --- id discipline ---

    /// IDs are non-empty, at most 31 characters, and contain no spaces,
    /// semicolons or double quotes.
    pub fn valid_id(id: &str) -> bool {
        !id.is_empty()
            && id.len() <= MAX_ID_LEN
            && !id.chars().any(|c| c.is_whitespace() || c == ';' || c == '"')
    }

    fn check_new_node_id(&self, id: &str) -> NetworkResult<()> {
        if !Self::valid_id(id) {
            return Err(NetworkError::InvalidId { id: id.to_string() });
        }
        if self.node_ids.contains_key(id) {
            return Err(NetworkError::DuplicateId { id: id.to_string() });
        }
        Ok(())
    }

    fn check_new_link_id(&self, id: &str) -> NetworkResult<()> {
        if !Self::valid_id(id) {
            return Err(NetworkError::InvalidId { id: id.to_string() });
        }
        if self.link_ids.contains_key(id) {
            return Err(NetworkError::DuplicateId { id: id.to_string() });
        }
        Ok(())
    }

    // --- node insertion / deletion ---

    /// Add a node of the given kind, returning its index.
    ///
    /// Junctions are inserted at position `njuncs`, shifting all tank and
    /// reservoir nodes up by one; every stored node reference is rewritten
    /// in the same call. Tanks and reservoirs append at the end.
    pub fn add_node(&mut self, id: &str, kind: NodeKind) -> NetworkResult<NodeIdx> {
        self.check_new_node_id(id)?;
        let mut node = Node::new(id);
        match kind {
            NodeKind::Junction => {
                node.demands.push(crate::node::Demand::default());
                let at = self.njuncs;
                self.nodes.insert(at, node);
                self.njuncs += 1;
                self.shift_node_refs_up(at);
                self.rebuild_node_map();
                Ok(Idx::from_index(at))
            }
            NodeKind::Reservoir | NodeKind::Tank => {
                let at = self.nodes.len();
                self.nodes.push(node);
                let idx = Idx::from_index(at);
                let mut tank = Tank::new(idx);
                if kind == NodeKind::Tank {
                    tank.area = 1.0;
                }
                self.tanks.push(tank);
                self.node_ids.insert(id.to_string(), idx);
                Ok(idx)
            }
        }
    }

    /// Remove a node. The caller must already have deleted its adjacent
    /// links; simple controls referencing the node are purged here and all
    /// higher node references shift down.
    pub fn delete_node(&mut self, idx: NodeIdx) -> NetworkResult<()> {
        let i = idx.index();
        if i >= self.nodes.len() {
            return Err(NetworkError::UndefinedNode);
        }
        debug_assert!(self.adjacent_links(idx).is_empty());

        self.controls.retain(|c| c.node != Some(idx));
        if self.options.trace_node == Some(idx) {
            self.options.trace_node = None;
        }

        if let Some(t) = self.tank_index(idx) {
            self.tanks.remove(t);
        } else {
            self.njuncs -= 1;
        }
        self.nodes.remove(i);
        self.shift_node_refs_down(i);
        self.rebuild_node_map();
        Ok(())
    }

    /// Rename a node, preserving hash-map consistency.
    pub fn set_node_id(&mut self, idx: NodeIdx, new_id: &str) -> NetworkResult<()> {
        let i = idx.index();
        if i >= self.nodes.len() {
            return Err(NetworkError::UndefinedNode);
        }
        if self.nodes[i].id == new_id {
            return Ok(());
        }
        self.check_new_node_id(new_id)?;
        let old = std::mem::replace(&mut self.nodes[i].id, new_id.to_string());
        self.node_ids.remove(&old);
        self.node_ids.insert(new_id.to_string(), idx);
        Ok(())
    }

    // --- link insertion / deletion ---

    /// Add a link between two existing, distinct nodes. PRV/PSV/FCV valves
    /// must satisfy the valve placement rules.
    pub fn add_link(
        &mut self,
        id: &str,
        kind: LinkKind,
        n1: NodeIdx,
        n2: NodeIdx,
    ) -> NetworkResult<LinkIdx> {
        self.check_new_link_id(id)?;
        if n1.index() >= self.nodes.len() || n2.index() >= self.nodes.len() {
            return Err(NetworkError::UndefinedNode);
        }
        if n1 == n2 {
            return Err(NetworkError::SameStartEndNodes { id: id.to_string() });
        }
        self.valve_check(kind, n1, n2, None)?;

        let at = self.links.len();
        let idx = Idx::from_index(at);
        self.links.push(Link::new(id, kind, n1, n2));
        if kind.is_pump() {
            self.pumps.push(Pump::new(idx));
        } else if kind.is_valve() {
            self.valves.push(Valve { link: idx });
        }
        self.link_ids.insert(id.to_string(), idx);
        Ok(idx)
    }

    /// Remove a link. Simple controls referencing it are purged and higher
    /// link references shift down.
    pub fn delete_link(&mut self, idx: LinkIdx) -> NetworkResult<()> {
        let i = idx.index();
        if i >= self.links.len() {
            return Err(NetworkError::UndefinedLink);
        }
        self.controls.retain(|c| c.link != idx);
        self.pumps.retain(|p| p.link != idx);
        self.valves.retain(|v| v.link != idx);
        self.links.remove(i);
        self.shift_link_refs_down(i);
        self.rebuild_link_map();
        Ok(())
    }

    pub fn set_link_id(&mut self, idx: LinkIdx, new_id: &str) -> NetworkResult<()> {
        let i = idx.index();
        if i >= self.links.len() {
            return Err(NetworkError::UndefinedLink);
        }
        if self.links[i].id == new_id {
            return Ok(());
        }
        self.check_new_link_id(new_id)?;
        let old = std::mem::replace(&mut self.links[i].id, new_id.to_string());
        self.link_ids.remove(&old);
        self.link_ids.insert(new_id.to_string(), idx);
        Ok(())
    }

    /// Reattach a link to new end nodes.
    pub fn set_link_nodes(&mut self, idx: LinkIdx, n1: NodeIdx, n2: NodeIdx) -> NetworkResult<()> {
        let i = idx.index();
        if i >= self.links.len() {
            return Err(NetworkError::UndefinedLink);
        }
        if n1.index() >= self.nodes.len() || n2.index() >= self.nodes.len() {
            return Err(NetworkError::UndefinedNode);
        }
        if n1 == n2 {
            return Err(NetworkError::SameStartEndNodes {
                id: self.links[i].id.clone(),
            });
        }
        self.valve_check(self.links[i].kind, n1, n2, Some(idx))?;
        self.links[i].n1 = n1;
        self.links[i].n2 = n2;
        Ok(())
    }

    /// Valve placement rules for PRV/PSV/FCV: both end nodes must be
    /// junctions and no two such valves may share an end node in a
    /// conflicting orientation.
    pub fn valve_check(
        &self,
        kind: LinkKind,
        n1: NodeIdx,
        n2: NodeIdx,
        skip: Option<LinkIdx>,
    ) -> NetworkResult<()> {
        use LinkKind::*;
        if !matches!(kind, Prv | Psv | Fcv) {
            return Ok(());
        }
        if !self.is_junction(n1) || !self.is_junction(n2) {
            return Err(NetworkError::ValveTankConnection);
        }
        for valve in &self.valves {
            if Some(valve.link) == skip {
                continue;
            }
            let Some(other) = self.link(valve.link) else {
                continue;
            };
            let (v1, v2, vtype) = (other.n1, other.n2, other.kind);
            let conflict = match (vtype, kind) {
                (Prv, Prv) => n2 == v2 || n2 == v1 || n1 == v2,
                (Psv, Psv) => n1 == v1 || n1 == v2 || n2 == v1,
                (Psv, Prv) | (Fcv, Prv) => n1 == v2,
                (Prv, Psv) | (Fcv, Psv) => n2 == v1,
                (Psv, Fcv) => n1 == v2,
                (Prv, Fcv) => n2 == v1,
                _ => false,
            };
            if conflict {
                return Err(NetworkError::ValveValveConnection);
            }
        }
        Ok(())
    }

    // --- patterns and curves ---

    pub fn add_pattern(&mut self, id: &str) -> NetworkResult<PatternIdx> {
        if !Self::valid_id(id) {
            return Err(NetworkError::InvalidId { id: id.to_string() });
        }
        if self.pattern_ids.contains_key(id) {
            return Err(NetworkError::DuplicateId { id: id.to_string() });
        }
        let idx = Idx::from_index(self.patterns.len());
        self.patterns.push(Pattern::new(id));
        self.pattern_ids.insert(id.to_string(), idx);
        Ok(idx)
    }

    pub fn add_curve(&mut self, id: &str) -> NetworkResult<CurveIdx> {
        if !Self::valid_id(id) {
            return Err(NetworkError::InvalidId { id: id.to_string() });
        }
        if self.curve_ids.contains_key(id) {
            return Err(NetworkError::DuplicateId { id: id.to_string() });
        }
        let idx = Idx::from_index(self.curves.len());
        self.curves.push(Curve::new(id));
        self.curve_ids.insert(id.to_string(), idx);
        Ok(idx)
    }

    pub fn pattern(&self, idx: PatternIdx) -> Option<&Pattern> {
        self.patterns.get(idx.index())
    }

    pub fn pattern_mut(&mut self, idx: PatternIdx) -> Option<&mut Pattern> {
        self.patterns.get_mut(idx.index())
    }

    pub fn curve(&self, idx: CurveIdx) -> Option<&Curve> {
        self.curves.get(idx.index())
    }

    pub fn curve_mut(&mut self, idx: CurveIdx) -> Option<&mut Curve> {
        self.curves.get_mut(idx.index())
    }

    // --- controls ---

    pub fn add_control(&mut self, control: Control) -> NetworkResult<usize> {
        let link = self
            .link(control.link)
            .ok_or(NetworkError::UndefinedLink)?;
        if link.kind == LinkKind::CvPipe {
            return Err(NetworkError::ControlOnCheckValve);
        }
        if let Some(node) = control.node {
            if node.index() >= self.nodes.len() {
                return Err(NetworkError::UndefinedNode);
            }
        }
        self.controls.push(control);
        Ok(self.controls.len() - 1)
    }

    pub fn delete_control(&mut self, index: usize) -> NetworkResult<()> {
        if index >= self.controls.len() {
            return Err(NetworkError::UndefinedControl);
        }
        self.controls.remove(index);
        Ok(())
    }

    pub fn controls_reference_node(&self, idx: NodeIdx) -> bool {
        self.controls.iter().any(|c| c.node == Some(idx))
    }

    pub fn controls_reference_link(&self, idx: LinkIdx) -> bool {
        self.controls.iter().any(|c| c.link == idx)
    }

    // --- tank geometry ---

    /// Tank volume at water-surface elevation `h`.
    pub fn tank_volume(&self, t: usize, h: f64) -> f64 {
        let tank = &self.tanks[t];
        if let Some(cidx) = tank.vol_curve {
            if let Some(curve) = self.curve(cidx) {
                let elev = self.nodes[tank.node.index()].elevation;
                return curve.value_at(h - elev);
            }
        }
        tank.vmin + (h - tank.hmin) * tank.area
    }

    /// Water-surface elevation of a tank holding volume `v`.
    pub fn tank_grade(&self, t: usize, v: f64) -> f64 {
        let tank = &self.tanks[t];
        if let Some(cidx) = tank.vol_curve {
            if let Some(curve) = self.curve(cidx) {
                let elev = self.nodes[tank.node.index()].elevation;
                return elev + curve.x_at(v);
            }
        }
        if tank.area == 0.0 {
            return tank.h0;
        }
        tank.hmin + (v - tank.vmin) / tank.area
    }

    /// Recompute a tank's volume limits from its levels and geometry. When
    /// `keep_vmin` is set, the stored minimum volume (supplied explicitly)
    /// anchors the cylindrical volume scale instead of the tank bottom.
    pub fn update_tank_volumes(&mut self, t: usize, keep_vmin: bool) {
        let (hmin, h0, hmax, has_curve) = {
            let tank = &self.tanks[t];
            (tank.hmin, tank.h0, tank.hmax, tank.vol_curve.is_some())
        };
        if has_curve {
            self.tanks[t].vmin = self.tank_volume_raw(t, hmin);
            self.tanks[t].v0 = self.tank_volume_raw(t, h0);
            self.tanks[t].vmax = self.tank_volume_raw(t, hmax);
            return;
        }
        if !keep_vmin {
            self.tanks[t].vmin = self.tank_volume_raw(t, hmin);
        }
        let tank = &mut self.tanks[t];
        tank.v0 = tank.vmin + (h0 - hmin) * tank.area;
        tank.vmax = tank.vmin + (hmax - hmin) * tank.area;
    }

    /// Volume from geometry alone (not the stored vmin), used when limits
    /// themselves are being recomputed.
    fn tank_volume_raw(&self, t: usize, h: f64) -> f64 {
        let tank = &self.tanks[t];
        let elev = self.nodes[tank.node.index()].elevation;
        if let Some(cidx) = tank.vol_curve {
            if let Some(curve) = self.curve(cidx) {
                return curve.value_at(h - elev);
            }
        }
        (h - elev).max(0.0) * tank.area
    }

    /// Mark a pump's head-curve derived coefficients from its curve points.
    pub fn update_pump_params(&mut self, p: usize) -> NetworkResult<()> {
        let (link_idx, hcurve) = {
            let pump = &self.pumps[p];
            (pump.link, pump.hcurve)
        };
        let link_id = self
            .link(link_idx)
            .map(|l| l.id.clone())
            .unwrap_or_default();

        let Some(cidx) = hcurve else {
            // constant-horsepower pumps carry their power in the link's kc
            if self.pumps[p].kind == PumpKind::ConstHp {
                self.pumps[p].h0 = 0.0;
                self.pumps[p].r = 0.0;
                self.pumps[p].n = 0.0;
                self.pumps[p].hmax = aq_core::CBIG;
                self.pumps[p].qmax = aq_core::CBIG;
                return Ok(());
            }
            return Err(NetworkError::NoPumpCurve { id: link_id });
        };
        let curve = self
            .curve(cidx)
            .ok_or(NetworkError::UndefinedCurve)?
            .clone();
        if curve.is_empty() {
            return Err(NetworkError::NoPumpCurve { id: link_id });
        }

        let n = curve.len();
        let pump = &mut self.pumps[p];
        if n == 1 {
            // one design point: synthetic power curve through
            // (0, 4/3 h1) and (2 q1, 0)
            let q1 = curve.x[0];
            let h1 = curve.y[0];
            if q1 <= 0.0 || h1 <= 0.0 {
                return Err(NetworkError::InvalidPumpCurve { id: link_id });
            }
            pump.kind = PumpKind::PowerFunc;
            pump.q0 = q1;
            pump.qmax = 2.0 * q1;
            pump.hmax = 4.0 / 3.0 * h1;
            pump.h0 = pump.hmax;
            pump.n = 2.0;
            pump.r = (pump.h0 - h1) / (q1 * q1);
        } else if n == 3 && curve.x[0] == 0.0 {
            // classic three-point curve: fit h = h0 - r q^n
            let (h0, h1, h2) = (curve.y[0], curve.y[1], curve.y[2]);
            let (q1, q2) = (curve.x[1], curve.x[2]);
            let h4 = h0 - h1;
            let h5 = h0 - h2;
            if h4 <= 0.0 || h5 <= h4 || q1 <= 0.0 || q2 <= q1 {
                return Err(NetworkError::InvalidPumpCurve { id: link_id });
            }
            let exp = (h5 / h4).ln() / (q2 / q1).ln();
            if exp <= 0.0 || exp > 20.0 {
                return Err(NetworkError::InvalidPumpCurve { id: link_id });
            }
            pump.kind = PumpKind::PowerFunc;
            pump.q0 = q1;
            pump.qmax = q2;
            pump.hmax = h0;
            pump.h0 = h0;
            pump.n = exp;
            pump.r = h4 / q1.powf(exp);
        } else {
            // arbitrary curve: head must strictly decrease with flow
            if !curve.y.windows(2).all(|w| w[0] > w[1]) {
                return Err(NetworkError::InvalidPumpCurve { id: link_id });
            }
            pump.kind = PumpKind::Custom;
            pump.q0 = curve.x[n / 2];
            pump.qmax = curve.x[n - 1];
            pump.hmax = curve.y[0];
        }
        Ok(())
    }

    // --- renumbering sweeps ---

    fn shift_node_refs_up(&mut self, from: usize) {
        let bump = |idx: &mut NodeIdx| {
            if idx.index() >= from {
                *idx = Idx::from_index(idx.index() + 1);
            }
        };
        for link in &mut self.links {
            bump(&mut link.n1);
            bump(&mut link.n2);
        }
        for tank in &mut self.tanks {
            bump(&mut tank.node);
        }
        for control in &mut self.controls {
            if let Some(node) = &mut control.node {
                bump(node);
            }
        }
        if let Some(trace) = &mut self.options.trace_node {
            bump(trace);
        }
    }

    fn shift_node_refs_down(&mut self, removed: usize) {
        let drop_one = |idx: &mut NodeIdx| {
            debug_assert_ne!(idx.index(), removed);
            if idx.index() > removed {
                *idx = Idx::from_index(idx.index() - 1);
            }
        };
        for link in &mut self.links {
            drop_one(&mut link.n1);
            drop_one(&mut link.n2);
        }
        for tank in &mut self.tanks {
            drop_one(&mut tank.node);
        }
        for control in &mut self.controls {
            if let Some(node) = &mut control.node {
                drop_one(node);
            }
        }
        if let Some(trace) = &mut self.options.trace_node {
            drop_one(trace);
        }
    }

    fn shift_link_refs_down(&mut self, removed: usize) {
        let drop_one = |idx: &mut LinkIdx| {
            debug_assert_ne!(idx.index(), removed);
            if idx.index() > removed {
                *idx = Idx::from_index(idx.index() - 1);
            }
        };
        for control in &mut self.controls {
            drop_one(&mut control.link);
        }
        for pump in &mut self.pumps {
            drop_one(&mut pump.link);
        }
        for valve in &mut self.valves {
            drop_one(&mut valve.link);
        }
    }

    fn rebuild_node_map(&mut self) {
        self.node_ids.clear();
        for (i, node) in self.nodes.iter().enumerate() {
            self.node_ids.insert(node.id.clone(), Idx::from_index(i));
        }
    }

    fn rebuild_link_map(&mut self) {
        self.link_ids.clear();
        for (i, link) in self.links.iter().enumerate() {
            self.link_ids.insert(link.id.clone(), Idx::from_index(i));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    fn idx(i: usize) -> Idx {
        Idx::from_index(i)
    }

    #[test]
    fn junction_insertion_shifts_tanks() {
        let mut net = Network::new();
        let j1 = net.add_node("J1", NodeKind::Junction).unwrap();
        let t1 = net.add_node("T1", NodeKind::Tank).unwrap();
        let p1 = net.add_link("P1", LinkKind::Pipe, j1, t1).unwrap();

        let link = net.link(p1).unwrap();
        assert_eq!(link.n1().index(), 0);
        assert_eq!(link.n2().index(), 1);

        // adding a second junction inserts before the tank
        net.add_node("J2", NodeKind::Junction).unwrap();
        let link = net.link(p1).unwrap();
        assert_eq!(link.n1().index(), 0);
        assert_eq!(link.n2().index(), 2);

        // hash maps track the shift
        assert_eq!(net.find_node("T1").unwrap().index(), 2);
        assert_eq!(net.find_node("J2").unwrap().index(), 1);
        assert_eq!(net.tanks[0].node.index(), 2);
    }

    #[test]
    fn hash_round_trip_after_mutations() {
        let mut net = Network::new();
        for id in ["A", "B", "C"] {
            net.add_node(id, NodeKind::Junction).unwrap();
        }
        net.add_node("R", NodeKind::Reservoir).unwrap();
        for i in 0..net.n_nodes() {
            let id = net.node(idx(i)).unwrap().id().to_string();
            assert_eq!(net.find_node(&id), Some(idx(i)));
        }
    }

    #[test]
    fn duplicate_ids_rejected() {
        let mut net = Network::new();
        net.add_node("J1", NodeKind::Junction).unwrap();
        assert!(matches!(
            net.add_node("J1", NodeKind::Tank),
            Err(NetworkError::DuplicateId { .. })
        ));
    }

    #[test]
    fn bad_ids_rejected() {
        let mut net = Network::new();
        assert!(net.add_node("has space", NodeKind::Junction).is_err());
        assert!(net.add_node("semi;colon", NodeKind::Junction).is_err());
        assert!(net.add_node("", NodeKind::Junction).is_err());
        let long = "x".repeat(32);
        assert!(net.add_node(&long, NodeKind::Junction).is_err());
    }

    #[test]
    fn same_end_nodes_rejected() {
        let mut net = Network::new();
        let j1 = net.add_node("J1", NodeKind::Junction).unwrap();
        assert!(matches!(
            net.add_link("P1", LinkKind::Pipe, j1, j1),
            Err(NetworkError::SameStartEndNodes { .. })
        ));
    }

    #[test]
    fn delete_link_purges_controls_and_shifts() {
        let mut net = Network::new();
        let j1 = net.add_node("J1", NodeKind::Junction).unwrap();
        let j2 = net.add_node("J2", NodeKind::Junction).unwrap();
        let j3 = net.add_node("J3", NodeKind::Junction).unwrap();
        let p1 = net.add_link("P1", LinkKind::Pipe, j1, j2).unwrap();
        let p2 = net.add_link("P2", LinkKind::Pipe, j2, j3).unwrap();
        net.add_control(Control {
            kind: crate::control::ControlKind::Timer,
            link: p1,
            node: None,
            status: crate::link::LinkStatus::Closed,
            setting: 0.0,
            grade: 0.0,
            time: 3600,
        })
        .unwrap();
        net.add_control(Control {
            kind: crate::control::ControlKind::Timer,
            link: p2,
            node: None,
            status: crate::link::LinkStatus::Closed,
            setting: 0.0,
            grade: 0.0,
            time: 7200,
        })
        .unwrap();

        net.delete_link(p1).unwrap();
        assert_eq!(net.n_links(), 1);
        // the control on P1 is gone; the one on P2 now points at index 0
        assert_eq!(net.controls.len(), 1);
        assert_eq!(net.controls[0].link.index(), 0);
        assert_eq!(net.find_link("P2"), Some(idx(0)));
        assert_eq!(net.find_link("P1"), None);
    }

    #[test]
    fn valve_check_rejects_tank_endpoint() {
        let mut net = Network::new();
        let j1 = net.add_node("J1", NodeKind::Junction).unwrap();
        let t1 = net.add_node("T1", NodeKind::Tank).unwrap();
        assert!(matches!(
            net.add_link("V1", LinkKind::Prv, j1, t1),
            Err(NetworkError::ValveTankConnection)
        ));
        // a TCV may connect to a tank
        assert!(net.add_link("V2", LinkKind::Tcv, j1, t1).is_ok());
    }

    #[test]
    fn valve_check_rejects_shared_prv_node() {
        let mut net = Network::new();
        let j1 = net.add_node("J1", NodeKind::Junction).unwrap();
        let j2 = net.add_node("J2", NodeKind::Junction).unwrap();
        let j3 = net.add_node("J3", NodeKind::Junction).unwrap();
        net.add_link("V1", LinkKind::Prv, j1, j2).unwrap();
        assert!(matches!(
            net.add_link("V2", LinkKind::Prv, j3, j2),
            Err(NetworkError::ValveValveConnection)
        ));
    }

    #[test]
    fn rename_updates_map_and_rejects_collisions() {
        let mut net = Network::new();
        let j1 = net.add_node("J1", NodeKind::Junction).unwrap();
        net.add_node("J2", NodeKind::Junction).unwrap();
        assert!(net.set_node_id(j1, "J2").is_err());
        net.set_node_id(j1, "JX").unwrap();
        assert_eq!(net.find_node("JX"), Some(j1));
        assert_eq!(net.find_node("J1"), None);
    }

    #[test]
    fn single_point_pump_curve_expands() {
        let mut net = Network::new();
        let j1 = net.add_node("J1", NodeKind::Junction).unwrap();
        let j2 = net.add_node("J2", NodeKind::Junction).unwrap();
        let pl = net.add_link("PU1", LinkKind::Pump, j1, j2).unwrap();
        let c = net.add_curve("C1").unwrap();
        {
            let curve = net.curve_mut(c).unwrap();
            curve.x = vec![10.0];
            curve.y = vec![90.0];
            curve.kind = CurveKind::Pump;
        }
        let p = net.pump_index(pl).unwrap();
        net.pumps[p].hcurve = Some(c);
        net.update_pump_params(p).unwrap();
        let pump = &net.pumps[p];
        assert_eq!(pump.kind, PumpKind::PowerFunc);
        assert!((pump.hmax - 120.0).abs() < 1e-9);
        assert!((pump.qmax - 20.0).abs() < 1e-9);
        assert!((pump.n - 2.0).abs() < 1e-12);
    }

    #[test]
    fn cylindrical_tank_volume_round_trip() {
        let mut net = Network::new();
        net.add_node("J1", NodeKind::Junction).unwrap();
        let t1 = net.add_node("T1", NodeKind::Tank).unwrap();
        net.node_mut(t1).unwrap().elevation = 100.0;
        let t = net.tank_index(t1).unwrap();
        {
            let tank = &mut net.tanks[t];
            tank.area = 50.0;
            tank.hmin = 110.0;
            tank.h0 = 115.0;
            tank.hmax = 130.0;
        }
        net.update_tank_volumes(t, false);
        assert!((net.tanks[t].vmin - 500.0).abs() < 1e-9);
        assert!((net.tanks[t].v0 - 750.0).abs() < 1e-9);
        assert!((net.tanks[t].vmax - 1500.0).abs() < 1e-9);
        let h = net.tank_grade(t, 750.0);
        assert!((h - 115.0).abs() < 1e-9);
    }
}
