//! Water-quality transport engine.
//!
//! Driven substep by substep from stored hydraulic snapshots: the caller
//! loads each converged period's flows and demands with `set_hydraulics`,
//! then advances the quality clock in steps no longer than the hydraulic
//! period. All quantities are internal units (ft3, mg/ft3, seconds).

use std::collections::VecDeque;

use aq_core::time::Seconds;
use aq_core::units::QualKind;
use aq_network::{Network, SourceKind};

use crate::error::{QualError, QualResult};
use crate::mixing::TankStore;
use crate::reaction;
use crate::segment::{Segment, drain, feed, total_mass, total_volume};

/// Flows smaller than this transport no water.
const Q_ZERO: f64 = 1.0e-8;

/// Running constituent-mass ledger.
#[derive(Debug, Clone, Copy, Default)]
pub struct MassBalance {
    /// Mass present when the solver initialized.
    pub initial: f64,
    /// Mass added by sources and boundary nodes.
    pub inflow: f64,
    /// Mass removed by demands and boundary nodes.
    pub outflow: f64,
    /// Net mass change from reactions (negative for decay).
    pub reacted: f64,
}

impl MassBalance {
    /// Outflow-side over inflow-side mass; 1.0 means perfect closure.
    pub fn ratio(&self, stored: f64) -> f64 {
        let in_side = self.initial + self.inflow;
        let out_side = stored + self.outflow - self.reacted;
        if in_side.abs() < 1.0e-12 {
            if out_side.abs() < 1.0e-12 { 1.0 } else { 0.0 }
        } else {
            out_side / in_side
        }
    }
}

#[derive(Debug, Default)]
pub struct QualEngine {
    kind: QualKind,
    link_segs: Vec<VecDeque<Segment>>,
    tanks: Vec<TankStore>,
    pub node_qual: Vec<f64>,
    flows: Vec<f64>,
    demands: Vec<f64>,
    flow_dir: Vec<i8>,
    bulk_rate: Vec<f64>,
    wall_rate: Vec<f64>,
    tank_kb: Vec<f64>,
    pub qtime: Seconds,
    pub massbal: MassBalance,
    open: bool,
    initialized: bool,
}

impl QualEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Resolve reaction coefficients and size the transport structures.
    pub fn open(&mut self, net: &Network) -> QualResult<()> {
        self.kind = net.options.qual;
        let nlinks = net.n_links();
        self.link_segs = vec![VecDeque::new(); nlinks];
        self.flows = vec![0.0; nlinks];
        self.flow_dir = vec![1; nlinks];
        self.demands = vec![0.0; net.n_nodes()];
        self.node_qual = vec![0.0; net.n_nodes()];

        self.bulk_rate = net
            .links()
            .iter()
            .map(|l| {
                if l.kb == aq_core::MISSING {
                    net.options.kbulk
                } else {
                    l.kb
                }
            })
            .collect();
        // effective wall rates depend on flow; refreshed per snapshot
        self.wall_rate = vec![0.0; nlinks];
        self.tank_kb = net
            .tanks
            .iter()
            .map(|t| {
                if t.kb == aq_core::MISSING {
                    net.options.kbulk
                } else {
                    t.kb
                }
            })
            .collect();
        self.tanks = Vec::new();
        self.open = true;
        self.initialized = false;
        Ok(())
    }

    /// Reset stored water to initial conditions.
    pub fn init(&mut self, net: &Network) -> QualResult<()> {
        if !self.open {
            return Err(QualError::NotOpen);
        }
        for (i, node) in net.nodes().iter().enumerate() {
            self.node_qual[i] = node.init_qual;
        }
        if self.kind == QualKind::Trace {
            if let Some(trace) = net.options.trace_node {
                self.node_qual[trace.index()] = 100.0;
            }
        }

        for (k, segs) in self.link_segs.iter_mut().enumerate() {
            segs.clear();
            let vol = link_volume(net, k);
            if vol > 0.0 {
                let down = net.links()[k].n2().index();
                segs.push_back(Segment {
                    volume: vol,
                    concen: self.node_qual[down],
                });
            }
        }

        self.tanks = net
            .tanks
            .iter()
            .map(|tank| {
                let c = self.node_qual[tank.node.index()];
                if tank.is_reservoir() {
                    // boundary store of unbounded supply at fixed quality
                    return TankStore::new_mix1(0.0, c);
                }
                let v = tank.v0;
                match tank.mix_model {
                    aq_network::MixModel::Mix1 => TankStore::new_mix1(v, c),
                    aq_network::MixModel::Mix2 => TankStore::new_mix2(v, c, tank.v1max()),
                    aq_network::MixModel::Fifo => TankStore::new_fifo(v, c),
                    aq_network::MixModel::Lifo => TankStore::new_lifo(v, c),
                }
            })
            .collect();

        self.qtime = 0;
        self.massbal = MassBalance {
            initial: self.stored_mass(),
            ..Default::default()
        };
        self.initialized = true;
        tracing::debug!(
            kind = ?self.kind,
            initial_mass = self.massbal.initial,
            "quality transport initialized"
        );
        Ok(())
    }

    /// Adopt a converged hydraulic period: flows, demands and the
    /// flow-dependent wall reaction rates. Reversed links flip their
    /// segment order.
    pub fn set_hydraulics(&mut self, net: &Network, demands: &[f64], flows: &[f64]) {
        self.demands.copy_from_slice(demands);
        for (k, q) in flows.iter().enumerate() {
            let dir: i8 = if *q < 0.0 { -1 } else { 1 };
            if dir != self.flow_dir[k] && !self.link_segs[k].is_empty() {
                let reversed: VecDeque<Segment> =
                    self.link_segs[k].iter().rev().copied().collect();
                self.link_segs[k] = reversed;
            }
            self.flow_dir[k] = dir;
            self.flows[k] = *q;
        }
        if self.kind == QualKind::Chem && net.options.wall_order != 0.0 {
            for (k, link) in net.links().iter().enumerate() {
                if !link.kind.is_pipe() {
                    continue;
                }
                let kw = if link.kw == aq_core::MISSING {
                    net.options.kwall
                } else {
                    link.kw
                };
                let kf = reaction::mass_transfer_coeff(
                    self.flows[k],
                    link.diameter,
                    net.options.viscos,
                    net.options.diffus,
                );
                self.wall_rate[k] =
                    reaction::wall_rate(kw, link.diameter, kf, net.options.wall_order);
            }
        }
    }

    /// Advance transport by one substep of `dt` seconds.
    pub fn step(&mut self, net: &Network, dt: Seconds) -> QualResult<()> {
        if !self.initialized {
            return Err(QualError::NotOpen);
        }
        if dt <= 0 || self.kind == QualKind::None {
            self.qtime += dt.max(0);
            return Ok(());
        }
        let dt_s = dt as f64;
        let n_nodes = net.n_nodes();

        self.react(net, dt_s);

        // --- move water out of links into receiving nodes ---
        let mut vol_in = vec![0.0; n_nodes];
        let mut mass_in = vec![0.0; n_nodes];
        for (k, link) in net.links().iter().enumerate() {
            let q = self.flows[k];
            if q.abs() < Q_ZERO || !self.flows[k].is_finite() {
                continue;
            }
            let (up, down) = if q >= 0.0 {
                (link.n1().index(), link.n2().index())
            } else {
                (link.n2().index(), link.n1().index())
            };
            let vq = q.abs() * dt_s;
            let available = total_volume(&self.link_segs[k]);
            let mut mass = drain(&mut self.link_segs[k], vq);
            if vq > available {
                // zero-volume devices and under-filled pipes pass the
                // upstream node's previous quality straight through
                let direct = (vq - available) * self.node_qual[up];
                mass += direct;
                let up_idx = aq_core::Idx::from_index(up);
                if net
                    .tank_of(up_idx)
                    .map(|t| t.is_reservoir())
                    .unwrap_or(false)
                {
                    // boundary mass bypassing the segment store still
                    // enters the system
                    self.massbal.inflow += direct;
                }
            }
            vol_in[down] += vq;
            mass_in[down] += mass;
        }

        // --- node mixing ---
        for i in 0..net.n_juncs() {
            let external_in = (-self.demands[i]).max(0.0) * dt_s;
            let vol = vol_in[i] + external_in;
            if vol > 0.0 {
                // external inflow carries no constituent unless a source adds it
                self.node_qual[i] = mass_in[i] / vol;
            }
            let consumed = self.demands[i].max(0.0) * dt_s;
            self.massbal.outflow += consumed * self.node_qual[i];
        }

        // --- tanks and reservoirs ---
        for (t, tank) in net.tanks.iter().enumerate() {
            let n = tank.node.index();
            if tank.is_reservoir() {
                // mass entering a fixed-grade boundary leaves the system
                self.massbal.outflow += mass_in[n];
                continue;
            }
            let outlet = self.tanks[t].outlet_concen();
            let vout = self.tank_outflow(net, n) * dt_s;
            let cin = if vol_in[n] > 0.0 {
                mass_in[n] / vol_in[n]
            } else {
                0.0
            };
            self.tanks[t].exchange(vol_in[n], cin, vout, net.options.ctol);
            self.node_qual[n] = outlet;
        }

        self.apply_sources(net, dt_s);

        if self.kind == QualKind::Trace {
            if let Some(trace) = net.options.trace_node {
                self.node_qual[trace.index()] = 100.0;
            }
        }

        // --- refill links from their upstream nodes ---
        for (k, link) in net.links().iter().enumerate() {
            let q = self.flows[k];
            if q.abs() < Q_ZERO {
                continue;
            }
            if link_volume(net, k) == 0.0 {
                continue;
            }
            let up = if q >= 0.0 {
                link.n1().index()
            } else {
                link.n2().index()
            };
            let vq = q.abs() * dt_s;
            let c = self.node_qual[up];
            feed(&mut self.link_segs[k], vq, c, net.options.ctol);
            if !net.is_junction(aq_core::Idx::from_index(up)) {
                // boundary nodes inject their stored or fixed quality
                let boundary_is_reservoir = net
                    .tank_of(aq_core::Idx::from_index(up))
                    .map(|t| t.is_reservoir())
                    .unwrap_or(false);
                if boundary_is_reservoir {
                    self.massbal.inflow += vq * c;
                }
            }
        }

        self.qtime += dt;
        Ok(())
    }

    /// Quality currently at a node.
    pub fn quality_at(&self, node: usize) -> f64 {
        self.node_qual.get(node).copied().unwrap_or(0.0)
    }

    /// Flow-weighted average quality inside a link.
    pub fn link_quality(&self, k: usize) -> f64 {
        let vol = total_volume(&self.link_segs[k]);
        if vol > 0.0 {
            total_mass(&self.link_segs[k]) / vol
        } else {
            0.0
        }
    }

    /// Total constituent mass stored in links and tanks.
    pub fn stored_mass(&self) -> f64 {
        let links: f64 = self.link_segs.iter().map(total_mass).sum();
        let tanks: f64 = self.tanks.iter().map(|t| t.mass()).sum();
        links + tanks
    }

    /// Mass-balance closure ratio; deviations beyond ~1% indicate trouble.
    pub fn mass_ratio(&self) -> f64 {
        self.massbal.ratio(self.stored_mass())
    }

    pub fn close(&mut self) {
        self.open = false;
        self.initialized = false;
    }

    // --- internals ---

    fn react(&mut self, net: &Network, dt_s: f64) {
        match self.kind {
            QualKind::Age => {
                for segs in &mut self.link_segs {
                    for seg in segs.iter_mut() {
                        seg.concen += dt_s;
                    }
                }
                for tank in &mut self.tanks {
                    tank.react(|c| c + dt_s);
                }
            }
            QualKind::Chem => {
                let order = net.options.bulk_order;
                let climit = net.options.climit;
                let wall_order = net.options.wall_order;
                for (k, segs) in self.link_segs.iter_mut().enumerate() {
                    let kb = self.bulk_rate[k];
                    let kwr = self.wall_rate[k];
                    let link = &net.links()[k];
                    let kw_zero = if wall_order == 0.0 && link.kind.is_pipe() {
                        let kw = if link.kw == aq_core::MISSING {
                            net.options.kwall
                        } else {
                            link.kw
                        };
                        4.0 * kw / link.diameter.max(1e-6)
                    } else {
                        0.0
                    };
                    for seg in segs.iter_mut() {
                        let before = seg.concen;
                        let mut c = reaction::bulk(before, kb, order, climit, dt_s);
                        if kwr != 0.0 {
                            c = (c * (kwr * dt_s).exp()).max(0.0);
                        }
                        if kw_zero != 0.0 {
                            c = (c + kw_zero * dt_s).max(0.0);
                        }
                        self.massbal.reacted += (c - before) * seg.volume;
                        seg.concen = c;
                    }
                }
                let tank_order = net.options.tank_order;
                for (t, tank) in self.tanks.iter_mut().enumerate() {
                    let kb = self.tank_kb[t];
                    if kb == 0.0 {
                        continue;
                    }
                    let delta =
                        tank.react(|c| reaction::bulk(c, kb, tank_order, climit, dt_s));
                    self.massbal.reacted += delta;
                }
            }
            _ => {}
        }
    }

    /// Volume rate leaving a tank node through links, cfs.
    fn tank_outflow(&self, net: &Network, node: usize) -> f64 {
        let mut out = 0.0;
        for (k, link) in net.links().iter().enumerate() {
            let q = self.flows[k];
            if q.abs() < Q_ZERO {
                continue;
            }
            if (q > 0.0 && link.n1().index() == node) || (q < 0.0 && link.n2().index() == node) {
                out += q.abs();
            }
        }
        out
    }

    fn apply_sources(&mut self, net: &Network, dt_s: f64) {
        if self.kind != QualKind::Chem {
            return;
        }
        let period = ((self.qtime + net.times.pstart) / net.times.pstep.max(1)) as usize;
        for (i, node) in net.nodes().iter().enumerate() {
            let Some(source) = &node.source else {
                continue;
            };
            let factor = source
                .pattern
                .and_then(|p| net.pattern(p))
                .map(|p| p.value(period))
                .unwrap_or(1.0);
            let strength = source.base * factor;
            if strength <= 0.0 {
                continue;
            }
            // volume leaving the node during this substep
            let mut volout = self.tank_outflow(net, i) * dt_s;
            volout += self.demands[i].max(0.0) * dt_s;
            let added = match source.kind {
                SourceKind::Mass => strength / 60.0 * dt_s,
                SourceKind::Concen => strength * (-self.demands[i]).max(0.0) * dt_s,
                SourceKind::Setpoint => {
                    if self.node_qual[i] < strength {
                        (strength - self.node_qual[i]) * volout
                    } else {
                        0.0
                    }
                }
                SourceKind::FlowPaced => strength * volout,
            };
            if added <= 0.0 {
                continue;
            }
            if volout > 0.0 {
                self.node_qual[i] += added / volout;
            }
            self.massbal.inflow += added;
        }
    }
}

/// Water volume held inside a link; pumps and valves hold none.
fn link_volume(net: &Network, k: usize) -> f64 {
    let link = &net.links()[k];
    if link.kind.is_pipe() {
        std::f64::consts::PI / 4.0 * link.diameter * link.diameter * link.length
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_network::{LinkKind, NodeKind};

    /// Reservoir at quality 1.0 pushing 1 cfs through a pipe into a
    /// junction with matching demand.
    fn flow_net() -> (Network, QualEngine) {
        let mut net = Network::new();
        let j = net.add_node("J1", NodeKind::Junction).unwrap();
        let r = net.add_node("R1", NodeKind::Reservoir).unwrap();
        let p = net.add_link("P1", LinkKind::Pipe, r, j).unwrap();
        {
            let link = net.link_mut(p).unwrap();
            link.length = 100.0;
            link.diameter = 1.0;
        }
        net.options.qual = aq_core::units::QualKind::Chem;
        net.node_mut(r).unwrap().init_qual = 1.0;

        let mut eng = QualEngine::new();
        eng.open(&net).unwrap();
        eng.init(&net).unwrap();
        let demands = vec![1.0, -1.0];
        let flows = vec![1.0];
        eng.set_hydraulics(&net, &demands, &flows);
        (net, eng)
    }

    #[test]
    fn front_arrives_after_travel_time() {
        let (net, mut eng) = flow_net();
        // pipe volume = pi/4 * 100 ~ 78.5 ft3 at 1 cfs -> ~79 s travel
        let j = net.find_node("J1").unwrap().index();
        for _ in 0..7 {
            eng.step(&net, 10).unwrap();
        }
        assert!(eng.quality_at(j) < 0.05, "front arrived early");
        for _ in 0..5 {
            eng.step(&net, 10).unwrap();
        }
        assert!(eng.quality_at(j) > 0.9, "front never arrived");
    }

    #[test]
    fn age_accumulates_along_pipe() {
        let (mut net, _) = flow_net();
        net.options.qual = aq_core::units::QualKind::Age;
        let mut eng = QualEngine::new();
        eng.open(&net).unwrap();
        eng.init(&net).unwrap();
        eng.set_hydraulics(&net, &[1.0, -1.0], &[1.0]);
        let j = net.find_node("J1").unwrap().index();
        for _ in 0..20 {
            eng.step(&net, 10).unwrap();
        }
        // once through, arriving water is about one travel time old
        let age = eng.quality_at(j);
        assert!(age > 60.0 && age < 120.0, "age = {age}");
    }

    #[test]
    fn trace_holds_source_at_hundred() {
        let (mut net, _) = flow_net();
        net.options.qual = aq_core::units::QualKind::Trace;
        let r = net.find_node("R1").unwrap();
        net.options.trace_node = Some(r);
        let mut eng = QualEngine::new();
        eng.open(&net).unwrap();
        eng.init(&net).unwrap();
        eng.set_hydraulics(&net, &[1.0, -1.0], &[1.0]);
        let j = net.find_node("J1").unwrap().index();
        for _ in 0..30 {
            eng.step(&net, 10).unwrap();
        }
        assert_eq!(eng.quality_at(r.index()), 100.0);
        assert!(eng.quality_at(j) > 99.0);
    }

    #[test]
    fn mass_balance_stays_closed() {
        let (net, mut eng) = flow_net();
        for _ in 0..50 {
            eng.step(&net, 10).unwrap();
        }
        let ratio = eng.mass_ratio();
        assert!((ratio - 1.0).abs() < 0.01, "ratio = {ratio}");
    }

    #[test]
    fn step_before_init_errors() {
        let mut eng = QualEngine::new();
        let net = Network::new();
        assert!(matches!(eng.step(&net, 10), Err(QualError::NotOpen)));
    }
}
