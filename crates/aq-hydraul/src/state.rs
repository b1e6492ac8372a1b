//! Per-simulation hydraulic state, separate from the network topology.

use aq_core::time::Seconds;
use aq_network::{LinkStatus, Network, PumpEnergy};

/// Mutable solver state for one project.
#[derive(Debug, Clone, Default)]
pub struct HydState {
    /// Demand delivered at each node, cfs (negative = external inflow at
    /// tanks/reservoirs).
    pub demand: Vec<f64>,
    /// Pattern-scaled demand required at each junction, cfs.
    pub demand_required: Vec<f64>,
    /// Delivered pressure-dependent demand per junction, cfs.
    pub demand_flow: Vec<f64>,
    /// Emitter outflow per junction, cfs.
    pub emitter_flow: Vec<f64>,
    /// Hydraulic grade per node, ft.
    pub head: Vec<f64>,
    /// Flow per link, cfs.
    pub flow: Vec<f64>,
    pub status: Vec<LinkStatus>,
    pub setting: Vec<f64>,
    /// Current tank volumes, ft3 (parallel to `net.tanks`).
    pub tank_volume: Vec<f64>,
    /// Last known node qualities, for rule premises that read them.
    pub quality: Vec<f64>,
    /// Per-pump energy tallies (parallel to `net.pumps`).
    pub energy: Vec<PumpEnergy>,
    /// Peak total system kw, for the demand charge.
    pub peak_kw: f64,

    /// Simulation clock, seconds.
    pub htime: Seconds,
    /// Next reporting instant the step may not overrun.
    pub rtime: Seconds,
    /// Time of the previous rule evaluation.
    pub rule_time: Seconds,
}

impl HydState {
    pub fn sized_for(net: &Network) -> Self {
        Self {
            demand: vec![0.0; net.n_nodes()],
            demand_required: vec![0.0; net.n_nodes()],
            demand_flow: vec![0.0; net.n_nodes()],
            emitter_flow: vec![0.0; net.n_nodes()],
            head: vec![0.0; net.n_nodes()],
            flow: vec![0.0; net.n_links()],
            status: vec![LinkStatus::Open; net.n_links()],
            setting: vec![0.0; net.n_links()],
            tank_volume: vec![0.0; net.n_tanks()],
            quality: vec![0.0; net.n_nodes()],
            energy: vec![PumpEnergy::default(); net.n_pumps()],
            peak_kw: 0.0,
            htime: 0,
            rtime: 0,
            rule_time: 0,
        }
    }

    /// Water level above a tank node's elevation, ft.
    pub fn pressure_head(&self, node: usize, elevation: f64) -> f64 {
        self.head[node] - elevation
    }
}
