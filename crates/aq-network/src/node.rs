//! Node records: junctions, reservoirs and tanks.
//!
//! Junctions occupy the low indices of the node array; tanks and reservoirs
//! follow. A reservoir is a tank with zero surface area. Tank side-records
//! live in a parallel array in node order, so the tank record for node `i`
//! is `tanks[i - njuncs]`.

use aq_core::{CurveIdx, NodeIdx, PatternIdx};

/// Node classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeKind {
    Junction = 0,
    Reservoir = 1,
    Tank = 2,
}

/// One demand category at a junction.
///
/// The list is ordered; the primary category is the LAST entry, and several
/// public operations (base demand, demand pattern) read or write it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Demand {
    /// Base demand, cfs.
    pub base: f64,
    /// Time pattern applied to the base demand.
    pub pattern: Option<PatternIdx>,
    /// Category label.
    pub name: String,
}

/// Kind of water-quality source at a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SourceKind {
    /// Inflow concentration applies to external inflow only.
    #[default]
    Concen = 0,
    /// Fixed mass inflow rate.
    Mass = 1,
    /// Fixes the concentration of all water leaving the node.
    Setpoint = 2,
    /// Adds a fixed increment to the concentration leaving the node.
    FlowPaced = 3,
}

impl SourceKind {
    pub fn from_value(v: u8) -> Option<Self> {
        use SourceKind::*;
        [Concen, Mass, Setpoint, FlowPaced]
            .into_iter()
            .find(|k| *k as u8 == v)
    }
}

/// Water-quality source attached to a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub kind: SourceKind,
    /// Base strength: concentration (mass/ft3) or mass rate (mass/min).
    pub base: f64,
    pub pattern: Option<PatternIdx>,
}

/// A network node. All quantities are in internal units (feet, cfs,
/// mass/ft3).
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: String,
    pub elevation: f64,
    pub coords: Option<(f64, f64)>,
    /// Initial quality.
    pub init_qual: f64,
    /// Emitter flow coefficient (flow per head^(1/Qexp)); 0 disables.
    pub emitter: f64,
    pub source: Option<Source>,
    pub demands: Vec<Demand>,
    pub report: bool,
    pub comment: String,
}

impl Node {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            elevation: 0.0,
            coords: None,
            init_qual: 0.0,
            emitter: 0.0,
            source: None,
            demands: Vec::new(),
            report: false,
            comment: String::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Primary demand category (last in the list).
    pub fn primary_demand(&self) -> Option<&Demand> {
        self.demands.last()
    }

    pub fn primary_demand_mut(&mut self) -> Option<&mut Demand> {
        self.demands.last_mut()
    }
}

/// Tank mixing model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum MixModel {
    /// Single completely mixed compartment.
    #[default]
    Mix1 = 0,
    /// Two compartments: inlet mixing zone plus ambient zone.
    Mix2 = 1,
    /// Plug flow, first in first out.
    Fifo = 2,
    /// Stacked plugs, last in first out.
    Lifo = 3,
}

impl MixModel {
    pub fn from_value(v: u8) -> Option<Self> {
        use MixModel::*;
        [Mix1, Mix2, Fifo, Lifo].into_iter().find(|m| *m as u8 == v)
    }
}

/// Tank (or reservoir) side-record, kept in node order.
#[derive(Debug, Clone)]
pub struct Tank {
    /// Owning node.
    pub node: NodeIdx,
    /// Surface area, ft2. Zero marks a reservoir (fixed grade).
    pub area: f64,
    /// Water-surface elevation limits and initial grade, ft.
    pub hmin: f64,
    pub h0: f64,
    pub hmax: f64,
    /// Volume limits and initial volume, ft3.
    pub vmin: f64,
    pub v0: f64,
    pub vmax: f64,
    /// Level-volume curve; None means cylindrical.
    pub vol_curve: Option<CurveIdx>,
    pub mix_model: MixModel,
    /// Mixing-zone fraction of total volume for MIX2.
    pub v1_frac: f64,
    /// Tank-specific bulk reaction coefficient (per second).
    pub kb: f64,
    /// Head pattern (fixed-grade nodes only).
    pub pattern: Option<PatternIdx>,
}

impl Tank {
    pub fn new(node: NodeIdx) -> Self {
        Self {
            node,
            area: 0.0,
            hmin: 0.0,
            h0: 0.0,
            hmax: 0.0,
            vmin: 0.0,
            v0: 0.0,
            vmax: 0.0,
            vol_curve: None,
            mix_model: MixModel::Mix1,
            v1_frac: 1.0,
            kb: aq_core::MISSING,
            pattern: None,
        }
    }

    pub fn is_reservoir(&self) -> bool {
        self.area == 0.0
    }

    /// Mixing-zone volume limit for MIX2.
    pub fn v1max(&self) -> f64 {
        self.v1_frac * self.vmax
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_core::Idx;

    #[test]
    fn primary_demand_is_last() {
        let mut node = Node::new("J1");
        node.demands.push(Demand {
            base: 1.0,
            pattern: None,
            name: "domestic".into(),
        });
        node.demands.push(Demand {
            base: 2.0,
            pattern: None,
            name: "industrial".into(),
        });
        assert_eq!(node.primary_demand().unwrap().base, 2.0);
    }

    #[test]
    fn zero_area_marks_reservoir() {
        let tank = Tank::new(Idx::from_index(3));
        assert!(tank.is_reservoir());
        let full = Tank {
            area: 120.0,
            ..Tank::new(Idx::from_index(3))
        };
        assert!(!full.is_reservoir());
    }
}
