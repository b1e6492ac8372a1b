//! aq-network: the network store.
//!
//! Owns every element of a water distribution model (junctions, tanks,
//! reservoirs, pipes, pumps, valves, patterns, curves, demands, sources,
//! simple controls) plus the analysis options parsed alongside them.
//! Topology mutation preserves referential integrity: the store rewrites
//! every cross-reference eagerly whenever elements are inserted, deleted or
//! renamed.

pub mod control;
pub mod curve;
pub mod error;
pub mod link;
pub mod network;
pub mod node;
pub mod options;
pub mod pattern;
pub mod validate;

pub use control::{Control, ControlKind};
pub use curve::{Curve, CurveKind};
pub use error::{NetworkError, NetworkResult};
pub use link::{Link, LinkKind, LinkStatus, Pump, PumpEnergy, PumpKind, Valve};
pub use network::{MAX_ID_LEN, Network};
pub use node::{Demand, MixModel, Node, NodeKind, Source, SourceKind, Tank};
pub use options::{DemandModel, Options, Statistic, Times};
pub use pattern::Pattern;
