//! aq-quality: Lagrangian water-quality transport.
//!
//! Tracks a reactive constituent, water age or source trace through the
//! network by moving discrete water segments along each pipe with the flow,
//! mixing them at nodes and inside tanks, and integrating bulk and wall
//! reaction kinetics per segment. The solver walks stored hydraulic
//! snapshots on its own, finer time grid.

pub mod engine;
pub mod error;
pub mod mixing;
pub mod reaction;
pub mod segment;

pub use engine::{MassBalance, QualEngine};
pub use error::{QualError, QualResult};
pub use segment::Segment;
