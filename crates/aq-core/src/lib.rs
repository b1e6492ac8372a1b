//! aq-core: stable foundation for aquanet.
//!
//! Contains:
//! - error (public error codes, warnings, shared result alias)
//! - ids (compact element indices for the network store)
//! - numeric (float helpers + tolerances)
//! - units (flow/pressure unit selection and conversion-factor tables)
//! - time (simulation clock helpers)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod time;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use error::{Code, CoreResult, Warn};
pub use ids::*;
pub use numeric::*;
pub use units::*;
