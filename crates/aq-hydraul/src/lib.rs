//! aq-hydraul: gradient-method hydraulic solver.
//!
//! Solves the coupled flow-continuity / energy-loss equations of a
//! pressurized network one period at a time, and advances an extended-period
//! clock between solutions. Per period the nonlinear system is linearized
//! into diagonal (`Aii`), off-diagonal (`Aij`) and right-hand-side (`F`)
//! arrays and handed to an opaque linear solve; flows are corrected from the
//! resulting heads until the relative flow change, head error and flow
//! change all meet their thresholds.

pub mod coeffs;
pub mod engine;
pub mod error;
pub mod matrix;
pub mod resist;
pub mod solver;
pub mod state;

pub use engine::HydEngine;
pub use error::{HydError, HydResult};
pub use state::HydState;

/// Head accuracy used by status tests, ft.
pub const HTOL: f64 = 0.0005;
/// Flow accuracy used by status tests, cfs.
pub const QTOL: f64 = 0.0001;
/// Low-flow cutoff for headloss-gradient linearization.
pub const RQTOL: f64 = 1e-7;
/// Hazen-Williams flow exponent.
pub const HW_EXP: f64 = 1.852;
/// Horsepower per (cfs x ft) of water at specific gravity 1.
pub const HP_PER_CFS_FT: f64 = 62.4 / 550.0;
