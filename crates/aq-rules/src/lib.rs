//! aq-rules: rule-based operational controls.
//!
//! Rules are IF/AND/OR premise lists with THEN and ELSE action lists,
//! evaluated against current simulation state at the rule time step. Rule
//! actions override simple controls; when two rules act on the same link in
//! one step, the higher-priority rule wins (ties go to definition order).
//!
//! The crate owns the rule data model, the multi-line rule-text parser and
//! the evaluation pass. Simulation state is read through the [`StateView`]
//! trait so the hydraulic engine can feed values without a crate cycle.

pub mod error;
pub mod eval;
pub mod parse;
pub mod rule;

pub use error::{RuleError, RuleResult};
pub use eval::{PendingAction, StateView};
pub use parse::parse_rule;
pub use rule::{Action, LogOp, Object, Premise, RelOp, Rule, RuleSet, Variable};
