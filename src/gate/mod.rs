//! Access gate — decides whether content is blocked behind the
//! "subscription required" screen and holds the onboarding dialog open
//! until the selected organization has a platform subscription.

pub mod evaluator;
pub mod state;

pub use evaluator::{AccessGate, GateConfig};
pub use state::{GateState, ReconcileTrigger, check_invariants};
