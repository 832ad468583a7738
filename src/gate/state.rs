//! Gate decision state and the invariants tying it to the dialog.

use serde::{Deserialize, Serialize};

use crate::error::InconsistentStateError;
use crate::onboarding::WizardSnapshot;
use crate::onboarding::state::PLAN_SELECTION_INDEX;

/// What caused a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileTrigger {
    SelectionChanged,
    DialogChanged,
}

impl std::fmt::Display for ReconcileTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelectionChanged => write!(f, "selection_changed"),
            Self::DialogChanged => write!(f, "dialog_changed"),
        }
    }
}

/// Output of the last reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateState {
    /// Replace the application with the "subscription required" screen.
    pub block_content: bool,
    pub dialog_open: bool,
    /// Step the gate holds the dialog at while content is blocked.
    pub dialog_start_step: usize,
}

impl GateState {
    pub fn unblocked(dialog_open: bool) -> Self {
        Self {
            block_content: false,
            dialog_open,
            dialog_start_step: 1,
        }
    }

    pub fn blocked() -> Self {
        Self {
            block_content: true,
            dialog_open: true,
            dialog_start_step: PLAN_SELECTION_INDEX,
        }
    }
}

impl Default for GateState {
    fn default() -> Self {
        Self::unblocked(false)
    }
}

/// Verify a gate decision against the dialog it drove and the organization
/// currently selected.
///
/// Blocked content requires the dialog open at the plan step or later, for
/// the selected organization; unblocked content requires the dialog not be
/// held by the gate.
pub fn check_invariants(
    state: &GateState,
    dialog: &WizardSnapshot,
    selected: Option<&str>,
) -> Result<(), InconsistentStateError> {
    if state.block_content && !(dialog.open && dialog.step >= PLAN_SELECTION_INDEX) {
        return Err(InconsistentStateError::BlockedWithoutDialog {
            open: dialog.open,
            step: dialog.step,
        });
    }
    let held = dialog.data.organization_id.as_deref();
    if state.block_content && (selected.is_none() || held != selected) {
        return Err(InconsistentStateError::HeldForOtherOrganization {
            held: held.map(str::to_string),
            selected: selected.map(str::to_string),
        });
    }
    if !state.block_content && dialog.forced {
        return Err(InconsistentStateError::ForcedWhileEntitled);
    }
    Ok(())
}
