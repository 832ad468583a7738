//! Wizard step machine — which step the user is on and what they've entered.

use serde::{Deserialize, Serialize};

use crate::error::WizardError;

use super::validation::validate_organization_name;

/// The steps of the organization onboarding dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    /// Enter the organization name; advancing creates the organization.
    Name,
    /// Pick and pay for the platform plan.
    PlanSelection,
    /// Pick and pay for a support plan (extended flow only).
    SupportPlan,
    /// Done; completing closes the dialog.
    Complete,
}

impl WizardStep {
    /// Whether this step is terminal (completing exits the wizard).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Whether advancing from this step requires a successful payment.
    pub fn requires_payment(&self) -> bool {
        matches!(self, Self::PlanSelection | Self::SupportPlan)
    }
}

impl std::fmt::Display for WizardStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Name => "name",
            Self::PlanSelection => "plan_selection",
            Self::SupportPlan => "support_plan",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// Which sequence of steps a wizard runs.
///
/// `WithSupport` is a superset of `Standard` with the same transition rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WizardFlow {
    #[default]
    Standard,
    WithSupport,
}

const STANDARD_STEPS: [WizardStep; 3] = [
    WizardStep::Name,
    WizardStep::PlanSelection,
    WizardStep::Complete,
];

const WITH_SUPPORT_STEPS: [WizardStep; 4] = [
    WizardStep::Name,
    WizardStep::PlanSelection,
    WizardStep::SupportPlan,
    WizardStep::Complete,
];

/// 1-based index of the plan-selection step in every flow.
pub const PLAN_SELECTION_INDEX: usize = 2;

impl WizardFlow {
    pub fn steps(&self) -> &'static [WizardStep] {
        match self {
            Self::Standard => &STANDARD_STEPS,
            Self::WithSupport => &WITH_SUPPORT_STEPS,
        }
    }

    pub fn total_steps(&self) -> usize {
        self.steps().len()
    }

    /// Step at a 1-based index.
    pub fn step_at(&self, index: usize) -> Option<WizardStep> {
        index.checked_sub(1).and_then(|i| self.steps().get(i)).copied()
    }

    /// 1-based index of a step, if this flow has it.
    pub fn index_of(&self, step: WizardStep) -> Option<usize> {
        self.steps().iter().position(|s| *s == step).map(|i| i + 1)
    }

    /// Check a 1-based index is within `[1, total_steps]`.
    pub fn check_index(&self, index: usize) -> Result<usize, WizardError> {
        if (1..=self.total_steps()).contains(&index) {
            Ok(index)
        } else {
            Err(WizardError::StepOutOfRange {
                step: index,
                total: self.total_steps(),
            })
        }
    }
}

/// Form data accumulated across steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardData {
    pub organization_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_plan_id: Option<String>,
}

/// Whether the user may leave `step` forward with the given data.
///
/// Pure: callable outside of any dialog to decide if "Next" is enabled.
pub fn is_step_valid(step: WizardStep, data: &WizardData) -> bool {
    match step {
        WizardStep::Name => validate_organization_name(&data.organization_name).is_ok(),
        WizardStep::PlanSelection => data.organization_id.is_some() && data.plan_id.is_some(),
        WizardStep::SupportPlan => data.support_plan_id.is_some(),
        WizardStep::Complete => data.organization_id.is_some(),
    }
}

/// Position and data of one wizard run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardState {
    pub flow: WizardFlow,
    /// Current step, 1-based, always within `[1, flow.total_steps()]`.
    pub step: usize,
    pub data: WizardData,
}

impl WizardState {
    pub fn new(flow: WizardFlow) -> Self {
        Self {
            flow,
            step: 1,
            data: WizardData::default(),
        }
    }

    pub fn current_step(&self) -> WizardStep {
        // `step` is kept in range by every mutator below.
        self.flow.step_at(self.step).unwrap_or(WizardStep::Name)
    }

    /// Move forward one step if the current step is valid.
    pub fn advance(&mut self) -> Result<WizardStep, WizardError> {
        let current = self.current_step();
        if current.is_terminal() {
            return Err(WizardError::WrongStep {
                action: "next".into(),
                step: current.to_string(),
            });
        }
        if !is_step_valid(current, &self.data) {
            return Err(WizardError::StepInvalid {
                step: current.to_string(),
            });
        }
        self.step += 1;
        Ok(self.current_step())
    }

    /// Move back one step. Never re-validates the step being left.
    pub fn retreat(&mut self) -> Result<WizardStep, WizardError> {
        if self.step <= 1 {
            return Err(WizardError::AtFirstStep);
        }
        self.step -= 1;
        Ok(self.current_step())
    }

    /// Jump to a 1-based step index.
    pub fn jump_to(&mut self, index: usize) -> Result<WizardStep, WizardError> {
        self.step = self.flow.check_index(index)?;
        Ok(self.current_step())
    }

    /// Back to step 1 with empty data.
    pub fn reset(&mut self) {
        self.step = 1;
        self.data = WizardData::default();
    }
}
