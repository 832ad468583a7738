//! Onboarding wizard — the multi-step organization creation flow.
//!
//! The user names the organization (which creates it), buys the platform
//! plan, optionally a support plan, and completes. Hosts drive the dialog
//! through `OnboardingWizard`; step validity is a pure function of the form
//! data so "Next" can be enabled or disabled without running the dialog.

pub mod state;
pub mod validation;
pub mod wizard;

pub use state::{WizardData, WizardFlow, WizardState, WizardStep, is_step_valid};
pub use validation::validate_organization_name;
pub use wizard::{CloseOutcome, CompletionInfo, OnboardingWizard, WizardEvent, WizardSnapshot};
