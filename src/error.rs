//! Error types for the fleet console.

use std::time::Duration;

/// Top-level error type for the console core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Wizard error: {0}")]
    Wizard(#[from] WizardError),

    #[error("Inconsistent gate state: {0}")]
    InconsistentState(#[from] InconsistentStateError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Organization name rejected by the creation step.
///
/// Recovered locally: the wizard stays on the name step and the message is
/// shown inline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Organization name is required")]
    Empty,

    #[error("Organization name must be at least {min} characters")]
    TooShort { min: usize },

    #[error("Organization name must be at most {max} characters")]
    TooLong { max: usize },
}

/// Failures from the external organization and payment services.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("Organization rejected: {reason}")]
    Rejected { reason: String },

    #[error("Organization name already taken: {name}")]
    Conflict { name: String },

    #[error("Payment gateway error: {reason}")]
    Gateway { reason: String },

    #[error("Payment for plan {plan_id} was declined")]
    PaymentDeclined { plan_id: String },

    #[error("Unknown plan: {plan_id}")]
    UnknownPlan { plan_id: String },
}

/// Organization store errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Organization {id} not found")]
    NotFound { id: String },

    #[error("Refresh of organization {id} failed: {reason}")]
    RefreshFailed { id: String, reason: String },

    #[error("Refresh of organization {id} timed out after {timeout:?}")]
    Timeout { id: String, timeout: Duration },
}

/// Rejected wizard transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WizardError {
    #[error("Onboarding dialog is not open")]
    NotOpen,

    #[error("Step {step} is out of range 1..={total}")]
    StepOutOfRange { step: usize, total: usize },

    #[error("Step {step} is not valid yet")]
    StepInvalid { step: String },

    #[error("Action for step {step} is already in flight")]
    ActionInFlight { step: String },

    #[error("Cannot go back while a payment is in progress")]
    PaymentInFlight,

    #[error("Already at the first step")]
    AtFirstStep,

    #[error("Dialog is held at step {min_step} or later until a plan is purchased")]
    HeldByGate { min_step: usize },

    #[error("Action {action} is not available on step {step}")]
    WrongStep { action: String, step: String },

    #[error("No organization has been created for this onboarding yet")]
    MissingOrganization,

    #[error("Result for step {step} arrived after the dialog moved on")]
    Stale { step: String },
}

/// Gate invariant violations. These are programming defects, not user
/// conditions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InconsistentStateError {
    #[error("Content blocked but dialog is not open at step >= 2 (open={open}, step={step})")]
    BlockedWithoutDialog { open: bool, step: usize },

    #[error("Dialog still forced open while entitlement is satisfied")]
    ForcedWhileEntitled,

    #[error("Content blocked for {held:?} but {selected:?} is selected")]
    HeldForOtherOrganization {
        held: Option<String>,
        selected: Option<String>,
    },
}

/// Result type alias for the console.
pub type Result<T> = std::result::Result<T, Error>;
