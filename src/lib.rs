//! Fleet Console — organization onboarding and subscription-gated access
//! for the IoT platform administration console.

pub mod config;
pub mod console;
pub mod error;
pub mod gate;
pub mod onboarding;
pub mod org;
