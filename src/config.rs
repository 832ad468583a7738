//! Configuration types.

use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;
use crate::onboarding::WizardFlow;

/// Plan id of the platform-tier product in the default catalogue.
pub const DEFAULT_PLATFORM_PLAN: &str = "platform-monthly";

/// Console configuration.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Port for the HTTP surface.
    pub port: u16,
    /// Plan the wizard's plan step purchases when none is given.
    pub platform_plan_id: String,
    /// Which wizard flow hosts open.
    pub wizard_flow: WizardFlow,
    /// Upper bound on the gate's one-shot organization refresh.
    pub refresh_timeout: Duration,
    /// Surface gate invariant violations as errors instead of self-correcting.
    pub strict_invariants: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            platform_plan_id: DEFAULT_PLATFORM_PLAN.to_string(),
            wizard_flow: WizardFlow::Standard,
            refresh_timeout: Duration::from_secs(5),
            strict_invariants: cfg!(debug_assertions),
        }
    }
}

impl ConsoleConfig {
    /// Build configuration from `FLEET_CONSOLE_*` environment variables,
    /// falling back to defaults for anything unset or unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port: u16 = std::env::var("FLEET_CONSOLE_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        let platform_plan_id = std::env::var("FLEET_CONSOLE_PLATFORM_PLAN")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.platform_plan_id);

        let wizard_flow =
            wizard_flow_from(std::env::var("FLEET_CONSOLE_SUPPORT_STEP").ok().as_deref());

        let refresh_timeout = std::env::var("FLEET_CONSOLE_REFRESH_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.refresh_timeout);

        let strict_invariants = match std::env::var("FLEET_CONSOLE_STRICT_INVARIANTS") {
            Ok(v) => parse_bool("FLEET_CONSOLE_STRICT_INVARIANTS", &v)?,
            Err(_) => defaults.strict_invariants,
        };

        Ok(Self {
            port,
            platform_plan_id,
            wizard_flow,
            refresh_timeout,
            strict_invariants,
        })
    }
}

/// The support step is opt-in; anything but a recognised "true" keeps the
/// standard flow.
fn wizard_flow_from(value: Option<&str>) -> WizardFlow {
    match value.map(|v| parse_bool("FLEET_CONSOLE_SUPPORT_STEP", v)) {
        Some(Ok(true)) => WizardFlow::WithSupport,
        Some(Err(e)) => {
            warn!(error = %e, "Ignoring support step setting, using standard flow");
            WizardFlow::Standard
        }
        _ => WizardFlow::Standard,
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}
