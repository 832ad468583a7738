use std::sync::Arc;

use fleet_console::config::ConsoleConfig;
use fleet_console::console::{ConsoleSession, console_routes};
use fleet_console::org::memory::{
    InMemoryBackend, MemoryOrganizationStore, default_plans, fixture_organizations,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ConsoleConfig::from_env()?;

    eprintln!("Fleet Console v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Platform plan: {}", config.platform_plan_id);
    eprintln!("   Wizard steps: {}", config.wizard_flow.total_steps());
    eprintln!("   Refresh timeout: {:?}", config.refresh_timeout);
    eprintln!(
        "   Invariants: {}",
        if config.strict_invariants { "strict" } else { "self-correcting" }
    );
    eprintln!("   API: http://0.0.0.0:{}/api/console/status\n", config.port);

    // ── Organizations ────────────────────────────────────────────────────
    let backend = InMemoryBackend::with_plans(default_plans(&config.platform_plan_id));
    for org in fixture_organizations() {
        backend.insert_organization(org);
    }
    let store = MemoryOrganizationStore::new(Arc::clone(&backend));
    eprintln!("   Organizations: {} seeded", backend.organizations().len());

    let session = ConsoleSession::new(&config, store, backend.clone(), backend);

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = console_routes(session);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Console server started");
    axum::serve(listener, app).await?;

    Ok(())
}
