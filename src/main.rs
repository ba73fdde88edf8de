use anyhow::Context;

use inbox_todo::config::GatewayConfig;
use inbox_todo::services::{
    ConnectionPool, DatabaseClient, HttpConnector, ReadinessGate, ServiceConfig, SummaryClient,
    TodoClient,
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

    let config = GatewayConfig::from_env()?;

    eprintln!("📬 inbox-todo v{}", env!("CARGO_PKG_VERSION"));
    for endpoint in config.endpoints() {
        eprintln!("   {}: {}", endpoint.name, endpoint.addr);
    }
    eprintln!("   Database: {}", config.database_path);

    // ── Connections ──────────────────────────────────────────────────────
    let services = vec![
        ServiceConfig::new("llm", config.llm_addr.clone(), SummaryClient::new),
        ServiceConfig::new("todo", config.todo_addr.clone(), TodoClient::new),
        ServiceConfig::new("database", config.database_addr.clone(), DatabaseClient::new),
    ];

    let connector = HttpConnector::new(config.health_check_timeout)?;
    let pool = ConnectionPool::build(&services, &connector)?;

    // ── Readiness ────────────────────────────────────────────────────────
    let gate = ReadinessGate::new(config.health_poll_interval);
    if let Err(e) = gate.await_healthy(&pool, config.health_check_timeout).await {
        pool.close();
        return Err(e).context("services did not become healthy");
    }
    tracing::info!(services = ?pool.names(), "Connected to services");

    // ── Database ─────────────────────────────────────────────────────────
    let database = pool.require_client::<DatabaseClient>("database")?;
    if let Err(e) = database.create_if_not_exist(&config.database_path).await {
        pool.close();
        return Err(e).context("failed to set up database");
    }
    tracing::info!(path = %config.database_path, "Database ready");

    eprintln!("   Ready. Press Ctrl-C to stop.\n");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    pool.close();
    Ok(())
}
