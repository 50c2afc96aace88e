pub mod accounts;
pub mod api;
pub mod appointment;
pub mod authorization;
pub mod config;
pub mod core_state;
pub mod crypto;
pub mod dashboard;
pub mod db;
pub mod departments;
pub mod inventory;
pub mod medications;
pub mod models;
pub mod notifications;
pub mod prescription;
pub mod system_alerts;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::core_state::{AccessSource, CoreState, MAINTENANCE_INTERVAL};

pub async fn run() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(
        version = config::APP_VERSION,
        data_dir = %config.data_dir.display(),
        "{} starting",
        config::APP_NAME
    );

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        tracing::error!("Cannot create data directory: {e}");
        return;
    }

    let core = Arc::new(CoreState::new(&config));
    if let Err(e) = prepare_database(&core, &config) {
        tracing::error!("Database setup failed: {e}");
        return;
    }

    match api::start_server(core.clone(), config.bind_addr).await {
        Ok(server) => {
            tracing::info!(addr = %server.addr, "Listening");
            core.set_api_server(server).await;
        }
        Err(e) => {
            tracing::error!("{e}");
            return;
        }
    }
    core.log_access(AccessSource::System, "startup", &config.bind_addr.to_string());
    let maintenance = core_state::spawn_maintenance(core.clone(), MAINTENANCE_INTERVAL);

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {e}");
    }

    maintenance.abort();
    core.shutdown_api_server().await;
    core.log_access(AccessSource::System, "shutdown", &config.bind_addr.to_string());
    match core.flush_and_prune_audit() {
        Ok((flushed, pruned)) => tracing::info!(flushed, pruned, "Audit log persisted"),
        Err(e) => tracing::error!("Audit flush failed: {e}"),
    }
}

/// Apply migrations, seed the first admin when configured, and drop
/// sessions that expired while the server was down.
fn prepare_database(core: &CoreState, config: &ServerConfig) -> Result<(), String> {
    let conn = core.open_db().map_err(|e| e.to_string())?;

    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        accounts::ensure_bootstrap_admin(&conn, email, password).map_err(|e| e.to_string())?;
    }

    accounts::purge_expired_sessions(&conn).map_err(|e| e.to_string())?;
    Ok(())
}
