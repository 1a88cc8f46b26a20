mod errors;
mod layers;
mod models;
mod routers;
mod services;
mod utils;

use crate::errors::InviteeError;
use crate::models::chain::Address;
use crate::models::const_val::DB_CLOSE_TIMEOUT;
use crate::routers::router;
use crate::services::lifecycle::InviteLifecycle;
use crate::services::oracle::RpcChainOracle;
use anyhow::Context;
use clap::Parser;
use services::states::InviteeState;
use services::states::config::AppConfig;
use services::states::db::DataBaseState;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[cfg(all(target_os = "windows", feature = "alternative-allocator"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(all(
    any(
        target_os = "linux",
        target_os = "macos",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd"
    ),
    feature = "alternative-allocator"
))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

fn tracing_init(level: &str) {
    use std::io::stdout;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, Layer};
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(stdout)
        .with_filter(EnvFilter::new(level));
    tracing_subscriber::registry().with(fmt_layer).init();
}

#[cfg(test)]
#[ctor::ctor]
fn init() {
    tracing_init("info,invitee=debug");
}

#[derive(clap::Parser, Debug)]
#[clap(name = "invitee", version)]
pub struct Cli {
    #[clap(short, long, help = "Path to config file", default_value = "invitee.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(AppConfig::load(&cli.config).map_err(InviteeError::from)?);
    tracing_init(&config.common.log_level);
    let contract = Address::from_str(&config.chain.contract_address)
        .context("`chain.contract_address` is not a valid address")?;
    if contract.is_zero() {
        tracing::warn!("`chain.contract_address` is the zero address, every lookup will fail");
    }
    let sqlx_opt = SqliteConnectOptions::from_str(&config.db.db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);
    let sqlx_pool = SqlitePoolOptions::new()
        .max_connections(config.db.sqlite_connection_nums)
        .connect_with(sqlx_opt)
        .await
        .map_err(InviteeError::SqlxError)?;
    #[cfg(feature = "migrate")]
    {
        tracing::info!("Preparing to run embed migrations...");
        sqlx::migrate!("./migrations")
            .run(&sqlx_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                InviteeError::from(e)
            })?;
        tracing::info!("Migrations completed successfully.");
    }
    let db = DataBaseState::new(sqlx_pool);
    let oracle = RpcChainOracle::new(
        config.chain.rpc_url.to_string(),
        contract,
        Duration::from_secs(config.chain.request_timeout_secs),
    )
    .map_err(InviteeError::from)?;
    tracing::info!(
        "Chain oracle ready: rpc={}, contract={}",
        config.chain.rpc_url,
        contract
    );
    let invites = InviteLifecycle::new(db.clone(), Arc::new(oracle));
    let addr = format!("{}:{}", config.common.host, config.common.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(InviteeError::from)?;
    tracing::info!(
        "Starting server at {}:{}",
        config.common.host,
        config.common.port
    );
    let state = Arc::new(InviteeState {
        db,
        invites,
        config,
    });
    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{SignalKind, signal};
                let mut sigint =
                    signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
                let mut sigterm =
                    signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
                tokio::select! {
                    _ = sigint.recv() => {},
                    _ = sigterm.recv() => {},
                }
            }
            #[cfg(windows)]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
            #[cfg(not(any(unix, windows)))]
            {
                tracing::warn!("Graceful shutdown is not supported on this platform.");
                std::future::pending::<()>().await;
            }
            tracing::warn!("Received shutdown signal, shutting down gracefully...");
        })
        .await?;
    tracing::info!("Trying to close database connections...");
    match tokio::time::timeout(DB_CLOSE_TIMEOUT, state.db.close_conn()).await {
        Ok(_) => tracing::info!("Database connections closed."),
        Err(_) => tracing::error!("Timed out while closing database connections."),
    }
    Ok(())
}
