//! libris-catalog - Bulk book import service
//!
//! Accepts CSV or JSON book lists over HTTP and imports them into the
//! catalog database, reporting a per-record outcome for every row.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;

use libris_catalog::config::ImportSettings;
use libris_catalog::AppState;
use libris_common::config::{
    database_path, default_config_path, load_toml_config, resolve_data_folder, DATA_FOLDER_ENV,
};

/// Command-line arguments for libris-catalog
#[derive(Parser, Debug)]
#[command(name = "libris-catalog")]
#[command(about = "Bulk book import service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "LIBRIS_PORT")]
    port: Option<u16>,

    /// Folder holding the catalog database
    #[arg(short, long)]
    data_folder: Option<PathBuf>,

    /// Bootstrap TOML config file
    #[arg(short, long, env = "LIBRIS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let toml_config = match &config_path {
        Some(path) => load_toml_config(path).context("Failed to load config file")?,
        None => Default::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},tower_http=info", toml_config.logging.level).into()
            }),
        )
        .init();

    // Build identification first, before any database delay
    info!(
        "Starting libris-catalog v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let data_folder = resolve_data_folder(args.data_folder.as_deref(), DATA_FOLDER_ENV, &toml_config);
    let db_path = database_path(&data_folder);
    info!("Database: {}", db_path.display());

    let db_pool = libris_common::db::init_database(&db_path)
        .await
        .context("Failed to open catalog database")?;

    let settings = ImportSettings::load(&db_pool)
        .await
        .context("Failed to load import settings")?;

    let state = AppState::new(db_pool, settings);
    let app = libris_catalog::build_router(state);

    let port = args.port.unwrap_or(toml_config.port);
    let addr: SocketAddr = format!("{}:{}", toml_config.bind_address, port)
        .parse()
        .context("Invalid bind address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
