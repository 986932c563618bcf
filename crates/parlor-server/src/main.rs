//! Parlor server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite conversation store, and serves the JSON API under `/api`.
//!
//! # Migrating without serving
//!
//! ```
//! cargo run -p parlor-server -- --migrate
//! ```

mod config;

use std::sync::Arc;

use anyhow::Context as _;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use clap::Parser;
use parlor_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

#[derive(Parser)]
#[command(author, version, about = "Parlor conversation server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: std::path::PathBuf,

  /// Apply pending migrations, print the schema version, and exit.
  #[arg(long)]
  migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();
  let server_cfg = ServerConfig::load(&cli.config)?;
  init_tracing(server_cfg.log_json);

  // Opening the store applies migrations.
  let store_path = server_cfg.database_path();
  let store = SqliteStore::open_with(&store_path, server_cfg.store_options())
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let version = store.schema_version().await.context("failed to read schema version")?;
  tracing::info!(path = %store_path.display(), version, "store ready");

  if cli.migrate {
    println!("{version}");
    return Ok(());
  }

  let store = Arc::new(store);
  let app = Router::new()
    .route("/health", get(health))
    .with_state(store.clone())
    .nest("/api", parlor_api::api_router(store))
    .layer(TraceLayer::new_for_http());

  let address = server_cfg.address();
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  tracing::info!("server stopped");
  Ok(())
}

fn init_tracing(json: bool) {
  let filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::INFO.into())
    .from_env_lossy();

  if json {
    tracing_subscriber::fmt().json().with_env_filter(filter).init();
  } else {
    tracing_subscriber::fmt().with_env_filter(filter).init();
  }
}

/// `GET /health`: 200 while the database answers.
async fn health(State(store): State<Arc<SqliteStore>>) -> StatusCode {
  match store.ping().await {
    Ok(()) => StatusCode::OK,
    Err(e) => {
      tracing::warn!(error = %e, "health check failed");
      StatusCode::SERVICE_UNAVAILABLE
    }
  }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      tracing::warn!(error = %e, "failed to listen for ctrl-c");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        tracing::warn!(error = %e, "failed to listen for SIGTERM");
        std::future::pending::<()>().await;
      }
    }
  };
  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    () = ctrl_c => {},
    () = terminate => {},
  }
  tracing::info!("shutting down");
}
