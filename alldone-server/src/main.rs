//! Alldone server -- REST backend for the task list.
//!
//! An axum HTTP server that registers users, issues bearer tokens, and
//! serves per-user task CRUD under `/tasks/`.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:8000
//! cargo run --bin alldone-server
//!
//! # Run on custom address
//! cargo run --bin alldone-server -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! ALLDONE_ADDR=127.0.0.1:8080 cargo run --bin alldone-server
//! ```

use alldone_server::api;
use alldone_server::config::{ServerCliArgs, ServerConfig};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        cors_origins = config.cors_origins.len(),
        "starting alldone server"
    );

    match api::start_server(&config).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}
