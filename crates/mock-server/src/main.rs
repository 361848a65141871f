//! Standalone mock MAL service.
//!
//! Listens on `127.0.0.1:$PORT` (default 8089) and accepts the credentials
//! `unitTest` / `unitPass`. Logging follows the `[logging]` section of the
//! file named by `$MAL_CONFIG` (default `config.toml`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use mock_server::{Credentials, CONFIG_ENV, DEFAULT_CONFIG_PATH};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    shared::logging::init(mock_server::log_config(&config_path))?;

    let port = std::env::var("PORT").unwrap_or_else(|_| "8089".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(addr = %addr, config = %config_path.display(), "Mock MAL service listening");
    mock_server::run(listener, Credentials::new("unitTest", "unitPass"))
        .await
        .context("Mock MAL service failed")
}
