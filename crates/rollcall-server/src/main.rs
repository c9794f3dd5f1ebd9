use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use rollcall_server::{api, AppState, ServerConfig, TreeStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rollcall_server=debug")),
        )
        .init();

    info!("Starting Rollcall server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        instance = %config.instance_name,
        addr = %config.http_addr,
        data_path = ?config.data_path,
        auth_enabled = config.auth_token.is_some(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Restore the tree
    // -----------------------------------------------------------------------
    let store = match &config.data_path {
        Some(path) => TreeStore::open(path.clone()).await?,
        None => {
            tracing::warn!("DATA_PATH not set, data is kept in memory only");
            TreeStore::in_memory()
        }
    };

    let http_addr = config.http_addr;
    let app_state = AppState {
        store: Arc::new(store),
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
