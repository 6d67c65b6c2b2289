//! Server bootstrap: tracing, tokio runtime, listener, graceful shutdown.

use talkface_core::Config;

use crate::error::{io_err, ServerError};
use crate::routes::{router, AppState};

/// Start the HTTP server and block the current thread until it exits.
///
/// `bind` overrides `server.bind` from the config.
pub fn start_blocking(config: &Config, bind: Option<&str>) -> Result<(), ServerError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    let bind = bind.unwrap_or(config.server.bind.as_str()).to_string();
    runtime.block_on(serve(config, &bind))
}

/// Serve until ctrl-c.
pub async fn serve(config: &Config, bind: &str) -> Result<(), ServerError> {
    let state = AppState::from_config(config)?;
    let demo_dir = state.demo_dir.clone();
    tokio::fs::create_dir_all(&demo_dir)
        .await
        .map_err(|e| io_err(&demo_dir, e))?;
    let results_dir = state.orchestrator.results_dir().to_path_buf();
    tokio::fs::create_dir_all(&results_dir)
        .await
        .map_err(|e| io_err(&results_dir, e))?;

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: bind.to_string(),
            source,
        })?;
    let local = listener.local_addr().map_err(|e| io_err(bind, e))?;
    tracing::info!(
        addr = %local,
        project_root = %config.project_root.display(),
        max_concurrent_jobs = config.server.max_concurrent_jobs,
        "talkface server listening",
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| io_err(bind, e))?;
    tracing::info!("talkface server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

/// `RUST_LOG` filter, `info` by default. Logs go to stderr so stdout stays
/// clean for command output.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
