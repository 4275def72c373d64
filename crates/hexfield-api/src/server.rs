//! Listener setup and the serve loop.

use std::future::Future;
use std::sync::Arc;

use hexfield_engine::config::ServerConfig;
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Bind `server.host:server.port` and serve until `shutdown` resolves.
///
/// The host may be a name; it is resolved by the listener.
///
/// # Errors
///
/// [`ServerError::Bind`] if the address cannot be bound, [`ServerError::Serve`]
/// if the accept loop fails.
pub async fn start_server<F>(config: &ServerConfig, state: Arc<AppState>, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|source| ServerError::Bind {
            address: format!("{}:{}", config.host, config.port),
            source,
        })?;
    serve(listener, state, shutdown).await
}

/// Serve on an already bound listener.
///
/// In-flight requests finish before this returns.
///
/// # Errors
///
/// [`ServerError::Serve`] if the accept loop fails.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local = listener.local_addr().map_err(ServerError::Serve)?;
    info!(addr = %local, header = %state.identity_header, "Hexfield API listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServerError::Serve)?;

    info!(addr = %local, "Hexfield API drained");
    Ok(())
}

/// Listener failures.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configured address could not be bound.
    #[error("cannot bind {address}: {source}")]
    Bind {
        /// `host:port` as configured.
        address: String,
        /// Socket error.
        source: std::io::Error,
    },

    /// The accept loop stopped with an error.
    #[error("serve failed: {0}")]
    Serve(#[source] std::io::Error),
}
