//! Shared application state for the API handlers.

use axum::http::HeaderName;
use hexfield_db::Game;

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The game handle (pool, config, content, clock).
    pub game: Game,
    /// Header the gateway uses to pass the authenticated player id.
    pub identity_header: HeaderName,
}

impl AppState {
    /// Build state from a game handle, reading the identity header name
    /// from the game's server configuration.
    ///
    /// An unusable header name falls back to `x-player-id`.
    pub fn new(game: Game) -> Self {
        let configured = game.config().server.identity_header.to_ascii_lowercase();
        let identity_header = HeaderName::try_from(configured.as_str()).unwrap_or_else(|err| {
            tracing::warn!(header = %configured, error = %err, "invalid identity header, using x-player-id");
            HeaderName::from_static(DEFAULT_IDENTITY_HEADER)
        });
        Self { game, identity_header }
    }
}

/// Header used when the configured name is unusable.
pub const DEFAULT_IDENTITY_HEADER: &str = "x-player-id";
