//! Error types for the server binary.
//!
//! [`ServerError`] wraps every failure mode during startup and serving so
//! `main` can propagate with `?`.

/// Top-level error for the server binary.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: hexfield_engine::ConfigError,
    },

    /// Database connection, migration or content loading failed.
    #[error("database error: {source}")]
    Database {
        /// The underlying database error.
        #[from]
        source: hexfield_db::DbError,
    },

    /// The HTTP server failed to bind or serve.
    #[error("http error: {source}")]
    Http {
        /// The underlying server error.
        #[from]
        source: hexfield_api::ServerError,
    },

    /// The log subscriber could not be installed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
