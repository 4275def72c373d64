//! Error types for the persistence layer.
//!
//! Rule rejections surface unchanged as [`DbError::Game`] so the API layer
//! can map them by [`ErrorCategory`]. Everything else is a storage fault.

use hexfield_engine::{ErrorCategory, GameError};
use hexfield_ledger::LedgerError;
use hexfield_types::BundleError;

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// Errors returned by the procedures and stores in this crate.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A game rule rejected the operation.
    #[error(transparent)]
    Game(#[from] GameError),

    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A JSON column could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row holds a value the game types cannot represent.
    #[error("corrupt {table} row: {reason}")]
    Corrupt {
        /// Table the row came from.
        table: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DbError {
    /// Build a [`DbError::Corrupt`].
    pub fn corrupt(table: &'static str, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            table,
            reason: reason.into(),
        }
    }

    /// The rule category, when a rule produced the error.
    pub const fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Game(err) => Some(err.category()),
            Self::Corrupt { .. } => Some(ErrorCategory::Malformed),
            Self::Postgres(_) | Self::Migration(_) | Self::Serialization(_) | Self::Config(_) => None,
        }
    }

    /// Whether this is a unique-constraint violation raised by `PostgreSQL`.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Postgres(err) => err
                .as_database_error()
                .and_then(|db| db.code())
                .is_some_and(|code| code == UNIQUE_VIOLATION),
            _ => false,
        }
    }
}

impl From<LedgerError> for DbError {
    fn from(err: LedgerError) -> Self {
        Self::Game(GameError::from(err))
    }
}

impl From<BundleError> for DbError {
    fn from(err: BundleError) -> Self {
        Self::Game(GameError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_errors_keep_their_category() {
        let err = DbError::from(GameError::not_found("listing", "x"));
        assert_eq!(err.category(), Some(ErrorCategory::NotFound));
        assert_eq!(err.to_string(), "listing x not found");
    }

    #[test]
    fn storage_errors_have_no_category() {
        let err = DbError::Postgres(sqlx::Error::RowNotFound);
        assert_eq!(err.category(), None);
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn corrupt_rows_are_malformed() {
        let err = DbError::corrupt("inventory", "negative quantity");
        assert_eq!(err.category(), Some(ErrorCategory::Malformed));
    }
}
