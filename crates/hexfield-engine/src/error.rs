//! Error types for the `hexfield-engine` crate.
//!
//! Every rejection carries the concrete numbers involved so that the message
//! can be rendered to a player as-is. [`GameError::category`] maps each
//! variant onto the coarse taxonomy the API layer turns into status codes.

use chrono::{DateTime, Utc};

use hexfield_ledger::LedgerError;
use hexfield_types::BundleError;

/// Coarse classification of a [`GameError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Referenced entity absent or owned by someone else.
    NotFound,
    /// Insufficient resource, capacity full, not ready, limit reached.
    Precondition,
    /// Already claimed, purchased, completed or settled.
    AlreadyTerminal,
    /// Content data is unusable (null duration, bad bundle).
    Malformed,
    /// The request itself makes no sense (self-friending, zero quantity).
    Invalid,
}

impl ErrorCategory {
    /// Stable wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Precondition => "precondition",
            Self::AlreadyTerminal => "already_terminal",
            Self::Malformed => "malformed",
            Self::Invalid => "invalid",
        }
    }
}

/// Errors raised by game rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Entity absent or not owned by the caller.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity (e.g. "factory").
        entity: &'static str,
        /// Identifier as given.
        id: String,
    },

    /// A production site has no free slot.
    #[error("{site} is at capacity: {in_flight} of {capacity} slots in use")]
    CapacityFull {
        /// Kind of site.
        site: &'static str,
        /// Tasks currently in flight.
        in_flight: u32,
        /// Computed capacity.
        capacity: u32,
    },

    /// A timed task is not complete yet.
    #[error("not ready: completes at {ready_at}")]
    NotReady {
        /// When the task completes.
        ready_at: DateTime<Utc>,
    },

    /// Currency or inventory shortfall, or ledger arithmetic failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A count or rate limit is exhausted.
    #[error("{what} limit reached: {used} of {limit} used")]
    LimitReached {
        /// What is limited.
        what: String,
        /// Amount already used.
        used: u32,
        /// The limit.
        limit: u32,
    },

    /// Player level too low.
    #[error("requires level {required}, current level {current}")]
    LevelTooLow {
        /// Level needed.
        required: u32,
        /// Player level.
        current: u32,
    },

    /// Player population too low.
    #[error("requires population {required}, current population {current}")]
    PopulationTooLow {
        /// Population needed.
        required: u32,
        /// Player population.
        current: u32,
    },

    /// A prerequisite building has not been placed.
    #[error("requires a {building} to be built first")]
    MissingPrerequisite {
        /// Name of the prerequisite building type.
        building: String,
    },

    /// A town grid cell is already taken.
    #[error("cell ({x}, {y}) is already occupied")]
    CellOccupied {
        /// Column.
        x: i32,
        /// Row.
        y: i32,
    },

    /// A footprint leaves the town grid.
    #[error("footprint at ({x}, {y}) size {width}x{height} leaves the {grid_width}x{grid_height} grid")]
    OutOfBounds {
        /// Column.
        x: i32,
        /// Row.
        y: i32,
        /// Footprint width.
        width: u16,
        /// Footprint height.
        height: u16,
        /// Grid width.
        grid_width: u16,
        /// Grid height.
        grid_height: u16,
    },

    /// The entity is already in a final state.
    #[error("{what} already {state}")]
    AlreadyTerminal {
        /// What was acted on.
        what: String,
        /// Its state ("claimed", "purchased", ...).
        state: &'static str,
    },

    /// The caller lacks the role needed.
    #[error("not permitted: {0}")]
    NotPermitted(String),

    /// A state precondition without a more specific variant.
    #[error("{0}")]
    Precondition(String),

    /// Content data is unusable.
    #[error("malformed {what}: {reason}")]
    Malformed {
        /// What was being read.
        what: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The request is invalid on its face.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl GameError {
    /// Shorthand for [`GameError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`GameError::AlreadyTerminal`].
    pub fn terminal(what: impl Into<String>, state: &'static str) -> Self {
        Self::AlreadyTerminal {
            what: what.into(),
            state,
        }
    }

    /// Shorthand for [`GameError::Malformed`].
    pub fn malformed(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Arithmetic overflow, reported through the ledger taxonomy.
    pub fn overflow(context: impl Into<String>) -> Self {
        Self::Ledger(LedgerError::overflow(context))
    }

    /// Taxonomy bucket for this error.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::CapacityFull { .. }
            | Self::NotReady { .. }
            | Self::LimitReached { .. }
            | Self::LevelTooLow { .. }
            | Self::PopulationTooLow { .. }
            | Self::MissingPrerequisite { .. }
            | Self::CellOccupied { .. }
            | Self::OutOfBounds { .. }
            | Self::NotPermitted(_)
            | Self::Precondition(_) => ErrorCategory::Precondition,
            Self::Ledger(inner) => match inner {
                LedgerError::InsufficientCrystals { .. }
                | LedgerError::InsufficientGems { .. }
                | LedgerError::InsufficientItem { .. } => ErrorCategory::Precondition,
                LedgerError::ArithmeticOverflow { .. } | LedgerError::InvalidRule(_) => {
                    ErrorCategory::Malformed
                }
            },
            Self::AlreadyTerminal { .. } => ErrorCategory::AlreadyTerminal,
            Self::Malformed { .. } => ErrorCategory::Malformed,
            Self::Invalid(_) => ErrorCategory::Invalid,
        }
    }
}

impl From<BundleError> for GameError {
    fn from(err: BundleError) -> Self {
        Self::malformed("bundle", err.0)
    }
}

#[cfg(test)]
mod tests {
    use hexfield_types::ItemKind;

    use super::*;

    #[test]
    fn insufficient_item_message_has_numbers() {
        let err = GameError::from(LedgerError::InsufficientItem {
            item: ItemKind::Seed(1),
            required: 5,
            available: 3,
        });
        assert_eq!(err.category(), ErrorCategory::Precondition);
        assert_eq!(err.to_string(), "not enough seed:1: required 5, available 3");
    }

    #[test]
    fn overflow_is_malformed() {
        assert_eq!(GameError::overflow("x").category(), ErrorCategory::Malformed);
    }

    #[test]
    fn terminal_message() {
        let err = GameError::terminal("listing", "purchased");
        assert_eq!(err.to_string(), "listing already purchased");
        assert_eq!(err.category(), ErrorCategory::AlreadyTerminal);
    }
}
