//! Player ledger, inventory store and progression rules.
//!
//! Every currency and item movement in Hexfield goes through the value types
//! in this crate. They never allow a balance or quantity to go negative:
//! debits are checked against the current amount and fail with the exact
//! numbers involved, credits are overflow-checked.
//!
//! # Modules
//!
//! - [`ledger`] -- [`PlayerLedger`]: crystals, gems, experience, level.
//! - [`inventory`] -- [`Inventory`]: a view over locked inventory lines that
//!   records net changes for the persistence layer to apply.
//! - [`progression`] -- XP grants, the level-up loop, level-derived
//!   multipliers, discounts and gates.
//!
//! # Usage
//!
//! ```
//! use hexfield_ledger::{Inventory, PlayerLedger, ProgressionRules, progression};
//! use hexfield_types::{ItemKind, PlayerId};
//!
//! let player = PlayerId::new();
//! let mut ledger = PlayerLedger::new(player, 100, 0);
//! let rules = ProgressionRules::default();
//!
//! // A grant crossing two thresholds (1000 at level 1, 2000 at level 2).
//! let gained = progression::grant_xp(&mut ledger, 3500, &rules).ok();
//! assert_eq!(gained, Some(2));
//! assert_eq!(ledger.level, 3);
//! assert_eq!(ledger.experience, 500);
//!
//! let mut inventory = Inventory::new(player);
//! inventory.credit(ItemKind::Seed(1), 3).ok();
//! assert_eq!(inventory.quantity(ItemKind::Seed(1)), 3);
//! ```

pub mod inventory;
pub mod ledger;
pub mod progression;

pub use inventory::Inventory;
pub use ledger::PlayerLedger;
pub use progression::ProgressionRules;

use hexfield_types::ItemKind;

/// Errors raised by ledger and inventory operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Not enough crystals for a debit.
    #[error("not enough crystals: required {required}, available {available}")]
    InsufficientCrystals {
        /// Crystals needed.
        required: u64,
        /// Crystals held.
        available: u64,
    },

    /// Not enough gems for a debit.
    #[error("not enough gems: required {required}, available {available}")]
    InsufficientGems {
        /// Gems needed.
        required: u64,
        /// Gems held.
        available: u64,
    },

    /// Not enough of an item for a debit.
    #[error("not enough {item}: required {required}, available {available}")]
    InsufficientItem {
        /// The item short.
        item: ItemKind,
        /// Units needed.
        required: u64,
        /// Units held.
        available: u64,
    },

    /// A checked arithmetic operation overflowed.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// What was being computed.
        context: String,
    },

    /// A progression rule is unusable (e.g. zero XP per level).
    #[error("invalid progression rule: {0}")]
    InvalidRule(&'static str),
}

impl LedgerError {
    /// Shorthand for [`LedgerError::ArithmeticOverflow`].
    pub fn overflow(context: impl Into<String>) -> Self {
        Self::ArithmeticOverflow {
            context: context.into(),
        }
    }
}
