//! Persistence and transactional procedures for the Hexfield backend.
//!
//! `PostgreSQL` is the only store. Every game operation is a method on
//! [`Game`] that runs in one transaction: lock rows, call the matching
//! rule in `hexfield_engine`, write back, commit.
//!
//! # Lock order
//!
//! ```text
//! site rows (plot, factory, slot, enclosure, animal, order, listing,
//!            task, coven, invitation, regatta)
//!     |
//!     +-- player ledgers, ascending id
//!             (serializes inventory, town grid and per-player counts)
//! ```
//!
//! # Modules
//!
//! - [`postgres`] -- connection pool, configuration and migrations
//! - [`procedures`] -- the [`Game`] handle and every named operation
//! - [`content`] -- the immutable content catalog loaded at startup
//! - [`state`] -- loading player snapshots and saving their changes
//! - [`effects`] -- post-commit progress fan-out
//! - [`views`] -- read models returned to callers
//! - [`clock`] -- injectable time source
//! - [`error`] -- shared error type

pub mod clock;
mod codec;
pub mod content;
pub mod effects;
pub mod error;
pub mod postgres;
pub mod procedures;
pub mod state;
pub mod views;

pub use clock::{Clock, ManualClock, SystemClock};
pub use content::Catalog;
pub use effects::Effects;
pub use error::DbError;
pub use postgres::{PostgresConfig, PostgresPool};
pub use procedures::{Game, RegattaTaskSpec};
