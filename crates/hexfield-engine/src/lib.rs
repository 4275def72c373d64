//! Game rules for Hexfield.
//!
//! Everything in this crate is synchronous and free of I/O. The persistence
//! layer locks the rows an operation touches, loads them into the value
//! types defined here, calls one rule function with an injected `now`, and
//! writes the mutated values back in the same transaction. A rule either
//! returns `Ok` with every mutation applied or an `Err` with the state it
//! was given left as it found it, as far as the caller can observe: callers
//! discard the state on error and roll back.
//!
//! # Modules
//!
//! - [`scheduler`] -- The shared start/collect/shorten pattern for timed
//!   tasks, instantiated by [`farm`], [`factory`], [`zoo`] and [`skyport`].
//! - [`speedup`] -- Rolling-window rate limits for speed-ups.
//! - [`boosts`] -- Timed crystal/XP multipliers bought with gems.
//! - [`town`] -- The town grid: placement, prerequisites, population.
//! - [`market`] -- Player listings with escrow, the seed shop, NPC sales.
//! - [`rewards`] -- Daily login streak.
//! - [`friends`] -- Friend graph and help actions.
//! - [`coven`] -- Guild membership, invitations, pool and collective tasks.
//! - [`progress`] -- Achievement and quest counters.
//! - [`regatta`] -- Time-boxed competitive events and tiered settlement.
//! - [`player`] -- Signup defaults.
//! - [`catalog`] -- Content definitions loaded from the database.
//! - [`config`] -- [`GameConfig`], loaded from YAML.
//! - [`state`] -- [`PlayerState`], the per-operation mutable view.
//! - [`error`] -- [`GameError`] and its coarse [`ErrorCategory`].

pub mod boosts;
pub mod catalog;
pub mod config;
pub mod coven;
pub mod error;
pub mod factory;
pub mod farm;
pub mod friends;
pub mod market;
pub mod player;
pub mod progress;
pub mod regatta;
pub mod rewards;
pub mod scheduler;
pub mod skyport;
pub mod speedup;
pub mod state;
pub mod town;
pub mod zoo;

pub use boosts::BoostSet;
pub use config::{ConfigError, GameConfig};
pub use error::{ErrorCategory, GameError};
pub use state::PlayerState;
