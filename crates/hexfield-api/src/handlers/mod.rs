//! Endpoint handlers, one per game operation.
//!
//! Every handler resolves the [`Caller`](crate::extract::Caller), calls the
//! matching [`Game`](hexfield_db::Game) procedure and returns its result as
//! JSON. Handlers hold no game logic.

pub mod coven;
pub mod economy;
pub mod players;
pub mod production;
pub mod progress;
pub mod social;
pub mod town;

use axum::Json;

use crate::error::ApiError;

/// Result type returned by every handler.
pub type ApiResult<T> = Result<Json<T>, ApiError>;
