//! HTTP API for the Hexfield game backend.
//!
//! An Axum router exposing one route per game operation. Handlers are thin:
//! they resolve the [`Caller`] from the gateway identity header, call the
//! matching [`hexfield_db::Game`] procedure and serialize the result.
//! Failures become JSON bodies through [`ApiError`].
//!
//! ```text
//! gateway --(x-player-id)--> Caller extractor --> handler --> Game procedure
//!                                                     |
//!                                      ApiError <-----+ (rule or storage failure)
//! ```

pub mod error;
pub mod extract;
pub mod handlers;
pub mod requests;
pub mod router;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use extract::{Caller, ValidJson};
pub use router::build_router;
pub use server::{ServerError, serve, start_server};
pub use state::AppState;
