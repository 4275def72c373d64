//! Error types for the HTTP API.
//!
//! [`ApiError`] converts every failure into a JSON body of the form
//! `{"error": <message>, "status": <code>, "kind": <category>}` through its
//! [`IntoResponse`] implementation. Rule rejections keep their message so
//! clients can show the concrete numbers; storage faults are logged and
//! reported generically.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hexfield_db::DbError;
use hexfield_engine::ErrorCategory;

/// Errors that can occur in the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The identity header was missing or not a player id.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The request body or query failed to parse or validate.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A procedure failed.
    #[error(transparent)]
    Db(#[from] DbError),
}

impl ApiError {
    /// HTTP status and wire `kind` for this error.
    pub const fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, ErrorCategory::Invalid.as_str()),
            Self::Db(err) => match err.category() {
                Some(category) => (category_status(category), category.as_str()),
                None => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
            },
        }
    }
}

const fn category_status(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::Precondition | ErrorCategory::AlreadyTerminal => StatusCode::CONFLICT,
        ErrorCategory::Invalid => StatusCode::BAD_REQUEST,
        ErrorCategory::Malformed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let message = match &self {
            Self::Unauthenticated(msg) | Self::BadRequest(msg) => msg.clone(),
            Self::Db(DbError::Game(err)) => err.to_string(),
            Self::Db(err) if err.category().is_some() => {
                tracing::error!(error = %err, "corrupt content or row");
                err.to_string()
            }
            Self::Db(err) => {
                tracing::error!(error = %err, "storage failure");
                "internal error".to_owned()
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "kind": kind,
        });

        (status, axum::Json(body)).into_response()
    }
}
