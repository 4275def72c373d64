//! Request extractors: caller identity and validated JSON bodies.

use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use hexfield_types::PlayerId;
use serde::de::DeserializeOwned;
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated player making the request.
///
/// Resolved from the trusted gateway header. The acting player is never
/// taken from a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub PlayerId);

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = &state.identity_header;
        let value = parts
            .headers
            .get(header)
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {header} header")))?;
        let text = value
            .to_str()
            .map_err(|e| ApiError::Unauthenticated(format!("unreadable {header} header: {e}")))?;
        let id = Uuid::parse_str(text.trim())
            .map_err(|e| ApiError::Unauthenticated(format!("{header} is not a player id: {e}")))?;
        Ok(Self(PlayerId::from(id)))
    }
}

/// A JSON body that has been deserialized and then validated.
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        value
            .validate()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        Ok(Self(value))
    }
}
