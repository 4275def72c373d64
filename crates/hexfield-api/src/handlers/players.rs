//! Signup and the caller's own ledger.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use hexfield_db::views::{InventoryLine, Profile};

use super::ApiResult;
use crate::extract::{Caller, ValidJson};
use crate::requests::CreatePlayerRequest;
use crate::state::AppState;

/// `POST /api/players` -- idempotent signup for the caller.
pub async fn create_player(
    State(state): State<Arc<AppState>>,
    Caller(player): Caller,
    ValidJson(req): ValidJson<CreatePlayerRequest>,
) -> ApiResult<Profile> {
    Ok(Json(state.game.create_player(player, &req.display_name).await?))
}

/// `GET /api/me`
pub async fn get_profile(State(state): State<Arc<AppState>>, Caller(player): Caller) -> ApiResult<Profile> {
    Ok(Json(state.game.get_profile(player).await?))
}

/// `GET /api/me/inventory`
pub async fn get_inventory(
    State(state): State<Arc<AppState>>,
    Caller(player): Caller,
) -> ApiResult<Vec<InventoryLine>> {
    Ok(Json(state.game.get_inventory(player).await?))
}
