//! Town grid placements.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use hexfield_db::views::TownView;
use hexfield_types::{PlacementId, PlacementResult};

use super::ApiResult;
use crate::extract::{Caller, ValidJson};
use crate::requests::{CellRequest, PlaceRequest};
use crate::state::AppState;

/// `GET /api/town`
pub async fn get_town(State(state): State<Arc<AppState>>, Caller(player): Caller) -> ApiResult<TownView> {
    Ok(Json(state.game.get_town(player).await?))
}

/// `POST /api/town/buildings`
pub async fn place_building(
    State(state): State<Arc<AppState>>,
    Caller(player): Caller,
    ValidJson(req): ValidJson<PlaceRequest>,
) -> ApiResult<PlacementResult> {
    Ok(Json(
        state
            .game
            .place_building(player, req.building_type, (req.x, req.y))
            .await?,
    ))
}

/// `POST /api/town/decorations`
pub async fn place_decoration(
    State(state): State<Arc<AppState>>,
    Caller(player): Caller,
    ValidJson(req): ValidJson<PlaceRequest>,
) -> ApiResult<PlacementResult> {
    Ok(Json(
        state
            .game
            .place_decoration(player, req.building_type, (req.x, req.y))
            .await?,
    ))
}

/// `POST /api/town/roads`
pub async fn place_road(
    State(state): State<Arc<AppState>>,
    Caller(player): Caller,
    ValidJson(req): ValidJson<CellRequest>,
) -> ApiResult<PlacementResult> {
    Ok(Json(state.game.place_road(player, (req.x, req.y)).await?))
}

/// `POST /api/town/placements/{id}/move`
pub async fn move_placement(
    State(state): State<Arc<AppState>>,
    Caller(player): Caller,
    Path(placement): Path<PlacementId>,
    ValidJson(req): ValidJson<CellRequest>,
) -> ApiResult<PlacementResult> {
    Ok(Json(state.game.move_placement(player, placement, (req.x, req.y)).await?))
}

/// `POST /api/town/placements/{id}/upgrade`
pub async fn upgrade_building(
    State(state): State<Arc<AppState>>,
    Caller(player): Caller,
    Path(placement): Path<PlacementId>,
) -> ApiResult<PlacementResult> {
    Ok(Json(state.game.upgrade_building(player, placement).await?))
}

/// `DELETE /api/town/placements/{id}` -- no refund.
pub async fn remove_placement(
    State(state): State<Arc<AppState>>,
    Caller(player): Caller,
    Path(placement): Path<PlacementId>,
) -> ApiResult<PlacementResult> {
    Ok(Json(state.game.remove_placement(player, placement).await?))
}
