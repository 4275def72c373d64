//! Seed shop, market sales, player listings and daily rewards.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use hexfield_db::views::{CancelResult, ListingView};
use hexfield_types::{BalanceResult, DailyRewardResult, ListingId, ListingPurchaseResult};
use validator::Validate;

use super::ApiResult;
use crate::error::ApiError;
use crate::extract::{Caller, ValidJson};
use crate::requests::{BrowseQuery, BuySeedsRequest, CreateListingRequest, ItemQuantityRequest};
use crate::state::AppState;

type Shared = State<Arc<AppState>>;

/// `POST /api/market/seeds`
pub async fn buy_seeds(
    State(state): Shared,
    Caller(player): Caller,
    ValidJson(req): ValidJson<BuySeedsRequest>,
) -> ApiResult<BalanceResult> {
    Ok(Json(state.game.buy_seeds(player, req.crop_id, req.quantity).await?))
}

/// `POST /api/market/sell`
pub async fn sell_to_market(
    State(state): Shared,
    Caller(player): Caller,
    ValidJson(req): ValidJson<ItemQuantityRequest>,
) -> ApiResult<BalanceResult> {
    Ok(Json(state.game.sell_to_market(player, req.item, req.quantity).await?))
}

/// `GET /api/market/listings`
///
/// Open to any authenticated caller; the caller is not used as a filter.
pub async fn browse_listings(
    State(state): Shared,
    Caller(_): Caller,
    Query(query): Query<BrowseQuery>,
) -> ApiResult<Vec<ListingView>> {
    query.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let item = query.item()?;
    let limit = query.limit.unwrap_or(BrowseQuery::DEFAULT_LIMIT);
    Ok(Json(state.game.browse_listings(item, limit).await?))
}

/// `POST /api/market/listings`
pub async fn create_listing(
    State(state): Shared,
    Caller(player): Caller,
    ValidJson(req): ValidJson<CreateListingRequest>,
) -> ApiResult<ListingView> {
    Ok(Json(
        state
            .game
            .create_listing(player, req.item, req.quantity, req.price)
            .await?,
    ))
}

/// `POST /api/market/listings/{id}/purchase`
pub async fn purchase_listing(
    State(state): Shared,
    Caller(player): Caller,
    Path(listing): Path<ListingId>,
) -> ApiResult<ListingPurchaseResult> {
    Ok(Json(state.game.purchase_listing(player, listing).await?))
}

/// `DELETE /api/market/listings/{id}`
pub async fn cancel_listing(
    State(state): Shared,
    Caller(player): Caller,
    Path(listing): Path<ListingId>,
) -> ApiResult<CancelResult> {
    Ok(Json(state.game.cancel_listing(player, listing).await?))
}

/// `POST /api/market/listings/{id}/reclaim`
pub async fn reclaim_expired_listing(
    State(state): Shared,
    Caller(player): Caller,
    Path(listing): Path<ListingId>,
) -> ApiResult<CancelResult> {
    Ok(Json(state.game.reclaim_expired_listing(player, listing).await?))
}

/// `POST /api/daily-reward`
pub async fn claim_daily_reward(State(state): Shared, Caller(player): Caller) -> ApiResult<DailyRewardResult> {
    Ok(Json(state.game.claim_daily_reward(player).await?))
}
