//! Friends and help actions.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use hexfield_db::views::{CancelResult, FriendView};
use hexfield_types::{FactoryId, OrderId, PlayerId, SpeedUpResult};

use super::ApiResult;
use crate::extract::Caller;
use crate::state::AppState;

type Shared = State<Arc<AppState>>;

/// `GET /api/friends`
pub async fn list_friends(State(state): Shared, Caller(player): Caller) -> ApiResult<Vec<FriendView>> {
    Ok(Json(state.game.list_friends(player).await?))
}

/// `POST /api/friends/{player}/request`
pub async fn send_friend_request(
    State(state): Shared,
    Caller(player): Caller,
    Path(target): Path<PlayerId>,
) -> ApiResult<FriendView> {
    Ok(Json(state.game.send_friend_request(player, target).await?))
}

/// `POST /api/friends/{player}/accept`
pub async fn accept_friend_request(
    State(state): Shared,
    Caller(player): Caller,
    Path(requester): Path<PlayerId>,
) -> ApiResult<FriendView> {
    Ok(Json(state.game.accept_friend_request(player, requester).await?))
}

/// `POST /api/friends/{player}/decline`
pub async fn decline_friend_request(
    State(state): Shared,
    Caller(player): Caller,
    Path(requester): Path<PlayerId>,
) -> ApiResult<CancelResult> {
    Ok(Json(state.game.decline_friend_request(player, requester).await?))
}

/// `DELETE /api/friends/{player}`
pub async fn remove_friend(
    State(state): Shared,
    Caller(player): Caller,
    Path(friend): Path<PlayerId>,
) -> ApiResult<CancelResult> {
    Ok(Json(state.game.remove_friend(player, friend).await?))
}

/// `POST /api/friends/{player}/help/plots/{plot}`
pub async fn help_friend_crop(
    State(state): Shared,
    Caller(helper): Caller,
    Path((friend, plot)): Path<(PlayerId, u16)>,
) -> ApiResult<SpeedUpResult> {
    Ok(Json(state.game.help_friend_crop(helper, friend, plot).await?))
}

/// `POST /api/friends/{player}/help/factories/{factory}/slots/{slot}`
pub async fn help_friend_production(
    State(state): Shared,
    Caller(helper): Caller,
    Path((friend, factory, slot)): Path<(PlayerId, FactoryId, u16)>,
) -> ApiResult<SpeedUpResult> {
    Ok(Json(
        state
            .game
            .help_friend_production(helper, friend, factory, slot)
            .await?,
    ))
}

/// `POST /api/friends/{player}/help/orders/{order}` -- the helper supplies
/// the items.
pub async fn help_fulfill_order(
    State(state): Shared,
    Caller(helper): Caller,
    Path((friend, order)): Path<(PlayerId, OrderId)>,
) -> ApiResult<SpeedUpResult> {
    Ok(Json(state.game.help_fulfill_order(helper, friend, order).await?))
}
