//! Coven membership, invitations, pool and tasks.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use hexfield_db::views::{CancelResult, CovenTaskView, CovenView, InvitationView, LeaveResult};
use hexfield_types::{BalanceResult, Bundle, ContributionResult, CovenId, CovenTaskId, InvitationId, PlayerId};
use serde::Serialize;

use super::ApiResult;
use crate::error::ApiError;
use crate::extract::{Caller, ValidJson};
use crate::requests::{
    CreateCovenRequest, CreateTaskRequest, DonateCrystalsRequest, ItemQuantityRequest, RespondRequest,
    TargetPlayerRequest,
};
use crate::state::AppState;

type Shared = State<Arc<AppState>>;

/// Body of `GET /api/covens/{id}/members/{player}`.
#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    /// Whether the player belongs to the coven.
    pub member: bool,
}

/// `GET /api/coven` -- the caller's coven.
pub async fn get_coven(State(state): Shared, Caller(player): Caller) -> ApiResult<CovenView> {
    Ok(Json(state.game.get_coven(player).await?))
}

/// `POST /api/covens`
pub async fn create_coven(
    State(state): Shared,
    Caller(player): Caller,
    ValidJson(req): ValidJson<CreateCovenRequest>,
) -> ApiResult<CovenView> {
    Ok(Json(state.game.create_coven(player, &req.name, req.public).await?))
}

/// `POST /api/covens/{id}/join` -- public covens only.
pub async fn join_coven(
    State(state): Shared,
    Caller(player): Caller,
    Path(coven): Path<CovenId>,
) -> ApiResult<CovenView> {
    Ok(Json(state.game.join_coven(player, coven).await?))
}

/// `GET /api/covens/{id}/members/{player}`
pub async fn is_coven_member(
    State(state): Shared,
    Caller(_): Caller,
    Path((coven, player)): Path<(CovenId, PlayerId)>,
) -> ApiResult<MembershipResponse> {
    let member = state.game.is_coven_member(coven, player).await?;
    Ok(Json(MembershipResponse { member }))
}

/// `POST /api/coven/leave`
pub async fn leave_coven(State(state): Shared, Caller(player): Caller) -> ApiResult<LeaveResult> {
    Ok(Json(state.game.leave_coven(player).await?))
}

/// `DELETE /api/coven/members/{player}`
pub async fn kick_member(
    State(state): Shared,
    Caller(leader): Caller,
    Path(target): Path<PlayerId>,
) -> ApiResult<CancelResult> {
    Ok(Json(state.game.kick_member(leader, target).await?))
}

/// `POST /api/coven/leader`
pub async fn transfer_leadership(
    State(state): Shared,
    Caller(leader): Caller,
    ValidJson(req): ValidJson<TargetPlayerRequest>,
) -> ApiResult<CovenView> {
    Ok(Json(state.game.transfer_leadership(leader, req.player).await?))
}

// ---------------------------------------------------------------------------
// Invitations
// ---------------------------------------------------------------------------

/// `POST /api/coven/invitations`
pub async fn invite_to_coven(
    State(state): Shared,
    Caller(player): Caller,
    ValidJson(req): ValidJson<TargetPlayerRequest>,
) -> ApiResult<InvitationView> {
    Ok(Json(state.game.invite_to_coven(player, req.player).await?))
}

/// `GET /api/invitations` -- pending invitations addressed to the caller.
pub async fn list_invitations(State(state): Shared, Caller(player): Caller) -> ApiResult<Vec<InvitationView>> {
    Ok(Json(state.game.list_invitations(player).await?))
}

/// `POST /api/invitations/{id}/respond`
pub async fn respond_to_invitation(
    State(state): Shared,
    Caller(player): Caller,
    Path(invitation): Path<InvitationId>,
    ValidJson(req): ValidJson<RespondRequest>,
) -> ApiResult<InvitationView> {
    Ok(Json(
        state
            .game
            .respond_to_invitation(player, invitation, req.accept)
            .await?,
    ))
}

/// `DELETE /api/invitations/{id}`
pub async fn cancel_invitation(
    State(state): Shared,
    Caller(player): Caller,
    Path(invitation): Path<InvitationId>,
) -> ApiResult<InvitationView> {
    Ok(Json(state.game.cancel_invitation(player, invitation).await?))
}

// ---------------------------------------------------------------------------
// Pool and tasks
// ---------------------------------------------------------------------------

/// `POST /api/coven/donations/crystals`
pub async fn donate_crystals(
    State(state): Shared,
    Caller(player): Caller,
    ValidJson(req): ValidJson<DonateCrystalsRequest>,
) -> ApiResult<BalanceResult> {
    Ok(Json(state.game.donate_crystals(player, req.amount).await?))
}

/// `POST /api/coven/donations/items`
pub async fn donate_items(
    State(state): Shared,
    Caller(player): Caller,
    ValidJson(req): ValidJson<ItemQuantityRequest>,
) -> ApiResult<BalanceResult> {
    Ok(Json(state.game.donate_items(player, req.item, req.quantity).await?))
}

/// `GET /api/coven/tasks`
pub async fn list_coven_tasks(State(state): Shared, Caller(player): Caller) -> ApiResult<Vec<CovenTaskView>> {
    Ok(Json(state.game.list_coven_tasks(player).await?))
}

/// `POST /api/coven/tasks` -- leader only.
pub async fn create_coven_task(
    State(state): Shared,
    Caller(leader): Caller,
    ValidJson(req): ValidJson<CreateTaskRequest>,
) -> ApiResult<CovenTaskView> {
    let reward = Bundle::from_json(&req.reward).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(Json(
        state
            .game
            .create_coven_task(leader, &req.title, &req.objectives, reward, req.reward_points)
            .await?,
    ))
}

/// `POST /api/coven/tasks/{id}/contribute`
pub async fn contribute_to_task(
    State(state): Shared,
    Caller(player): Caller,
    Path(task): Path<CovenTaskId>,
    ValidJson(req): ValidJson<ItemQuantityRequest>,
) -> ApiResult<ContributionResult> {
    Ok(Json(
        state
            .game
            .contribute_to_task(player, task, req.item, req.quantity)
            .await?,
    ))
}
