//! Achievements, quests and regattas.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use hexfield_db::views::{ProgressView, RegattaView, StandingView, SubmissionResult};
use hexfield_types::{AchievementId, BalanceResult, QuestId, RegattaId, RegattaTaskId, SettlementResult};

use super::ApiResult;
use crate::extract::Caller;
use crate::state::AppState;

type Shared = State<Arc<AppState>>;

/// `GET /api/achievements`
pub async fn list_achievements(State(state): Shared, Caller(player): Caller) -> ApiResult<Vec<ProgressView>> {
    Ok(Json(state.game.list_achievements(player).await?))
}

/// `POST /api/achievements/{id}/claim`
pub async fn claim_achievement(
    State(state): Shared,
    Caller(player): Caller,
    Path(id): Path<AchievementId>,
) -> ApiResult<BalanceResult> {
    Ok(Json(state.game.claim_achievement(player, id).await?))
}

/// `GET /api/quests`
pub async fn list_quests(State(state): Shared, Caller(player): Caller) -> ApiResult<Vec<ProgressView>> {
    Ok(Json(state.game.list_quests(player).await?))
}

/// `POST /api/quests/{id}/claim`
pub async fn claim_quest(
    State(state): Shared,
    Caller(player): Caller,
    Path(id): Path<QuestId>,
) -> ApiResult<BalanceResult> {
    Ok(Json(state.game.claim_quest(player, id).await?))
}

// ---------------------------------------------------------------------------
// Regattas
// ---------------------------------------------------------------------------

/// `GET /api/regattas/{id}`
pub async fn get_regatta(
    State(state): Shared,
    Caller(_): Caller,
    Path(id): Path<RegattaId>,
) -> ApiResult<RegattaView> {
    Ok(Json(state.game.get_regatta(id).await?))
}

/// `POST /api/regattas/{id}/join`
pub async fn join_regatta(
    State(state): Shared,
    Caller(player): Caller,
    Path(id): Path<RegattaId>,
) -> ApiResult<SubmissionResult> {
    Ok(Json(state.game.join_regatta(player, id).await?))
}

/// `POST /api/regattas/{id}/tasks/{task}/submit`
pub async fn submit_regatta_task(
    State(state): Shared,
    Caller(player): Caller,
    Path((id, task)): Path<(RegattaId, RegattaTaskId)>,
) -> ApiResult<SubmissionResult> {
    Ok(Json(state.game.submit_regatta_task(player, id, task).await?))
}

/// `POST /api/regattas/{id}/settle` -- idempotent; anyone may trigger it
/// once the regatta has ended.
pub async fn settle_regatta(
    State(state): Shared,
    Caller(_): Caller,
    Path(id): Path<RegattaId>,
) -> ApiResult<SettlementResult> {
    Ok(Json(state.game.settle_regatta(id).await?))
}

/// `GET /api/regattas/{id}/standings`
pub async fn regatta_standings(
    State(state): Shared,
    Caller(_): Caller,
    Path(id): Path<RegattaId>,
) -> ApiResult<Vec<StandingView>> {
    Ok(Json(state.game.regatta_standings(id).await?))
}
