//! Time-boxed regatta competitions.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgConnection;
use uuid::Uuid;

use hexfield_engine::GameError;
use hexfield_engine::boosts::BoostSet;
use hexfield_engine::catalog::RegattaTask;
use hexfield_engine::regatta::{self, Participant, Regatta};
use hexfield_types::bundle::{item_list_to_json, parse_item_list};
use hexfield_types::{ItemKind, ItemStack, PlayerId, RegattaId, RegattaTaskId, SettlementResult};

use super::{Game, unique_as};
use crate::codec::{column, param};
use crate::effects::Effects;
use crate::error::DbError;
use crate::state;
use crate::views::{RegattaTaskView, RegattaView, StandingView, SubmissionResult};

/// A task offered by a newly scheduled regatta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegattaTaskSpec {
    /// Id, unique within the regatta.
    pub id: RegattaTaskId,
    /// Items to deliver.
    pub requirements: BTreeMap<ItemKind, u32>,
    /// Points banked on submission.
    pub points: u64,
}

#[derive(Debug, sqlx::FromRow)]
struct RegattaRow {
    id: Uuid,
    name: String,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
}

impl From<RegattaRow> for Regatta {
    fn from(row: RegattaRow) -> Self {
        Self {
            id: RegattaId(row.id),
            name: row.name,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            settled_at: row.settled_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ParticipantRow {
    player_id: Uuid,
    points: i64,
    joined_at: DateTime<Utc>,
}

impl ParticipantRow {
    fn into_participant(self) -> Result<Participant, DbError> {
        Ok(Participant {
            player: PlayerId(self.player_id),
            points: column(self.points, "regatta_participants", "points")?,
            joined_at: self.joined_at,
        })
    }
}

/// Read a regatta, taking the row lock named by `lock` (`FOR SHARE` for
/// entrants, `FOR UPDATE` for settlement).
async fn fetch_regatta(conn: &mut PgConnection, id: RegattaId, lock: &str) -> Result<Regatta, DbError> {
    Ok(sqlx::query_as::<_, RegattaRow>(&format!(
        "SELECT id, name, starts_at, ends_at, settled_at FROM regattas WHERE id = $1 {lock}"
    ))
    .bind(id.into_inner())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| GameError::not_found("regatta", id))?
    .into())
}

async fn load_tasks(conn: &mut PgConnection, id: RegattaId) -> Result<Vec<RegattaTask>, DbError> {
    let rows: Vec<(i32, Value, i64)> =
        sqlx::query_as("SELECT id, requirements, points FROM regatta_tasks WHERE regatta_id = $1 ORDER BY id")
            .bind(id.into_inner())
            .fetch_all(&mut *conn)
            .await?;
    rows.into_iter()
        .map(|(task, requirements, points)| {
            Ok(RegattaTask {
                id: RegattaTaskId(task),
                requirements: parse_item_list(&requirements).map_err(|e| DbError::corrupt("regatta_tasks", e.0))?,
                points: column(points, "regatta_tasks", "points")?,
            })
        })
        .collect()
}

async fn load_participants(conn: &mut PgConnection, id: RegattaId) -> Result<Vec<Participant>, DbError> {
    sqlx::query_as::<_, ParticipantRow>(
        "SELECT player_id, points, joined_at FROM regatta_participants WHERE regatta_id = $1",
    )
    .bind(id.into_inner())
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(ParticipantRow::into_participant)
    .collect()
}

fn regatta_view(regatta: Regatta, tasks: Vec<RegattaTask>) -> RegattaView {
    RegattaView {
        id: regatta.id,
        name: regatta.name,
        starts_at: regatta.starts_at,
        ends_at: regatta.ends_at,
        settled_at: regatta.settled_at,
        tasks: tasks
            .into_iter()
            .map(|t| RegattaTaskView {
                id: t.id,
                requirements: ItemStack::from_map(&t.requirements),
                points: t.points,
            })
            .collect(),
    }
}

impl Game {
    /// Create a regatta with its task list. Operator action.
    pub async fn schedule_regatta(
        &self,
        name: &str,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        tasks: &[RegattaTaskSpec],
    ) -> Result<RegattaView, DbError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GameError::Invalid("regatta name must not be empty".into()).into());
        }
        if ends_at <= starts_at {
            return Err(GameError::Invalid("a regatta must end after it starts".into()).into());
        }
        let ids: BTreeSet<RegattaTaskId> = tasks.iter().map(|t| t.id).collect();
        if tasks.is_empty() || ids.len() != tasks.len() {
            return Err(GameError::Invalid("regatta tasks need distinct ids".into()).into());
        }

        let regatta = Regatta {
            id: RegattaId::new(),
            name: name.to_owned(),
            starts_at,
            ends_at,
            settled_at: None,
        };
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO regattas (id, name, starts_at, ends_at) VALUES ($1, $2, $3, $4)")
            .bind(regatta.id.into_inner())
            .bind(&regatta.name)
            .bind(starts_at)
            .bind(ends_at)
            .execute(&mut *tx)
            .await?;
        for task in tasks {
            sqlx::query("INSERT INTO regatta_tasks (regatta_id, id, requirements, points) VALUES ($1, $2, $3, $4)")
                .bind(regatta.id.into_inner())
                .bind(task.id.get())
                .bind(item_list_to_json(&task.requirements))
                .bind(param::<_, i64>(task.points, "regatta points")?)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(regatta = %regatta.id, name = %regatta.name, %starts_at, %ends_at, "regatta scheduled");
        let tasks = tasks
            .iter()
            .map(|t| RegattaTask {
                id: t.id,
                requirements: t.requirements.clone(),
                points: t.points,
            })
            .collect();
        Ok(regatta_view(regatta, tasks))
    }

    /// A regatta and its tasks.
    pub async fn get_regatta(&self, id: RegattaId) -> Result<RegattaView, DbError> {
        let mut conn = self.pool.acquire().await?;
        let regatta = fetch_regatta(&mut conn, id, "").await?;
        let tasks = load_tasks(&mut conn, id).await?;
        Ok(regatta_view(regatta, tasks))
    }

    /// Enter a running regatta.
    pub async fn join_regatta(&self, player: PlayerId, id: RegattaId) -> Result<SubmissionResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let regatta = fetch_regatta(&mut tx, id, "FOR SHARE").await?;
        super::players::ensure_player(&mut tx, player).await?;
        let joined: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM regatta_participants WHERE regatta_id = $1 AND player_id = $2)",
        )
        .bind(id.into_inner())
        .bind(player.into_inner())
        .fetch_one(&mut *tx)
        .await?;

        let participant = regatta::join(&regatta, player, joined, now)?;
        sqlx::query("INSERT INTO regatta_participants (regatta_id, player_id, points, joined_at) VALUES ($1, $2, 0, $3)")
            .bind(id.into_inner())
            .bind(player.into_inner())
            .bind(participant.joined_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| unique_as(e, "already registered for this regatta"))?;
        tx.commit().await?;

        tracing::info!(player = %player, regatta = %id, "joined regatta");
        Ok(SubmissionResult {
            success: true,
            points: participant.points,
        })
    }

    /// Deliver one task's requirements and bank its points. Each task
    /// counts once per participant.
    pub async fn submit_regatta_task(
        &self,
        player: PlayerId,
        id: RegattaId,
        task_id: RegattaTaskId,
    ) -> Result<SubmissionResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let regatta = fetch_regatta(&mut tx, id, "FOR SHARE").await?;
        let mut participant = sqlx::query_as::<_, ParticipantRow>(
            r"SELECT player_id, points, joined_at FROM regatta_participants
              WHERE regatta_id = $1 AND player_id = $2 FOR UPDATE",
        )
        .bind(id.into_inner())
        .bind(player.into_inner())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| GameError::Precondition(format!("not registered for {}", regatta.name)))?
        .into_participant()?;
        let task = load_tasks(&mut tx, id)
            .await?
            .into_iter()
            .find(|t| t.id == task_id)
            .ok_or_else(|| GameError::not_found("regatta task", task_id))?;
        let submitted: bool = sqlx::query_scalar(
            r"SELECT EXISTS (SELECT 1 FROM regatta_submissions
                             WHERE regatta_id = $1 AND player_id = $2 AND task_id = $3)",
        )
        .bind(id.into_inner())
        .bind(player.into_inner())
        .bind(task_id.get())
        .fetch_one(&mut *tx)
        .await?;
        let mut state = state::load_player(&mut tx, player).await?;

        let points = regatta::submit(&mut state, &regatta, &mut participant, &task, submitted, now)?;
        sqlx::query(
            "INSERT INTO regatta_submissions (regatta_id, player_id, task_id, submitted_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(id.into_inner())
        .bind(player.into_inner())
        .bind(task_id.get())
        .bind(now)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE regatta_participants SET points = $3 WHERE regatta_id = $1 AND player_id = $2")
            .bind(id.into_inner())
            .bind(player.into_inner())
            .bind(param::<_, i64>(points, "regatta points")?)
            .execute(&mut *tx)
            .await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;
        Ok(SubmissionResult { success: true, points })
    }

    /// Rank a closed regatta and pay out its tiers. Later calls are
    /// successful no-ops.
    pub async fn settle_regatta(&self, id: RegattaId) -> Result<SettlementResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let mut regatta = fetch_regatta(&mut tx, id, "FOR UPDATE").await?;
        let participants = load_participants(&mut tx, id).await?;

        let settlement = regatta::settle(&mut regatta, &participants, &self.config.regatta, now)?;
        if !settlement.result.settled_now {
            return Ok(settlement.result);
        }
        sqlx::query("UPDATE regattas SET settled_at = $2 WHERE id = $1")
            .bind(id.into_inner())
            .bind(regatta.settled_at)
            .execute(&mut *tx)
            .await?;

        let mut states = state::load_players(&mut tx, settlement.awards.iter().map(|a| a.player)).await?;
        let mut levelled = Vec::new();
        for award in &settlement.awards {
            let state = states
                .get_mut(&award.player)
                .ok_or_else(|| GameError::not_found("player", award.player))?;
            let awarded = state.credit_bundle(&award.reward, 0, &BoostSet::none(), &self.config.progression)?;
            sqlx::query("INSERT INTO regatta_rewards (regatta_id, player_id, tier, reward) VALUES ($1, $2, $3, $4)")
                .bind(id.into_inner())
                .bind(award.player.into_inner())
                .bind(award.tier.as_str())
                .bind(award.reward.to_json())
                .execute(&mut *tx)
                .await?;
            levelled.push((award.player, awarded));
        }
        state::save_players(&mut tx, &states).await?;
        tx.commit().await?;

        for (player, awarded) in levelled {
            let mut effects = Effects::new();
            effects.level(&awarded);
            self.fan_out(player, effects).await;
        }
        Ok(settlement.result)
    }

    /// Current ranking. Participants without points are not ranked.
    pub async fn regatta_standings(&self, id: RegattaId) -> Result<Vec<StandingView>, DbError> {
        let mut conn = self.pool.acquire().await?;
        fetch_regatta(&mut conn, id, "").await?;
        let participants = load_participants(&mut conn, id).await?;
        Ok(regatta::rank(&participants)
            .into_iter()
            .map(|s| StandingView {
                player_id: s.player,
                points: s.points,
                rank: s.rank,
            })
            .collect())
    }
}
