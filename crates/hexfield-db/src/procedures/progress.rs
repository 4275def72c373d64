//! Achievements and quests.
//!
//! Both tracks share one shape: a definition table in the catalog and a
//! per-player progress table keyed by definition id.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use hexfield_engine::GameError;
use hexfield_engine::catalog::ProgressDefinition;
use hexfield_engine::progress::{self, ProgressEvent, ProgressState};
use hexfield_types::{AchievementId, BalanceResult, PlayerId, QuestId};

use super::Game;
use crate::codec::{column, param};
use crate::effects::Effects;
use crate::error::DbError;
use crate::state::{self, Scope};
use crate::views::ProgressView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Track {
    Achievements,
    Quests,
}

impl Track {
    const ALL: [Self; 2] = [Self::Achievements, Self::Quests];

    const fn table(self) -> &'static str {
        match self {
            Self::Achievements => "player_achievements",
            Self::Quests => "player_quests",
        }
    }

    const fn noun(self) -> &'static str {
        match self {
            Self::Achievements => "achievement",
            Self::Quests => "quest",
        }
    }
}

impl Game {
    fn definitions(&self, track: Track) -> Vec<&ProgressDefinition> {
        match track {
            Track::Achievements => self.catalog.achievements.values().collect(),
            Track::Quests => self.catalog.quests.values().collect(),
        }
    }

    fn definition(&self, track: Track, id: i32) -> Option<&ProgressDefinition> {
        match track {
            Track::Achievements => self.catalog.achievements.get(&AchievementId(id)),
            Track::Quests => self.catalog.quests.get(&QuestId(id)),
        }
    }
}

async fn load_states(
    conn: &mut PgConnection,
    track: Track,
    player: PlayerId,
    lock: bool,
) -> Result<BTreeMap<i32, ProgressState>, DbError> {
    let table = track.table();
    let suffix = if lock { " FOR UPDATE" } else { "" };
    let rows: Vec<(i32, i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>)> = sqlx::query_as(&format!(
        "SELECT definition_id, progress, completed_at, claimed_at FROM {table} WHERE player_id = $1{suffix}"
    ))
    .bind(player.into_inner())
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter()
        .map(|(id, progress, completed_at, claimed_at)| {
            Ok((
                id,
                ProgressState {
                    progress: column(progress, table, "progress")?,
                    completed_at,
                    claimed_at,
                },
            ))
        })
        .collect()
}

async fn save_state(
    conn: &mut PgConnection,
    track: Track,
    player: PlayerId,
    definition: i32,
    state: &ProgressState,
) -> Result<(), DbError> {
    let table = track.table();
    sqlx::query(&format!(
        r"INSERT INTO {table} (player_id, definition_id, progress, completed_at, claimed_at)
          VALUES ($1, $2, $3, $4, $5)
          ON CONFLICT (player_id, definition_id) DO UPDATE
          SET progress = EXCLUDED.progress, completed_at = EXCLUDED.completed_at, claimed_at = EXCLUDED.claimed_at"
    ))
    .bind(player.into_inner())
    .bind(definition)
    .bind(param::<_, i64>(state.progress, "progress")?)
    .bind(state.completed_at)
    .bind(state.claimed_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl Game {
    /// Fold events into every offered achievement and quest of `player`.
    pub(crate) async fn record_progress(&self, player: PlayerId, events: &[ProgressEvent]) -> Result<(), DbError> {
        if events.is_empty() {
            return Ok(());
        }
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        state::lock_scope(&mut tx, player, Scope::Progress).await?;
        let level = state::load_ledger(&mut tx, player).await?.level;

        for track in Track::ALL {
            let states = load_states(&mut tx, track, player, true).await?;
            for definition in self.definitions(track) {
                if !progress::offered(definition, level) {
                    continue;
                }
                let before = states.get(&definition.id).copied().unwrap_or_default();
                let mut after = before;
                for event in events {
                    if progress::apply_event(definition, &mut after, event, now) {
                        tracing::info!(
                            player = %player,
                            track = track.noun(),
                            definition = definition.id,
                            "progress completed"
                        );
                    }
                }
                if after != before {
                    save_state(&mut tx, track, player, definition.id, &after).await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn claim_progress(&self, player: PlayerId, track: Track, id: i32) -> Result<BalanceResult, DbError> {
        let now = self.now();
        let definition = self
            .definition(track, id)
            .ok_or_else(|| GameError::not_found(track.noun(), id))?;
        let mut tx = self.pool.begin().await?;
        state::lock_scope(&mut tx, player, Scope::Progress).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let mut progress_state = load_states(&mut tx, track, player, true)
            .await?
            .remove(&id)
            .unwrap_or_default();

        let awarded = progress::claim(&mut state, definition, &mut progress_state, &self.config.progression, now)?;
        save_state(&mut tx, track, player, id, &progress_state).await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        let mut effects = Effects::new();
        effects.level(&awarded);
        self.fan_out(player, effects).await;
        Ok(BalanceResult {
            success: true,
            crystals: state.ledger.crystals,
            gems: state.ledger.gems,
            awarded: Some(awarded),
        })
    }

    async fn list_progress(&self, player: PlayerId, track: Track) -> Result<Vec<ProgressView>, DbError> {
        let mut conn = self.pool.acquire().await?;
        let level: i32 = sqlx::query_scalar("SELECT level FROM players WHERE id = $1")
            .bind(player.into_inner())
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| GameError::not_found("player", player))?;
        let level: u32 = column(level, "players", "level")?;
        let states = load_states(&mut conn, track, player, false).await?;
        Ok(self
            .definitions(track)
            .into_iter()
            .filter(|d| progress::offered(d, level) || states.contains_key(&d.id))
            .map(|d| {
                let state = states.get(&d.id).copied().unwrap_or_default();
                ProgressView {
                    id: d.id,
                    name: d.name.clone(),
                    progress: state.progress,
                    target: d.target,
                    reward: d.reward.to_json(),
                    completed_at: state.completed_at,
                    claimed_at: state.claimed_at,
                }
            })
            .collect())
    }

    /// Achievements offered at the caller's level, with progress.
    pub async fn list_achievements(&self, player: PlayerId) -> Result<Vec<ProgressView>, DbError> {
        self.list_progress(player, Track::Achievements).await
    }

    /// Claim a completed achievement's reward.
    pub async fn claim_achievement(&self, player: PlayerId, id: AchievementId) -> Result<BalanceResult, DbError> {
        self.claim_progress(player, Track::Achievements, id.get()).await
    }

    /// Quests offered at the caller's level, with progress.
    pub async fn list_quests(&self, player: PlayerId) -> Result<Vec<ProgressView>, DbError> {
        self.list_progress(player, Track::Quests).await
    }

    /// Claim a completed quest's reward.
    pub async fn claim_quest(&self, player: PlayerId, id: QuestId) -> Result<BalanceResult, DbError> {
        self.claim_progress(player, Track::Quests, id.get()).await
    }
}
