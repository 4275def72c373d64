//! Daily login rewards.

use chrono::NaiveDate;

use hexfield_engine::rewards::{self, DailyStreak};
use hexfield_types::{DailyRewardResult, PlayerId};

use super::Game;
use crate::codec::{column, param};
use crate::effects::Effects;
use crate::error::DbError;
use crate::state;

impl Game {
    /// Claim today's reward. A second claim on the same UTC day fails.
    pub async fn claim_daily_reward(&self, player: PlayerId) -> Result<DailyRewardResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let (streak, last_claim): (i32, Option<NaiveDate>) =
            sqlx::query_as("SELECT daily_streak, last_daily_claim FROM players WHERE id = $1 FOR UPDATE")
                .bind(player.into_inner())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| hexfield_engine::GameError::not_found("player", player))?;
        let mut state = state::load_player(&mut tx, player).await?;
        let mut streak = DailyStreak {
            last_claim,
            streak: column(streak, "players", "daily_streak")?,
        };

        let result = rewards::claim(
            &mut state,
            &mut streak,
            &self.config.daily_rewards,
            &self.config.progression,
            now,
        )?;
        sqlx::query("UPDATE players SET daily_streak = $2, last_daily_claim = $3 WHERE id = $1")
            .bind(player.into_inner())
            .bind(param::<_, i32>(streak.streak, "daily streak")?)
            .bind(streak.last_claim)
            .execute(&mut *tx)
            .await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        tracing::info!(player = %player, streak = result.streak, "daily reward claimed");
        let mut effects = Effects::new();
        effects.level(&result.awarded);
        self.fan_out(player, effects).await;
        Ok(result)
    }
}
