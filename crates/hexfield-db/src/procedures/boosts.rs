//! Speed-up eligibility and yield boosts.

use hexfield_engine::{boosts, speedup};
use hexfield_types::{BoostKind, PlayerId, SpeedUpCategory, SpeedUpEligibility};

use super::{Game, count_speed_ups};
use crate::error::DbError;
use crate::state::{self, Scope};
use crate::views::BoostView;

impl Game {
    /// How many speed-ups of `category` the caller has left. Display only:
    /// the grant itself recounts under a lock.
    pub async fn speedup_eligibility(
        &self,
        player: PlayerId,
        category: SpeedUpCategory,
    ) -> Result<SpeedUpEligibility, DbError> {
        let config = &self.config.speedups;
        let mut conn = self.pool.acquire().await?;
        super::players::ensure_player(&mut conn, player).await?;
        let used = count_speed_ups(&mut conn, player, category, speedup::window_start(self.now(), config)).await?;
        Ok(speedup::eligibility(category, used, config))
    }

    /// Pay gems for a crystal or XP boost, extending one already running.
    pub async fn activate_boost(&self, player: PlayerId, kind: BoostKind) -> Result<BoostView, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        state::lock_scope(&mut tx, player, Scope::Boosts).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let rows = state::load_boost_rows(&mut tx, player).await?;
        let current = rows.iter().find(|b| b.kind == kind);

        let boost = boosts::activate(&mut state.ledger, kind, current, &self.config.boosts, now)?;
        sqlx::query(
            r"INSERT INTO boosts (player_id, kind, multiplier, expires_at) VALUES ($1, $2, $3, $4)
              ON CONFLICT (player_id, kind) DO UPDATE SET multiplier = EXCLUDED.multiplier, expires_at = EXCLUDED.expires_at",
        )
        .bind(player.into_inner())
        .bind(kind.as_str())
        .bind(boost.multiplier)
        .bind(boost.expires_at)
        .execute(&mut *tx)
        .await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        tracing::info!(player = %player, kind = kind.as_str(), expires_at = %boost.expires_at, "boost activated");
        Ok(BoostView {
            kind,
            multiplier: boost.multiplier,
            expires_at: boost.expires_at,
            gems: state.ledger.gems,
        })
    }
}
