//! Transactional procedures, one per named game operation.
//!
//! Each procedure opens a transaction, locks the rows it touches in the
//! order documented in [`crate::state`], loads them into engine values,
//! calls one rule function with the clock's `now`, writes the result back
//! and commits. A rule rejection rolls the transaction back and surfaces as
//! [`DbError::Game`].
//!
//! Progress side effects (achievements, quests, coven `produce`
//! objectives) run after commit through [`Game::fan_out`] and never fail
//! the operation that caused them.

mod boosts;
mod coven;
mod factory;
mod farm;
mod market;
mod players;
mod progress;
mod regatta;
mod rewards;
mod skyport;
mod social;
mod town;
mod zoo;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use hexfield_engine::{GameConfig, speedup};
use hexfield_types::{PlayerId, SpeedUpCategory, SpeedUpResult};

use crate::clock::{Clock, SystemClock};
use crate::content::Catalog;
use crate::error::DbError;

pub use regatta::RegattaTaskSpec;

/// Handle to the game: pool, balance configuration, content and clock.
///
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct Game {
    pool: PgPool,
    config: Arc<GameConfig>,
    catalog: Arc<Catalog>,
    clock: Arc<dyn Clock>,
}

impl Game {
    /// Load the content catalog and build a handle on the system clock.
    pub async fn load(pool: PgPool, config: GameConfig) -> Result<Self, DbError> {
        let catalog = Catalog::load(&pool, config.production.default_xp_per_unit).await?;
        Ok(Self::new(pool, config, catalog))
    }

    /// Build a handle from already-loaded parts.
    pub fn new(pool: PgPool, config: GameConfig, catalog: Catalog) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The connection pool.
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Balance configuration.
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Loaded content.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The current instant according to the clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Grant one rate-limited speed-up inside an open transaction.
    ///
    /// The window is recounted under a transaction-scoped advisory lock on
    /// (player, category), so concurrent grants serialize and the log can
    /// never exceed the limit. The caller has already locked the task row.
    async fn grant_speed_up(
        &self,
        conn: &mut PgConnection,
        player: PlayerId,
        category: SpeedUpCategory,
        completes_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SpeedUpResult, DbError> {
        let config = &self.config.speedups;
        let shortened = speedup::apply(completes_at, now, config)?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1), hashtext($2))")
            .bind(player.to_string())
            .bind(category.as_str())
            .execute(&mut *conn)
            .await?;
        let used = count_speed_ups(conn, player, category, speedup::window_start(now, config)).await?;
        let remaining = speedup::authorize(category, used, config)?;

        sqlx::query("INSERT INTO speedup_log (player_id, category, created_at) VALUES ($1, $2, $3)")
            .bind(player.into_inner())
            .bind(category.as_str())
            .bind(now)
            .execute(&mut *conn)
            .await?;

        tracing::info!(
            player = %player,
            category = category.as_str(),
            completes_at = %shortened,
            remaining,
            "speed-up granted"
        );
        Ok(SpeedUpResult {
            success: true,
            completes_at: shortened,
            remaining: Some(remaining),
        })
    }
}

impl core::fmt::Debug for Game {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Game")
            .field("pool_size", &self.pool.size())
            .field("now", &self.clock.now())
            .finish_non_exhaustive()
    }
}

/// Speed-ups logged for `category` since `since`.
async fn count_speed_ups(
    conn: &mut PgConnection,
    player: PlayerId,
    category: SpeedUpCategory,
    since: DateTime<Utc>,
) -> Result<u32, DbError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM speedup_log WHERE player_id = $1 AND category = $2 AND created_at > $3",
    )
    .bind(player.into_inner())
    .bind(category.as_str())
    .bind(since)
    .fetch_one(&mut *conn)
    .await?;
    crate::codec::column(count, "speedup_log", "count")
}

/// Map a unique-constraint violation to a rule rejection.
fn unique_as(err: sqlx::Error, message: &str) -> DbError {
    let err = DbError::from(err);
    if err.is_unique_violation() {
        hexfield_engine::GameError::Precondition(message.to_owned()).into()
    } else {
        err
    }
}
