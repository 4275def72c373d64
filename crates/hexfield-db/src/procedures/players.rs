//! Signup, profile and inventory.

use std::collections::BTreeMap;

use sqlx::PgConnection;
use uuid::Uuid;

use hexfield_engine::GameError;
use hexfield_engine::player;
use hexfield_ledger::Inventory;
use hexfield_types::{CovenId, PlayerId};

use super::Game;
use crate::codec::{column, param};
use crate::error::DbError;
use crate::state;
use crate::views::{InventoryLine, Profile};

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    display_name: String,
    crystals: i64,
    gems: i64,
    experience: i64,
    level: i32,
    daily_streak: i32,
    coven_id: Option<Uuid>,
}

impl Game {
    /// Create the caller's account. Calling it again for an existing player
    /// changes nothing and returns the current profile.
    pub async fn create_player(&self, player: PlayerId, display_name: &str) -> Result<Profile, DbError> {
        let new = player::onboard(player, display_name, &self.config.economy, &self.config.production)?;
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r"INSERT INTO players (id, display_name, crystals, gems, experience, level)
              VALUES ($1, $2, $3, $4, $5, $6)
              ON CONFLICT (id) DO NOTHING",
        )
        .bind(player.into_inner())
        .bind(&new.display_name)
        .bind(param::<_, i64>(new.ledger.crystals, "crystals")?)
        .bind(param::<_, i64>(new.ledger.gems, "gems")?)
        .bind(param::<_, i64>(new.ledger.experience, "experience")?)
        .bind(param::<_, i32>(new.ledger.level, "level")?)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted > 0 {
            for plot in &new.plots {
                sqlx::query("INSERT INTO farm_plots (player_id, plot_index) VALUES ($1, $2)")
                    .bind(player.into_inner())
                    .bind(i32::from(*plot))
                    .execute(&mut *tx)
                    .await?;
            }
            let mut inventory = Inventory::new(player);
            inventory.credit_all(&new.items)?;
            let starter = hexfield_engine::PlayerState::new(new.ledger, inventory);
            state::save_player(&mut tx, &starter).await?;
            tracing::info!(player = %player, plots = new.plots.len(), "player created");
        } else {
            tracing::debug!(player = %player, "player already exists");
        }
        tx.commit().await?;

        self.get_profile(player).await
    }

    /// The caller's ledger with town and coven figures.
    pub async fn get_profile(&self, player: PlayerId) -> Result<Profile, DbError> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, ProfileRow>(
            r"SELECT p.display_name, p.crystals, p.gems, p.experience, p.level, p.daily_streak, m.coven_id
              FROM players p
              LEFT JOIN coven_members m ON m.player_id = p.id
              WHERE p.id = $1",
        )
        .bind(player.into_inner())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| GameError::not_found("player", player))?;

        let grid = super::town::load_grid(&mut conn, player, &self.config.town).await?;
        Ok(Profile {
            player_id: player,
            display_name: row.display_name,
            crystals: column(row.crystals, "players", "crystals")?,
            gems: column(row.gems, "players", "gems")?,
            experience: column(row.experience, "players", "experience")?,
            level: column(row.level, "players", "level")?,
            population: grid.population(&self.catalog.building_types),
            factory_limit: self.config.production.factory_limit,
            daily_streak: column(row.daily_streak, "players", "daily_streak")?,
            coven_id: row.coven_id.map(CovenId),
        })
    }

    /// Every inventory line the caller holds.
    pub async fn get_inventory(&self, player: PlayerId) -> Result<Vec<InventoryLine>, DbError> {
        let mut conn = self.pool.acquire().await?;
        ensure_player(&mut conn, player).await?;
        let lines: BTreeMap<_, _> = load_lines(&mut conn, player).await?;
        Ok(lines
            .into_iter()
            .map(|(item, quantity)| InventoryLine { item, quantity })
            .collect())
    }
}

async fn load_lines(
    conn: &mut PgConnection,
    player: PlayerId,
) -> Result<BTreeMap<hexfield_types::ItemKind, u64>, DbError> {
    let rows: Vec<(String, i32, i32, i64)> = sqlx::query_as(
        r"SELECT item_category, item_base, item_level, quantity
          FROM inventory WHERE player_id = $1 AND quantity > 0",
    )
    .bind(player.into_inner())
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter()
        .map(|(category, base, level, quantity)| {
            Ok((
                crate::codec::item_from_columns("inventory", &category, base, level)?,
                column(quantity, "inventory", "quantity")?,
            ))
        })
        .collect()
}

/// Fail with `NotFound` unless the player exists.
pub(super) async fn ensure_player(conn: &mut PgConnection, player: PlayerId) -> Result<(), DbError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM players WHERE id = $1)")
        .bind(player.into_inner())
        .fetch_one(&mut *conn)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(GameError::not_found("player", player).into())
    }
}
