//! Town grid placements.
//!
//! Placements are not row-locked individually. Every mutation locks the
//! owner's ledger first, which serializes all writers to one grid.

use sqlx::PgConnection;
use uuid::Uuid;

use hexfield_engine::config::TownConfig;
use hexfield_engine::progress::ProgressEvent;
use hexfield_engine::town::{self, Footprint, Placed, Placement, TownGrid};
use hexfield_types::{
    BuildingTypeId, ConditionType, PlacementId, PlacementKind, PlacementResult, PlayerId,
};

use super::Game;
use crate::codec::{column, param};
use crate::effects::Effects;
use crate::error::DbError;
use crate::state::{self, Scope};
use crate::views::{PlacementView, TownView};

#[derive(Debug, sqlx::FromRow)]
struct PlacementRow {
    id: Uuid,
    kind: String,
    building_type: Option<i32>,
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    level: i32,
}

impl PlacementRow {
    fn into_placement(self) -> Result<Placement, DbError> {
        let kind = PlacementKind::parse(&self.kind)
            .ok_or_else(|| DbError::corrupt("town_placements", format!("unknown kind {}", self.kind)))?;
        Ok(Placement {
            id: PlacementId(self.id),
            kind,
            building_type: self.building_type.map(BuildingTypeId),
            footprint: Footprint::new(
                self.x,
                self.y,
                column(self.width, "town_placements", "width")?,
                column(self.height, "town_placements", "height")?,
            ),
            level: column(self.level, "town_placements", "level")?,
        })
    }
}

/// Load `player`'s whole grid.
pub(super) async fn load_grid(
    conn: &mut PgConnection,
    player: PlayerId,
    config: &TownConfig,
) -> Result<TownGrid, DbError> {
    let placements = sqlx::query_as::<_, PlacementRow>(
        r"SELECT id, kind, building_type, x, y, width, height, level
          FROM town_placements WHERE player_id = $1 ORDER BY created_at, id",
    )
    .bind(player.into_inner())
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(PlacementRow::into_placement)
    .collect::<Result<Vec<_>, _>>()?;
    Ok(TownGrid::new(placements, config))
}

async fn save_placement(conn: &mut PgConnection, player: PlayerId, placement: &Placement) -> Result<(), DbError> {
    sqlx::query(
        r"INSERT INTO town_placements (id, player_id, kind, building_type, x, y, width, height, level)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
          ON CONFLICT (id) DO UPDATE SET x = EXCLUDED.x, y = EXCLUDED.y, level = EXCLUDED.level",
    )
    .bind(placement.id.into_inner())
    .bind(player.into_inner())
    .bind(placement.kind.as_str())
    .bind(placement.building_type.map(BuildingTypeId::get))
    .bind(placement.footprint.x)
    .bind(placement.footprint.y)
    .bind(i32::from(placement.footprint.width))
    .bind(i32::from(placement.footprint.height))
    .bind(param::<_, i32>(placement.level, "placement level")?)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

const fn placement_result(placed: &Placed) -> PlacementResult {
    PlacementResult {
        success: true,
        placement_id: placed.placement.id,
        cost: placed.cost,
        population: placed.population,
    }
}

impl Game {
    /// Place a building on the caller's grid.
    pub async fn place_building(
        &self,
        player: PlayerId,
        building_type: BuildingTypeId,
        at: (i32, i32),
    ) -> Result<PlacementResult, DbError> {
        let mut tx = self.pool.begin().await?;
        state::lock_scope(&mut tx, player, Scope::Town).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let mut grid = load_grid(&mut tx, player, &self.config.town).await?;

        let types = &self.catalog.building_types;
        let placed = town::place_building(
            &mut state,
            &mut grid,
            types.get(&building_type),
            at,
            types,
            &self.config.progression,
        )?;
        save_placement(&mut tx, player, &placed.placement).await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        let mut effects = Effects::new();
        effects.event(ProgressEvent::plain(ConditionType::Build, 1));
        self.fan_out(player, effects).await;
        Ok(placement_result(&placed))
    }

    /// Place a decoration.
    pub async fn place_decoration(
        &self,
        player: PlayerId,
        decoration: BuildingTypeId,
        at: (i32, i32),
    ) -> Result<PlacementResult, DbError> {
        let mut tx = self.pool.begin().await?;
        state::lock_scope(&mut tx, player, Scope::Town).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let mut grid = load_grid(&mut tx, player, &self.config.town).await?;

        let placed = town::place_decoration(
            &mut state,
            &mut grid,
            self.catalog.building_types.get(&decoration),
            at,
            &self.config.progression,
        )?;
        save_placement(&mut tx, player, &placed.placement).await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;
        Ok(placement_result(&placed))
    }

    /// Lay a single road tile.
    pub async fn place_road(&self, player: PlayerId, at: (i32, i32)) -> Result<PlacementResult, DbError> {
        let mut tx = self.pool.begin().await?;
        state::lock_scope(&mut tx, player, Scope::Town).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let mut grid = load_grid(&mut tx, player, &self.config.town).await?;

        let placed = town::place_road(&mut state, &mut grid, at, &self.config.town)?;
        save_placement(&mut tx, player, &placed.placement).await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;
        Ok(placement_result(&placed))
    }

    /// Move any placement. Moving is free, so the ledger is not touched.
    pub async fn move_placement(
        &self,
        player: PlayerId,
        placement: PlacementId,
        to: (i32, i32),
    ) -> Result<PlacementResult, DbError> {
        let mut tx = self.pool.begin().await?;
        state::lock_scope(&mut tx, player, Scope::Town).await?;
        let mut grid = load_grid(&mut tx, player, &self.config.town).await?;

        let placed = town::move_placement(&mut grid, placement, to)?;
        save_placement(&mut tx, player, &placed.placement).await?;
        tx.commit().await?;
        Ok(placement_result(&placed))
    }

    /// Raise a building's level.
    pub async fn upgrade_building(&self, player: PlayerId, placement: PlacementId) -> Result<PlacementResult, DbError> {
        let mut tx = self.pool.begin().await?;
        state::lock_scope(&mut tx, player, Scope::Town).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let mut grid = load_grid(&mut tx, player, &self.config.town).await?;

        let placed = town::upgrade_building(
            &mut state,
            &mut grid,
            placement,
            &self.catalog.building_types,
            &self.config.progression,
        )?;
        save_placement(&mut tx, player, &placed.placement).await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;
        Ok(placement_result(&placed))
    }

    /// Remove a placement without refund.
    pub async fn remove_placement(&self, player: PlayerId, placement: PlacementId) -> Result<PlacementResult, DbError> {
        let mut tx = self.pool.begin().await?;
        state::lock_scope(&mut tx, player, Scope::Town).await?;
        let mut grid = load_grid(&mut tx, player, &self.config.town).await?;

        let placed = town::remove_placement(&mut grid, placement, &self.catalog.building_types)?;
        sqlx::query("DELETE FROM town_placements WHERE id = $1 AND player_id = $2")
            .bind(placement.into_inner())
            .bind(player.into_inner())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(player = %player, placement = %placement, "placement removed");
        Ok(placement_result(&placed))
    }

    /// The caller's grid with its population.
    pub async fn get_town(&self, player: PlayerId) -> Result<TownView, DbError> {
        let mut conn = self.pool.acquire().await?;
        super::players::ensure_player(&mut conn, player).await?;
        let grid = load_grid(&mut conn, player, &self.config.town).await?;
        Ok(TownView {
            width: self.config.town.grid_width,
            height: self.config.town.grid_height,
            population: grid.population(&self.catalog.building_types),
            placements: grid
                .placements()
                .iter()
                .map(|p| PlacementView {
                    id: p.id,
                    kind: p.kind,
                    building_type: p.building_type,
                    x: p.footprint.x,
                    y: p.footprint.y,
                    width: p.footprint.width,
                    height: p.footprint.height,
                    level: p.level,
                })
                .collect(),
        })
    }
}
