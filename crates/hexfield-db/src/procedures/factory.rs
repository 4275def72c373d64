//! Factories and their production slots.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use hexfield_engine::GameError;
use hexfield_engine::factory::{self, Factory, ProductionSlot};
use hexfield_engine::scheduler;
use hexfield_types::{
    BuildingTypeId, CollectResult, ConditionType, FactoryId, PlayerId, RecipeId, SpeedUpCategory,
    SpeedUpResult, StartResult,
};

use super::Game;
use crate::codec::{column, param};
use crate::effects::Effects;
use crate::error::DbError;
use crate::state::{self, Scope};
use crate::views::{FactoryView, SlotView};

#[derive(Debug, sqlx::FromRow)]
struct FactoryRow {
    id: Uuid,
    building_type: i32,
    base_capacity: i32,
    level: i32,
}

impl FactoryRow {
    fn into_factory(self) -> Result<Factory, DbError> {
        Ok(Factory {
            id: FactoryId(self.id),
            building_type: BuildingTypeId(self.building_type),
            base_capacity: column(self.base_capacity, "factories", "base_capacity")?,
            level: column(self.level, "factories", "level")?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SlotRow {
    factory_id: Uuid,
    slot_index: i32,
    recipe_id: i32,
    started_at: DateTime<Utc>,
    completes_at: DateTime<Utc>,
}

impl SlotRow {
    fn into_slot(self) -> Result<ProductionSlot, DbError> {
        Ok(ProductionSlot {
            factory_id: FactoryId(self.factory_id),
            slot_index: column(self.slot_index, "production_slots", "slot_index")?,
            recipe_id: RecipeId(self.recipe_id),
            started_at: self.started_at,
            completes_at: self.completes_at,
        })
    }
}

const SLOT_COLUMNS: &str = "factory_id, slot_index, recipe_id, started_at, completes_at";

/// Lock one of `player`'s factories. A foreign factory is not found.
pub(super) async fn lock_factory(conn: &mut PgConnection, player: PlayerId, id: FactoryId) -> Result<Factory, DbError> {
    sqlx::query_as::<_, FactoryRow>(
        "SELECT id, building_type, base_capacity, level FROM factories WHERE id = $1 AND player_id = $2 FOR UPDATE",
    )
    .bind(id.into_inner())
    .bind(player.into_inner())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| GameError::not_found("factory", id))?
    .into_factory()
}

/// Lock one slot of a factory the caller already holds.
pub(super) async fn lock_slot(
    conn: &mut PgConnection,
    factory: FactoryId,
    slot_index: u16,
) -> Result<Option<ProductionSlot>, DbError> {
    sqlx::query_as::<_, SlotRow>(&format!(
        "SELECT {SLOT_COLUMNS} FROM production_slots WHERE factory_id = $1 AND slot_index = $2 FOR UPDATE"
    ))
    .bind(factory.into_inner())
    .bind(i32::from(slot_index))
    .fetch_optional(&mut *conn)
    .await?
    .map(SlotRow::into_slot)
    .transpose()
}

async fn load_slots(conn: &mut PgConnection, factory: FactoryId) -> Result<Vec<ProductionSlot>, DbError> {
    sqlx::query_as::<_, SlotRow>(&format!(
        "SELECT {SLOT_COLUMNS} FROM production_slots WHERE factory_id = $1 ORDER BY slot_index"
    ))
    .bind(factory.into_inner())
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(SlotRow::into_slot)
    .collect()
}

/// Buildings of `building_type` on the player's town grid.
async fn placed_of_type(conn: &mut PgConnection, player: PlayerId, building_type: BuildingTypeId) -> Result<u32, DbError> {
    let count: i64 =
        sqlx::query_scalar("SELECT count(*) FROM town_placements WHERE player_id = $1 AND building_type = $2")
            .bind(player.into_inner())
            .bind(building_type.get())
            .fetch_one(&mut *conn)
            .await?;
    column(count, "town_placements", "count")
}

/// Move a slot's completion time.
pub(super) async fn save_slot_completion(conn: &mut PgConnection, slot: &ProductionSlot) -> Result<(), DbError> {
    sqlx::query("UPDATE production_slots SET completes_at = $3 WHERE factory_id = $1 AND slot_index = $2")
        .bind(slot.factory_id.into_inner())
        .bind(i32::from(slot.slot_index))
        .bind(slot.completes_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn save_factory(conn: &mut PgConnection, factory: &Factory) -> Result<(), DbError> {
    sqlx::query("UPDATE factories SET base_capacity = $2, level = $3 WHERE id = $1")
        .bind(factory.id.into_inner())
        .bind(i32::from(factory.base_capacity))
        .bind(param::<_, i32>(factory.level, "factory level")?)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

impl Game {
    /// Build a factory for a factory building the caller has placed.
    pub async fn create_factory(&self, player: PlayerId, factory_type: BuildingTypeId) -> Result<FactoryView, DbError> {
        let mut tx = self.pool.begin().await?;
        state::lock_scope(&mut tx, player, Scope::Town).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let building_type = self
            .catalog
            .building_types
            .get(&factory_type)
            .ok_or_else(|| GameError::not_found("building type", factory_type))?;
        let placed = placed_of_type(&mut tx, player, factory_type).await?;
        let owned = state::count_for(&mut tx, "SELECT count(*) FROM factories WHERE player_id = $1", player).await?;

        let built = factory::create(&mut state, building_type, placed, owned, &self.config.production)?;
        sqlx::query(
            "INSERT INTO factories (id, player_id, building_type, base_capacity, level) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(built.id.into_inner())
        .bind(player.into_inner())
        .bind(built.building_type.get())
        .bind(i32::from(built.base_capacity))
        .bind(param::<_, i32>(built.level, "factory level")?)
        .execute(&mut *tx)
        .await?;
        state::save_player(&mut tx, &state).await?;
        let view = self.factory_view(&mut tx, &built, placed).await?;
        tx.commit().await?;

        tracing::info!(player = %player, factory = %built.id, building_type = %factory_type, "factory created");
        Ok(view)
    }

    /// Buy one more base slot.
    pub async fn purchase_factory_slot(&self, player: PlayerId, factory_id: FactoryId) -> Result<FactoryView, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut site = lock_factory(&mut tx, player, factory_id).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let capacity = factory::purchase_slot(&mut state, &mut site, &self.config.production)?;
        save_factory(&mut tx, &site).await?;
        state::save_player(&mut tx, &state).await?;
        let placed = placed_of_type(&mut tx, player, site.building_type).await?;
        let view = self.factory_view(&mut tx, &site, placed).await?;
        tx.commit().await?;

        tracing::info!(player = %player, factory = %factory_id, base_capacity = capacity, "factory slot purchased");
        Ok(view)
    }

    /// Raise the factory's site level.
    pub async fn upgrade_factory(&self, player: PlayerId, factory_id: FactoryId) -> Result<FactoryView, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut site = lock_factory(&mut tx, player, factory_id).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let level = factory::upgrade(&mut state, &mut site, &self.config.production)?;
        save_factory(&mut tx, &site).await?;
        state::save_player(&mut tx, &state).await?;
        let placed = placed_of_type(&mut tx, player, site.building_type).await?;
        let view = self.factory_view(&mut tx, &site, placed).await?;
        tx.commit().await?;

        tracing::info!(player = %player, factory = %factory_id, level, "factory upgraded");
        Ok(view)
    }

    /// Start `recipe_id` in the factory's lowest free slot.
    pub async fn start_production(
        &self,
        player: PlayerId,
        factory_id: FactoryId,
        recipe_id: RecipeId,
    ) -> Result<StartResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let site = lock_factory(&mut tx, player, factory_id).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let slots = load_slots(&mut tx, factory_id).await?;
        let placed = placed_of_type(&mut tx, player, site.building_type).await?;

        let recipe = self.catalog.recipes.get(&recipe_id);
        let slot = factory::start(&mut state, &site, &slots, placed, recipe, &self.config, now)?;
        sqlx::query(&format!(
            "INSERT INTO production_slots ({SLOT_COLUMNS}) VALUES ($1, $2, $3, $4, $5)"
        ))
        .bind(slot.factory_id.into_inner())
        .bind(i32::from(slot.slot_index))
        .bind(slot.recipe_id.get())
        .bind(slot.started_at)
        .bind(slot.completes_at)
        .execute(&mut *tx)
        .await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        let times = scheduler::TaskTimes {
            started_at: slot.started_at,
            completes_at: slot.completes_at,
        };
        let consumed = recipe.map(|r| r.inputs.clone()).unwrap_or_default();
        Ok(scheduler::start_result(times, Some(slot.slot_index), &consumed))
    }

    /// Collect a finished slot. A missing slot is a successful no-op.
    pub async fn collect_production(
        &self,
        player: PlayerId,
        factory_id: FactoryId,
        slot_index: u16,
    ) -> Result<CollectResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        lock_factory(&mut tx, player, factory_id).await?;
        let Some(slot) = lock_slot(&mut tx, factory_id, slot_index).await? else {
            tracing::debug!(player = %player, factory = %factory_id, slot = slot_index, "nothing to collect");
            return Ok(CollectResult::nothing_to_collect());
        };
        let recipe = self
            .catalog
            .recipes
            .get(&slot.recipe_id)
            .ok_or_else(|| DbError::corrupt("production_slots", format!("unknown recipe {}", slot.recipe_id)))?;

        let mut state = state::load_player(&mut tx, player).await?;
        let boosts = state::load_boosts(&mut tx, player, now).await?;
        let awarded = factory::collect(
            &mut state,
            &slot,
            recipe,
            &self.catalog.item_values,
            &boosts,
            &self.config,
            now,
        )?;
        sqlx::query("DELETE FROM production_slots WHERE factory_id = $1 AND slot_index = $2")
            .bind(factory_id.into_inner())
            .bind(i32::from(slot_index))
            .execute(&mut *tx)
            .await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        let mut effects = Effects::new();
        effects.awarded(ConditionType::Craft, &awarded).produced(&awarded);
        self.fan_out(player, effects).await;
        Ok(CollectResult::collected(awarded))
    }

    /// Shorten a running slot. Rate-limited under the `factory` category.
    pub async fn speed_up_production(
        &self,
        player: PlayerId,
        factory_id: FactoryId,
        slot_index: u16,
    ) -> Result<SpeedUpResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        lock_factory(&mut tx, player, factory_id).await?;
        let mut slot = lock_slot(&mut tx, factory_id, slot_index)
            .await?
            .ok_or_else(|| GameError::not_found("production slot", slot_index))?;

        let result = self
            .grant_speed_up(&mut tx, player, SpeedUpCategory::Factory, slot.completes_at, now)
            .await?;
        slot.completes_at = result.completes_at;
        save_slot_completion(&mut tx, &slot).await?;
        tx.commit().await?;
        Ok(result)
    }

    /// The caller's factories with their computed capacity.
    pub async fn list_factories(&self, player: PlayerId) -> Result<Vec<FactoryView>, DbError> {
        let mut conn = self.pool.acquire().await?;
        let factories = sqlx::query_as::<_, FactoryRow>(
            "SELECT id, building_type, base_capacity, level FROM factories WHERE player_id = $1 ORDER BY created_at",
        )
        .bind(player.into_inner())
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(FactoryRow::into_factory)
        .collect::<Result<Vec<_>, _>>()?;

        let mut views = Vec::with_capacity(factories.len());
        for site in &factories {
            let placed = placed_of_type(&mut conn, player, site.building_type).await?;
            views.push(self.factory_view(&mut conn, site, placed).await?);
        }
        Ok(views)
    }

    async fn factory_view(&self, conn: &mut PgConnection, site: &Factory, placed: u32) -> Result<FactoryView, DbError> {
        let slots = load_slots(conn, site.id).await?;
        Ok(FactoryView {
            id: site.id,
            building_type: site.building_type,
            level: site.level,
            base_capacity: site.base_capacity,
            capacity: factory::capacity(site, placed, &self.config.production),
            slots: slots
                .into_iter()
                .map(|s| SlotView {
                    slot_index: s.slot_index,
                    recipe_id: s.recipe_id,
                    started_at: s.started_at,
                    completes_at: s.completes_at,
                })
                .collect(),
        })
    }
}
