//! Factories: recipe queues with computed capacity.
//!
//! A factory's capacity is its purchased base plus
//! `slots_per_building × matching buildings placed on the town grid`, so two
//! `rune_bakery` buildings add four bakery slots. Capacity is never stored.

use chrono::{DateTime, Utc};

use hexfield_types::{Awarded, BuildingCategory, BuildingTypeId, FactoryId, RecipeId};

use crate::boosts::BoostSet;
use crate::catalog::{BuildingType, ItemValues, Recipe};
use crate::config::{GameConfig, ProductionConfig};
use crate::error::GameError;
use crate::scheduler::{self, StartRequest, TaskTimes};
use crate::state::PlayerState;

/// A player-owned factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Factory {
    /// Identifier.
    pub id: FactoryId,
    /// Building type whose recipes it runs.
    pub building_type: BuildingTypeId,
    /// Purchased slots.
    pub base_capacity: u16,
    /// Upgrade level (1-based).
    pub level: u32,
}

/// One in-flight production.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductionSlot {
    /// Owning factory.
    pub factory_id: FactoryId,
    /// Slot index within the factory.
    pub slot_index: u16,
    /// Recipe being produced.
    pub recipe_id: RecipeId,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Completion time.
    pub completes_at: DateTime<Utc>,
}

/// Capacity of a factory given the number of matching placed buildings.
pub fn capacity(factory: &Factory, matching_buildings: u32, config: &ProductionConfig) -> u32 {
    u32::from(factory.base_capacity)
        .saturating_add(u32::from(config.slots_per_building).saturating_mul(matching_buildings))
}

/// Build a new factory of a placed factory building type.
pub fn create(
    player: &mut PlayerState,
    building_type: &BuildingType,
    placed_of_type: u32,
    owned_factories: u32,
    config: &ProductionConfig,
) -> Result<Factory, GameError> {
    if building_type.category != BuildingCategory::Factory {
        return Err(GameError::Invalid(format!("{} is not a factory", building_type.name)));
    }
    if placed_of_type == 0 {
        return Err(GameError::MissingPrerequisite {
            building: building_type.name.clone(),
        });
    }
    if owned_factories >= config.factory_limit {
        return Err(GameError::LimitReached {
            what: "factory".into(),
            used: owned_factories,
            limit: config.factory_limit,
        });
    }
    player.ledger.debit_crystals(config.factory_price)?;
    Ok(Factory {
        id: FactoryId::new(),
        building_type: building_type.id,
        base_capacity: config.factory_base_capacity,
        level: 1,
    })
}

/// Buy one more base slot. Returns the new base capacity.
pub fn purchase_slot(
    player: &mut PlayerState,
    factory: &mut Factory,
    config: &ProductionConfig,
) -> Result<u16, GameError> {
    if factory.base_capacity >= config.max_base_capacity {
        return Err(GameError::LimitReached {
            what: "purchased factory slot".into(),
            used: u32::from(factory.base_capacity),
            limit: u32::from(config.max_base_capacity),
        });
    }
    player.ledger.debit_crystals(config.slot_price)?;
    factory.base_capacity = factory.base_capacity.saturating_add(1);
    Ok(factory.base_capacity)
}

/// Raise the site level. Returns the new level.
pub fn upgrade(
    player: &mut PlayerState,
    factory: &mut Factory,
    config: &ProductionConfig,
) -> Result<u32, GameError> {
    let cost = config
        .upgrade_cost(factory.level)
        .ok_or_else(|| GameError::terminal(format!("factory at level {}", factory.level), "at maximum level"))?;
    player.ledger.debit_crystals(cost)?;
    factory.level = factory.level.saturating_add(1);
    Ok(factory.level)
}

/// Start `recipe` in the lowest free slot.
pub fn start(
    player: &mut PlayerState,
    factory: &Factory,
    slots: &[ProductionSlot],
    matching_buildings: u32,
    recipe: Option<&Recipe>,
    config: &GameConfig,
    now: DateTime<Utc>,
) -> Result<ProductionSlot, GameError> {
    let capacity = capacity(factory, matching_buildings, &config.production);
    let in_flight = u32::try_from(slots.len()).unwrap_or(u32::MAX);
    scheduler::ensure_capacity("factory", in_flight, capacity)?;
    let recipe = recipe.ok_or_else(|| GameError::Invalid("unknown recipe".into()))?;
    if recipe.factory_type != factory.building_type {
        return Err(GameError::Invalid(format!(
            "recipe {} cannot be produced in this factory",
            recipe.name
        )));
    }
    if player.level() < recipe.unlock_level {
        return Err(GameError::LevelTooLow {
            required: recipe.unlock_level,
            current: player.level(),
        });
    }
    let occupied: Vec<u16> = slots.iter().map(|s| s.slot_index).collect();
    let slot_index = scheduler::free_slot_index(&occupied, capacity).ok_or(GameError::CapacityFull {
        site: "factory",
        in_flight,
        capacity,
    })?;
    let TaskTimes {
        started_at,
        completes_at,
    } = scheduler::start_task(
        player,
        &StartRequest {
            site: "factory",
            in_flight,
            capacity,
            inputs: &recipe.inputs,
            duration_seconds: recipe.duration_seconds,
            site_multiplier: Some(config.production.site_multiplier(factory.level)),
        },
        &config.progression,
        now,
    )?;
    tracing::info!(
        player = %player.player_id(),
        factory = %factory.id,
        slot = slot_index,
        recipe = %recipe.id,
        completes_at = %completes_at,
        "production started"
    );
    Ok(ProductionSlot {
        factory_id: factory.id,
        slot_index,
        recipe_id: recipe.id,
        started_at,
        completes_at,
    })
}

/// Collect a finished production slot.
pub fn collect(
    player: &mut PlayerState,
    slot: &ProductionSlot,
    recipe: &Recipe,
    values: &ItemValues,
    boosts: &BoostSet,
    config: &GameConfig,
    now: DateTime<Utc>,
) -> Result<Awarded, GameError> {
    let xp = values.xp_for_items(&recipe.outputs.items);
    let awarded = scheduler::collect_task(
        player,
        slot.completes_at,
        &recipe.outputs,
        xp,
        boosts,
        &config.progression,
        now,
    )?;
    tracing::info!(
        player = %player.player_id(),
        factory = %slot.factory_id,
        slot = slot.slot_index,
        recipe = %recipe.id,
        "production collected"
    );
    Ok(awarded)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeDelta;
    use hexfield_ledger::{Inventory, PlayerLedger};
    use hexfield_types::{Bundle, ItemKind, PlayerId};

    use super::*;

    const BAKERY: BuildingTypeId = BuildingTypeId(3);

    fn bakery() -> Factory {
        Factory {
            id: FactoryId::new(),
            building_type: BAKERY,
            base_capacity: 2,
            level: 1,
        }
    }

    fn bread() -> Recipe {
        Recipe {
            id: RecipeId(1),
            name: "Moon bread".into(),
            factory_type: BAKERY,
            inputs: BTreeMap::from([(ItemKind::Crop(1), 3)]),
            outputs: Bundle {
                crystals: 5,
                items: BTreeMap::from([(ItemKind::Craftable(200), 1)]),
                ..Bundle::default()
            },
            duration_seconds: Some(180),
            unlock_level: 1,
        }
    }

    fn player(crystals: u64, wheat: u64) -> PlayerState {
        let id = PlayerId::new();
        PlayerState::new(
            PlayerLedger::new(id, crystals, 0),
            Inventory::from_lines(id, [(ItemKind::Crop(1), wheat)]),
        )
    }

    fn slot(factory: &Factory, index: u16) -> ProductionSlot {
        let now = Utc::now();
        ProductionSlot {
            factory_id: factory.id,
            slot_index: index,
            recipe_id: RecipeId(1),
            started_at: now,
            completes_at: now,
        }
    }

    #[test]
    fn two_bakeries_add_four_slots() {
        let config = ProductionConfig::default();
        assert_eq!(capacity(&bakery(), 0, &config), 2);
        assert_eq!(capacity(&bakery(), 2, &config), 6);
    }

    #[test]
    fn start_fills_lowest_free_slot() {
        let config = GameConfig::default();
        let factory = bakery();
        let mut p = player(0, 3);
        let started = start(&mut p, &factory, &[slot(&factory, 0)], 0, Some(&bread()), &config, Utc::now());
        assert_eq!(started.map(|s| s.slot_index).ok(), Some(1));
        assert_eq!(p.inventory.quantity(ItemKind::Crop(1)), 0);
    }

    #[test]
    fn full_factory_rejects_before_recipe_lookup() {
        let config = GameConfig::default();
        let factory = bakery();
        let mut p = player(0, 3);
        let slots = [slot(&factory, 0), slot(&factory, 1)];
        let result = start(&mut p, &factory, &slots, 0, None, &config, Utc::now());
        assert!(matches!(result, Err(GameError::CapacityFull { in_flight: 2, capacity: 2, .. })));
    }

    #[test]
    fn placed_buildings_unlock_more_slots() {
        let config = GameConfig::default();
        let factory = bakery();
        let mut p = player(0, 3);
        let slots = [slot(&factory, 0), slot(&factory, 1)];
        let started = start(&mut p, &factory, &slots, 1, Some(&bread()), &config, Utc::now());
        assert_eq!(started.map(|s| s.slot_index).ok(), Some(2));
    }

    #[test]
    fn wrong_factory_type_is_invalid() {
        let config = GameConfig::default();
        let factory = Factory {
            building_type: BuildingTypeId(99),
            ..bakery()
        };
        let mut p = player(0, 3);
        let result = start(&mut p, &factory, &[], 0, Some(&bread()), &config, Utc::now());
        assert!(matches!(result, Err(GameError::Invalid(_))));
    }

    #[test]
    fn collect_credits_outputs_once_ready() {
        let config = GameConfig::default();
        let factory = bakery();
        let mut p = player(0, 3);
        let now = Utc::now();
        let started = start(&mut p, &factory, &[], 0, Some(&bread()), &config, now);
        let running = started.unwrap();
        let values = ItemValues::new(BTreeMap::new(), 2);
        let early = collect(&mut p, &running, &bread(), &values, &BoostSet::none(), &config, now);
        assert!(matches!(early, Err(GameError::NotReady { .. })));
        let later = now + TimeDelta::seconds(180);
        let awarded = collect(&mut p, &running, &bread(), &values, &BoostSet::none(), &config, later);
        assert!(awarded.is_ok());
        assert_eq!(p.ledger.crystals, 5);
        assert_eq!(p.inventory.quantity(ItemKind::Craftable(200)), 1);
        assert_eq!(p.ledger.experience, 2);
    }

    #[test]
    fn slot_purchase_is_bounded() {
        let config = ProductionConfig {
            max_base_capacity: 3,
            ..ProductionConfig::default()
        };
        let mut factory = bakery();
        let mut p = player(10_000, 0);
        assert_eq!(purchase_slot(&mut p, &mut factory, &config).ok(), Some(3));
        assert!(matches!(
            purchase_slot(&mut p, &mut factory, &config),
            Err(GameError::LimitReached { .. })
        ));
        assert_eq!(p.ledger.crystals, 10_000 - config.slot_price);
    }

    #[test]
    fn upgrade_stops_at_table_end() {
        let config = ProductionConfig::default();
        let mut factory = bakery();
        let mut p = player(100_000, 0);
        for expected in 2..=4 {
            assert_eq!(upgrade(&mut p, &mut factory, &config).ok(), Some(expected));
        }
        assert!(matches!(
            upgrade(&mut p, &mut factory, &config),
            Err(GameError::AlreadyTerminal { .. })
        ));
    }
}
