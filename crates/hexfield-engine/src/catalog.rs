//! Content definitions: crops, recipes, building types, animal species,
//! order templates, achievement/quest definitions, regatta tasks and the
//! per-item value table.
//!
//! Content is data, loaded from the content tables by the persistence layer.
//! Durations are kept as the raw nullable column value so the scheduler can
//! reject a missing or non-positive duration as malformed content instead of
//! producing a nonsense completion time.

use std::collections::BTreeMap;

use hexfield_types::{
    BuildingCategory, BuildingTypeId, Bundle, ConditionType, CropId, ItemKind,
    OrderTemplateId, RecipeId, RegattaTaskId, SpeciesId,
};

use crate::error::GameError;

/// Convert a catalog key into the base id of an [`ItemKind`].
pub fn item_base(what: &'static str, id: i32) -> Result<u16, GameError> {
    u16::try_from(id).map_err(|e| GameError::malformed(what, format!("id {id} is not a valid item base: {e}")))
}

// ---------------------------------------------------------------------------
// Farm
// ---------------------------------------------------------------------------

/// A plantable crop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropDefinition {
    /// Catalog key; also the item base of its seed and produce.
    pub id: CropId,
    /// Display name.
    pub name: String,
    /// Growth time in seconds (nullable column).
    pub grow_seconds: Option<i64>,
    /// Units harvested.
    pub yield_quantity: u32,
    /// Seed shop price per seed.
    pub seed_price: u64,
    /// Player level needed to plant or buy seeds.
    pub unlock_level: u32,
}

impl CropDefinition {
    /// The produce item.
    pub fn crop_item(&self) -> Result<ItemKind, GameError> {
        Ok(ItemKind::Crop(item_base("crop", self.id.get())?))
    }

    /// The seed item.
    pub fn seed_item(&self) -> Result<ItemKind, GameError> {
        Ok(ItemKind::Seed(item_base("crop", self.id.get())?))
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// A factory recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    /// Catalog key.
    pub id: RecipeId,
    /// Display name.
    pub name: String,
    /// Building type of the factories that can run it.
    pub factory_type: BuildingTypeId,
    /// Items consumed on start.
    pub inputs: BTreeMap<ItemKind, u32>,
    /// Items, currency and flat XP credited on collect.
    pub outputs: Bundle,
    /// Production time in seconds (nullable column).
    pub duration_seconds: Option<i64>,
    /// Player level needed.
    pub unlock_level: u32,
}

// ---------------------------------------------------------------------------
// Town
// ---------------------------------------------------------------------------

/// A placeable building, decoration or utility type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildingType {
    /// Catalog key.
    pub id: BuildingTypeId,
    /// Stable code (e.g. `rune_bakery`).
    pub code: String,
    /// Display name.
    pub name: String,
    /// What kind of thing this is.
    pub category: BuildingCategory,
    /// Footprint width in cells.
    pub width: u16,
    /// Footprint height in cells.
    pub height: u16,
    /// Crystal price before discount.
    pub base_cost: u64,
    /// Per-player count limit; `None` is unlimited.
    pub max_count: Option<u32>,
    /// Building type that must already be placed.
    pub prerequisite: Option<BuildingTypeId>,
    /// Player level needed.
    pub required_level: u32,
    /// Population needed.
    pub required_population: u32,
    /// Population granted per building level.
    pub population_per_level: u32,
    /// Highest upgrade level.
    pub max_level: u32,
    /// Crystal price per upgrade, multiplied by the current level.
    pub upgrade_cost: u64,
}

// ---------------------------------------------------------------------------
// Zoo
// ---------------------------------------------------------------------------

/// An animal species.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimalSpecies {
    /// Catalog key; also the species base of its creature items.
    pub id: SpeciesId,
    /// Display name.
    pub name: String,
    /// Items consumed to start production or breeding.
    pub feed: BTreeMap<ItemKind, u32>,
    /// Item produced.
    pub product: ItemKind,
    /// Units produced per creature level.
    pub product_quantity: u32,
    /// Production time in seconds (nullable column).
    pub production_seconds: Option<i64>,
    /// Breeding time in seconds (nullable column).
    pub breeding_seconds: Option<i64>,
    /// Highest creature level.
    pub max_level: u8,
    /// Animals a new enclosure for this species holds.
    pub enclosure_capacity: u16,
    /// XP for a newborn, per offspring level.
    pub breeding_xp: u64,
}

impl AnimalSpecies {
    /// The creature item for this species at `level`.
    pub fn creature(&self, level: u8) -> Result<ItemKind, GameError> {
        if level == 0 || level > self.max_level {
            return Err(GameError::Invalid(format!(
                "{} level must be within 1..={}, got {level}",
                self.name, self.max_level
            )));
        }
        Ok(ItemKind::Creature {
            species: item_base("species", self.id.get())?,
            level,
        })
    }
}

// ---------------------------------------------------------------------------
// Skyport
// ---------------------------------------------------------------------------

/// A template skyport orders are drawn from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTemplate {
    /// Catalog key.
    pub id: OrderTemplateId,
    /// Items delivered.
    pub requirements: BTreeMap<ItemKind, u32>,
    /// What the delivery pays.
    pub reward: Bundle,
    /// Delivery flight time in seconds (nullable column).
    pub delivery_seconds: Option<i64>,
    /// Player level needed to be offered this template.
    pub min_level: u32,
}

// ---------------------------------------------------------------------------
// Progress and events
// ---------------------------------------------------------------------------

/// An achievement or quest definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressDefinition {
    /// Catalog key of the achievement or quest.
    pub id: i32,
    /// Display name.
    pub name: String,
    /// Event type counted.
    pub condition: ConditionType,
    /// Only count events for this item.
    pub item_filter: Option<ItemKind>,
    /// Progress needed to complete.
    pub target: u64,
    /// Issued on claim.
    pub reward: Bundle,
    /// Player level from which the definition is offered.
    pub min_level: u32,
}

/// A task players submit during a regatta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegattaTask {
    /// Catalog key.
    pub id: RegattaTaskId,
    /// Items delivered.
    pub requirements: BTreeMap<ItemKind, u32>,
    /// Points earned.
    pub points: u64,
}

// ---------------------------------------------------------------------------
// Item values
// ---------------------------------------------------------------------------

/// Market price and XP of one item kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemValue {
    /// NPC market price per unit; `None` when the market does not buy it.
    pub sell_price: Option<u64>,
    /// XP per unit produced.
    pub xp_per_unit: u64,
}

/// Lookup of [`ItemValue`] by item kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemValues {
    values: BTreeMap<ItemKind, ItemValue>,
    default_xp_per_unit: u64,
}

impl ItemValues {
    /// Build from loaded rows.
    pub fn new(values: BTreeMap<ItemKind, ItemValue>, default_xp_per_unit: u64) -> Self {
        Self {
            values,
            default_xp_per_unit,
        }
    }

    /// Value entry for an item, if one exists.
    pub fn get(&self, item: ItemKind) -> Option<ItemValue> {
        self.values.get(&item).copied()
    }

    /// XP for producing `quantity` units of `item`.
    pub fn xp_for(&self, item: ItemKind, quantity: u32) -> u64 {
        let per_unit = self
            .get(item)
            .map_or(self.default_xp_per_unit, |value| value.xp_per_unit);
        per_unit.saturating_mul(u64::from(quantity))
    }

    /// XP for a set of produced items.
    pub fn xp_for_items(&self, items: &BTreeMap<ItemKind, u32>) -> u64 {
        items
            .iter()
            .fold(0_u64, |acc, (item, qty)| acc.saturating_add(self.xp_for(*item, *qty)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xp_uses_table_then_default() {
        let values = ItemValues::new(
            BTreeMap::from([(
                ItemKind::Crop(1),
                ItemValue {
                    sell_price: Some(3),
                    xp_per_unit: 2,
                },
            )]),
            1,
        );
        let items = BTreeMap::from([(ItemKind::Crop(1), 5), (ItemKind::Craftable(200), 4)]);
        assert_eq!(values.xp_for_items(&items), 14);
    }

    #[test]
    fn creature_levels_are_bounded() {
        let species = AnimalSpecies {
            id: SpeciesId(4),
            name: "Moonhen".into(),
            feed: BTreeMap::new(),
            product: ItemKind::Craftable(210),
            product_quantity: 1,
            production_seconds: Some(60),
            breeding_seconds: Some(600),
            max_level: 3,
            enclosure_capacity: 4,
            breeding_xp: 5,
        };
        assert_eq!(
            species.creature(2).ok(),
            Some(ItemKind::Creature { species: 4, level: 2 })
        );
        assert!(species.creature(0).is_err());
        assert!(species.creature(4).is_err());
    }

    #[test]
    fn negative_catalog_key_is_malformed() {
        assert!(item_base("crop", -1).is_err());
        assert_eq!(item_base("crop", 7).ok(), Some(7));
    }
}
