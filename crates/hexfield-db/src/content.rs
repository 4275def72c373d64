//! Content tables loaded once at startup.
//!
//! Every row is converted into the engine's catalog types here; a row the
//! engine cannot represent fails the load instead of surfacing later as a
//! half-working crop or recipe.

use std::collections::BTreeMap;

use serde_json::Value;
use sqlx::PgPool;

use hexfield_engine::catalog::{
    AnimalSpecies, BuildingType, CropDefinition, ItemValue, ItemValues, OrderTemplate,
    ProgressDefinition, Recipe,
};
use hexfield_types::{
    AchievementId, BuildingCategory, BuildingTypeId, Bundle, ConditionType, CropId, ItemKind,
    OrderTemplateId, QuestId, RecipeId, SpeciesId, bundle,
};

use crate::codec::{column, item_from_columns};
use crate::error::DbError;

/// All content definitions, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Crops by id.
    pub crops: BTreeMap<CropId, CropDefinition>,
    /// Recipes by id.
    pub recipes: BTreeMap<RecipeId, Recipe>,
    /// Building, decoration and road types by id.
    pub building_types: BTreeMap<BuildingTypeId, BuildingType>,
    /// Animal species by id.
    pub species: BTreeMap<SpeciesId, AnimalSpecies>,
    /// Skyport order templates.
    pub order_templates: Vec<OrderTemplate>,
    /// Sell prices and XP per unit.
    pub item_values: ItemValues,
    /// Achievement definitions by id.
    pub achievements: BTreeMap<AchievementId, ProgressDefinition>,
    /// Quest definitions by id.
    pub quests: BTreeMap<QuestId, ProgressDefinition>,
}

impl Catalog {
    /// Load every content table.
    ///
    /// `default_xp_per_unit` is the XP granted for items missing from the
    /// `item_values` table.
    pub async fn load(pool: &PgPool, default_xp_per_unit: u64) -> Result<Self, DbError> {
        let crops = sqlx::query_as::<_, CropRow>(
            "SELECT id, name, grow_seconds, yield_quantity, seed_price, unlock_level FROM crops",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| row.into_definition().map(|c| (c.id, c)))
        .collect::<Result<_, _>>()?;

        let recipes = sqlx::query_as::<_, RecipeRow>(
            "SELECT id, name, factory_type, inputs, outputs, duration_seconds, unlock_level FROM recipes",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| row.into_recipe().map(|r| (r.id, r)))
        .collect::<Result<_, _>>()?;

        let building_types = sqlx::query_as::<_, BuildingTypeRow>(
            r"SELECT id, code, name, category, width, height, base_cost, max_count, prerequisite,
                     required_level, required_population, population_per_level, max_level, upgrade_cost
              FROM building_types",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| row.into_type().map(|t| (t.id, t)))
        .collect::<Result<_, _>>()?;

        let species = sqlx::query_as::<_, SpeciesRow>(
            r"SELECT id, name, feed, product_category, product_base, product_level, product_quantity,
                     production_seconds, breeding_seconds, max_level, enclosure_capacity, breeding_xp
              FROM animal_species",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| row.into_species().map(|s| (s.id, s)))
        .collect::<Result<_, _>>()?;

        let order_templates = sqlx::query_as::<_, OrderTemplateRow>(
            "SELECT id, requirements, reward, delivery_seconds, min_level FROM order_templates ORDER BY id",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(OrderTemplateRow::into_template)
        .collect::<Result<_, _>>()?;

        let values = sqlx::query_as::<_, ItemValueRow>(
            "SELECT item_category, item_base, item_level, sell_price, xp_per_unit FROM item_values",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(ItemValueRow::into_entry)
        .collect::<Result<_, _>>()?;

        let achievements = load_progress(pool, "achievements")
            .await?
            .into_iter()
            .map(|d| (AchievementId(d.id), d))
            .collect();
        let quests = load_progress(pool, "quests")
            .await?
            .into_iter()
            .map(|d| (QuestId(d.id), d))
            .collect();

        let catalog = Self {
            crops,
            recipes,
            building_types,
            species,
            order_templates,
            item_values: ItemValues::new(values, default_xp_per_unit),
            achievements,
            quests,
        };
        tracing::info!(
            crops = catalog.crops.len(),
            recipes = catalog.recipes.len(),
            building_types = catalog.building_types.len(),
            species = catalog.species.len(),
            order_templates = catalog.order_templates.len(),
            achievements = catalog.achievements.len(),
            quests = catalog.quests.len(),
            "Content catalog loaded"
        );
        Ok(catalog)
    }
}

async fn load_progress(pool: &PgPool, table: &'static str) -> Result<Vec<ProgressDefinition>, DbError> {
    let sql = format!(
        "SELECT id, name, condition_type, item_category, item_base, item_level, target, reward, min_level \
         FROM {table} ORDER BY id"
    );
    sqlx::query_as::<_, ProgressRow>(&sql)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| row.into_definition(table))
        .collect()
}

fn parse_bundle(table: &'static str, value: &Value) -> Result<Bundle, DbError> {
    Bundle::from_json(value).map_err(|e| DbError::corrupt(table, e.0))
}

fn item_list(table: &'static str, value: &Value) -> Result<BTreeMap<ItemKind, u32>, DbError> {
    bundle::parse_item_list(value).map_err(|e| DbError::corrupt(table, e.0))
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct CropRow {
    id: i32,
    name: String,
    grow_seconds: Option<i64>,
    yield_quantity: i32,
    seed_price: i64,
    unlock_level: i32,
}

impl CropRow {
    fn into_definition(self) -> Result<CropDefinition, DbError> {
        Ok(CropDefinition {
            id: CropId(self.id),
            name: self.name,
            grow_seconds: self.grow_seconds,
            yield_quantity: column(self.yield_quantity, "crops", "yield_quantity")?,
            seed_price: column(self.seed_price, "crops", "seed_price")?,
            unlock_level: column(self.unlock_level, "crops", "unlock_level")?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RecipeRow {
    id: i32,
    name: String,
    factory_type: i32,
    inputs: Value,
    outputs: Value,
    duration_seconds: Option<i64>,
    unlock_level: i32,
}

impl RecipeRow {
    fn into_recipe(self) -> Result<Recipe, DbError> {
        Ok(Recipe {
            id: RecipeId(self.id),
            name: self.name,
            factory_type: BuildingTypeId(self.factory_type),
            inputs: item_list("recipes", &self.inputs)?,
            outputs: parse_bundle("recipes", &self.outputs)?,
            duration_seconds: self.duration_seconds,
            unlock_level: column(self.unlock_level, "recipes", "unlock_level")?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BuildingTypeRow {
    id: i32,
    code: String,
    name: String,
    category: String,
    width: i32,
    height: i32,
    base_cost: i64,
    max_count: Option<i32>,
    prerequisite: Option<i32>,
    required_level: i32,
    required_population: i32,
    population_per_level: i32,
    max_level: i32,
    upgrade_cost: i64,
}

impl BuildingTypeRow {
    fn into_type(self) -> Result<BuildingType, DbError> {
        const T: &str = "building_types";
        let category = BuildingCategory::parse(&self.category)
            .ok_or_else(|| DbError::corrupt(T, format!("unknown category {:?}", self.category)))?;
        Ok(BuildingType {
            id: BuildingTypeId(self.id),
            code: self.code,
            name: self.name,
            category,
            width: column(self.width, T, "width")?,
            height: column(self.height, T, "height")?,
            base_cost: column(self.base_cost, T, "base_cost")?,
            max_count: self.max_count.map(|m| column(m, T, "max_count")).transpose()?,
            prerequisite: self.prerequisite.map(BuildingTypeId),
            required_level: column(self.required_level, T, "required_level")?,
            required_population: column(self.required_population, T, "required_population")?,
            population_per_level: column(self.population_per_level, T, "population_per_level")?,
            max_level: column(self.max_level, T, "max_level")?,
            upgrade_cost: column(self.upgrade_cost, T, "upgrade_cost")?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SpeciesRow {
    id: i32,
    name: String,
    feed: Value,
    product_category: String,
    product_base: i32,
    product_level: i32,
    product_quantity: i32,
    production_seconds: Option<i64>,
    breeding_seconds: Option<i64>,
    max_level: i32,
    enclosure_capacity: i32,
    breeding_xp: i64,
}

impl SpeciesRow {
    fn into_species(self) -> Result<AnimalSpecies, DbError> {
        const T: &str = "animal_species";
        Ok(AnimalSpecies {
            id: SpeciesId(self.id),
            name: self.name,
            feed: item_list(T, &self.feed)?,
            product: item_from_columns(T, &self.product_category, self.product_base, self.product_level)?,
            product_quantity: column(self.product_quantity, T, "product_quantity")?,
            production_seconds: self.production_seconds,
            breeding_seconds: self.breeding_seconds,
            max_level: column(self.max_level, T, "max_level")?,
            enclosure_capacity: column(self.enclosure_capacity, T, "enclosure_capacity")?,
            breeding_xp: column(self.breeding_xp, T, "breeding_xp")?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderTemplateRow {
    id: i32,
    requirements: Value,
    reward: Value,
    delivery_seconds: Option<i64>,
    min_level: i32,
}

impl OrderTemplateRow {
    fn into_template(self) -> Result<OrderTemplate, DbError> {
        Ok(OrderTemplate {
            id: OrderTemplateId(self.id),
            requirements: item_list("order_templates", &self.requirements)?,
            reward: parse_bundle("order_templates", &self.reward)?,
            delivery_seconds: self.delivery_seconds,
            min_level: column(self.min_level, "order_templates", "min_level")?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ItemValueRow {
    item_category: String,
    item_base: i32,
    item_level: i32,
    sell_price: Option<i64>,
    xp_per_unit: i64,
}

impl ItemValueRow {
    fn into_entry(self) -> Result<(ItemKind, ItemValue), DbError> {
        const T: &str = "item_values";
        let item = item_from_columns(T, &self.item_category, self.item_base, self.item_level)?;
        Ok((
            item,
            ItemValue {
                sell_price: self.sell_price.map(|p| column(p, T, "sell_price")).transpose()?,
                xp_per_unit: column(self.xp_per_unit, T, "xp_per_unit")?,
            },
        ))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProgressRow {
    id: i32,
    name: String,
    condition_type: String,
    item_category: Option<String>,
    item_base: Option<i32>,
    item_level: Option<i32>,
    target: i64,
    reward: Value,
    min_level: i32,
}

impl ProgressRow {
    fn into_definition(self, table: &'static str) -> Result<ProgressDefinition, DbError> {
        let condition = ConditionType::parse(&self.condition_type)
            .ok_or_else(|| DbError::corrupt(table, format!("unknown condition {:?}", self.condition_type)))?;
        let item_filter = match (self.item_category.as_deref(), self.item_base) {
            (Some(category), Some(base)) => Some(item_from_columns(
                table,
                category,
                base,
                self.item_level.unwrap_or(0),
            )?),
            (None, None) => None,
            _ => return Err(DbError::corrupt(table, format!("definition {} has a partial item filter", self.id))),
        };
        Ok(ProgressDefinition {
            id: self.id,
            name: self.name,
            condition,
            item_filter,
            target: column(self.target, table, "target")?,
            reward: parse_bundle(table, &self.reward)?,
            min_level: column(self.min_level, table, "min_level")?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn recipe_row_parses_bundles() {
        let row = RecipeRow {
            id: 3,
            name: "Moonbread".into(),
            factory_type: 10,
            inputs: json!([{"item": {"category": "crop", "base": 1}, "quantity": 3}]),
            outputs: json!({"crystals": 5, "items": [{"item": {"category": "craftable", "base": 201}, "quantity": 1}]}),
            duration_seconds: Some(120),
            unlock_level: 2,
        };
        let recipe = row.into_recipe();
        let recipe = recipe.unwrap();
        assert_eq!(recipe.inputs.get(&ItemKind::Crop(1)).copied(), Some(3));
        assert_eq!(recipe.outputs.crystals, 5);
        assert_eq!(recipe.factory_type, BuildingTypeId(10));
    }

    #[test]
    fn negative_price_is_corrupt() {
        let row = CropRow {
            id: 1,
            name: "Glowwheat".into(),
            grow_seconds: Some(60),
            yield_quantity: 2,
            seed_price: -1,
            unlock_level: 1,
        };
        assert!(matches!(row.into_definition(), Err(DbError::Corrupt { table: "crops", .. })));
    }

    #[test]
    fn partial_item_filter_is_corrupt() {
        let row = ProgressRow {
            id: 9,
            name: "Harvester".into(),
            condition_type: "harvest".into(),
            item_category: Some("crop".into()),
            item_base: None,
            item_level: None,
            target: 10,
            reward: Value::Null,
            min_level: 1,
        };
        assert!(row.into_definition("achievements").is_err());
    }
}
