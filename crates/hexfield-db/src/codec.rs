//! Column conversions between `PostgreSQL` integers and the unsigned game
//! types.
//!
//! Reads go through [`column`], which reports an out-of-range stored value
//! as a corrupt row. Writes go through [`param`], which reports a value too
//! large for its column as an overflow.

use core::fmt::Display;

use hexfield_engine::GameError;
use hexfield_types::{ItemCategory, ItemKey, ItemKind};

use crate::error::DbError;

/// Convert a stored value to its game type.
pub fn column<S, T>(value: S, table: &'static str, field: &'static str) -> Result<T, DbError>
where
    S: Copy + Display,
    T: TryFrom<S>,
{
    T::try_from(value)
        .ok()
        .ok_or_else(|| DbError::corrupt(table, format!("{field} value {value} is out of range")))
}

/// Convert a game value to its column type.
pub fn param<S, T>(value: S, field: &'static str) -> Result<T, DbError>
where
    S: Copy + Display,
    T: TryFrom<S>,
{
    T::try_from(value)
        .ok()
        .ok_or_else(|| DbError::Game(GameError::overflow(format!("{field} {value}"))))
}

/// Decode the `(item_category, item_base, item_level)` column triple.
pub fn item_from_columns(
    table: &'static str,
    category: &str,
    base: i32,
    level: i32,
) -> Result<ItemKind, DbError> {
    let category = ItemCategory::parse(category)
        .ok_or_else(|| DbError::corrupt(table, format!("unknown item category {category:?}")))?;
    let key = ItemKey {
        category,
        base: column(base, table, "item_base")?,
        level: column(level, table, "item_level")?,
    };
    ItemKind::try_from(key).map_err(|e| DbError::corrupt(table, e.to_string()))
}

/// Encode an item as its column triple.
pub fn item_columns(item: ItemKind) -> (&'static str, i32, i32) {
    (
        item.category().as_str(),
        i32::from(item.base()),
        i32::from(item.level()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_quantity_is_corrupt() {
        let result: Result<u64, _> = column(-1_i64, "inventory", "quantity");
        assert!(matches!(result, Err(DbError::Corrupt { table: "inventory", .. })));
    }

    #[test]
    fn oversized_parameter_overflows() {
        let result: Result<i64, _> = param(u64::MAX, "crystals");
        assert!(matches!(result, Err(DbError::Game(_))));
        let ok: Result<i64, _> = param(12_u64, "crystals");
        assert_eq!(ok.ok(), Some(12));
    }

    #[test]
    fn item_triple_decodes() {
        let creature = item_from_columns("inventory", "creature", 4, 2);
        assert_eq!(creature.ok(), Some(ItemKind::Creature { species: 4, level: 2 }));
        assert!(item_from_columns("inventory", "creature", 4, 0).is_err());
        assert!(item_from_columns("inventory", "gold", 1, 0).is_err());
        assert_eq!(item_columns(ItemKind::Seed(3)), ("seed", 3, 0));
    }
}
