//! Variable-width resource bundles (recipe inputs/outputs, rewards, order
//! requirements) stored as JSON columns.
//!
//! Parsing is defensive: a missing key means zero, a `null` column means an
//! empty bundle. Values that are present but unusable (negative, fractional,
//! wrong type, unknown item) are rejected as malformed instead of being
//! silently coerced.
//!
//! ```text
//! {"crystals": 40, "xp": 12, "items": [{"item": {"category": "crop", "base": 1}, "quantity": 3}]}
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::item::ItemKind;

/// A bundle column could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed bundle: {0}")]
pub struct BundleError(pub String);

/// A set of currency, experience and item amounts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    /// Primary currency.
    pub crystals: u64,
    /// Premium currency.
    pub gems: u64,
    /// Experience points.
    pub xp: u64,
    /// Items by kind.
    pub items: BTreeMap<ItemKind, u32>,
}

impl Bundle {
    /// A bundle containing only items.
    pub const fn of_items(items: BTreeMap<ItemKind, u32>) -> Self {
        Self {
            crystals: 0,
            gems: 0,
            xp: 0,
            items,
        }
    }

    /// Whether every amount is zero.
    pub fn is_empty(&self) -> bool {
        self.crystals == 0 && self.gems == 0 && self.xp == 0 && self.items.values().all(|q| *q == 0)
    }

    /// Parse a bundle from a JSON column value.
    pub fn from_json(value: &Value) -> Result<Self, BundleError> {
        let object = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => return Err(BundleError(format!("expected object, got {other}"))),
        };

        Ok(Self {
            crystals: read_amount(object, "crystals")?,
            gems: read_amount(object, "gems")?,
            xp: read_amount(object, "xp")?,
            items: object
                .get("items")
                .map_or_else(|| Ok(BTreeMap::new()), parse_item_list)?,
        })
    }

    /// Serialize back into the JSON column shape. Zero amounts are omitted.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        if self.crystals > 0 {
            map.insert("crystals".to_owned(), Value::from(self.crystals));
        }
        if self.gems > 0 {
            map.insert("gems".to_owned(), Value::from(self.gems));
        }
        if self.xp > 0 {
            map.insert("xp".to_owned(), Value::from(self.xp));
        }
        if !self.items.is_empty() {
            map.insert("items".to_owned(), item_list_to_json(&self.items));
        }
        Value::Object(map)
    }
}

/// Read a non-negative integer amount; missing or `null` is zero.
fn read_amount(object: &Map<String, Value>, key: &str) -> Result<u64, BundleError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(v) => v
            .as_u64()
            .ok_or_else(|| BundleError(format!("{key} must be a non-negative integer, got {v}"))),
    }
}

/// Parse a JSON item list (`[{"item": ..., "quantity": n}]`) into a map.
///
/// Duplicate entries for the same item are summed.
pub fn parse_item_list(value: &Value) -> Result<BTreeMap<ItemKind, u32>, BundleError> {
    let entries = match value {
        Value::Null => return Ok(BTreeMap::new()),
        Value::Array(entries) => entries,
        other => return Err(BundleError(format!("item list must be an array, got {other}"))),
    };

    let mut items = BTreeMap::new();
    for entry in entries {
        let item_value = entry
            .get("item")
            .ok_or_else(|| BundleError(format!("item entry without item: {entry}")))?;
        let item: ItemKind = serde_json::from_value(item_value.clone())
            .map_err(|e| BundleError(format!("bad item {item_value}: {e}")))?;
        let quantity = match entry.get("quantity") {
            None | Some(Value::Null) => 0,
            Some(q) => q
                .as_u64()
                .and_then(|q| u32::try_from(q).ok())
                .ok_or_else(|| BundleError(format!("bad quantity for {item}: {q}")))?,
        };
        if quantity == 0 {
            continue;
        }
        let slot = items.entry(item).or_insert(0_u32);
        *slot = slot
            .checked_add(quantity)
            .ok_or_else(|| BundleError(format!("quantity overflow for {item}")))?;
    }
    Ok(items)
}

/// Serialize an item map into the JSON item list shape.
pub fn item_list_to_json(items: &BTreeMap<ItemKind, u32>) -> Value {
    Value::Array(
        items
            .iter()
            .filter(|(_, q)| **q > 0)
            .map(|(item, quantity)| {
                serde_json::json!({
                    "item": item,
                    "quantity": quantity,
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_keys_default_to_zero() {
        let bundle = Bundle::from_json(&json!({"xp": 5})).unwrap_or_default();
        assert_eq!(bundle.xp, 5);
        assert_eq!(bundle.crystals, 0);
        assert!(bundle.items.is_empty());
    }

    #[test]
    fn null_column_is_empty_bundle() {
        let bundle = Bundle::from_json(&Value::Null);
        assert_eq!(bundle, Ok(Bundle::default()));
    }

    #[test]
    fn negative_amount_is_malformed() {
        assert!(Bundle::from_json(&json!({"crystals": -3})).is_err());
        assert!(Bundle::from_json(&json!({"crystals": 1.5})).is_err());
        assert!(Bundle::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn duplicate_items_are_summed() {
        let items = parse_item_list(&json!([
            {"item": {"category": "crop", "base": 1}, "quantity": 2},
            {"item": {"category": "crop", "base": 1}, "quantity": 3},
            {"item": {"category": "ore", "base": 2}},
        ]))
        .unwrap_or_default();
        assert_eq!(items.get(&ItemKind::Crop(1)).copied(), Some(5));
        assert!(!items.contains_key(&ItemKind::Ore(2)));
    }

    #[test]
    fn json_shape_is_stable() {
        let mut items = BTreeMap::new();
        items.insert(ItemKind::Craftable(4), 2);
        let bundle = Bundle {
            crystals: 10,
            gems: 0,
            xp: 3,
            items,
        };
        let parsed = Bundle::from_json(&bundle.to_json());
        assert_eq!(parsed, Ok(bundle));
    }
}
