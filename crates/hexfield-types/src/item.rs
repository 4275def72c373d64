//! Tagged item identity.
//!
//! Every inventory line is keyed by an [`ItemKind`]. The kind is a sum type,
//! so "is this a seed or a crop" is answered by a match instead of by the
//! numeric range an integer happens to fall into. The legacy integer codes
//! that older clients still send are decoded in exactly one place,
//! [`ItemKind::from_legacy_code`].
//!
//! On the wire and in the database an item is the triple
//! `(category, base, level)`, see [`ItemKey`].

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Legacy code ranges
// ---------------------------------------------------------------------------

/// First legacy code of the seed range. `Seed(n)` is `SEED_OFFSET + n`.
const SEED_OFFSET: i64 = 100;
/// First legacy code of the craftable range.
const CRAFTABLE_OFFSET: i64 = 200;
/// First legacy code of the ore range.
const ORE_OFFSET: i64 = 500;
/// First legacy code of the creature range.
const CREATURE_OFFSET: i64 = 1000;
/// Creature codes encode `species * CREATURE_STRIDE + level`.
const CREATURE_STRIDE: i64 = 10;

/// Highest crop base id representable in the legacy scheme.
const MAX_LEGACY_CROP: u16 = 99;
/// Highest craftable base id representable in the legacy scheme.
const MAX_LEGACY_CRAFTABLE: u16 = 299;
/// Highest ore base id representable in the legacy scheme.
const MAX_LEGACY_ORE: u16 = 99;
/// Highest creature level representable in the legacy scheme.
const MAX_LEGACY_CREATURE_LEVEL: u8 = 9;

// ---------------------------------------------------------------------------
// ItemCategory
// ---------------------------------------------------------------------------

/// The discriminant of an [`ItemKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ItemCategory {
    /// Harvested crop.
    Crop,
    /// Plantable seed.
    Seed,
    /// Factory product.
    Craftable,
    /// Mined or delivered raw ore.
    Ore,
    /// A leveled creature that can live in a zoo enclosure.
    Creature,
}

impl ItemCategory {
    /// Database / wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Crop => "crop",
            Self::Seed => "seed",
            Self::Craftable => "craftable",
            Self::Ore => "ore",
            Self::Creature => "creature",
        }
    }

    /// Parse the database representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "crop" => Some(Self::Crop),
            "seed" => Some(Self::Seed),
            "craftable" => Some(Self::Craftable),
            "ore" => Some(Self::Ore),
            "creature" => Some(Self::Creature),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ItemKind
// ---------------------------------------------------------------------------

/// What a unit of inventory represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "ItemKey", into = "ItemKey")]
pub enum ItemKind {
    /// A harvested crop of the given crop id.
    Crop(u16),
    /// A seed that grows into `Crop` of the same id.
    Seed(u16),
    /// A crafted good.
    Craftable(u16),
    /// Raw ore.
    Ore(u16),
    /// A creature of a species at a level (level starts at 1).
    Creature {
        /// Species catalog id.
        species: u16,
        /// Creature level.
        level: u8,
    },
}

impl ItemKind {
    /// The category discriminant.
    pub const fn category(self) -> ItemCategory {
        match self {
            Self::Crop(_) => ItemCategory::Crop,
            Self::Seed(_) => ItemCategory::Seed,
            Self::Craftable(_) => ItemCategory::Craftable,
            Self::Ore(_) => ItemCategory::Ore,
            Self::Creature { .. } => ItemCategory::Creature,
        }
    }

    /// The base id within the category (species id for creatures).
    pub const fn base(self) -> u16 {
        match self {
            Self::Crop(b) | Self::Seed(b) | Self::Craftable(b) | Self::Ore(b) => b,
            Self::Creature { species, .. } => species,
        }
    }

    /// The creature level, `0` for everything that is not a creature.
    pub const fn level(self) -> u8 {
        match self {
            Self::Creature { level, .. } => level,
            _ => 0,
        }
    }

    /// The crop a seed grows into. `None` for non-seeds.
    pub const fn grows_into(self) -> Option<Self> {
        match self {
            Self::Seed(b) => Some(Self::Crop(b)),
            _ => None,
        }
    }

    /// The seed that grows into this crop. `None` for non-crops.
    pub const fn seed_of(self) -> Option<Self> {
        match self {
            Self::Crop(b) => Some(Self::Seed(b)),
            _ => None,
        }
    }

    /// Build an item from its storage triple.
    pub const fn from_parts(category: ItemCategory, base: u16, level: u8) -> Self {
        match category {
            ItemCategory::Crop => Self::Crop(base),
            ItemCategory::Seed => Self::Seed(base),
            ItemCategory::Craftable => Self::Craftable(base),
            ItemCategory::Ore => Self::Ore(base),
            ItemCategory::Creature => Self::Creature {
                species: base,
                level,
            },
        }
    }

    /// Encode as the legacy integer code.
    ///
    /// Returns `None` when the base id does not fit the legacy ranges.
    pub fn legacy_code(self) -> Option<i64> {
        match self {
            Self::Crop(b) if (1..=MAX_LEGACY_CROP).contains(&b) => Some(i64::from(b)),
            Self::Seed(b) if (1..=MAX_LEGACY_CROP).contains(&b) => {
                SEED_OFFSET.checked_add(i64::from(b))
            }
            Self::Craftable(b) if b <= MAX_LEGACY_CRAFTABLE => {
                CRAFTABLE_OFFSET.checked_add(i64::from(b))
            }
            Self::Ore(b) if b <= MAX_LEGACY_ORE => ORE_OFFSET.checked_add(i64::from(b)),
            Self::Creature { species, level } if level <= MAX_LEGACY_CREATURE_LEVEL => {
                i64::from(species)
                    .checked_mul(CREATURE_STRIDE)?
                    .checked_add(i64::from(level))?
                    .checked_add(CREATURE_OFFSET)
            }
            _ => None,
        }
    }

    /// Decode a legacy integer code.
    pub fn from_legacy_code(code: i64) -> Option<Self> {
        let base = |offset: i64| u16::try_from(code.checked_sub(offset)?).ok();
        match code {
            1..=99 => Some(Self::Crop(base(0)?)),
            101..=199 => Some(Self::Seed(base(SEED_OFFSET)?)),
            200..=499 => Some(Self::Craftable(base(CRAFTABLE_OFFSET)?)),
            500..=599 => Some(Self::Ore(base(ORE_OFFSET)?)),
            c if c >= CREATURE_OFFSET => {
                let rest = c.checked_sub(CREATURE_OFFSET)?;
                let species = u16::try_from(rest.checked_div(CREATURE_STRIDE)?).ok()?;
                let level = u8::try_from(rest.checked_rem(CREATURE_STRIDE)?).ok()?;
                Some(Self::Creature { species, level })
            }
            _ => None,
        }
    }
}

impl core::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Creature { species, level } => write!(f, "creature:{species}@{level}"),
            other => write!(f, "{}:{}", other.category().as_str(), other.base()),
        }
    }
}

// ---------------------------------------------------------------------------
// ItemKey (wire + storage shape)
// ---------------------------------------------------------------------------

/// Storage and wire shape of an [`ItemKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ItemKey {
    /// Item category.
    pub category: ItemCategory,
    /// Base id within the category.
    pub base: u16,
    /// Creature level; omitted (zero) for non-creatures.
    #[serde(default)]
    pub level: u8,
}

/// Rejection of an [`ItemKey`] that does not describe a valid item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid item {category:?}:{base} level {level}")]
pub struct InvalidItemKey {
    /// Category of the rejected key.
    pub category: ItemCategory,
    /// Base of the rejected key.
    pub base: u16,
    /// Level of the rejected key.
    pub level: u8,
}

impl TryFrom<ItemKey> for ItemKind {
    type Error = InvalidItemKey;

    fn try_from(key: ItemKey) -> Result<Self, Self::Error> {
        let valid = match key.category {
            ItemCategory::Creature => key.level >= 1,
            _ => key.level == 0,
        };
        if valid {
            Ok(Self::from_parts(key.category, key.base, key.level))
        } else {
            Err(InvalidItemKey {
                category: key.category,
                base: key.base,
                level: key.level,
            })
        }
    }
}

impl From<ItemKind> for ItemKey {
    fn from(kind: ItemKind) -> Self {
        Self {
            category: kind.category(),
            base: kind.base(),
            level: kind.level(),
        }
    }
}
