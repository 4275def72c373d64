//! Enumeration types shared by the engine, the database layer and the API.
//!
//! Each enum that is persisted has an `as_str`/`parse` pair matching the
//! `TEXT` + `CHECK` columns in the migrations.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates `as_str` / `parse` for a fieldless enum.
macro_rules! db_text {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Database / wire representation.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            /// Parse the database representation.
            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Rate-limit bucket for speed-ups. Each category has its own hourly limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SpeedUpCategory {
    /// Crop growth on farm plots.
    Farm,
    /// Factory production slots.
    Factory,
    /// Animal production in enclosures.
    Zoo,
    /// Skyport deliveries.
    Skyport,
}

db_text!(SpeedUpCategory {
    Farm => "farm",
    Factory => "factory",
    Zoo => "zoo",
    Skyport => "skyport",
});

/// Kind of a temporary output multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum BoostKind {
    /// Multiplies crystals credited by collections.
    CrystalYield,
    /// Multiplies experience granted by collections.
    XpYield,
}

db_text!(BoostKind {
    CrystalYield => "crystal_yield",
    XpYield => "xp_yield",
});

// ---------------------------------------------------------------------------
// Town grid
// ---------------------------------------------------------------------------

/// What occupies a set of grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum PlacementKind {
    /// A leveled building.
    Building,
    /// A cosmetic decoration.
    Decoration,
    /// A single road tile.
    Road,
}

db_text!(PlacementKind {
    Building => "building",
    Decoration => "decoration",
    Road => "road",
});

/// Catalog category of a building type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum BuildingCategory {
    /// Unlocks a factory type; each copy adds factory slots.
    Factory,
    /// Provides population.
    House,
    /// Cosmetic only.
    Decoration,
    /// Road tile.
    Road,
    /// Any other functional building (skyport, zoo gate, ...).
    Utility,
}

db_text!(BuildingCategory {
    Factory => "factory",
    House => "house",
    Decoration => "decoration",
    Road => "road",
    Utility => "utility",
});

// ---------------------------------------------------------------------------
// Social
// ---------------------------------------------------------------------------

/// State of one direction of a friendship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum FriendStatus {
    /// Request sent, not yet accepted.
    Pending,
    /// Both sides accepted.
    Accepted,
}

db_text!(FriendStatus {
    Pending => "pending",
    Accepted => "accepted",
});

/// Kind of help one friend gives another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum HelpAction {
    /// Speed up a growing crop.
    Crop,
    /// Speed up a factory slot.
    Production,
    /// Supply a skyport order.
    Order,
}

db_text!(HelpAction {
    Crop => "crop",
    Production => "production",
    Order => "order",
});

/// Role inside a coven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum CovenRole {
    /// The single leader.
    Leader,
    /// Regular member.
    Member,
}

db_text!(CovenRole {
    Leader => "leader",
    Member => "member",
});

/// Lifecycle of a coven invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum InvitationStatus {
    /// Awaiting a response.
    Pending,
    /// Invitee joined.
    Accepted,
    /// Invitee declined.
    Declined,
    /// Withdrawn by the inviter.
    Cancelled,
}

db_text!(InvitationStatus {
    Pending => "pending",
    Accepted => "accepted",
    Declined => "declined",
    Cancelled => "cancelled",
});

// ---------------------------------------------------------------------------
// Progression
// ---------------------------------------------------------------------------

/// What an achievement or quest counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ConditionType {
    /// Crops harvested.
    Harvest,
    /// Factory goods collected.
    Craft,
    /// Animal products collected.
    Produce,
    /// Offspring bred.
    Breed,
    /// Skyport orders delivered.
    Deliver,
    /// Buildings placed.
    Build,
    /// Items sold to the market.
    Sell,
    /// Help actions given to friends.
    Help,
    /// Player level reached (progress is the level itself).
    ReachLevel,
    /// Items contributed to coven tasks.
    Contribute,
}

db_text!(ConditionType {
    Harvest => "harvest",
    Craft => "craft",
    Produce => "produce",
    Breed => "breed",
    Deliver => "deliver",
    Build => "build",
    Sell => "sell",
    Help => "help",
    ReachLevel => "reach_level",
    Contribute => "contribute",
});

/// Regatta settlement tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum RewardTier {
    /// Top tier.
    Gold,
    /// Second tier.
    Silver,
    /// Third tier.
    Bronze,
    /// Everyone else with at least one point.
    Participation,
}

db_text!(RewardTier {
    Gold => "gold",
    Silver => "silver",
    Bronze => "bronze",
    Participation => "participation",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_text_round_trips() {
        for category in [
            SpeedUpCategory::Farm,
            SpeedUpCategory::Factory,
            SpeedUpCategory::Zoo,
            SpeedUpCategory::Skyport,
        ] {
            assert_eq!(SpeedUpCategory::parse(category.as_str()), Some(category));
        }
        assert_eq!(ConditionType::parse("reach_level"), Some(ConditionType::ReachLevel));
        assert_eq!(ConditionType::parse("fishing"), None);
    }

    #[test]
    fn serde_matches_db_text() {
        let json = serde_json::to_string(&BoostKind::CrystalYield).unwrap_or_default();
        assert_eq!(json, format!("\"{}\"", BoostKind::CrystalYield.as_str()));
    }
}
