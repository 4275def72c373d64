//! Result payloads returned by the named procedures.
//!
//! Every payload carries a `success` flag. Optional fields are omitted from
//! the JSON when they do not apply; clients must read an absent field as
//! "not applicable", never as zero.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{RewardTier, SpeedUpCategory};
use crate::ids::{ListingId, PlacementId};
use crate::item::{ItemKey, ItemKind};

/// A quantity of one item kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ItemStack {
    /// The item.
    #[ts(as = "ItemKey")]
    pub item: ItemKind,
    /// How many units.
    pub quantity: u32,
}

impl ItemStack {
    /// Convert an item map into a list of stacks, dropping zero lines.
    pub fn from_map(items: &BTreeMap<ItemKind, u32>) -> Vec<Self> {
        items
            .iter()
            .filter(|(_, q)| **q > 0)
            .map(|(item, quantity)| Self {
                item: *item,
                quantity: *quantity,
            })
            .collect()
    }
}

/// What a successful operation credited to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Awarded {
    /// Crystals credited (after boosts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crystals: Option<u64>,
    /// Gems credited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gems: Option<u64>,
    /// Experience granted (after boosts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp: Option<u64>,
    /// Items credited.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemStack>,
    /// Levels gained by the experience grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels_gained: Option<u32>,
    /// Level after the grant, present when `levels_gained` is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
}

/// Result of starting a timed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StartResult {
    /// Always `true`; failures are returned as errors.
    pub success: bool,
    /// Slot index inside the site, when the site has numbered slots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_index: Option<u16>,
    /// When the task started.
    pub started_at: DateTime<Utc>,
    /// When the task can be collected.
    pub completes_at: DateTime<Utc>,
    /// Inputs debited.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumed: Vec<ItemStack>,
}

/// Result of collecting a timed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CollectResult {
    /// Always `true`; failures are returned as errors.
    pub success: bool,
    /// `false` when the slot was already gone (collected concurrently).
    pub collected: bool,
    /// Credited outputs, present when `collected` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awarded: Option<Awarded>,
}

impl CollectResult {
    /// A successful collection.
    pub const fn collected(awarded: Awarded) -> Self {
        Self {
            success: true,
            collected: true,
            awarded: Some(awarded),
        }
    }

    /// The benign "already collected" outcome.
    pub const fn nothing_to_collect() -> Self {
        Self {
            success: true,
            collected: false,
            awarded: None,
        }
    }
}

/// Result of shortening a timed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SpeedUpResult {
    /// Always `true`; failures are returned as errors.
    pub success: bool,
    /// New completion time.
    pub completes_at: DateTime<Utc>,
    /// Speed-ups left in the current window, for rate-limited speed-ups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
}

/// Display-only view of the speed-up rate limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SpeedUpEligibility {
    /// Category inspected.
    pub category: SpeedUpCategory,
    /// Speed-ups used inside the trailing window.
    pub used: u32,
    /// Limit per window.
    pub limit: u32,
    /// `limit - used`, floored at zero.
    pub remaining: u32,
    /// Window length in seconds.
    pub window_seconds: u32,
}

/// Result of an operation that only moves currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BalanceResult {
    /// Always `true`; failures are returned as errors.
    pub success: bool,
    /// Crystal balance after the operation.
    pub crystals: u64,
    /// Gem balance after the operation.
    pub gems: u64,
    /// What was credited, if anything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awarded: Option<Awarded>,
}

/// Result of placing or moving something on the town grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PlacementResult {
    /// Always `true`; failures are returned as errors.
    pub success: bool,
    /// The placement touched.
    pub placement_id: PlacementId,
    /// Crystals debited.
    pub cost: u64,
    /// Recomputed population, present when it changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<u32>,
}

/// Result of buying a market listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ListingPurchaseResult {
    /// Always `true`; failures are returned as errors.
    pub success: bool,
    /// The listing bought.
    pub listing_id: ListingId,
    /// Crystals the buyer paid.
    pub price: u64,
    /// Crystals the seller received after commission.
    pub seller_proceeds: u64,
    /// What the buyer received.
    pub item: ItemStack,
}

/// Result of contributing to a coven task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ContributionResult {
    /// Always `true`; failures are returned as errors.
    pub success: bool,
    /// Units actually counted (capped at the remaining objective).
    pub contributed: u32,
    /// Whether this contribution completed the task.
    pub task_completed: bool,
    /// Experience each contributor received, when the task completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp_per_contributor: Option<u64>,
}

/// Result of the daily reward claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DailyRewardResult {
    /// Always `true`; failures are returned as errors.
    pub success: bool,
    /// Consecutive-day streak after this claim.
    pub streak: u32,
    /// What was credited.
    pub awarded: Awarded,
}

/// Result of settling a regatta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SettlementResult {
    /// Always `true`; failures are returned as errors.
    pub success: bool,
    /// `false` when a previous call already settled the regatta.
    pub settled_now: bool,
    /// Number of ranked participants.
    pub participants: u32,
    /// Participants per tier.
    pub tiers: BTreeMap<RewardTier, u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_are_omitted() {
        let json = serde_json::to_value(CollectResult::nothing_to_collect()).unwrap_or_default();
        assert_eq!(json, serde_json::json!({"success": true, "collected": false}));
    }

    #[test]
    fn awarded_omits_zero_sections() {
        let awarded = Awarded {
            xp: Some(12),
            ..Awarded::default()
        };
        let json = serde_json::to_value(awarded).unwrap_or_default();
        assert_eq!(json, serde_json::json!({"xp": 12}));
    }
}
