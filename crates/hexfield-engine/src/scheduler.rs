//! The production scheduler: "start a timed task consuming inputs" and
//! "collect a completed task producing outputs".
//!
//! Farm plots, factories, zoo animals, breeding pens and skyport deliveries
//! are all instances of the same two-phase contract implemented here. The
//! site-specific modules resolve the site, its capacity and the recipe, then
//! hand off to [`start_task`] and [`collect_task`].
//!
//! # Start
//!
//! Checked in order, first failure wins, nothing is mutated on failure:
//! 1. site exists and is owned (caller)
//! 2. `in_flight < capacity`
//! 3. recipe exists (caller)
//! 4. every input is held in full ([`Inventory::ensure_all`])
//! 5. the duration is present and positive
//!
//! Only then are the inputs debited. Completion is
//! `now + duration / (level_multiplier × site_multiplier)`, rounded up to a
//! whole second, with both multipliers floored at 1.0 when absent or
//! non-positive.
//!
//! # Collect
//!
//! Requires `now >= completes_at`. Outputs are credited with boosts applied
//! to crystals and XP; XP is re-evaluated through the progression engine.
//!
//! [`Inventory::ensure_all`]: hexfield_ledger::Inventory::ensure_all

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use hexfield_ledger::{ProgressionRules, progression};
use hexfield_types::{Awarded, Bundle, ItemKind, ItemStack, StartResult};

use crate::boosts::BoostSet;
use crate::error::GameError;
use crate::state::PlayerState;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// A started task's timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskTimes {
    /// When the task started.
    pub started_at: DateTime<Utc>,
    /// When it can be collected.
    pub completes_at: DateTime<Utc>,
}

fn floor_multiplier(value: Option<Decimal>) -> Decimal {
    match value {
        Some(v) if v > Decimal::ZERO => v,
        _ => Decimal::ONE,
    }
}

/// Completion time for a task of `duration_seconds` started at `now`.
pub fn completion_time(
    now: DateTime<Utc>,
    duration_seconds: Option<i64>,
    level_multiplier: Option<Decimal>,
    site_multiplier: Option<Decimal>,
) -> Result<DateTime<Utc>, GameError> {
    let duration = match duration_seconds {
        Some(d) if d > 0 => d,
        Some(d) => {
            return Err(GameError::malformed(
                "duration",
                format!("must be positive, got {d} seconds"),
            ));
        }
        None => return Err(GameError::malformed("duration", "missing")),
    };
    let divisor = floor_multiplier(level_multiplier)
        .checked_mul(floor_multiplier(site_multiplier))
        .unwrap_or(Decimal::ONE);
    let seconds = Decimal::from(duration)
        .checked_div(divisor)
        .and_then(|s| s.ceil().to_i64())
        .ok_or_else(|| GameError::overflow("task duration"))?
        .max(1);
    TimeDelta::try_seconds(seconds)
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| GameError::overflow("completion time"))
}

/// Reject a start when the site has no free slot.
pub fn ensure_capacity(site: &'static str, in_flight: u32, capacity: u32) -> Result<(), GameError> {
    if in_flight >= capacity {
        return Err(GameError::CapacityFull {
            site,
            in_flight,
            capacity,
        });
    }
    Ok(())
}

/// Reject a collect before the completion time.
pub fn ensure_ready(completes_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), GameError> {
    if now < completes_at {
        return Err(GameError::NotReady {
            ready_at: completes_at,
        });
    }
    Ok(())
}

/// Move a completion time earlier by `seconds`, never earlier than `now`.
/// A task already due stays as it is.
pub fn shorten(completes_at: DateTime<Utc>, now: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
    let shifted = TimeDelta::try_seconds(seconds.max(0))
        .and_then(|d| completes_at.checked_sub_signed(d))
        .unwrap_or(now);
    shifted.max(now).min(completes_at)
}

// ---------------------------------------------------------------------------
// Start / collect
// ---------------------------------------------------------------------------

/// Everything [`start_task`] needs about the site and recipe.
#[derive(Debug, Clone, Copy)]
pub struct StartRequest<'a> {
    /// Kind of site, for error messages.
    pub site: &'static str,
    /// Tasks currently in flight at the site.
    pub in_flight: u32,
    /// Computed capacity of the site.
    pub capacity: u32,
    /// Items consumed.
    pub inputs: &'a BTreeMap<ItemKind, u32>,
    /// Raw duration from content.
    pub duration_seconds: Option<i64>,
    /// Site upgrade multiplier, when the site has levels.
    pub site_multiplier: Option<Decimal>,
}

/// Validate and start a task: capacity, inputs, duration; then debit.
pub fn start_task(
    player: &mut PlayerState,
    request: &StartRequest<'_>,
    rules: &ProgressionRules,
    now: DateTime<Utc>,
) -> Result<TaskTimes, GameError> {
    ensure_capacity(request.site, request.in_flight, request.capacity)?;
    player.inventory.ensure_all(request.inputs)?;
    let level_multiplier = progression::speed_multiplier(player.level(), rules);
    let completes_at = completion_time(
        now,
        request.duration_seconds,
        Some(level_multiplier),
        request.site_multiplier,
    )?;
    player.inventory.debit_all(request.inputs)?;
    Ok(TaskTimes {
        started_at: now,
        completes_at,
    })
}

/// Check readiness and credit a task's outputs.
pub fn collect_task(
    player: &mut PlayerState,
    completes_at: DateTime<Utc>,
    outputs: &Bundle,
    xp: u64,
    boosts: &BoostSet,
    rules: &ProgressionRules,
    now: DateTime<Utc>,
) -> Result<Awarded, GameError> {
    ensure_ready(completes_at, now)?;
    player.credit_bundle(outputs, xp, boosts, rules)
}

/// Result payload for a started task.
pub fn start_result(
    times: TaskTimes,
    slot_index: Option<u16>,
    consumed: &BTreeMap<ItemKind, u32>,
) -> StartResult {
    StartResult {
        success: true,
        slot_index,
        started_at: times.started_at,
        completes_at: times.completes_at,
        consumed: ItemStack::from_map(consumed),
    }
}

/// Lowest slot index in `0..capacity` not in `occupied`.
pub fn free_slot_index(occupied: &[u16], capacity: u32) -> Option<u16> {
    let capacity = u16::try_from(capacity).unwrap_or(u16::MAX);
    (0..capacity).find(|idx| !occupied.contains(idx))
}

#[cfg(test)]
mod tests {
    use hexfield_ledger::{Inventory, PlayerLedger};
    use hexfield_types::PlayerId;
    use rust_decimal_macros::dec;

    use super::*;

    fn player(level: u32, lines: &[(ItemKind, u64)]) -> PlayerState {
        let id = PlayerId::new();
        let mut ledger = PlayerLedger::new(id, 0, 0);
        ledger.level = level;
        PlayerState::new(ledger, Inventory::from_lines(id, lines.iter().copied()))
    }

    fn request(inputs: &BTreeMap<ItemKind, u32>, duration: Option<i64>) -> StartRequest<'_> {
        StartRequest {
            site: "factory",
            in_flight: 0,
            capacity: 2,
            inputs,
            duration_seconds: duration,
            site_multiplier: Some(Decimal::ONE),
        }
    }

    #[test]
    fn missing_input_fails_and_leaves_inventory_unchanged() {
        let mut p = player(1, &[]);
        let inputs = BTreeMap::from([(ItemKind::Seed(1), 3)]);
        let result = start_task(&mut p, &request(&inputs, Some(180)), &ProgressionRules::default(), Utc::now());
        assert_eq!(
            result.map_err(|e| e.to_string()),
            Err("not enough seed:1: required 3, available 0".to_owned())
        );
        assert!(!p.inventory.is_dirty());
    }

    #[test]
    fn multi_input_shortfall_consumes_nothing() {
        let mut p = player(1, &[(ItemKind::Crop(1), 5), (ItemKind::Crop(2), 1)]);
        let inputs = BTreeMap::from([(ItemKind::Crop(1), 2), (ItemKind::Crop(2), 2)]);
        let result = start_task(&mut p, &request(&inputs, Some(60)), &ProgressionRules::default(), Utc::now());
        assert!(result.is_err());
        assert_eq!(p.inventory.quantity(ItemKind::Crop(1)), 5);
    }

    #[test]
    fn capacity_is_checked_before_inputs() {
        let mut p = player(1, &[]);
        let inputs = BTreeMap::from([(ItemKind::Seed(1), 3)]);
        let mut req = request(&inputs, Some(60));
        req.in_flight = 2;
        let result = start_task(&mut p, &req, &ProgressionRules::default(), Utc::now());
        assert!(matches!(result, Err(GameError::CapacityFull { in_flight: 2, capacity: 2, .. })));
    }

    #[test]
    fn null_or_zero_duration_is_malformed_and_debits_nothing() {
        let mut p = player(1, &[(ItemKind::Crop(1), 5)]);
        let inputs = BTreeMap::from([(ItemKind::Crop(1), 2)]);
        for duration in [None, Some(0), Some(-5)] {
            let result = start_task(&mut p, &request(&inputs, duration), &ProgressionRules::default(), Utc::now());
            assert!(matches!(result, Err(GameError::Malformed { .. })), "{duration:?}");
        }
        assert_eq!(p.inventory.quantity(ItemKind::Crop(1)), 5);
    }

    #[test]
    fn three_minute_job_round_trip() {
        let mut p = player(1, &[(ItemKind::Crop(1), 4)]);
        let rules = ProgressionRules::default();
        let inputs = BTreeMap::from([(ItemKind::Crop(1), 3)]);
        let now = Utc::now();
        let times = start_task(&mut p, &request(&inputs, Some(180)), &rules, now);
        let times = times.unwrap_or(TaskTimes {
            started_at: now,
            completes_at: now,
        });
        assert_eq!(times.completes_at, now + TimeDelta::seconds(180));
        assert_eq!(p.inventory.quantity(ItemKind::Crop(1)), 1);

        let outputs = Bundle::of_items(BTreeMap::from([(ItemKind::Craftable(200), 1)]));
        let early = collect_task(&mut p, times.completes_at, &outputs, 0, &BoostSet::none(), &rules, now + TimeDelta::seconds(179));
        assert_eq!(
            early,
            Err(GameError::NotReady {
                ready_at: times.completes_at
            })
        );
        assert_eq!(p.inventory.quantity(ItemKind::Craftable(200)), 0);

        let late = collect_task(&mut p, times.completes_at, &outputs, 0, &BoostSet::none(), &rules, now + TimeDelta::seconds(180));
        assert!(late.is_ok());
        assert_eq!(p.inventory.quantity(ItemKind::Craftable(200)), 1);
        assert_eq!(p.inventory.changes().get(&ItemKind::Crop(1)).copied(), Some(-3));
    }

    #[test]
    fn multipliers_shorten_and_floor() {
        let now = Utc::now();
        let at = |l, s| completion_time(now, Some(300), l, s).ok();
        assert_eq!(at(Some(dec!(1.5)), Some(dec!(2))), Some(now + TimeDelta::seconds(100)));
        assert_eq!(at(None, Some(Decimal::ZERO)), Some(now + TimeDelta::seconds(300)));
        assert_eq!(at(Some(dec!(-1)), None), Some(now + TimeDelta::seconds(300)));
        // 300 / 1.3 = 230.77 -> 231
        assert_eq!(at(Some(dec!(1.3)), None), Some(now + TimeDelta::seconds(231)));
    }

    #[test]
    fn shorten_never_goes_past_now() {
        let now = Utc::now();
        let due = now + TimeDelta::seconds(100);
        assert_eq!(shorten(due, now, 30), now + TimeDelta::seconds(70));
        assert_eq!(shorten(due, now, 500), now);
        let overdue = now - TimeDelta::seconds(10);
        assert_eq!(shorten(overdue, now, 30), overdue);
    }

    #[test]
    fn free_slot_picks_lowest_gap() {
        assert_eq!(free_slot_index(&[0, 2], 4), Some(1));
        assert_eq!(free_slot_index(&[0, 1], 2), None);
        assert_eq!(free_slot_index(&[], 0), None);
    }
}
