//! Progression engine: XP grants, level-up evaluation and level unlocks.
//!
//! Everything here is a pure function of the ledger and the
//! [`ProgressionRules`] loaded from configuration.
//!
//! # Level-up
//!
//! The threshold for leaving level `L` is `L × xp_per_level`. A grant adds
//! to experience and then loops: while `experience >= threshold(level)`,
//! subtract the threshold and increment the level. One grant can cross
//! several levels, and afterwards `experience < threshold(level)` holds.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::{LedgerError, PlayerLedger};

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Tunable progression constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionRules {
    /// XP per level step: leaving level `L` costs `L × xp_per_level`.
    pub xp_per_level: u64,
    /// Production speed bonus per player level.
    pub speed_bonus_per_level: Decimal,
    /// Levels beyond this add no further speed bonus.
    pub speed_bonus_level_cap: u32,
    /// Upper bound on the level speed multiplier.
    pub max_speed_multiplier: Decimal,
    /// Building cost discount per player level.
    pub discount_per_level: Decimal,
    /// Upper bound on the building cost discount.
    pub max_discount: Decimal,
    /// Player levels needed per building upgrade level.
    pub levels_per_building_level: u32,
}

impl Default for ProgressionRules {
    fn default() -> Self {
        Self {
            xp_per_level: 1000,
            speed_bonus_per_level: Decimal::new(1, 2),
            speed_bonus_level_cap: 50,
            max_speed_multiplier: Decimal::new(15, 1),
            discount_per_level: Decimal::new(5, 3),
            max_discount: Decimal::new(25, 2),
            levels_per_building_level: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// XP and levels
// ---------------------------------------------------------------------------

/// XP needed to leave `level`.
pub fn level_threshold(level: u32, rules: &ProgressionRules) -> Result<u64, LedgerError> {
    if rules.xp_per_level == 0 {
        return Err(LedgerError::InvalidRule("xp_per_level must be positive"));
    }
    u64::from(level)
        .checked_mul(rules.xp_per_level)
        .ok_or_else(|| LedgerError::overflow(format!("level threshold for level {level}")))
}

/// Add experience and re-evaluate the level. Returns the levels gained.
pub fn grant_xp(
    ledger: &mut PlayerLedger,
    amount: u64,
    rules: &ProgressionRules,
) -> Result<u32, LedgerError> {
    let experience = ledger
        .experience
        .checked_add(amount)
        .ok_or_else(|| LedgerError::overflow("experience"))?;
    ledger.experience = experience;
    let gained = evaluate_level_up(ledger, rules)?;
    if gained > 0 {
        tracing::info!(
            player = %ledger.player_id,
            level = ledger.level,
            gained,
            "player levelled up"
        );
    }
    Ok(gained)
}

/// Apply every level-up the current experience allows. Idempotent: a
/// ledger already below its threshold is left unchanged.
pub fn evaluate_level_up(
    ledger: &mut PlayerLedger,
    rules: &ProgressionRules,
) -> Result<u32, LedgerError> {
    if ledger.level == 0 {
        ledger.level = 1;
    }
    let mut gained: u32 = 0;
    loop {
        let threshold = level_threshold(ledger.level, rules)?;
        if ledger.experience < threshold {
            break;
        }
        ledger.experience = ledger.experience.saturating_sub(threshold);
        ledger.level = ledger
            .level
            .checked_add(1)
            .ok_or_else(|| LedgerError::overflow("level"))?;
        gained = gained.saturating_add(1);
    }
    Ok(gained)
}

// ---------------------------------------------------------------------------
// Level-derived unlocks
// ---------------------------------------------------------------------------

/// Production speed multiplier for a player level:
/// `1 + min(level - 1, cap) × bonus`, capped at `max_speed_multiplier` and
/// never below 1. Level 1 is the 1.00× baseline.
pub fn speed_multiplier(level: u32, rules: &ProgressionRules) -> Decimal {
    let effective = Decimal::from(level.saturating_sub(1).min(rules.speed_bonus_level_cap));
    let multiplier = rules
        .speed_bonus_per_level
        .checked_mul(effective)
        .and_then(|bonus| Decimal::ONE.checked_add(bonus))
        .unwrap_or(rules.max_speed_multiplier);
    multiplier.min(rules.max_speed_multiplier).max(Decimal::ONE)
}

/// Building cost discount fraction for a player level, in `[0, max_discount]`.
pub fn building_discount(level: u32, rules: &ProgressionRules) -> Decimal {
    rules
        .discount_per_level
        .checked_mul(Decimal::from(level))
        .unwrap_or(rules.max_discount)
        .min(rules.max_discount)
        .max(Decimal::ZERO)
}

/// `base_cost × (1 − discount)`, floored to a whole crystal.
pub fn discounted_cost(base_cost: u64, level: u32, rules: &ProgressionRules) -> u64 {
    let factor = Decimal::ONE
        .checked_sub(building_discount(level, rules))
        .unwrap_or(Decimal::ONE);
    Decimal::from(base_cost)
        .checked_mul(factor)
        .and_then(|cost| cost.floor().to_u64())
        .unwrap_or(base_cost)
}

/// Highest building level a player may upgrade to: one level per
/// `levels_per_building_level` player levels, bounded by the type maximum.
pub fn max_building_level(player_level: u32, type_max_level: u32, rules: &ProgressionRules) -> u32 {
    let per = rules.levels_per_building_level.max(1);
    player_level
        .checked_div(per)
        .unwrap_or(0)
        .saturating_add(1)
        .min(type_max_level.max(1))
}

#[cfg(test)]
mod tests {
    use hexfield_types::PlayerId;
    use rust_decimal_macros::dec;

    use super::*;

    fn fresh() -> PlayerLedger {
        PlayerLedger::new(PlayerId::new(), 0, 0)
    }

    #[test]
    fn small_grant_does_not_level() {
        let mut l = fresh();
        let rules = ProgressionRules::default();
        assert_eq!(grant_xp(&mut l, 999, &rules), Ok(0));
        assert_eq!(l.level, 1);
        assert_eq!(l.experience, 999);
    }

    #[test]
    fn exact_threshold_levels_up() {
        let mut l = fresh();
        let rules = ProgressionRules::default();
        assert_eq!(grant_xp(&mut l, 1000, &rules), Ok(1));
        assert_eq!(l.level, 2);
        assert_eq!(l.experience, 0);
    }

    #[test]
    fn one_grant_crosses_several_levels() {
        let mut l = fresh();
        let rules = ProgressionRules::default();
        // 1000 (L1) + 2000 (L2) + 3000 (L3) = 6000, plus 10 residual.
        assert_eq!(grant_xp(&mut l, 6010, &rules), Ok(3));
        assert_eq!(l.level, 4);
        assert_eq!(l.experience, 10);
    }

    #[test]
    fn residual_is_always_below_threshold() {
        let mut l = fresh();
        let rules = ProgressionRules::default();
        let mut last_level = l.level;
        for grant in [5, 700, 1300, 4000, 12_345, 1, 99_999] {
            assert!(grant_xp(&mut l, grant, &rules).is_ok());
            assert!(l.level >= last_level);
            let threshold = level_threshold(l.level, &rules).unwrap_or(0);
            assert!(l.experience < threshold);
            last_level = l.level;
        }
    }

    #[test]
    fn re_evaluation_is_idempotent() {
        let mut l = fresh();
        let rules = ProgressionRules::default();
        assert!(grant_xp(&mut l, 2500, &rules).is_ok());
        let snapshot = l.clone();
        assert_eq!(evaluate_level_up(&mut l, &rules), Ok(0));
        assert_eq!(l, snapshot);
    }

    #[test]
    fn zero_xp_per_level_is_rejected() {
        let mut l = fresh();
        let rules = ProgressionRules {
            xp_per_level: 0,
            ..ProgressionRules::default()
        };
        assert!(matches!(
            grant_xp(&mut l, 10, &rules),
            Err(LedgerError::InvalidRule(_))
        ));
    }

    #[test]
    fn speed_multiplier_grows_then_caps() {
        let rules = ProgressionRules::default();
        assert_eq!(speed_multiplier(0, &rules), dec!(1));
        assert_eq!(speed_multiplier(1, &rules), dec!(1));
        assert_eq!(speed_multiplier(2, &rules), dec!(1.01));
        assert_eq!(speed_multiplier(31, &rules), dec!(1.30));
        assert_eq!(speed_multiplier(51, &rules), dec!(1.50));
        assert_eq!(speed_multiplier(80, &rules), dec!(1.50));
    }

    #[test]
    fn speed_multiplier_respects_lower_cap() {
        let rules = ProgressionRules {
            max_speed_multiplier: dec!(1.2),
            ..ProgressionRules::default()
        };
        assert_eq!(speed_multiplier(40, &rules), dec!(1.2));
    }

    #[test]
    fn discount_floors_cost() {
        let rules = ProgressionRules::default();
        // Level 10: 5% off 999 = 949.05, floored.
        assert_eq!(discounted_cost(999, 10, &rules), 949);
        // Level 100: capped at 25%.
        assert_eq!(discounted_cost(1000, 100, &rules), 750);
        assert_eq!(discounted_cost(0, 10, &rules), 0);
    }

    #[test]
    fn building_level_gate() {
        let rules = ProgressionRules::default();
        assert_eq!(max_building_level(1, 10, &rules), 1);
        assert_eq!(max_building_level(5, 10, &rules), 2);
        assert_eq!(max_building_level(14, 10, &rules), 3);
        assert_eq!(max_building_level(200, 10, &rules), 10);
    }
}
