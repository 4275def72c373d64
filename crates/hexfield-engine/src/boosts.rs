//! Temporary output multipliers bought with gems.
//!
//! Boosts are applied at credit time to the crystals and XP a collection
//! pays out. Recipe data is never rewritten with boosted values.

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use hexfield_ledger::PlayerLedger;
use hexfield_types::BoostKind;

use crate::config::BoostConfig;
use crate::error::GameError;

/// One activated boost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveBoost {
    /// What it multiplies.
    pub kind: BoostKind,
    /// Multiplier while active.
    pub multiplier: Decimal,
    /// End of the boost.
    pub expires_at: DateTime<Utc>,
}

impl ActiveBoost {
    /// Whether the boost still applies at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// The combined multipliers in effect for one credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoostSet {
    crystal: Decimal,
    xp: Decimal,
}

impl Default for BoostSet {
    fn default() -> Self {
        Self::none()
    }
}

impl BoostSet {
    /// No boosts.
    pub const fn none() -> Self {
        Self {
            crystal: Decimal::ONE,
            xp: Decimal::ONE,
        }
    }

    /// Multiply together every boost active at `now`. Non-positive
    /// multipliers are ignored.
    pub fn from_active(boosts: &[ActiveBoost], now: DateTime<Utc>) -> Self {
        let mut set = Self::none();
        for boost in boosts.iter().filter(|b| b.is_active(now)) {
            if boost.multiplier <= Decimal::ZERO {
                continue;
            }
            let slot = match boost.kind {
                BoostKind::CrystalYield => &mut set.crystal,
                BoostKind::XpYield => &mut set.xp,
            };
            *slot = slot.checked_mul(boost.multiplier).unwrap_or(*slot);
        }
        set
    }

    /// Boosted crystal amount.
    pub fn crystals(&self, amount: u64) -> u64 {
        apply(amount, self.crystal)
    }

    /// Boosted XP amount.
    pub fn xp(&self, amount: u64) -> u64 {
        apply(amount, self.xp)
    }
}

fn apply(amount: u64, multiplier: Decimal) -> u64 {
    Decimal::from(amount)
        .checked_mul(multiplier)
        .and_then(|v| v.floor().to_u64())
        .unwrap_or(amount)
}

/// Buy a boost. An active boost of the same kind is extended rather than
/// replaced.
pub fn activate(
    ledger: &mut PlayerLedger,
    kind: BoostKind,
    current: Option<&ActiveBoost>,
    config: &BoostConfig,
    now: DateTime<Utc>,
) -> Result<ActiveBoost, GameError> {
    if config.duration_minutes <= 0 {
        return Err(GameError::malformed("boost config", "duration_minutes must be positive"));
    }
    ledger.debit_gems(config.gem_cost)?;
    let from = current
        .filter(|b| b.is_active(now))
        .map_or(now, |b| b.expires_at);
    let expires_at = TimeDelta::try_minutes(config.duration_minutes)
        .and_then(|d| from.checked_add_signed(d))
        .ok_or_else(|| GameError::overflow("boost expiry"))?;
    Ok(ActiveBoost {
        kind,
        multiplier: config.multiplier,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use hexfield_types::PlayerId;
    use rust_decimal_macros::dec;

    use super::*;

    fn boost(kind: BoostKind, multiplier: Decimal, minutes: i64, now: DateTime<Utc>) -> ActiveBoost {
        ActiveBoost {
            kind,
            multiplier,
            expires_at: now + TimeDelta::minutes(minutes),
        }
    }

    #[test]
    fn expired_boosts_are_ignored() {
        let now = Utc::now();
        let set = BoostSet::from_active(&[boost(BoostKind::CrystalYield, dec!(2), -1, now)], now);
        assert_eq!(set.crystals(10), 10);
    }

    #[test]
    fn boosts_multiply_and_floor() {
        let now = Utc::now();
        let set = BoostSet::from_active(
            &[
                boost(BoostKind::CrystalYield, dec!(1.5), 10, now),
                boost(BoostKind::CrystalYield, dec!(2), 10, now),
                boost(BoostKind::XpYield, dec!(1.5), 10, now),
            ],
            now,
        );
        assert_eq!(set.crystals(7), 21);
        assert_eq!(set.xp(5), 7);
    }

    #[test]
    fn activation_costs_gems_and_extends() {
        let now = Utc::now();
        let config = BoostConfig::default();
        let mut ledger = PlayerLedger::new(PlayerId::new(), 0, 25);
        let first = activate(&mut ledger, BoostKind::XpYield, None, &config, now);
        assert!(first.is_ok());
        let first = first.unwrap_or_else(|_| boost(BoostKind::XpYield, dec!(1), 0, now));
        assert_eq!(first.expires_at, now + TimeDelta::minutes(60));

        let second = activate(&mut ledger, BoostKind::XpYield, Some(&first), &config, now);
        assert_eq!(
            second.map(|b| b.expires_at).ok(),
            Some(now + TimeDelta::minutes(120))
        );
        assert_eq!(ledger.gems, 5);

        assert!(activate(&mut ledger, BoostKind::XpYield, None, &config, now).is_err());
        assert_eq!(ledger.gems, 5);
    }
}
