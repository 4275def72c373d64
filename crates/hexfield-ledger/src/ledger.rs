//! Per-player currency and experience record.
//!
//! A [`PlayerLedger`] is loaded with a row lock, mutated through the checked
//! methods below and written back whole. Callers never assign balances
//! directly.

use serde::{Deserialize, Serialize};

use hexfield_types::PlayerId;

use crate::LedgerError;

/// Crystals, gems, experience and level of one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLedger {
    /// Owning player.
    pub player_id: PlayerId,
    /// Primary currency.
    pub crystals: u64,
    /// Premium currency.
    pub gems: u64,
    /// Experience accumulated towards the next level.
    pub experience: u64,
    /// Current level (starts at 1).
    pub level: u32,
}

impl PlayerLedger {
    /// A fresh level-1 ledger.
    pub const fn new(player_id: PlayerId, crystals: u64, gems: u64) -> Self {
        Self {
            player_id,
            crystals,
            gems,
            experience: 0,
            level: 1,
        }
    }

    /// Whether the player holds at least `amount` crystals.
    pub const fn can_afford(&self, amount: u64) -> bool {
        self.crystals >= amount
    }

    /// Remove crystals. Returns the new balance.
    pub fn debit_crystals(&mut self, amount: u64) -> Result<u64, LedgerError> {
        self.crystals = self
            .crystals
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientCrystals {
                required: amount,
                available: self.crystals,
            })?;
        Ok(self.crystals)
    }

    /// Add crystals. Returns the new balance.
    pub fn credit_crystals(&mut self, amount: u64) -> Result<u64, LedgerError> {
        self.crystals = self
            .crystals
            .checked_add(amount)
            .ok_or_else(|| LedgerError::overflow("crystal balance"))?;
        Ok(self.crystals)
    }

    /// Remove gems. Returns the new balance.
    pub fn debit_gems(&mut self, amount: u64) -> Result<u64, LedgerError> {
        self.gems = self
            .gems
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientGems {
                required: amount,
                available: self.gems,
            })?;
        Ok(self.gems)
    }

    /// Add gems. Returns the new balance.
    pub fn credit_gems(&mut self, amount: u64) -> Result<u64, LedgerError> {
        self.gems = self
            .gems
            .checked_add(amount)
            .ok_or_else(|| LedgerError::overflow("gem balance"))?;
        Ok(self.gems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(crystals: u64) -> PlayerLedger {
        PlayerLedger::new(PlayerId::new(), crystals, 5)
    }

    #[test]
    fn debit_within_balance() {
        let mut l = ledger(100);
        assert_eq!(l.debit_crystals(40), Ok(60));
        assert_eq!(l.crystals, 60);
    }

    #[test]
    fn debit_exact_balance_reaches_zero() {
        let mut l = ledger(100);
        assert_eq!(l.debit_crystals(100), Ok(0));
    }

    #[test]
    fn overdraft_is_rejected_and_balance_unchanged() {
        let mut l = ledger(30);
        assert_eq!(
            l.debit_crystals(31),
            Err(LedgerError::InsufficientCrystals {
                required: 31,
                available: 30
            })
        );
        assert_eq!(l.crystals, 30);
    }

    #[test]
    fn credit_overflow_is_rejected() {
        let mut l = ledger(u64::MAX);
        assert!(l.credit_crystals(1).is_err());
        assert_eq!(l.crystals, u64::MAX);
    }

    #[test]
    fn gems_are_separate() {
        let mut l = ledger(0);
        assert_eq!(l.debit_gems(5), Ok(0));
        assert!(l.debit_gems(1).is_err());
        assert_eq!(l.crystals, 0);
    }
}
