//! The mutable per-player state one operation works on.

use std::collections::BTreeMap;

use hexfield_ledger::{Inventory, PlayerLedger, ProgressionRules, progression};
use hexfield_types::{Awarded, Bundle, ItemKind, ItemStack, PlayerId};

use crate::boosts::BoostSet;
use crate::error::GameError;

/// A player's ledger plus the inventory lines an operation loaded.
///
/// The state is a snapshot. Storage writes back only what changed: the
/// currency difference against the opening balances, the inventory's
/// [`changes`](Inventory::changes) and the experience granted, which is
/// re-applied to the stored level under its row lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    /// Currency, experience and level.
    pub ledger: PlayerLedger,
    /// Loaded inventory lines with their pending changes.
    pub inventory: Inventory,
    opening_crystals: u64,
    opening_gems: u64,
    xp_granted: u64,
    xp_rules: Option<ProgressionRules>,
}

impl PlayerState {
    /// Pair a ledger with an inventory view.
    pub fn new(ledger: PlayerLedger, inventory: Inventory) -> Self {
        Self {
            opening_crystals: ledger.crystals,
            opening_gems: ledger.gems,
            ledger,
            inventory,
            xp_granted: 0,
            xp_rules: None,
        }
    }

    /// The owning player.
    pub const fn player_id(&self) -> PlayerId {
        self.ledger.player_id
    }

    /// Current level.
    pub const fn level(&self) -> u32 {
        self.ledger.level
    }

    /// Grant XP through the progression engine.
    pub fn grant_xp(&mut self, amount: u64, rules: &ProgressionRules) -> Result<u32, GameError> {
        let gained = progression::grant_xp(&mut self.ledger, amount, rules)?;
        self.xp_granted = self.xp_granted.saturating_add(amount);
        if amount > 0 {
            self.xp_rules = Some(rules.clone());
        }
        Ok(gained)
    }

    /// Net crystal change since the state was loaded.
    pub fn crystal_change(&self) -> i128 {
        i128::from(self.ledger.crystals) - i128::from(self.opening_crystals)
    }

    /// Net gem change since the state was loaded.
    pub fn gem_change(&self) -> i128 {
        i128::from(self.ledger.gems) - i128::from(self.opening_gems)
    }

    /// Experience granted since the state was loaded, with the rules it was
    /// granted under. `None` when nothing was granted.
    pub fn xp_grant(&self) -> Option<(u64, &ProgressionRules)> {
        self.xp_rules
            .as_ref()
            .filter(|_| self.xp_granted > 0)
            .map(|rules| (self.xp_granted, rules))
    }

    /// Credit a bundle plus `extra_xp`, applying boosts to crystals and XP.
    pub fn credit_bundle(
        &mut self,
        bundle: &Bundle,
        extra_xp: u64,
        boosts: &BoostSet,
        rules: &ProgressionRules,
    ) -> Result<Awarded, GameError> {
        let crystals = boosts.crystals(bundle.crystals);
        let xp = boosts.xp(bundle.xp.saturating_add(extra_xp));
        self.ledger.credit_crystals(crystals)?;
        self.ledger.credit_gems(bundle.gems)?;
        self.inventory.credit_all(&bundle.items)?;
        let levels_gained = self.grant_xp(xp, rules)?;
        Ok(awarded(crystals, bundle.gems, xp, &bundle.items, levels_gained, self.level()))
    }

    /// Debit every item, or none of them.
    pub fn debit_items(&mut self, items: &BTreeMap<ItemKind, u32>) -> Result<(), GameError> {
        Ok(self.inventory.debit_all(items)?)
    }
}

/// Assemble an [`Awarded`] payload, leaving zero sections absent.
pub fn awarded(
    crystals: u64,
    gems: u64,
    xp: u64,
    items: &BTreeMap<ItemKind, u32>,
    levels_gained: u32,
    level: u32,
) -> Awarded {
    let nonzero = |v: u64| (v > 0).then_some(v);
    Awarded {
        crystals: nonzero(crystals),
        gems: nonzero(gems),
        xp: nonzero(xp),
        items: ItemStack::from_map(items),
        levels_gained: (levels_gained > 0).then_some(levels_gained),
        level: (levels_gained > 0).then_some(level),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hexfield_ledger::Inventory;

    use super::*;

    #[test]
    fn credit_bundle_reports_level_ups() {
        let id = PlayerId::new();
        let mut state = PlayerState::new(PlayerLedger::new(id, 0, 0), Inventory::new(id));
        let bundle = Bundle {
            crystals: 10,
            gems: 0,
            xp: 900,
            items: BTreeMap::from([(ItemKind::Crop(2), 3)]),
        };
        let awarded = state.credit_bundle(&bundle, 150, &BoostSet::none(), &ProgressionRules::default());
        let awarded = awarded.unwrap();
        assert_eq!(awarded.crystals, Some(10));
        assert_eq!(awarded.gems, None);
        assert_eq!(awarded.xp, Some(1050));
        assert_eq!(awarded.levels_gained, Some(1));
        assert_eq!(awarded.level, Some(2));
        assert_eq!(state.inventory.quantity(ItemKind::Crop(2)), 3);
        assert_eq!(state.ledger.experience, 50);
        assert_eq!(state.crystal_change(), 10);
        assert_eq!(state.gem_change(), 0);
        assert_eq!(state.xp_grant().map(|(xp, _)| xp), Some(1050));
    }

    #[test]
    fn changes_are_measured_from_the_opening_balances() {
        let id = PlayerId::new();
        let mut state = PlayerState::new(PlayerLedger::new(id, 500, 7), Inventory::new(id));
        assert!(state.ledger.debit_crystals(120).is_ok());
        assert!(state.ledger.credit_gems(3).is_ok());
        assert_eq!(state.crystal_change(), -120);
        assert_eq!(state.gem_change(), 3);
        assert_eq!(state.xp_grant(), None);
    }
}
