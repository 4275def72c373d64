//! Inventory store view.
//!
//! An [`Inventory`] holds the quantities of the lines an operation locked
//! plus the net change it made to every line it touched. The persistence
//! layer applies [`Inventory::changes`] as increments, so credits to lines
//! that were never loaded (and therefore never locked) cannot lose a
//! concurrent update.
//!
//! Multi-input debits go through [`Inventory::debit_all`], which checks
//! every input before touching any of them.

use std::collections::BTreeMap;

use hexfield_types::{ItemKind, PlayerId};

use crate::LedgerError;

/// Quantities of (a subset of) one player's inventory lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    owner: PlayerId,
    lines: BTreeMap<ItemKind, u64>,
    changes: BTreeMap<ItemKind, i64>,
}

impl Inventory {
    /// An empty view.
    pub const fn new(owner: PlayerId) -> Self {
        Self {
            owner,
            lines: BTreeMap::new(),
            changes: BTreeMap::new(),
        }
    }

    /// A view over already-loaded lines. Zero lines are dropped.
    pub fn from_lines(owner: PlayerId, lines: impl IntoIterator<Item = (ItemKind, u64)>) -> Self {
        Self {
            owner,
            lines: lines.into_iter().filter(|(_, q)| *q > 0).collect(),
            changes: BTreeMap::new(),
        }
    }

    /// The player owning these lines.
    pub const fn owner(&self) -> PlayerId {
        self.owner
    }

    /// Current quantity of an item (zero when absent).
    pub fn quantity(&self, item: ItemKind) -> u64 {
        self.lines.get(&item).copied().unwrap_or(0)
    }

    /// Whether at least `amount` units are held.
    pub fn has(&self, item: ItemKind, amount: u64) -> bool {
        self.quantity(item) >= amount
    }

    /// All non-zero lines.
    pub const fn lines(&self) -> &BTreeMap<ItemKind, u64> {
        &self.lines
    }

    /// Net change per touched line since the view was loaded.
    pub const fn changes(&self) -> &BTreeMap<ItemKind, i64> {
        &self.changes
    }

    /// Whether any line changed.
    pub fn is_dirty(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Check that every requirement is met, reporting the first shortfall.
    pub fn ensure_all(&self, required: &BTreeMap<ItemKind, u32>) -> Result<(), LedgerError> {
        for (item, amount) in required {
            let amount = u64::from(*amount);
            let available = self.quantity(*item);
            if available < amount {
                return Err(LedgerError::InsufficientItem {
                    item: *item,
                    required: amount,
                    available,
                });
            }
        }
        Ok(())
    }

    /// Add units of an item.
    pub fn credit(&mut self, item: ItemKind, amount: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Ok(());
        }
        let current = self.quantity(item);
        let next = current
            .checked_add(amount)
            .ok_or_else(|| LedgerError::overflow(format!("inventory line {item}")))?;
        self.record_change(item, amount, true)?;
        self.lines.insert(item, next);
        Ok(())
    }

    /// Remove units of an item. The line disappears when it reaches zero.
    pub fn debit(&mut self, item: ItemKind, amount: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Ok(());
        }
        let available = self.quantity(item);
        let remaining = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientItem {
                item,
                required: amount,
                available,
            })?;
        self.record_change(item, amount, false)?;
        if remaining == 0 {
            self.lines.remove(&item);
        } else {
            self.lines.insert(item, remaining);
        }
        Ok(())
    }

    /// Debit several items at once: all requirements are checked first, so
    /// a shortfall leaves every line untouched.
    pub fn debit_all(&mut self, required: &BTreeMap<ItemKind, u32>) -> Result<(), LedgerError> {
        self.ensure_all(required)?;
        for (item, amount) in required {
            self.debit(*item, u64::from(*amount))?;
        }
        Ok(())
    }

    /// Credit several items.
    pub fn credit_all(&mut self, items: &BTreeMap<ItemKind, u32>) -> Result<(), LedgerError> {
        for (item, amount) in items {
            self.credit(*item, u64::from(*amount))?;
        }
        Ok(())
    }

    fn record_change(&mut self, item: ItemKind, amount: u64, credit: bool) -> Result<(), LedgerError> {
        let delta = i64::try_from(amount)
            .map_err(|e| LedgerError::overflow(format!("change amount for {item}: {e}")))?;
        let entry = self.changes.entry(item).or_insert(0);
        let next = if credit {
            entry.checked_add(delta)
        } else {
            entry.checked_sub(delta)
        }
        .ok_or_else(|| LedgerError::overflow(format!("net change for {item}")))?;
        if next == 0 {
            self.changes.remove(&item);
        } else {
            *entry = next;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory(lines: &[(ItemKind, u64)]) -> Inventory {
        Inventory::from_lines(PlayerId::new(), lines.iter().copied())
    }

    #[test]
    fn absent_line_reads_as_zero() {
        let inv = inventory(&[]);
        assert_eq!(inv.quantity(ItemKind::Crop(1)), 0);
        assert!(inv.has(ItemKind::Crop(1), 0));
        assert!(!inv.has(ItemKind::Crop(1), 1));
    }

    #[test]
    fn zero_lines_are_pruned_on_load() {
        let inv = inventory(&[(ItemKind::Crop(1), 0), (ItemKind::Crop(2), 4)]);
        assert_eq!(inv.lines().len(), 1);
    }

    #[test]
    fn debit_to_zero_removes_line_and_records_change() {
        let mut inv = inventory(&[(ItemKind::Seed(1), 2)]);
        assert!(inv.debit(ItemKind::Seed(1), 2).is_ok());
        assert!(inv.lines().is_empty());
        assert_eq!(inv.changes().get(&ItemKind::Seed(1)).copied(), Some(-2));
    }

    #[test]
    fn insufficient_debit_reports_numbers() {
        let mut inv = inventory(&[(ItemKind::Seed(1), 3)]);
        assert_eq!(
            inv.debit(ItemKind::Seed(1), 5),
            Err(LedgerError::InsufficientItem {
                item: ItemKind::Seed(1),
                required: 5,
                available: 3,
            })
        );
        assert_eq!(inv.quantity(ItemKind::Seed(1)), 3);
        assert!(!inv.is_dirty());
    }

    #[test]
    fn debit_all_is_all_or_nothing() {
        let mut inv = inventory(&[(ItemKind::Crop(1), 10), (ItemKind::Crop(2), 1)]);
        let required = BTreeMap::from([(ItemKind::Crop(1), 3), (ItemKind::Crop(2), 2)]);
        let result = inv.debit_all(&required);
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientItem { required: 2, available: 1, .. })
        ));
        // The first input was not consumed.
        assert_eq!(inv.quantity(ItemKind::Crop(1)), 10);
        assert!(!inv.is_dirty());
    }

    #[test]
    fn credit_then_debit_nets_out() {
        let mut inv = inventory(&[]);
        assert!(inv.credit(ItemKind::Ore(3), 4).is_ok());
        assert!(inv.debit(ItemKind::Ore(3), 4).is_ok());
        assert!(!inv.is_dirty());
    }

    #[test]
    fn net_change_accumulates() {
        let mut inv = inventory(&[(ItemKind::Crop(1), 5)]);
        assert!(inv.debit(ItemKind::Crop(1), 3).is_ok());
        assert!(inv.credit(ItemKind::Crop(1), 10).is_ok());
        assert_eq!(inv.changes().get(&ItemKind::Crop(1)).copied(), Some(7));
        assert_eq!(inv.quantity(ItemKind::Crop(1)), 12);
    }
}
