//! Signup: the starting ledger, farm plots and seeds of a new player.

use std::collections::BTreeMap;

use hexfield_ledger::PlayerLedger;
use hexfield_types::{ItemKind, PlayerId};

use crate::config::{EconomyConfig, ProductionConfig};
use crate::error::GameError;

/// Length bounds for display names.
const DISPLAY_NAME_LEN: core::ops::RangeInclusive<usize> = 3..=24;

/// Everything a signup writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlayer {
    /// Validated display name.
    pub display_name: String,
    /// Starting ledger.
    pub ledger: PlayerLedger,
    /// Plot indices to create, all empty.
    pub plots: Vec<u16>,
    /// Starter inventory.
    pub items: BTreeMap<ItemKind, u32>,
}

/// Trim and check a display name: letters, digits, spaces, `_` and `-`.
pub fn validate_display_name(name: &str) -> Result<String, GameError> {
    let trimmed = name.trim();
    if !DISPLAY_NAME_LEN.contains(&trimmed.chars().count()) {
        return Err(GameError::Invalid(format!(
            "display name must be {} to {} characters",
            DISPLAY_NAME_LEN.start(),
            DISPLAY_NAME_LEN.end()
        )));
    }
    if let Some(bad) = trimmed
        .chars()
        .find(|c| !(c.is_alphanumeric() || matches!(c, ' ' | '_' | '-')))
    {
        return Err(GameError::Invalid(format!("display name may not contain {bad:?}")));
    }
    Ok(trimmed.to_owned())
}

/// Build the rows of a fresh account.
pub fn onboard(
    id: PlayerId,
    display_name: &str,
    economy: &EconomyConfig,
    production: &ProductionConfig,
) -> Result<NewPlayer, GameError> {
    let display_name = validate_display_name(display_name)?;
    let items = economy
        .starter_seeds
        .iter()
        .filter(|(_, quantity)| **quantity > 0)
        .map(|(crop, quantity)| (ItemKind::Seed(*crop), *quantity))
        .collect();
    Ok(NewPlayer {
        display_name,
        ledger: PlayerLedger::new(id, economy.starting_crystals, economy.starting_gems),
        plots: (0..production.farm_plots).collect(),
        items,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn display_names_are_trimmed_and_checked() {
        assert_eq!(validate_display_name("  Mira_7 ").ok(), Some("Mira_7".to_owned()));
        assert!(validate_display_name("ab").is_err());
        assert!(validate_display_name("robert'); drop").is_err());
    }

    #[test]
    fn onboarding_uses_configured_defaults() {
        let id = PlayerId::new();
        let fresh = onboard(id, "Fern", &EconomyConfig::default(), &ProductionConfig::default());
        let fresh = fresh.unwrap();
        assert_eq!(fresh.ledger.crystals, 500);
        assert_eq!(fresh.ledger.gems, 10);
        assert_eq!(fresh.ledger.level, 1);
        assert_eq!(fresh.plots, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(fresh.items.get(&ItemKind::Seed(1)).copied(), Some(5));
    }
}
