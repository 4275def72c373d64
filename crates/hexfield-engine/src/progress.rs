//! Achievement and quest progress.
//!
//! Both are counters over game events: a definition names a
//! [`ConditionType`], an optional item filter and a target. Events are
//! emitted after an operation commits; applying them is best effort and a
//! lost event never rolls back the operation that produced it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use hexfield_ledger::ProgressionRules;
use hexfield_types::{Awarded, ConditionType, ItemKind};

use crate::boosts::BoostSet;
use crate::catalog::ProgressDefinition;
use crate::error::GameError;
use crate::state::PlayerState;

/// Something that happened which progress definitions may count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Kind of event.
    pub condition: ConditionType,
    /// Item involved, when there is one.
    pub item: Option<ItemKind>,
    /// Units counted (for `ReachLevel`, the level reached).
    pub amount: u64,
}

impl ProgressEvent {
    /// An event without an item.
    pub const fn plain(condition: ConditionType, amount: u64) -> Self {
        Self {
            condition,
            item: None,
            amount,
        }
    }
}

/// One event per item line.
pub fn events_for_items(condition: ConditionType, items: &BTreeMap<ItemKind, u32>) -> Vec<ProgressEvent> {
    items
        .iter()
        .filter(|(_, q)| **q > 0)
        .map(|(item, quantity)| ProgressEvent {
            condition,
            item: Some(*item),
            amount: u64::from(*quantity),
        })
        .collect()
}

/// A player's progress on one definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressState {
    /// Counter, capped at the target.
    pub progress: u64,
    /// When the target was reached.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the reward was claimed.
    pub claimed_at: Option<DateTime<Utc>>,
}

/// Whether `event` counts toward `definition`.
pub fn matches(definition: &ProgressDefinition, event: &ProgressEvent) -> bool {
    definition.condition == event.condition
        && definition
            .item_filter
            .is_none_or(|wanted| event.item == Some(wanted))
}

/// Whether `definition` is offered at `level`.
pub const fn offered(definition: &ProgressDefinition, level: u32) -> bool {
    level >= definition.min_level
}

/// Fold an event into a state. Returns `true` when this event completed it.
pub fn apply_event(
    definition: &ProgressDefinition,
    state: &mut ProgressState,
    event: &ProgressEvent,
    now: DateTime<Utc>,
) -> bool {
    if state.completed_at.is_some() || !matches(definition, event) {
        return false;
    }
    let next = match definition.condition {
        ConditionType::ReachLevel => state.progress.max(event.amount),
        _ => state.progress.saturating_add(event.amount),
    };
    state.progress = next.min(definition.target);
    if state.progress >= definition.target {
        state.completed_at = Some(now);
        return true;
    }
    false
}

/// Claim the reward of a completed definition.
pub fn claim(
    player: &mut PlayerState,
    definition: &ProgressDefinition,
    state: &mut ProgressState,
    rules: &ProgressionRules,
    now: DateTime<Utc>,
) -> Result<Awarded, GameError> {
    if state.claimed_at.is_some() {
        return Err(GameError::terminal(definition.name.clone(), "claimed"));
    }
    if state.completed_at.is_none() {
        return Err(GameError::Precondition(format!(
            "{} is not complete: {} of {}",
            definition.name, state.progress, definition.target
        )));
    }
    let awarded = player.credit_bundle(&definition.reward, 0, &BoostSet::none(), rules)?;
    state.claimed_at = Some(now);
    tracing::info!(player = %player.player_id(), definition = definition.id, "progress reward claimed");
    Ok(awarded)
}

#[cfg(test)]
mod tests {
    use hexfield_ledger::{Inventory, PlayerLedger};
    use hexfield_types::{Bundle, PlayerId};

    use super::*;

    fn definition(condition: ConditionType, filter: Option<ItemKind>, target: u64) -> ProgressDefinition {
        ProgressDefinition {
            id: 7,
            name: "Green thumb".into(),
            condition,
            item_filter: filter,
            target,
            reward: Bundle {
                crystals: 25,
                ..Bundle::default()
            },
            min_level: 1,
        }
    }

    #[test]
    fn filtered_definitions_ignore_other_items() {
        let def = definition(ConditionType::Harvest, Some(ItemKind::Crop(1)), 10);
        let mut state = ProgressState::default();
        let now = Utc::now();
        let items = BTreeMap::from([(ItemKind::Crop(1), 4), (ItemKind::Crop(2), 9)]);
        for event in events_for_items(ConditionType::Harvest, &items) {
            apply_event(&def, &mut state, &event, now);
        }
        assert_eq!(state.progress, 4);
        assert!(state.completed_at.is_none());
    }

    #[test]
    fn progress_caps_at_target_and_completes_once() {
        let def = definition(ConditionType::Sell, None, 5);
        let mut state = ProgressState::default();
        let now = Utc::now();
        let event = ProgressEvent::plain(ConditionType::Sell, 8);
        assert!(apply_event(&def, &mut state, &event, now));
        assert_eq!(state.progress, 5);
        assert!(!apply_event(&def, &mut state, &event, now));
    }

    #[test]
    fn reach_level_takes_the_maximum() {
        let def = definition(ConditionType::ReachLevel, None, 10);
        let mut state = ProgressState::default();
        let now = Utc::now();
        apply_event(&def, &mut state, &ProgressEvent::plain(ConditionType::ReachLevel, 4), now);
        apply_event(&def, &mut state, &ProgressEvent::plain(ConditionType::ReachLevel, 3), now);
        assert_eq!(state.progress, 4);
    }

    #[test]
    fn claim_requires_completion_and_happens_once() {
        let def = definition(ConditionType::Build, None, 1);
        let rules = ProgressionRules::default();
        let id = PlayerId::new();
        let mut player = PlayerState::new(PlayerLedger::new(id, 0, 0), Inventory::new(id));
        let mut state = ProgressState::default();
        let now = Utc::now();
        assert!(matches!(
            claim(&mut player, &def, &mut state, &rules, now),
            Err(GameError::Precondition(_))
        ));
        apply_event(&def, &mut state, &ProgressEvent::plain(ConditionType::Build, 1), now);
        assert!(claim(&mut player, &def, &mut state, &rules, now).is_ok());
        assert_eq!(player.ledger.crystals, 25);
        assert!(matches!(
            claim(&mut player, &def, &mut state, &rules, now),
            Err(GameError::AlreadyTerminal { .. })
        ));
    }
}
