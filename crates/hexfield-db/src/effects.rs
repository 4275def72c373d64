//! Best-effort progress side effects.
//!
//! A procedure collects what happened into [`Effects`] while it runs and,
//! after its transaction commits, hands them to [`Game::fan_out`]. Fan-out
//! runs in transactions of its own; a failure there is logged and dropped,
//! never reported to the caller of the operation that produced it.

use std::collections::BTreeMap;

use hexfield_engine::progress::{ProgressEvent, events_for_items};
use hexfield_types::{Awarded, ConditionType, ItemKind, PlayerId};

use crate::procedures::Game;

/// Side effects recorded by one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Effects {
    events: Vec<ProgressEvent>,
    produced: BTreeMap<ItemKind, u32>,
}

impl Effects {
    /// No side effects.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one event.
    pub fn event(&mut self, event: ProgressEvent) -> &mut Self {
        self.events.push(event);
        self
    }

    /// Count every credited item under `condition`, plus a level reached.
    pub fn awarded(&mut self, condition: ConditionType, awarded: &Awarded) -> &mut Self {
        let items = stacks(awarded);
        self.events.extend(events_for_items(condition, &items));
        self.level(awarded)
    }

    /// Count a level reached, when the award raised the level.
    pub fn level(&mut self, awarded: &Awarded) -> &mut Self {
        if let Some(level) = awarded.levels_gained.and(awarded.level) {
            self.events
                .push(ProgressEvent::plain(ConditionType::ReachLevel, u64::from(level)));
        }
        self
    }

    /// Offer the credited items to the player's coven `produce` objectives.
    pub fn produced(&mut self, awarded: &Awarded) -> &mut Self {
        for (item, quantity) in stacks(awarded) {
            let line = self.produced.entry(item).or_insert(0);
            *line = line.saturating_add(quantity);
        }
        self
    }

    /// Whether there is nothing to fan out.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.produced.is_empty()
    }
}

fn stacks(awarded: &Awarded) -> BTreeMap<ItemKind, u32> {
    awarded.items.iter().map(|s| (s.item, s.quantity)).collect()
}

impl Game {
    /// Apply recorded side effects for `player`. Failures are logged at
    /// `warn` and swallowed.
    pub async fn fan_out(&self, player: PlayerId, effects: Effects) {
        if effects.is_empty() {
            return;
        }
        let Effects { mut events, produced } = effects;

        for (item, quantity) in produced {
            match self.contribute_produced(player, item, quantity).await {
                Ok(counted) if counted > 0 => {
                    events.push(ProgressEvent {
                        condition: ConditionType::Contribute,
                        item: Some(item),
                        amount: u64::from(counted),
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(player = %player, item = %item, error = %e, "coven produce contribution failed");
                }
            }
        }

        if let Err(e) = self.record_progress(player, &events).await {
            tracing::warn!(player = %player, events = events.len(), error = %e, "progress update failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use hexfield_types::ItemStack;

    use super::*;

    fn harvest_award(levels_gained: Option<u32>) -> Awarded {
        Awarded {
            xp: Some(20),
            items: vec![ItemStack {
                item: ItemKind::Crop(1),
                quantity: 4,
            }],
            levels_gained,
            level: levels_gained.map(|l| l.saturating_add(1)),
            ..Awarded::default()
        }
    }

    #[test]
    fn awarded_items_become_events() {
        let mut effects = Effects::new();
        effects.awarded(ConditionType::Harvest, &harvest_award(None));
        assert_eq!(
            effects.events,
            vec![ProgressEvent {
                condition: ConditionType::Harvest,
                item: Some(ItemKind::Crop(1)),
                amount: 4,
            }]
        );
        assert!(effects.produced.is_empty());
    }

    #[test]
    fn level_up_adds_reach_level() {
        let mut effects = Effects::new();
        effects.awarded(ConditionType::Harvest, &harvest_award(Some(1)));
        assert_eq!(
            effects.events.last(),
            Some(&ProgressEvent::plain(ConditionType::ReachLevel, 2))
        );
    }

    #[test]
    fn produced_items_accumulate() {
        let mut effects = Effects::new();
        effects.produced(&harvest_award(None)).produced(&harvest_award(None));
        assert_eq!(effects.produced.get(&ItemKind::Crop(1)), Some(&8));
        assert!(!effects.is_empty());
    }
}
