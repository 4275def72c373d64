//! Skyport delivery orders.
//!
//! Orders are drawn from content templates. An open order can be started
//! (its requirements are loaded onto the airship and debited), discarded, or
//! fulfilled by a friend. A started order is a scheduled task with a fixed
//! number of concurrent delivery slots; collecting it pays the reward.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::IndexedRandom;

use hexfield_types::{Awarded, Bundle, ItemKind, OrderId, OrderTemplateId};

use crate::boosts::BoostSet;
use crate::catalog::OrderTemplate;
use crate::config::GameConfig;
use crate::error::GameError;
use crate::scheduler::{self, StartRequest, TaskTimes};
use crate::state::PlayerState;

/// One order on a player's skyport board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkyportOrder {
    /// Identifier.
    pub id: OrderId,
    /// Template drawn from.
    pub template_id: OrderTemplateId,
    /// Items to deliver.
    pub requirements: BTreeMap<ItemKind, u32>,
    /// Payment on collection.
    pub reward: Bundle,
    /// Flight time in seconds (nullable column).
    pub delivery_seconds: Option<i64>,
    /// When the order appeared.
    pub created_at: DateTime<Utc>,
    /// Delivery timestamps once started.
    pub delivery: Option<TaskTimes>,
}

impl SkyportOrder {
    /// Whether the order is still waiting to be started.
    pub const fn is_open(&self) -> bool {
        self.delivery.is_none()
    }
}

/// Top the board up to `max_open_orders` with random eligible templates.
pub fn generate_orders<R: Rng>(
    on_board: u32,
    templates: &[OrderTemplate],
    player_level: u32,
    config: &GameConfig,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Vec<SkyportOrder> {
    let eligible: Vec<&OrderTemplate> = templates
        .iter()
        .filter(|t| t.min_level <= player_level)
        .collect();
    let missing = config.skyport.max_open_orders.saturating_sub(on_board);
    (0..missing)
        .filter_map(|_| eligible.choose(rng).copied())
        .map(|template| SkyportOrder {
            id: OrderId::new(),
            template_id: template.id,
            requirements: template.requirements.clone(),
            reward: template.reward.clone(),
            delivery_seconds: template.delivery_seconds,
            created_at: now,
            delivery: None,
        })
        .collect()
}

fn ensure_open(order: &SkyportOrder) -> Result<(), GameError> {
    if order.is_open() {
        Ok(())
    } else {
        Err(GameError::terminal(format!("order {}", order.id), "in delivery"))
    }
}

/// Start delivering an open order. `supplier` provides the items: the owner
/// normally, a friend when helping.
pub fn start_delivery(
    supplier: &mut PlayerState,
    order: &SkyportOrder,
    in_delivery: u32,
    config: &GameConfig,
    now: DateTime<Utc>,
) -> Result<TaskTimes, GameError> {
    ensure_open(order)?;
    let times = scheduler::start_task(
        supplier,
        &StartRequest {
            site: "skyport",
            in_flight: in_delivery,
            capacity: config.skyport.delivery_slots,
            inputs: &order.requirements,
            duration_seconds: order.delivery_seconds,
            site_multiplier: None,
        },
        &config.progression,
        now,
    )?;
    tracing::info!(
        supplier = %supplier.player_id(),
        order = %order.id,
        completes_at = %times.completes_at,
        "delivery started"
    );
    Ok(times)
}

/// Collect a landed delivery's reward.
pub fn collect_delivery(
    player: &mut PlayerState,
    order: &SkyportOrder,
    boosts: &BoostSet,
    config: &GameConfig,
    now: DateTime<Utc>,
) -> Result<Awarded, GameError> {
    let delivery = order
        .delivery
        .ok_or_else(|| GameError::Precondition(format!("order {} has not been started", order.id)))?;
    scheduler::collect_task(player, delivery.completes_at, &order.reward, 0, boosts, &config.progression, now)
}

/// Check that an order may be discarded.
pub fn discard(order: &SkyportOrder) -> Result<(), GameError> {
    ensure_open(order)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;
    use hexfield_ledger::{Inventory, PlayerLedger};
    use hexfield_types::PlayerId;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn template(id: i32, min_level: u32) -> OrderTemplate {
        OrderTemplate {
            id: OrderTemplateId(id),
            requirements: BTreeMap::from([(ItemKind::Crop(1), 4)]),
            reward: Bundle {
                crystals: 40,
                xp: 12,
                ..Bundle::default()
            },
            delivery_seconds: Some(300),
            min_level,
        }
    }

    fn player(wheat: u64) -> PlayerState {
        let id = PlayerId::new();
        PlayerState::new(
            PlayerLedger::new(id, 0, 0),
            Inventory::from_lines(id, [(ItemKind::Crop(1), wheat)]),
        )
    }

    #[test]
    fn board_is_topped_up_with_eligible_templates() {
        let config = GameConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        let orders = generate_orders(
            2,
            &[template(1, 1), template(2, 10)],
            1,
            &config,
            &mut rng,
            Utc::now(),
        );
        assert_eq!(orders.len(), 4);
        assert!(orders.iter().all(|o| o.template_id == OrderTemplateId(1)));
    }

    #[test]
    fn no_templates_no_orders() {
        let config = GameConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        assert!(generate_orders(0, &[], 1, &config, &mut rng, Utc::now()).is_empty());
    }

    #[test]
    fn delivery_round_trip() {
        let config = GameConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        let now = Utc::now();
        let orders = generate_orders(5, &[template(1, 1)], 1, &config, &mut rng, now);
        assert_eq!(orders.len(), 1);
        let mut order = orders.into_iter().next().unwrap();
        let mut p = player(4);

        let started = start_delivery(&mut p, &order, 0, &config, now);
        assert!(started.is_ok());
        order.delivery = started.ok();
        assert_eq!(p.inventory.quantity(ItemKind::Crop(1)), 0);
        assert!(discard(&order).is_err());
        assert!(start_delivery(&mut p, &order, 1, &config, now).is_err());

        let landed = now + TimeDelta::seconds(300);
        let awarded = collect_delivery(&mut p, &order, &BoostSet::none(), &config, landed);
        assert!(awarded.is_ok());
        assert_eq!(p.ledger.crystals, 40);
        assert_eq!(p.ledger.experience, 12);
    }

    #[test]
    fn delivery_slots_are_limited() {
        let config = GameConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        let now = Utc::now();
        let orders = generate_orders(5, &[template(1, 1)], 1, &config, &mut rng, now);
        let mut p = player(4);
        let result = orders
            .first()
            .map(|o| start_delivery(&mut p, o, config.skyport.delivery_slots, &config, now));
        assert!(matches!(result, Some(Err(GameError::CapacityFull { .. }))));
    }
}
