//! Farm plots: plant a seed, wait, harvest the crop.
//!
//! Every player owns a fixed number of plots (`production.farm_plots`).
//! A plot holds at most one growing crop, so its capacity is one.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use hexfield_types::{Awarded, Bundle, CropId};

use crate::boosts::BoostSet;
use crate::catalog::{CropDefinition, ItemValues};
use crate::config::GameConfig;
use crate::error::GameError;
use crate::scheduler::{self, StartRequest, TaskTimes};
use crate::state::PlayerState;

/// A crop growing on a plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrowingCrop {
    /// Plot index.
    pub plot_index: u16,
    /// What is growing.
    pub crop_id: CropId,
    /// When it was planted.
    pub planted_at: DateTime<Utc>,
    /// When it can be harvested.
    pub ready_at: DateTime<Utc>,
}

/// One of the player's plots as loaded for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plot {
    /// Plot index.
    pub index: u16,
    /// Upgrade level (1-based).
    pub level: u32,
    /// Growing crop, if any.
    pub crop: Option<GrowingCrop>,
}

/// Plant one seed of `crop` on `plot`.
pub fn plant(
    player: &mut PlayerState,
    plot: &Plot,
    crop: Option<&CropDefinition>,
    config: &GameConfig,
    now: DateTime<Utc>,
) -> Result<(GrowingCrop, TaskTimes), GameError> {
    let in_flight = u32::from(plot.crop.is_some());
    scheduler::ensure_capacity("farm plot", in_flight, 1)?;
    let crop = crop.ok_or_else(|| GameError::Invalid("unknown crop".into()))?;
    if player.level() < crop.unlock_level {
        return Err(GameError::LevelTooLow {
            required: crop.unlock_level,
            current: player.level(),
        });
    }
    let inputs = BTreeMap::from([(crop.seed_item()?, 1)]);
    let times = scheduler::start_task(
        player,
        &StartRequest {
            site: "farm plot",
            in_flight,
            capacity: 1,
            inputs: &inputs,
            duration_seconds: crop.grow_seconds,
            site_multiplier: Some(config.production.site_multiplier(plot.level)),
        },
        &config.progression,
        now,
    )?;
    tracing::info!(
        player = %player.player_id(),
        plot = plot.index,
        crop = %crop.id,
        ready_at = %times.completes_at,
        "crop planted"
    );
    Ok((
        GrowingCrop {
            plot_index: plot.index,
            crop_id: crop.id,
            planted_at: times.started_at,
            ready_at: times.completes_at,
        },
        times,
    ))
}

/// Harvest a ripe crop. The caller deletes the slot in the same transaction.
pub fn harvest(
    player: &mut PlayerState,
    growing: &GrowingCrop,
    crop: &CropDefinition,
    values: &ItemValues,
    boosts: &BoostSet,
    config: &GameConfig,
    now: DateTime<Utc>,
) -> Result<Awarded, GameError> {
    let produce = crop.crop_item()?;
    let outputs = Bundle::of_items(BTreeMap::from([(produce, crop.yield_quantity)]));
    let xp = values.xp_for_items(&outputs.items);
    let awarded = scheduler::collect_task(
        player,
        growing.ready_at,
        &outputs,
        xp,
        boosts,
        &config.progression,
        now,
    )?;
    tracing::info!(
        player = %player.player_id(),
        plot = growing.plot_index,
        crop = %crop.id,
        quantity = crop.yield_quantity,
        "crop harvested"
    );
    Ok(awarded)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;
    use hexfield_ledger::{Inventory, PlayerLedger};
    use hexfield_types::{ItemKind, PlayerId};

    use super::*;

    fn wheat() -> CropDefinition {
        CropDefinition {
            id: CropId(1),
            name: "Wheat".into(),
            grow_seconds: Some(120),
            yield_quantity: 3,
            seed_price: 2,
            unlock_level: 1,
        }
    }

    fn player(seeds: u64) -> PlayerState {
        let id = PlayerId::new();
        PlayerState::new(
            PlayerLedger::new(id, 0, 0),
            Inventory::from_lines(id, [(ItemKind::Seed(1), seeds)]),
        )
    }

    fn empty_plot() -> Plot {
        Plot {
            index: 0,
            level: 1,
            crop: None,
        }
    }

    #[test]
    fn plant_and_harvest() {
        let config = GameConfig::default();
        let mut p = player(1);
        let now = Utc::now();
        let planted = plant(&mut p, &empty_plot(), Some(&wheat()), &config, now);
        assert!(planted.is_ok());
        let (growing, _) = planted.unwrap();
        assert_eq!(p.inventory.quantity(ItemKind::Seed(1)), 0);
        assert_eq!(growing.ready_at, now + TimeDelta::seconds(120));

        let values = ItemValues::new(BTreeMap::new(), 1);
        let awarded = harvest(
            &mut p,
            &growing,
            &wheat(),
            &values,
            &BoostSet::none(),
            &config,
            growing.ready_at,
        );
        assert_eq!(awarded.map(|a| a.xp).ok(), Some(Some(3)));
        assert_eq!(p.inventory.quantity(ItemKind::Crop(1)), 3);
    }

    #[test]
    fn occupied_plot_is_full() {
        let config = GameConfig::default();
        let mut p = player(5);
        let now = Utc::now();
        let plot = Plot {
            crop: Some(GrowingCrop {
                plot_index: 0,
                crop_id: CropId(1),
                planted_at: now,
                ready_at: now,
            }),
            ..empty_plot()
        };
        let result = plant(&mut p, &plot, Some(&wheat()), &config, now);
        assert!(matches!(result, Err(GameError::CapacityFull { .. })));
        assert_eq!(p.inventory.quantity(ItemKind::Seed(1)), 5);
    }

    #[test]
    fn no_seed_no_planting() {
        let config = GameConfig::default();
        let mut p = player(0);
        let result = plant(&mut p, &empty_plot(), Some(&wheat()), &config, Utc::now());
        assert!(matches!(result, Err(GameError::Ledger(_))));
    }

    #[test]
    fn locked_crop_needs_level() {
        let config = GameConfig::default();
        let mut p = player(1);
        let crop = CropDefinition {
            unlock_level: 4,
            ..wheat()
        };
        let result = plant(&mut p, &empty_plot(), Some(&crop), &config, Utc::now());
        assert_eq!(result.err(), Some(GameError::LevelTooLow { required: 4, current: 1 }));
    }
}
