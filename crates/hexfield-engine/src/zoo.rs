//! Zoo enclosures: animal production and breeding.
//!
//! Each animal is its own production site with capacity one. Each enclosure
//! has one breeding pen, and a pending offspring reserves a place, so
//! breeding needs `animals < capacity`. Cancelling either timer clears it
//! without refunding the feed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use hexfield_types::{AnimalId, Awarded, Bundle, EnclosureId, SpeciesId};

use crate::boosts::BoostSet;
use crate::catalog::{AnimalSpecies, ItemValues};
use crate::config::GameConfig;
use crate::error::GameError;
use crate::scheduler::{self, StartRequest, TaskTimes};
use crate::state::PlayerState;

/// An enclosure housing animals of one species.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enclosure {
    /// Identifier.
    pub id: EnclosureId,
    /// Species housed.
    pub species: SpeciesId,
    /// Animals it holds.
    pub capacity: u16,
    /// Breeding in progress, if any.
    pub breeding: Option<Breeding>,
}

/// A pending offspring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breeding {
    /// First parent.
    pub parent_a: AnimalId,
    /// Second parent.
    pub parent_b: AnimalId,
    /// Level the offspring will have.
    pub offspring_level: u8,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Completion time.
    pub completes_at: DateTime<Utc>,
}

/// An animal living in an enclosure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Animal {
    /// Identifier.
    pub id: AnimalId,
    /// Enclosure it lives in.
    pub enclosure_id: EnclosureId,
    /// Species.
    pub species: SpeciesId,
    /// Creature level.
    pub level: u8,
    /// Production in progress, if any.
    pub production: Option<TaskTimes>,
}

// ---------------------------------------------------------------------------
// Enclosures and animals
// ---------------------------------------------------------------------------

/// Buy an enclosure for `species`.
pub fn create_enclosure(
    player: &mut PlayerState,
    species: &AnimalSpecies,
    owned: u32,
    config: &GameConfig,
) -> Result<Enclosure, GameError> {
    if owned >= config.zoo.max_enclosures {
        return Err(GameError::LimitReached {
            what: "enclosure".into(),
            used: owned,
            limit: config.zoo.max_enclosures,
        });
    }
    player.ledger.debit_crystals(config.zoo.enclosure_price)?;
    Ok(Enclosure {
        id: EnclosureId::new(),
        species: species.id,
        capacity: species.enclosure_capacity,
        breeding: None,
    })
}

fn occupancy(enclosure: &Enclosure, animals: usize) -> u32 {
    u32::try_from(animals)
        .unwrap_or(u32::MAX)
        .saturating_add(u32::from(enclosure.breeding.is_some()))
}

/// Move a creature item from the inventory into an enclosure.
pub fn add_animal(
    player: &mut PlayerState,
    enclosure: &Enclosure,
    animals: usize,
    species: &AnimalSpecies,
    level: u8,
) -> Result<Animal, GameError> {
    if species.id != enclosure.species {
        return Err(GameError::Invalid(format!(
            "enclosure houses species {}, not {}",
            enclosure.species, species.id
        )));
    }
    scheduler::ensure_capacity("enclosure", occupancy(enclosure, animals), u32::from(enclosure.capacity))?;
    let item = species.creature(level)?;
    player.inventory.debit(item, 1)?;
    Ok(Animal {
        id: AnimalId::new(),
        enclosure_id: enclosure.id,
        species: species.id,
        level,
        production: None,
    })
}

/// Return an idle animal to the inventory.
pub fn remove_animal(
    player: &mut PlayerState,
    animal: &Animal,
    enclosure: &Enclosure,
    species: &AnimalSpecies,
) -> Result<(), GameError> {
    if animal.production.is_some() {
        return Err(GameError::Precondition(
            "animal is producing; collect or cancel first".into(),
        ));
    }
    if enclosure
        .breeding
        .is_some_and(|b| b.parent_a == animal.id || b.parent_b == animal.id)
    {
        return Err(GameError::Precondition(
            "animal is breeding; collect or cancel first".into(),
        ));
    }
    player.inventory.credit(species.creature(animal.level)?, 1)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Production
// ---------------------------------------------------------------------------

/// Feed an animal and start its production timer.
pub fn start_production(
    player: &mut PlayerState,
    animal: &Animal,
    species: &AnimalSpecies,
    config: &GameConfig,
    now: DateTime<Utc>,
) -> Result<TaskTimes, GameError> {
    let in_flight = u32::from(animal.production.is_some());
    let times = scheduler::start_task(
        player,
        &StartRequest {
            site: "animal",
            in_flight,
            capacity: 1,
            inputs: &species.feed,
            duration_seconds: species.production_seconds,
            site_multiplier: None,
        },
        &config.progression,
        now,
    )?;
    tracing::info!(
        player = %player.player_id(),
        animal = %animal.id,
        completes_at = %times.completes_at,
        "animal production started"
    );
    Ok(times)
}

/// Collect an animal's product: `product_quantity × level` units.
pub fn collect_production(
    player: &mut PlayerState,
    animal: &Animal,
    species: &AnimalSpecies,
    values: &ItemValues,
    boosts: &BoostSet,
    config: &GameConfig,
    now: DateTime<Utc>,
) -> Result<Awarded, GameError> {
    let times = animal
        .production
        .ok_or_else(|| GameError::Precondition("animal is not producing".into()))?;
    let quantity = species
        .product_quantity
        .checked_mul(u32::from(animal.level))
        .ok_or_else(|| GameError::overflow("animal product quantity"))?;
    let outputs = Bundle::of_items(BTreeMap::from([(species.product, quantity)]));
    let xp = values.xp_for_items(&outputs.items);
    scheduler::collect_task(player, times.completes_at, &outputs, xp, boosts, &config.progression, now)
}

/// Clear a timer. Returns whether one was running.
pub fn cancel<T>(timer: &mut Option<T>) -> bool {
    timer.take().is_some()
}

// ---------------------------------------------------------------------------
// Breeding
// ---------------------------------------------------------------------------

/// Offspring level: one above the weaker parent, with a configured chance of
/// one bonus level, capped at the species maximum.
pub fn offspring_level<R: Rng>(
    a: u8,
    b: u8,
    species: &AnimalSpecies,
    bonus_chance: Decimal,
    rng: &mut R,
) -> u8 {
    let threshold = bonus_chance
        .checked_mul(Decimal::from(10_000))
        .and_then(|t| t.floor().to_u32())
        .unwrap_or(0);
    let bonus = u8::from(rng.random_range(0..10_000_u32) < threshold);
    a.min(b)
        .saturating_add(1)
        .saturating_add(bonus)
        .min(species.max_level.max(1))
}

/// Start breeding two animals of the enclosure.
pub fn start_breeding<R: Rng>(
    player: &mut PlayerState,
    enclosure: &Enclosure,
    animals: &[Animal],
    parents: (AnimalId, AnimalId),
    species: &AnimalSpecies,
    config: &GameConfig,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Result<Breeding, GameError> {
    scheduler::ensure_capacity("breeding pen", u32::from(enclosure.breeding.is_some()), 1)?;
    let (a_id, b_id) = parents;
    if a_id == b_id {
        return Err(GameError::Invalid("an animal cannot breed with itself".into()));
    }
    let find = |id: AnimalId| {
        animals
            .iter()
            .find(|a| a.id == id && a.enclosure_id == enclosure.id)
            .ok_or_else(|| GameError::not_found("animal", id))
    };
    let a = find(a_id)?;
    let b = find(b_id)?;
    if a.species != species.id || b.species != species.id {
        return Err(GameError::Invalid("parents must be the same species".into()));
    }
    scheduler::ensure_capacity("enclosure", occupancy(enclosure, animals.len()), u32::from(enclosure.capacity))?;
    let level = offspring_level(a.level, b.level, species, config.zoo.bonus_level_chance, rng);
    let times = scheduler::start_task(
        player,
        &StartRequest {
            site: "breeding pen",
            in_flight: 0,
            capacity: 1,
            inputs: &species.feed,
            duration_seconds: species.breeding_seconds,
            site_multiplier: None,
        },
        &config.progression,
        now,
    )?;
    tracing::info!(
        player = %player.player_id(),
        enclosure = %enclosure.id,
        offspring_level = level,
        completes_at = %times.completes_at,
        "breeding started"
    );
    Ok(Breeding {
        parent_a: a_id,
        parent_b: b_id,
        offspring_level: level,
        started_at: times.started_at,
        completes_at: times.completes_at,
    })
}

/// Collect the offspring into the inventory as a creature item.
pub fn collect_breeding(
    player: &mut PlayerState,
    enclosure: &Enclosure,
    species: &AnimalSpecies,
    boosts: &BoostSet,
    config: &GameConfig,
    now: DateTime<Utc>,
) -> Result<Awarded, GameError> {
    let breeding = enclosure
        .breeding
        .ok_or_else(|| GameError::Precondition("enclosure is not breeding".into()))?;
    let offspring = species.creature(breeding.offspring_level)?;
    let outputs = Bundle::of_items(BTreeMap::from([(offspring, 1)]));
    let xp = species
        .breeding_xp
        .saturating_mul(u64::from(breeding.offspring_level));
    scheduler::collect_task(player, breeding.completes_at, &outputs, xp, boosts, &config.progression, now)
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use hexfield_ledger::{Inventory, PlayerLedger};
    use hexfield_types::{ItemKind, PlayerId};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rust_decimal_macros::dec;

    use super::*;

    fn moonhen() -> AnimalSpecies {
        AnimalSpecies {
            id: SpeciesId(4),
            name: "Moonhen".into(),
            feed: BTreeMap::from([(ItemKind::Crop(1), 2)]),
            product: ItemKind::Craftable(210),
            product_quantity: 2,
            production_seconds: Some(60),
            breeding_seconds: Some(600),
            max_level: 3,
            enclosure_capacity: 3,
            breeding_xp: 5,
        }
    }

    fn player(wheat: u64) -> PlayerState {
        let id = PlayerId::new();
        PlayerState::new(
            PlayerLedger::new(id, 5000, 0),
            Inventory::from_lines(
                id,
                [
                    (ItemKind::Crop(1), wheat),
                    (ItemKind::Creature { species: 4, level: 1 }, 2),
                    (ItemKind::Creature { species: 4, level: 2 }, 1),
                ],
            ),
        )
    }

    fn enclosure() -> Enclosure {
        Enclosure {
            id: EnclosureId::new(),
            species: SpeciesId(4),
            capacity: 3,
            breeding: None,
        }
    }

    fn animal(enclosure: &Enclosure, level: u8) -> Animal {
        Animal {
            id: AnimalId::new(),
            enclosure_id: enclosure.id,
            species: SpeciesId(4),
            level,
            production: None,
        }
    }

    #[test]
    fn adding_animal_consumes_creature_item() {
        let mut p = player(0);
        let pen = enclosure();
        let added = add_animal(&mut p, &pen, 0, &moonhen(), 2);
        assert!(added.is_ok());
        assert_eq!(p.inventory.quantity(ItemKind::Creature { species: 4, level: 2 }), 0);
        let full = add_animal(&mut p, &pen, 3, &moonhen(), 1);
        assert!(matches!(full, Err(GameError::CapacityFull { .. })));
    }

    #[test]
    fn production_scales_with_level() {
        let config = GameConfig::default();
        let mut p = player(2);
        let pen = enclosure();
        let mut hen = animal(&pen, 2);
        let now = Utc::now();
        let started = start_production(&mut p, &hen, &moonhen(), &config, now);
        assert!(started.is_ok());
        hen.production = started.ok();
        let second = start_production(&mut p, &hen, &moonhen(), &config, now);
        assert!(matches!(second, Err(GameError::CapacityFull { .. })));

        let values = ItemValues::new(BTreeMap::new(), 0);
        let later = now + TimeDelta::seconds(60);
        let awarded = collect_production(&mut p, &hen, &moonhen(), &values, &BoostSet::none(), &config, later);
        assert!(awarded.is_ok());
        assert_eq!(p.inventory.quantity(ItemKind::Craftable(210)), 4);
    }

    #[test]
    fn cancel_is_idempotent() {
        let now = Utc::now();
        let mut timer = Some(TaskTimes {
            started_at: now,
            completes_at: now,
        });
        assert!(cancel(&mut timer));
        assert!(!cancel(&mut timer));
        assert!(timer.is_none());
    }

    #[test]
    fn offspring_level_is_capped() {
        let mut rng = StdRng::seed_from_u64(7);
        let species = moonhen();
        assert_eq!(offspring_level(1, 2, &species, Decimal::ZERO, &mut rng), 2);
        assert_eq!(offspring_level(1, 2, &species, Decimal::ONE, &mut rng), 3);
        assert_eq!(offspring_level(3, 3, &species, dec!(1), &mut rng), 3);
    }

    #[test]
    fn breeding_round_trip() {
        let config = GameConfig {
            zoo: crate::config::ZooConfig {
                bonus_level_chance: Decimal::ZERO,
                ..crate::config::ZooConfig::default()
            },
            ..GameConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let mut p = player(2);
        let mut pen = enclosure();
        let a = animal(&pen, 1);
        let b = animal(&pen, 2);
        let now = Utc::now();
        let breeding = start_breeding(&mut p, &pen, &[a, b], (a.id, b.id), &moonhen(), &config, &mut rng, now);
        assert_eq!(breeding.as_ref().map(|b| b.offspring_level).ok(), Some(2));
        pen.breeding = breeding.ok();

        let again = start_breeding(&mut p, &pen, &[a, b], (a.id, b.id), &moonhen(), &config, &mut rng, now);
        assert!(matches!(again, Err(GameError::CapacityFull { .. })));

        let done = now + TimeDelta::seconds(600);
        let awarded = collect_breeding(&mut p, &pen, &moonhen(), &BoostSet::none(), &config, done);
        assert_eq!(awarded.map(|a| a.xp).ok(), Some(Some(10)));
        assert_eq!(p.inventory.quantity(ItemKind::Creature { species: 4, level: 2 }), 2);
    }

    #[test]
    fn breeding_needs_room_for_offspring() {
        let config = GameConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut p = player(2);
        let pen = enclosure();
        let animals = [animal(&pen, 1), animal(&pen, 1), animal(&pen, 1)];
        let result = start_breeding(
            &mut p,
            &pen,
            &animals,
            (animals[0].id, animals[1].id),
            &moonhen(),
            &config,
            &mut rng,
            Utc::now(),
        );
        assert!(matches!(result, Err(GameError::CapacityFull { .. })));
        assert_eq!(p.inventory.quantity(ItemKind::Crop(1)), 2);
    }

    #[test]
    fn busy_animal_cannot_leave() {
        let mut p = player(0);
        let pen = enclosure();
        let now = Utc::now();
        let mut hen = animal(&pen, 1);
        hen.production = Some(TaskTimes {
            started_at: now,
            completes_at: now,
        });
        assert!(remove_animal(&mut p, &hen, &pen, &moonhen()).is_err());
        hen.production = None;
        assert!(remove_animal(&mut p, &hen, &pen, &moonhen()).is_ok());
        assert_eq!(p.inventory.quantity(ItemKind::Creature { species: 4, level: 1 }), 3);
    }
}
