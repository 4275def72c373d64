//! Enclosures, animals, animal production and breeding.
//!
//! Row locks: breeding and removal take the enclosure before any animal;
//! production takes only the animal. Both then take the ledger.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use hexfield_engine::GameError;
use hexfield_engine::catalog::AnimalSpecies;
use hexfield_engine::scheduler::{self, TaskTimes};
use hexfield_engine::zoo::{self, Animal, Breeding, Enclosure};
use hexfield_types::{
    AnimalId, CollectResult, ConditionType, EnclosureId, PlayerId, SpeciesId, SpeedUpCategory,
    SpeedUpResult, StartResult,
};

use super::Game;
use crate::codec::column;
use crate::effects::Effects;
use crate::error::DbError;
use crate::state::{self, Scope};
use crate::views::{AnimalView, CancelResult, EnclosureView};

#[derive(Debug, sqlx::FromRow)]
struct EnclosureRow {
    id: Uuid,
    species_id: i32,
    capacity: i32,
    breeding_parent_a: Option<Uuid>,
    breeding_parent_b: Option<Uuid>,
    breeding_level: Option<i32>,
    breeding_started_at: Option<DateTime<Utc>>,
    breeding_completes_at: Option<DateTime<Utc>>,
}

impl EnclosureRow {
    fn into_enclosure(self) -> Result<Enclosure, DbError> {
        let breeding = match (
            self.breeding_parent_a,
            self.breeding_parent_b,
            self.breeding_level,
            self.breeding_completes_at,
        ) {
            (Some(a), Some(b), Some(level), Some(completes_at)) => Some(Breeding {
                parent_a: AnimalId(a),
                parent_b: AnimalId(b),
                offspring_level: column(level, "enclosures", "breeding_level")?,
                started_at: self.breeding_started_at.unwrap_or(completes_at),
                completes_at,
            }),
            (None, None, None, None) => None,
            _ => return Err(DbError::corrupt("enclosures", "partial breeding columns")),
        };
        Ok(Enclosure {
            id: EnclosureId(self.id),
            species: SpeciesId(self.species_id),
            capacity: column(self.capacity, "enclosures", "capacity")?,
            breeding,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AnimalRow {
    id: Uuid,
    enclosure_id: Uuid,
    species_id: i32,
    level: i32,
    production_started_at: Option<DateTime<Utc>>,
    production_completes_at: Option<DateTime<Utc>>,
}

impl AnimalRow {
    fn into_animal(self) -> Result<Animal, DbError> {
        Ok(Animal {
            id: AnimalId(self.id),
            enclosure_id: EnclosureId(self.enclosure_id),
            species: SpeciesId(self.species_id),
            level: column(self.level, "animals", "level")?,
            production: self.production_completes_at.map(|completes_at| TaskTimes {
                started_at: self.production_started_at.unwrap_or(completes_at),
                completes_at,
            }),
        })
    }
}

const ENCLOSURE_COLUMNS: &str = "id, species_id, capacity, breeding_parent_a, breeding_parent_b, \
     breeding_level, breeding_started_at, breeding_completes_at";
const ANIMAL_COLUMNS: &str =
    "id, enclosure_id, species_id, level, production_started_at, production_completes_at";

async fn lock_enclosure(conn: &mut PgConnection, player: PlayerId, id: EnclosureId) -> Result<Enclosure, DbError> {
    sqlx::query_as::<_, EnclosureRow>(&format!(
        "SELECT {ENCLOSURE_COLUMNS} FROM enclosures WHERE id = $1 AND player_id = $2 FOR UPDATE"
    ))
    .bind(id.into_inner())
    .bind(player.into_inner())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| GameError::not_found("enclosure", id))?
    .into_enclosure()
}

async fn find_animal(conn: &mut PgConnection, player: PlayerId, id: AnimalId, lock: bool) -> Result<Animal, DbError> {
    let suffix = if lock { " FOR UPDATE" } else { "" };
    sqlx::query_as::<_, AnimalRow>(&format!(
        "SELECT {ANIMAL_COLUMNS} FROM animals WHERE id = $1 AND player_id = $2{suffix}"
    ))
    .bind(id.into_inner())
    .bind(player.into_inner())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| GameError::not_found("animal", id))?
    .into_animal()
}

async fn load_animals(conn: &mut PgConnection, enclosure: EnclosureId) -> Result<Vec<Animal>, DbError> {
    sqlx::query_as::<_, AnimalRow>(&format!(
        "SELECT {ANIMAL_COLUMNS} FROM animals WHERE enclosure_id = $1 ORDER BY id"
    ))
    .bind(enclosure.into_inner())
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(AnimalRow::into_animal)
    .collect()
}

async fn save_production(conn: &mut PgConnection, animal: &Animal) -> Result<(), DbError> {
    sqlx::query("UPDATE animals SET production_started_at = $2, production_completes_at = $3 WHERE id = $1")
        .bind(animal.id.into_inner())
        .bind(animal.production.map(|t| t.started_at))
        .bind(animal.production.map(|t| t.completes_at))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn save_breeding(conn: &mut PgConnection, enclosure: &Enclosure) -> Result<(), DbError> {
    let b = enclosure.breeding;
    sqlx::query(
        r"UPDATE enclosures SET breeding_parent_a = $2, breeding_parent_b = $3, breeding_level = $4,
                 breeding_started_at = $5, breeding_completes_at = $6
          WHERE id = $1",
    )
    .bind(enclosure.id.into_inner())
    .bind(b.map(|b| b.parent_a.into_inner()))
    .bind(b.map(|b| b.parent_b.into_inner()))
    .bind(b.map(|b| i32::from(b.offspring_level)))
    .bind(b.map(|b| b.started_at))
    .bind(b.map(|b| b.completes_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn animal_view(animal: &Animal) -> AnimalView {
    AnimalView {
        id: animal.id,
        level: animal.level,
        producing_until: animal.production.map(|t| t.completes_at),
    }
}

impl Game {
    fn species(&self, id: SpeciesId) -> Result<&AnimalSpecies, DbError> {
        self.catalog
            .species
            .get(&id)
            .ok_or_else(|| DbError::corrupt("animal_species", format!("unknown species {id}")))
    }

    /// Buy an enclosure for `species_id`.
    pub async fn create_enclosure(&self, player: PlayerId, species_id: SpeciesId) -> Result<EnclosureView, DbError> {
        let species = self
            .catalog
            .species
            .get(&species_id)
            .ok_or_else(|| GameError::not_found("species", species_id))?;
        let mut tx = self.pool.begin().await?;
        state::lock_scope(&mut tx, player, Scope::Enclosures).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let owned = state::count_for(&mut tx, "SELECT count(*) FROM enclosures WHERE player_id = $1", player).await?;

        let enclosure = zoo::create_enclosure(&mut state, species, owned, &self.config)?;
        sqlx::query("INSERT INTO enclosures (id, player_id, species_id, capacity) VALUES ($1, $2, $3, $4)")
            .bind(enclosure.id.into_inner())
            .bind(player.into_inner())
            .bind(species_id.get())
            .bind(i32::from(enclosure.capacity))
            .execute(&mut *tx)
            .await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        tracing::info!(player = %player, enclosure = %enclosure.id, species = %species_id, "enclosure created");
        Ok(EnclosureView {
            id: enclosure.id,
            species: enclosure.species,
            capacity: enclosure.capacity,
            breeding_until: None,
            animals: Vec::new(),
        })
    }

    /// Move a creature of `level` from the inventory into an enclosure.
    pub async fn add_animal(&self, player: PlayerId, enclosure_id: EnclosureId, level: u8) -> Result<AnimalView, DbError> {
        let mut tx = self.pool.begin().await?;
        let enclosure = lock_enclosure(&mut tx, player, enclosure_id).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let species = self.species(enclosure.species)?;
        let housed = load_animals(&mut tx, enclosure_id).await?.len();

        let animal = zoo::add_animal(&mut state, &enclosure, housed, species, level)?;
        sqlx::query(
            "INSERT INTO animals (id, enclosure_id, player_id, species_id, level) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(animal.id.into_inner())
        .bind(enclosure_id.into_inner())
        .bind(player.into_inner())
        .bind(animal.species.get())
        .bind(i32::from(animal.level))
        .execute(&mut *tx)
        .await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        tracing::info!(player = %player, enclosure = %enclosure_id, animal = %animal.id, level, "animal added");
        Ok(animal_view(&animal))
    }

    /// Take an idle animal out of its enclosure and back into the inventory.
    pub async fn remove_animal(&self, player: PlayerId, animal_id: AnimalId) -> Result<CancelResult, DbError> {
        let mut tx = self.pool.begin().await?;
        let unlocked = find_animal(&mut tx, player, animal_id, false).await?;
        let enclosure = lock_enclosure(&mut tx, player, unlocked.enclosure_id).await?;
        let animal = find_animal(&mut tx, player, animal_id, true).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let species = self.species(animal.species)?;

        zoo::remove_animal(&mut state, &animal, &enclosure, species)?;
        sqlx::query("DELETE FROM animals WHERE id = $1")
            .bind(animal_id.into_inner())
            .execute(&mut *tx)
            .await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        tracing::info!(player = %player, animal = %animal_id, "animal removed");
        Ok(CancelResult {
            success: true,
            cancelled: true,
        })
    }

    /// Feed an animal and start its production timer.
    pub async fn start_animal_production(&self, player: PlayerId, animal_id: AnimalId) -> Result<StartResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let mut animal = find_animal(&mut tx, player, animal_id, true).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let species = self.species(animal.species)?;

        let times = zoo::start_production(&mut state, &animal, species, &self.config, now)?;
        animal.production = Some(times);
        save_production(&mut tx, &animal).await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;
        Ok(scheduler::start_result(times, None, &species.feed))
    }

    /// Collect an animal's product. An idle animal is a successful no-op.
    pub async fn collect_animal_production(&self, player: PlayerId, animal_id: AnimalId) -> Result<CollectResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let mut animal = find_animal(&mut tx, player, animal_id, true).await?;
        if animal.production.is_none() {
            tracing::debug!(player = %player, animal = %animal_id, "nothing to collect");
            return Ok(CollectResult::nothing_to_collect());
        }
        let mut state = state::load_player(&mut tx, player).await?;
        let boosts = state::load_boosts(&mut tx, player, now).await?;
        let species = self.species(animal.species)?;

        let awarded = zoo::collect_production(
            &mut state,
            &animal,
            species,
            &self.catalog.item_values,
            &boosts,
            &self.config,
            now,
        )?;
        animal.production = None;
        save_production(&mut tx, &animal).await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        tracing::info!(player = %player, animal = %animal_id, "animal production collected");
        let mut effects = Effects::new();
        effects.awarded(ConditionType::Produce, &awarded).produced(&awarded);
        self.fan_out(player, effects).await;
        Ok(CollectResult::collected(awarded))
    }

    /// Clear an animal's production timer. Feed is not refunded.
    pub async fn cancel_animal_production(&self, player: PlayerId, animal_id: AnimalId) -> Result<CancelResult, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut animal = find_animal(&mut tx, player, animal_id, true).await?;
        let cancelled = zoo::cancel(&mut animal.production);
        if cancelled {
            save_production(&mut tx, &animal).await?;
            tracing::info!(player = %player, animal = %animal_id, "animal production cancelled");
        }
        tx.commit().await?;
        Ok(CancelResult {
            success: true,
            cancelled,
        })
    }

    /// Pair two animals of an enclosure.
    pub async fn start_breeding(
        &self,
        player: PlayerId,
        enclosure_id: EnclosureId,
        parent_a: AnimalId,
        parent_b: AnimalId,
    ) -> Result<StartResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let mut enclosure = lock_enclosure(&mut tx, player, enclosure_id).await?;
        let animals = load_animals(&mut tx, enclosure_id).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let species = self.species(enclosure.species)?;

        let breeding = {
            let mut rng = rand::rng();
            zoo::start_breeding(
                &mut state,
                &enclosure,
                &animals,
                (parent_a, parent_b),
                species,
                &self.config,
                &mut rng,
                now,
            )?
        };
        enclosure.breeding = Some(breeding);
        save_breeding(&mut tx, &enclosure).await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        let times = TaskTimes {
            started_at: breeding.started_at,
            completes_at: breeding.completes_at,
        };
        Ok(scheduler::start_result(times, None, &species.feed))
    }

    /// Collect the offspring into the inventory. An idle pen is a
    /// successful no-op.
    pub async fn collect_breeding(&self, player: PlayerId, enclosure_id: EnclosureId) -> Result<CollectResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let mut enclosure = lock_enclosure(&mut tx, player, enclosure_id).await?;
        if enclosure.breeding.is_none() {
            tracing::debug!(player = %player, enclosure = %enclosure_id, "nothing to collect");
            return Ok(CollectResult::nothing_to_collect());
        }
        let mut state = state::load_player(&mut tx, player).await?;
        let boosts = state::load_boosts(&mut tx, player, now).await?;
        let species = self.species(enclosure.species)?;

        let awarded = zoo::collect_breeding(&mut state, &enclosure, species, &boosts, &self.config, now)?;
        enclosure.breeding = None;
        save_breeding(&mut tx, &enclosure).await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        tracing::info!(player = %player, enclosure = %enclosure_id, "offspring collected");
        let mut effects = Effects::new();
        effects.awarded(ConditionType::Breed, &awarded);
        self.fan_out(player, effects).await;
        Ok(CollectResult::collected(awarded))
    }

    /// Clear a breeding timer. Feed is not refunded.
    pub async fn cancel_breeding(&self, player: PlayerId, enclosure_id: EnclosureId) -> Result<CancelResult, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut enclosure = lock_enclosure(&mut tx, player, enclosure_id).await?;
        let cancelled = zoo::cancel(&mut enclosure.breeding);
        if cancelled {
            save_breeding(&mut tx, &enclosure).await?;
            tracing::info!(player = %player, enclosure = %enclosure_id, "breeding cancelled");
        }
        tx.commit().await?;
        Ok(CancelResult {
            success: true,
            cancelled,
        })
    }

    /// Shorten an animal's production. Rate-limited under `zoo`.
    pub async fn speed_up_animal(&self, player: PlayerId, animal_id: AnimalId) -> Result<SpeedUpResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let mut animal = find_animal(&mut tx, player, animal_id, true).await?;
        let mut times = animal
            .production
            .ok_or_else(|| GameError::Precondition("animal is not producing".into()))?;

        let result = self
            .grant_speed_up(&mut tx, player, SpeedUpCategory::Zoo, times.completes_at, now)
            .await?;
        times.completes_at = result.completes_at;
        animal.production = Some(times);
        save_production(&mut tx, &animal).await?;
        tx.commit().await?;
        Ok(result)
    }

    /// The caller's enclosures with their animals.
    pub async fn get_zoo(&self, player: PlayerId) -> Result<Vec<EnclosureView>, DbError> {
        let mut conn = self.pool.acquire().await?;
        let enclosures = sqlx::query_as::<_, EnclosureRow>(&format!(
            "SELECT {ENCLOSURE_COLUMNS} FROM enclosures WHERE player_id = $1 ORDER BY created_at"
        ))
        .bind(player.into_inner())
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(EnclosureRow::into_enclosure)
        .collect::<Result<Vec<_>, _>>()?;

        let mut views = Vec::with_capacity(enclosures.len());
        for enclosure in enclosures {
            let animals = load_animals(&mut conn, enclosure.id).await?;
            views.push(EnclosureView {
                id: enclosure.id,
                species: enclosure.species,
                capacity: enclosure.capacity,
                breeding_until: enclosure.breeding.map(|b| b.completes_at),
                animals: animals.iter().map(animal_view).collect(),
            });
        }
        Ok(views)
    }
}
