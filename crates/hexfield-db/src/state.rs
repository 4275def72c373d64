//! Loading and saving the per-player state a procedure works on.
//!
//! Player rows are read as snapshots and never locked up front. A
//! procedure locks only the rows its outcome depends on, in this order:
//!
//! 1. site rows (plot, factory, enclosure, animal, order, listing, coven,
//!    task, regatta) with `FOR UPDATE`
//! 2. a [`Scope`] advisory lock when the rule counts the player's owned rows
//!    (buildings, enclosures, listings, friends, the skyport board). Slot
//!    capacity of one site is serialized by the site row itself.
//! 3. at save time, the inventory lines being debited and then the ledger
//!    row, through guarded increments that refuse to go below zero. Several
//!    players are saved in ascending id order.
//!
//! Saves apply changes as increments, so two procedures on different sites
//! of the same player run side by side and both land. Experience is
//! re-applied under the ledger row lock, which is taken only when XP was
//! granted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use hexfield_engine::boosts::ActiveBoost;
use hexfield_engine::{BoostSet, GameError, PlayerState};
use hexfield_ledger::{Inventory, LedgerError, PlayerLedger, ProgressionRules, progression};
use hexfield_types::{BoostKind, ItemKind, PlayerId};

use crate::codec::{column, item_columns, item_from_columns, param};
use crate::error::DbError;

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: Uuid,
    crystals: i64,
    gems: i64,
    experience: i64,
    level: i32,
}

impl LedgerRow {
    fn into_ledger(self) -> Result<PlayerLedger, DbError> {
        Ok(PlayerLedger {
            player_id: PlayerId(self.id),
            crystals: column(self.crystals, "players", "crystals")?,
            gems: column(self.gems, "players", "gems")?,
            experience: column(self.experience, "players", "experience")?,
            level: column(self.level, "players", "level")?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InventoryRow {
    item_category: String,
    item_base: i32,
    item_level: i32,
    quantity: i64,
}

impl InventoryRow {
    fn into_line(self) -> Result<(ItemKind, u64), DbError> {
        Ok((
            item_from_columns("inventory", &self.item_category, self.item_base, self.item_level)?,
            column(self.quantity, "inventory", "quantity")?,
        ))
    }
}

/// Load one player's ledger and inventory as a snapshot.
pub async fn load_player(conn: &mut PgConnection, player: PlayerId) -> Result<PlayerState, DbError> {
    let ledger = load_ledger(conn, player).await?;
    let inventory = load_inventory(conn, player).await?;
    Ok(PlayerState::new(ledger, inventory))
}

/// Load several players, keyed (and later saved) in ascending id order.
pub async fn load_players(
    conn: &mut PgConnection,
    players: impl IntoIterator<Item = PlayerId>,
) -> Result<BTreeMap<PlayerId, PlayerState>, DbError> {
    let mut ids: Vec<PlayerId> = players.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    let mut states = BTreeMap::new();
    for id in ids {
        let state = load_player(conn, id).await?;
        states.insert(id, state);
    }
    Ok(states)
}

/// Read a ledger row without loading the inventory.
pub async fn load_ledger(conn: &mut PgConnection, player: PlayerId) -> Result<PlayerLedger, DbError> {
    sqlx::query_as::<_, LedgerRow>("SELECT id, crystals, gems, experience, level FROM players WHERE id = $1")
        .bind(player.into_inner())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::Game(GameError::not_found("player", player)))?
        .into_ledger()
}

async fn load_inventory(conn: &mut PgConnection, player: PlayerId) -> Result<Inventory, DbError> {
    let lines = sqlx::query_as::<_, InventoryRow>(
        "SELECT item_category, item_base, item_level, quantity FROM inventory WHERE player_id = $1",
    )
    .bind(player.into_inner())
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(InventoryRow::into_line)
    .collect::<Result<Vec<_>, _>>()?;
    Ok(Inventory::from_lines(player, lines))
}

/// A set of a player's owned rows that a rule counts or that may not exist
/// yet, so no row lock can guard it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Town grid cells and building counts.
    Town,
    /// Enclosures.
    Enclosures,
    /// Active market listings.
    Listings,
    /// Friendships and pending requests.
    Friends,
    /// Coven membership.
    Coven,
    /// Running boosts.
    Boosts,
    /// The skyport board and its orders in flight.
    Deliveries,
    /// Achievement and quest rows.
    Progress,
}

impl Scope {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Town => "town",
            Self::Enclosures => "enclosures",
            Self::Listings => "listings",
            Self::Friends => "friends",
            Self::Coven => "coven",
            Self::Boosts => "boosts",
            Self::Deliveries => "deliveries",
            Self::Progress => "progress",
        }
    }
}

/// Serialize the rest of the transaction against other writers of
/// `player`'s `scope`. Released at commit or rollback.
pub async fn lock_scope(conn: &mut PgConnection, player: PlayerId, scope: Scope) -> Result<(), DbError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1), hashtext($2))")
        .bind(player.to_string())
        .bind(scope.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Write a state's changes back as increments.
///
/// Debits are guarded: a line or balance that another transaction drained
/// since the snapshot fails the save with the same rejection the rule would
/// have raised, and the caller's transaction rolls back.
pub async fn save_player(conn: &mut PgConnection, state: &PlayerState) -> Result<(), DbError> {
    save_inventory(conn, &state.inventory).await?;
    save_currency(conn, state).await?;
    if let Some((amount, rules)) = state.xp_grant() {
        save_experience(conn, state.player_id(), amount, rules).await?;
    }
    Ok(())
}

async fn save_inventory(conn: &mut PgConnection, inventory: &Inventory) -> Result<(), DbError> {
    let owner = inventory.owner();
    for (item, delta) in inventory.changes() {
        let (category, base, level) = item_columns(*item);
        if *delta >= 0 {
            sqlx::query(
                r"INSERT INTO inventory (player_id, item_category, item_base, item_level, quantity)
                  VALUES ($1, $2, $3, $4, $5)
                  ON CONFLICT (player_id, item_category, item_base, item_level)
                  DO UPDATE SET quantity = inventory.quantity + EXCLUDED.quantity",
            )
            .bind(owner.into_inner())
            .bind(category)
            .bind(base)
            .bind(level)
            .bind(*delta)
            .execute(&mut *conn)
            .await?;
            continue;
        }

        let remaining: Option<i64> = sqlx::query_scalar(
            r"UPDATE inventory SET quantity = quantity + $5
              WHERE player_id = $1 AND item_category = $2 AND item_base = $3 AND item_level = $4
                AND quantity + $5 >= 0
              RETURNING quantity",
        )
        .bind(owner.into_inner())
        .bind(category)
        .bind(base)
        .bind(level)
        .bind(*delta)
        .fetch_optional(&mut *conn)
        .await?;
        match remaining {
            Some(0) => {
                sqlx::query(
                    r"DELETE FROM inventory
                      WHERE player_id = $1 AND item_category = $2 AND item_base = $3 AND item_level = $4
                        AND quantity = 0",
                )
                .bind(owner.into_inner())
                .bind(category)
                .bind(base)
                .bind(level)
                .execute(&mut *conn)
                .await?;
            }
            Some(_) => {}
            None => {
                let held: Option<i64> = sqlx::query_scalar(
                    r"SELECT quantity FROM inventory
                      WHERE player_id = $1 AND item_category = $2 AND item_base = $3 AND item_level = $4",
                )
                .bind(owner.into_inner())
                .bind(category)
                .bind(base)
                .bind(level)
                .fetch_optional(&mut *conn)
                .await?;
                return Err(LedgerError::InsufficientItem {
                    item: *item,
                    required: delta.unsigned_abs(),
                    available: column(held.unwrap_or(0), "inventory", "quantity")?,
                }
                .into());
            }
        }
    }
    Ok(())
}

async fn save_currency(conn: &mut PgConnection, state: &PlayerState) -> Result<(), DbError> {
    let crystals: i64 = param(state.crystal_change(), "crystal change")?;
    let gems: i64 = param(state.gem_change(), "gem change")?;
    if crystals == 0 && gems == 0 {
        return Ok(());
    }
    let updated = sqlx::query(
        r"UPDATE players SET crystals = crystals + $2, gems = gems + $3
          WHERE id = $1 AND crystals + $2 >= 0 AND gems + $3 >= 0",
    )
    .bind(state.player_id().into_inner())
    .bind(crystals)
    .bind(gems)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    if updated == 0 {
        let held = load_ledger(conn, state.player_id()).await?;
        let err = if i128::from(held.crystals) + i128::from(crystals) < 0 {
            LedgerError::InsufficientCrystals {
                required: crystals.unsigned_abs(),
                available: held.crystals,
            }
        } else {
            LedgerError::InsufficientGems {
                required: gems.unsigned_abs(),
                available: held.gems,
            }
        };
        return Err(err.into());
    }
    Ok(())
}

async fn save_experience(
    conn: &mut PgConnection,
    player: PlayerId,
    amount: u64,
    rules: &ProgressionRules,
) -> Result<(), DbError> {
    let mut ledger = sqlx::query_as::<_, LedgerRow>(
        "SELECT id, crystals, gems, experience, level FROM players WHERE id = $1 FOR UPDATE",
    )
    .bind(player.into_inner())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::Game(GameError::not_found("player", player)))?
    .into_ledger()?;
    progression::grant_xp(&mut ledger, amount, rules)?;
    sqlx::query("UPDATE players SET experience = $2, level = $3 WHERE id = $1")
        .bind(player.into_inner())
        .bind(param::<_, i64>(ledger.experience, "experience")?)
        .bind(param::<_, i32>(ledger.level, "level")?)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Save every state in a loaded set, in ascending id order.
pub async fn save_players(
    conn: &mut PgConnection,
    states: &BTreeMap<PlayerId, PlayerState>,
) -> Result<(), DbError> {
    for state in states.values() {
        save_player(conn, state).await?;
    }
    Ok(())
}

/// Take a state out of a loaded set.
pub fn take(states: &mut BTreeMap<PlayerId, PlayerState>, player: PlayerId) -> Result<PlayerState, DbError> {
    states
        .remove(&player)
        .ok_or_else(|| DbError::Game(GameError::not_found("player", player)))
}

// ---------------------------------------------------------------------------
// Boosts
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct BoostRow {
    kind: String,
    multiplier: Decimal,
    expires_at: DateTime<Utc>,
}

impl BoostRow {
    fn into_boost(self) -> Result<ActiveBoost, DbError> {
        let kind = BoostKind::parse(&self.kind)
            .ok_or_else(|| DbError::corrupt("boosts", format!("unknown kind {:?}", self.kind)))?;
        Ok(ActiveBoost {
            kind,
            multiplier: self.multiplier,
            expires_at: self.expires_at,
        })
    }
}

/// Load a player's boost rows.
pub async fn load_boost_rows(conn: &mut PgConnection, player: PlayerId) -> Result<Vec<ActiveBoost>, DbError> {
    sqlx::query_as::<_, BoostRow>("SELECT kind, multiplier, expires_at FROM boosts WHERE player_id = $1")
        .bind(player.into_inner())
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(BoostRow::into_boost)
        .collect()
}

/// The multipliers active for a player at `now`.
pub async fn load_boosts(conn: &mut PgConnection, player: PlayerId, now: DateTime<Utc>) -> Result<BoostSet, DbError> {
    let rows = load_boost_rows(conn, player).await?;
    Ok(BoostSet::from_active(&rows, now))
}

/// Count rows of a `SELECT count(*)` query bound to one player.
pub async fn count_for(conn: &mut PgConnection, sql: &str, player: PlayerId) -> Result<u32, DbError> {
    let count: i64 = sqlx::query_scalar(sql)
        .bind(player.into_inner())
        .fetch_one(&mut *conn)
        .await?;
    column(count, "count", "count")
}
