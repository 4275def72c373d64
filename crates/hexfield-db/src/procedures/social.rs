//! Friends and help actions.
//!
//! A friendship is two mirrored rows, one owned by each side. Help actions
//! are the one path where a caller mutates another player's sites; the
//! friendship is re-read inside the helping transaction every time.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use hexfield_engine::GameError;
use hexfield_engine::friends::{self, Friendship};
use hexfield_engine::progress::ProgressEvent;
use hexfield_engine::skyport;
use hexfield_types::{
    ConditionType, FactoryId, FriendStatus, HelpAction, OrderId, PlayerId, SpeedUpResult,
};

use super::{Game, factory, farm};
use crate::effects::Effects;
use crate::error::DbError;
use crate::state::{self, Scope};
use crate::views::{CancelResult, FriendView};

#[derive(Debug, sqlx::FromRow)]
struct FriendshipRow {
    player_id: Uuid,
    friend_id: Uuid,
    status: String,
    requested_by: Uuid,
    created_at: DateTime<Utc>,
}

impl FriendshipRow {
    fn into_friendship(self) -> Result<Friendship, DbError> {
        Ok(Friendship {
            player: PlayerId(self.player_id),
            friend: PlayerId(self.friend_id),
            status: parse_status(&self.status)?,
            requested_by: PlayerId(self.requested_by),
            created_at: self.created_at,
        })
    }
}

fn parse_status(status: &str) -> Result<FriendStatus, DbError> {
    FriendStatus::parse(status).ok_or_else(|| DbError::corrupt("friendships", format!("unknown status {status}")))
}

/// Take both players' friend scopes in id order. Serializes friend-count
/// checks.
async fn lock_pair(conn: &mut PgConnection, a: PlayerId, b: PlayerId) -> Result<(), DbError> {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    state::lock_scope(conn, first, Scope::Friends).await?;
    if second != first {
        state::lock_scope(conn, second, Scope::Friends).await?;
    }
    Ok(())
}

async fn find_row(conn: &mut PgConnection, player: PlayerId, friend: PlayerId) -> Result<Option<Friendship>, DbError> {
    sqlx::query_as::<_, FriendshipRow>(
        r"SELECT player_id, friend_id, status, requested_by, created_at
          FROM friendships WHERE player_id = $1 AND friend_id = $2",
    )
    .bind(player.into_inner())
    .bind(friend.into_inner())
    .fetch_optional(&mut *conn)
    .await?
    .map(FriendshipRow::into_friendship)
    .transpose()
}

async fn delete_pair(conn: &mut PgConnection, a: PlayerId, b: PlayerId) -> Result<u64, DbError> {
    let done = sqlx::query(
        r"DELETE FROM friendships
          WHERE (player_id = $1 AND friend_id = $2) OR (player_id = $2 AND friend_id = $1)",
    )
    .bind(a.into_inner())
    .bind(b.into_inner())
    .execute(&mut *conn)
    .await?;
    Ok(done.rows_affected())
}

async fn display_name(conn: &mut PgConnection, player: PlayerId) -> Result<String, DbError> {
    Ok(sqlx::query_scalar("SELECT display_name FROM players WHERE id = $1")
        .bind(player.into_inner())
        .fetch_one(&mut *conn)
        .await?)
}

async fn friend_count(conn: &mut PgConnection, player: PlayerId) -> Result<u32, DbError> {
    state::count_for(conn, "SELECT count(*) FROM friendships WHERE player_id = $1", player).await
}

impl Game {
    /// Ask `target` to be friends. Writes a pending row on each side.
    pub async fn send_friend_request(&self, player: PlayerId, target: PlayerId) -> Result<FriendView, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        lock_pair(&mut tx, player, target).await?;
        let existing = find_row(&mut tx, player, target).await?.map(|f| f.status);
        let mine = friend_count(&mut tx, player).await?;
        let theirs = friend_count(&mut tx, target).await?;
        friends::validate_request(player, target, existing, mine, theirs, &self.config.social)?;

        for row in Friendship::request_pair(player, target, now) {
            sqlx::query(
                r"INSERT INTO friendships (player_id, friend_id, status, requested_by, created_at)
                  VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(row.player.into_inner())
            .bind(row.friend.into_inner())
            .bind(row.status.as_str())
            .bind(row.requested_by.into_inner())
            .bind(row.created_at)
            .execute(&mut *tx)
            .await?;
        }
        let display_name = display_name(&mut tx, target).await?;
        tx.commit().await?;

        tracing::info!(player = %player, target = %target, "friend request sent");
        Ok(FriendView {
            player_id: target,
            display_name,
            status: FriendStatus::Pending,
            requested_by: player,
        })
    }

    /// Accept a pending request from `requester`.
    pub async fn accept_friend_request(&self, player: PlayerId, requester: PlayerId) -> Result<FriendView, DbError> {
        let mut tx = self.pool.begin().await?;
        lock_pair(&mut tx, player, requester).await?;
        let row = find_row(&mut tx, player, requester).await?;
        let row = friends::validate_response(player, row.as_ref())?;

        sqlx::query(
            r"UPDATE friendships SET status = $3
              WHERE (player_id = $1 AND friend_id = $2) OR (player_id = $2 AND friend_id = $1)",
        )
        .bind(player.into_inner())
        .bind(requester.into_inner())
        .bind(FriendStatus::Accepted.as_str())
        .execute(&mut *tx)
        .await?;
        let display_name = display_name(&mut tx, requester).await?;
        tx.commit().await?;

        tracing::info!(player = %player, friend = %requester, "friend request accepted");
        Ok(FriendView {
            player_id: requester,
            display_name,
            status: FriendStatus::Accepted,
            requested_by: row.requested_by,
        })
    }

    /// Decline a pending request. Both rows are removed.
    pub async fn decline_friend_request(&self, player: PlayerId, requester: PlayerId) -> Result<CancelResult, DbError> {
        let mut tx = self.pool.begin().await?;
        lock_pair(&mut tx, player, requester).await?;
        let row = find_row(&mut tx, player, requester).await?;
        friends::validate_response(player, row.as_ref())?;
        delete_pair(&mut tx, player, requester).await?;
        tx.commit().await?;
        Ok(CancelResult {
            success: true,
            cancelled: true,
        })
    }

    /// End a friendship or withdraw a request, from either side.
    pub async fn remove_friend(&self, player: PlayerId, friend: PlayerId) -> Result<CancelResult, DbError> {
        let mut tx = self.pool.begin().await?;
        lock_pair(&mut tx, player, friend).await?;
        if delete_pair(&mut tx, player, friend).await? == 0 {
            return Err(GameError::not_found("friend", friend).into());
        }
        tx.commit().await?;

        tracing::info!(player = %player, friend = %friend, "friend removed");
        Ok(CancelResult {
            success: true,
            cancelled: true,
        })
    }

    /// Accepted friends and pending requests in both directions.
    pub async fn list_friends(&self, player: PlayerId) -> Result<Vec<FriendView>, DbError> {
        let rows: Vec<(Uuid, String, String, Uuid)> = sqlx::query_as(
            r"SELECT f.friend_id, p.display_name, f.status, f.requested_by
              FROM friendships f JOIN players p ON p.id = f.friend_id
              WHERE f.player_id = $1
              ORDER BY f.status, p.display_name",
        )
        .bind(player.into_inner())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(friend, display_name, status, requested_by)| {
                Ok(FriendView {
                    player_id: PlayerId(friend),
                    display_name,
                    status: parse_status(&status)?,
                    requested_by: PlayerId(requested_by),
                })
            })
            .collect()
    }

    /// Re-verify the friendship and the daily budget for (helper, friend),
    /// then log the help. Returns helps left today after this one.
    async fn record_help(
        &self,
        conn: &mut PgConnection,
        helper: PlayerId,
        friend: PlayerId,
        action: HelpAction,
        now: DateTime<Utc>,
    ) -> Result<u32, DbError> {
        let config = &self.config.social;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1), hashtext($2))")
            .bind(helper.to_string())
            .bind(friend.to_string())
            .execute(&mut *conn)
            .await?;
        let status = find_row(conn, helper, friend).await?.map(|f| f.status);
        friends::ensure_friends(helper, friend, status)?;

        let helped: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM help_log WHERE helper_id = $1 AND friend_id = $2 AND created_at >= $3",
        )
        .bind(helper.into_inner())
        .bind(friend.into_inner())
        .bind(friends::help_day_start(now))
        .fetch_one(&mut *conn)
        .await?;
        let helped = crate::codec::column(helped, "help_log", "count")?;
        friends::ensure_help_allowed(helped, config)?;

        sqlx::query("INSERT INTO help_log (helper_id, friend_id, action, created_at) VALUES ($1, $2, $3, $4)")
            .bind(helper.into_inner())
            .bind(friend.into_inner())
            .bind(action.as_str())
            .bind(now)
            .execute(&mut *conn)
            .await?;
        Ok(config
            .helps_per_friend_per_day
            .saturating_sub(helped)
            .saturating_sub(1))
    }

    /// Shorten a friend's growing crop.
    pub async fn help_friend_crop(&self, helper: PlayerId, friend: PlayerId, plot_index: u16) -> Result<SpeedUpResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let remaining = self.record_help(&mut tx, helper, friend, HelpAction::Crop, now).await?;
        let plot = farm::lock_plot(&mut tx, friend, plot_index).await?;
        let mut growing = plot
            .crop
            .ok_or_else(|| GameError::Precondition(format!("plot {plot_index} has nothing growing")))?;

        growing.ready_at = friends::help_completion(HelpAction::Crop, growing.ready_at, now, &self.config.social)?;
        farm::save_plot(&mut tx, friend, plot_index, Some(&growing)).await?;
        tx.commit().await?;

        tracing::info!(helper = %helper, friend = %friend, plot = plot_index, "crop helped");
        self.help_effects(helper).await;
        Ok(SpeedUpResult {
            success: true,
            completes_at: growing.ready_at,
            remaining: Some(remaining),
        })
    }

    /// Shorten one of a friend's production slots.
    pub async fn help_friend_production(
        &self,
        helper: PlayerId,
        friend: PlayerId,
        factory_id: FactoryId,
        slot_index: u16,
    ) -> Result<SpeedUpResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let remaining = self
            .record_help(&mut tx, helper, friend, HelpAction::Production, now)
            .await?;
        factory::lock_factory(&mut tx, friend, factory_id).await?;
        let mut slot = factory::lock_slot(&mut tx, factory_id, slot_index)
            .await?
            .ok_or_else(|| GameError::not_found("production slot", slot_index))?;

        slot.completes_at =
            friends::help_completion(HelpAction::Production, slot.completes_at, now, &self.config.social)?;
        factory::save_slot_completion(&mut tx, &slot).await?;
        tx.commit().await?;

        tracing::info!(helper = %helper, friend = %friend, factory = %factory_id, slot = slot_index, "production helped");
        self.help_effects(helper).await;
        Ok(SpeedUpResult {
            success: true,
            completes_at: slot.completes_at,
            remaining: Some(remaining),
        })
    }

    /// Supply a friend's open order from the helper's inventory. The
    /// order starts flying on the friend's board and the helper earns
    /// `social.helper_xp`.
    pub async fn help_fulfill_order(&self, helper: PlayerId, friend: PlayerId, order_id: OrderId) -> Result<SpeedUpResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let remaining = self.record_help(&mut tx, helper, friend, HelpAction::Order, now).await?;
        let order = super::skyport::lock_order(&mut tx, friend, order_id)
            .await?
            .ok_or_else(|| GameError::not_found("order", order_id))?;
        state::lock_scope(&mut tx, friend, Scope::Deliveries).await?;
        let mut supplier = state::load_player(&mut tx, helper).await?;
        let flying = super::skyport::in_delivery(&mut tx, friend).await?;

        let times = skyport::start_delivery(&mut supplier, &order, flying, &self.config, now)?;
        let levels = supplier.grant_xp(self.config.social.helper_xp, &self.config.progression)?;
        super::skyport::save_delivery(&mut tx, order_id, times, Some(helper)).await?;
        state::save_player(&mut tx, &supplier).await?;
        tx.commit().await?;

        tracing::info!(helper = %helper, friend = %friend, order = %order_id, "order supplied by friend");
        let mut effects = Effects::new();
        effects.event(ProgressEvent::plain(ConditionType::Help, 1));
        if levels > 0 {
            effects.event(ProgressEvent::plain(
                ConditionType::ReachLevel,
                u64::from(supplier.level()),
            ));
        }
        self.fan_out(helper, effects).await;
        Ok(SpeedUpResult {
            success: true,
            completes_at: times.completes_at,
            remaining: Some(remaining),
        })
    }

    async fn help_effects(&self, helper: PlayerId) {
        let mut effects = Effects::new();
        effects.event(ProgressEvent::plain(ConditionType::Help, 1));
        self.fan_out(helper, effects).await;
    }
}
