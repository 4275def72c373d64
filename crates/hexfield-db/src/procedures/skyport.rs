//! The skyport order board.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgConnection;
use uuid::Uuid;

use hexfield_engine::GameError;
use hexfield_engine::progress::ProgressEvent;
use hexfield_engine::scheduler::{self, TaskTimes};
use hexfield_engine::skyport::{self, SkyportOrder};
use hexfield_types::bundle::{item_list_to_json, parse_item_list};
use hexfield_types::{
    Bundle, CollectResult, ConditionType, ItemStack, OrderId, OrderTemplateId, PlayerId,
    SpeedUpCategory, SpeedUpResult, StartResult,
};

use super::Game;
use crate::effects::Effects;
use crate::error::DbError;
use crate::state::{self, Scope};
use crate::views::{CancelResult, OrderView};

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    template_id: i32,
    requirements: Value,
    reward: Value,
    delivery_seconds: Option<i64>,
    created_at: DateTime<Utc>,
    delivery_started_at: Option<DateTime<Utc>>,
    delivery_completes_at: Option<DateTime<Utc>>,
    supplied_by: Option<Uuid>,
}

impl OrderRow {
    fn into_order(self) -> Result<(SkyportOrder, Option<PlayerId>), DbError> {
        let requirements =
            parse_item_list(&self.requirements).map_err(|e| DbError::corrupt("skyport_orders", e.0))?;
        let reward = Bundle::from_json(&self.reward).map_err(|e| DbError::corrupt("skyport_orders", e.0))?;
        let order = SkyportOrder {
            id: OrderId(self.id),
            template_id: OrderTemplateId(self.template_id),
            requirements,
            reward,
            delivery_seconds: self.delivery_seconds,
            created_at: self.created_at,
            delivery: self.delivery_completes_at.map(|completes_at| TaskTimes {
                started_at: self.delivery_started_at.unwrap_or(completes_at),
                completes_at,
            }),
        };
        Ok((order, self.supplied_by.map(PlayerId)))
    }
}

const ORDER_COLUMNS: &str = "id, template_id, requirements, reward, delivery_seconds, created_at, \
     delivery_started_at, delivery_completes_at, supplied_by";

/// Lock an order on `owner`'s board.
pub(super) async fn lock_order(
    conn: &mut PgConnection,
    owner: PlayerId,
    id: OrderId,
) -> Result<Option<SkyportOrder>, DbError> {
    sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM skyport_orders WHERE id = $1 AND player_id = $2 FOR UPDATE"
    ))
    .bind(id.into_inner())
    .bind(owner.into_inner())
    .fetch_optional(&mut *conn)
    .await?
    .map(|row| row.into_order().map(|(order, _)| order))
    .transpose()
}

/// Orders of `owner` currently in flight.
pub(super) async fn in_delivery(conn: &mut PgConnection, owner: PlayerId) -> Result<u32, DbError> {
    state::count_for(
        conn,
        "SELECT count(*) FROM skyport_orders WHERE player_id = $1 AND delivery_completes_at IS NOT NULL",
        owner,
    )
    .await
}

/// Record a started (or shortened) delivery.
pub(super) async fn save_delivery(
    conn: &mut PgConnection,
    order: OrderId,
    times: TaskTimes,
    supplied_by: Option<PlayerId>,
) -> Result<(), DbError> {
    sqlx::query(
        r"UPDATE skyport_orders
          SET delivery_started_at = $2, delivery_completes_at = $3, supplied_by = COALESCE($4, supplied_by)
          WHERE id = $1",
    )
    .bind(order.into_inner())
    .bind(times.started_at)
    .bind(times.completes_at)
    .bind(supplied_by.map(PlayerId::into_inner))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl Game {
    /// Top the board up to `skyport.max_open_orders` open orders.
    pub async fn refresh_orders(&self, player: PlayerId) -> Result<Vec<OrderView>, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        state::lock_scope(&mut tx, player, Scope::Deliveries).await?;
        let ledger = state::load_ledger(&mut tx, player).await?;
        let open = state::count_for(
            &mut tx,
            "SELECT count(*) FROM skyport_orders WHERE player_id = $1 AND delivery_completes_at IS NULL",
            player,
        )
        .await?;

        let orders = {
            let mut rng = rand::rng();
            skyport::generate_orders(open, &self.catalog.order_templates, ledger.level, &self.config, &mut rng, now)
        };
        for order in &orders {
            sqlx::query(
                r"INSERT INTO skyport_orders (id, player_id, template_id, requirements, reward, delivery_seconds, created_at)
                  VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(order.id.into_inner())
            .bind(player.into_inner())
            .bind(order.template_id.get())
            .bind(item_list_to_json(&order.requirements))
            .bind(order.reward.to_json())
            .bind(order.delivery_seconds)
            .bind(order.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::info!(player = %player, added = orders.len(), "skyport board refreshed");
        self.list_orders(player).await
    }

    /// Load an open order's requirements and start its flight.
    pub async fn start_delivery(&self, player: PlayerId, order_id: OrderId) -> Result<StartResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut tx, player, order_id)
            .await?
            .ok_or_else(|| GameError::not_found("order", order_id))?;
        state::lock_scope(&mut tx, player, Scope::Deliveries).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let flying = in_delivery(&mut tx, player).await?;

        let times = skyport::start_delivery(&mut state, &order, flying, &self.config, now)?;
        save_delivery(&mut tx, order_id, times, None).await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;
        Ok(scheduler::start_result(times, None, &order.requirements))
    }

    /// Collect a landed delivery's reward. A missing order is a successful
    /// no-op.
    pub async fn collect_delivery(&self, player: PlayerId, order_id: OrderId) -> Result<CollectResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let Some(order) = lock_order(&mut tx, player, order_id).await? else {
            tracing::debug!(player = %player, order = %order_id, "nothing to collect");
            return Ok(CollectResult::nothing_to_collect());
        };
        let mut state = state::load_player(&mut tx, player).await?;
        let boosts = state::load_boosts(&mut tx, player, now).await?;

        let awarded = skyport::collect_delivery(&mut state, &order, &boosts, &self.config, now)?;
        sqlx::query("DELETE FROM skyport_orders WHERE id = $1")
            .bind(order_id.into_inner())
            .execute(&mut *tx)
            .await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        tracing::info!(player = %player, order = %order_id, "delivery collected");
        let mut effects = Effects::new();
        effects
            .level(&awarded)
            .event(ProgressEvent::plain(ConditionType::Deliver, 1));
        self.fan_out(player, effects).await;
        Ok(CollectResult::collected(awarded))
    }

    /// Drop an open order from the board.
    pub async fn discard_order(&self, player: PlayerId, order_id: OrderId) -> Result<CancelResult, DbError> {
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut tx, player, order_id)
            .await?
            .ok_or_else(|| GameError::not_found("order", order_id))?;
        skyport::discard(&order)?;
        sqlx::query("DELETE FROM skyport_orders WHERE id = $1")
            .bind(order_id.into_inner())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(player = %player, order = %order_id, "order discarded");
        Ok(CancelResult {
            success: true,
            cancelled: true,
        })
    }

    /// Shorten a flight. Rate-limited under `skyport`.
    pub async fn speed_up_delivery(&self, player: PlayerId, order_id: OrderId) -> Result<SpeedUpResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut tx, player, order_id)
            .await?
            .ok_or_else(|| GameError::not_found("order", order_id))?;
        let mut times = order
            .delivery
            .ok_or_else(|| GameError::Precondition(format!("order {order_id} has not been started")))?;

        let result = self
            .grant_speed_up(&mut tx, player, SpeedUpCategory::Skyport, times.completes_at, now)
            .await?;
        times.completes_at = result.completes_at;
        save_delivery(&mut tx, order_id, times, None).await?;
        tx.commit().await?;
        Ok(result)
    }

    /// The caller's board, oldest first.
    pub async fn list_orders(&self, player: PlayerId) -> Result<Vec<OrderView>, DbError> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM skyport_orders WHERE player_id = $1 ORDER BY created_at, id"
        ))
        .bind(player.into_inner())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| {
            let (order, supplied_by) = row.into_order()?;
            Ok(OrderView {
                id: order.id,
                requirements: ItemStack::from_map(&order.requirements),
                reward: order.reward.to_json(),
                delivery_completes_at: order.delivery.map(|t| t.completes_at),
                supplied_by,
            })
        })
        .collect()
    }
}
