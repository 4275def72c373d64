//! The seed shop, the NPC market and the player marketplace.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use hexfield_engine::GameError;
use hexfield_engine::market::{self, Listing};
use hexfield_engine::progress::ProgressEvent;
use hexfield_types::{
    BalanceResult, ConditionType, CropId, ItemKind, ListingId, ListingPurchaseResult, PlayerId,
};

use super::Game;
use crate::codec::{column, item_columns, item_from_columns, param};
use crate::effects::Effects;
use crate::error::DbError;
use crate::state::{self, Scope};
use crate::views::{CancelResult, ListingView};

#[derive(Debug, sqlx::FromRow)]
struct ListingRow {
    id: Uuid,
    seller_id: Uuid,
    item_category: String,
    item_base: i32,
    item_level: i32,
    quantity: i64,
    price: i64,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    buyer_id: Option<Uuid>,
    purchased_at: Option<DateTime<Utc>>,
}

impl ListingRow {
    fn into_listing(self) -> Result<Listing, DbError> {
        Ok(Listing {
            id: ListingId(self.id),
            seller: PlayerId(self.seller_id),
            item: item_from_columns("market_listings", &self.item_category, self.item_base, self.item_level)?,
            quantity: column(self.quantity, "market_listings", "quantity")?,
            price: column(self.price, "market_listings", "price")?,
            created_at: self.created_at,
            expires_at: self.expires_at,
            buyer: self.buyer_id.map(PlayerId),
            purchased_at: self.purchased_at,
        })
    }
}

const LISTING_COLUMNS: &str = "id, seller_id, item_category, item_base, item_level, quantity, price, \
     created_at, expires_at, buyer_id, purchased_at";

async fn lock_listing(conn: &mut PgConnection, id: ListingId) -> Result<Listing, DbError> {
    sqlx::query_as::<_, ListingRow>(&format!(
        "SELECT {LISTING_COLUMNS} FROM market_listings WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.into_inner())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| GameError::not_found("listing", id))?
    .into_listing()
}

async fn delete_listing(conn: &mut PgConnection, id: ListingId) -> Result<(), DbError> {
    sqlx::query("DELETE FROM market_listings WHERE id = $1")
        .bind(id.into_inner())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

const fn listing_view(listing: &Listing) -> ListingView {
    ListingView {
        id: listing.id,
        seller: listing.seller,
        item: listing.item,
        quantity: listing.quantity,
        price: listing.price,
        expires_at: listing.expires_at,
    }
}

impl Game {
    /// Buy `quantity` seeds of `crop_id` from the shop.
    pub async fn buy_seeds(&self, player: PlayerId, crop_id: CropId, quantity: u32) -> Result<BalanceResult, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let cost = market::buy_seeds(&mut state, self.catalog.crops.get(&crop_id), quantity)?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        tracing::info!(player = %player, crop = %crop_id, quantity, cost, "seeds bought");
        Ok(BalanceResult {
            success: true,
            crystals: state.ledger.crystals,
            gems: state.ledger.gems,
            awarded: None,
        })
    }

    /// Sell items to the NPC market at their listed value.
    pub async fn sell_to_market(&self, player: PlayerId, item: ItemKind, quantity: u32) -> Result<BalanceResult, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let awarded = market::sell_to_market(&mut state, item, quantity, &self.catalog.item_values)?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        let mut effects = Effects::new();
        effects
            .event(ProgressEvent {
                condition: ConditionType::Sell,
                item: Some(item),
                amount: u64::from(quantity),
            })
            .level(&awarded);
        self.fan_out(player, effects).await;
        Ok(BalanceResult {
            success: true,
            crystals: state.ledger.crystals,
            gems: state.ledger.gems,
            awarded: Some(awarded),
        })
    }

    /// Escrow items in a new listing.
    pub async fn create_listing(
        &self,
        player: PlayerId,
        item: ItemKind,
        quantity: u32,
        price: u64,
    ) -> Result<ListingView, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        state::lock_scope(&mut tx, player, Scope::Listings).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        let active = state::count_for(
            &mut tx,
            "SELECT count(*) FROM market_listings WHERE seller_id = $1 AND purchased_at IS NULL",
            player,
        )
        .await?;

        let listing = market::create_listing(&mut state, item, quantity, price, active, &self.config.economy, now)?;
        let (category, base, level) = item_columns(item);
        sqlx::query(
            r"INSERT INTO market_listings
                (id, seller_id, item_category, item_base, item_level, quantity, price, created_at, expires_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(listing.id.into_inner())
        .bind(player.into_inner())
        .bind(category)
        .bind(base)
        .bind(level)
        .bind(i64::from(listing.quantity))
        .bind(param::<_, i64>(listing.price, "price")?)
        .bind(listing.created_at)
        .bind(listing.expires_at)
        .execute(&mut *tx)
        .await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        tracing::info!(player = %player, listing = %listing.id, item = %item, quantity, price, "listing created");
        Ok(listing_view(&listing))
    }

    /// Buy a listing. The listing row is locked first, so two buyers of one
    /// listing serialize and the second sees it purchased. Buyer and seller
    /// are saved in id order.
    pub async fn purchase_listing(&self, buyer: PlayerId, listing_id: ListingId) -> Result<ListingPurchaseResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let mut listing = lock_listing(&mut tx, listing_id).await?;
        let mut states = state::load_players(&mut tx, [buyer, listing.seller]).await?;
        let mut buyer_state = state::take(&mut states, buyer)?;

        let result = if listing.seller == buyer {
            let mut ledger = buyer_state.ledger.clone();
            market::purchase(&mut buyer_state, &mut ledger, &mut listing, &self.config.economy, now)?
        } else {
            let seller_state = states
                .get_mut(&listing.seller)
                .ok_or_else(|| GameError::not_found("player", listing.seller))?;
            market::purchase(
                &mut buyer_state,
                &mut seller_state.ledger,
                &mut listing,
                &self.config.economy,
                now,
            )?
        };

        sqlx::query("UPDATE market_listings SET buyer_id = $2, purchased_at = $3 WHERE id = $1")
            .bind(listing_id.into_inner())
            .bind(listing.buyer.map(PlayerId::into_inner))
            .bind(listing.purchased_at)
            .execute(&mut *tx)
            .await?;
        states.insert(buyer, buyer_state);
        state::save_players(&mut tx, &states).await?;
        tx.commit().await?;
        Ok(result)
    }

    /// Withdraw an unsold listing and take the items back.
    pub async fn cancel_listing(&self, player: PlayerId, listing_id: ListingId) -> Result<CancelResult, DbError> {
        let mut tx = self.pool.begin().await?;
        let listing = lock_listing(&mut tx, listing_id).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        market::cancel(&mut state, &listing)?;
        delete_listing(&mut tx, listing_id).await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;

        tracing::info!(player = %player, listing = %listing_id, "listing cancelled");
        Ok(CancelResult {
            success: true,
            cancelled: true,
        })
    }

    /// Take back the items of a listing that expired unsold.
    pub async fn reclaim_expired_listing(&self, player: PlayerId, listing_id: ListingId) -> Result<CancelResult, DbError> {
        let now = self.now();
        let mut tx = self.pool.begin().await?;
        let listing = lock_listing(&mut tx, listing_id).await?;
        let mut state = state::load_player(&mut tx, player).await?;
        market::reclaim_expired(&mut state, &listing, now)?;
        delete_listing(&mut tx, listing_id).await?;
        state::save_player(&mut tx, &state).await?;
        tx.commit().await?;
        Ok(CancelResult {
            success: true,
            cancelled: true,
        })
    }

    /// Live listings, cheapest first, optionally for one item.
    pub async fn browse_listings(&self, item: Option<ItemKind>, limit: u32) -> Result<Vec<ListingView>, DbError> {
        let columns = item.map(item_columns);
        sqlx::query_as::<_, ListingRow>(&format!(
            r"SELECT {LISTING_COLUMNS} FROM market_listings
              WHERE purchased_at IS NULL AND expires_at > $1
                AND ($2::TEXT IS NULL OR (item_category = $2 AND item_base = $3 AND item_level = $4))
              ORDER BY price, created_at
              LIMIT $5"
        ))
        .bind(self.now())
        .bind(columns.map(|c| c.0))
        .bind(columns.map(|c| c.1))
        .bind(columns.map(|c| c.2))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| row.into_listing().map(|l| listing_view(&l)))
        .collect()
    }
}
