//! Seed shop, NPC market and the player-to-player listing market.
//!
//! A listing escrows its items: they leave the seller's inventory when the
//! listing is created and go either to the buyer or back to the seller.
//! Purchase marks the listing instead of deleting it, so a retried purchase
//! observes "already purchased".

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use hexfield_ledger::PlayerLedger;
use hexfield_types::{Awarded, ItemKind, ItemStack, ListingId, ListingPurchaseResult, PlayerId};

use crate::catalog::{CropDefinition, ItemValues};
use crate::config::EconomyConfig;
use crate::error::GameError;
use crate::state::{self, PlayerState};

/// One market listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    /// Identifier.
    pub id: ListingId,
    /// Seller.
    pub seller: PlayerId,
    /// Escrowed item.
    pub item: ItemKind,
    /// Escrowed quantity.
    pub quantity: u32,
    /// Asking price in crystals for the whole lot.
    pub price: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// After this the listing can no longer be bought.
    pub expires_at: DateTime<Utc>,
    /// Buyer, once purchased.
    pub buyer: Option<PlayerId>,
    /// Purchase time, once purchased.
    pub purchased_at: Option<DateTime<Utc>>,
}

impl Listing {
    /// Whether the listing has been bought.
    pub const fn is_purchased(&self) -> bool {
        self.buyer.is_some()
    }

    /// Whether the listing has lapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Crystals the market keeps from a sale, floored.
pub fn commission(price: u64, rate: Decimal) -> u64 {
    Decimal::from(price)
        .checked_mul(rate)
        .and_then(|c| c.floor().to_u64())
        .unwrap_or(0)
        .min(price)
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// List `quantity` of `item` for `price` crystals, escrowing the items.
pub fn create_listing(
    seller: &mut PlayerState,
    item: ItemKind,
    quantity: u32,
    price: u64,
    active_listings: u32,
    config: &EconomyConfig,
    now: DateTime<Utc>,
) -> Result<Listing, GameError> {
    if quantity == 0 {
        return Err(GameError::Invalid("listing quantity must be positive".into()));
    }
    if price == 0 {
        return Err(GameError::Invalid("listing price must be positive".into()));
    }
    if active_listings >= config.max_active_listings {
        return Err(GameError::LimitReached {
            what: "active listing".into(),
            used: active_listings,
            limit: config.max_active_listings,
        });
    }
    let expires_at = TimeDelta::try_hours(config.listing_ttl_hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| GameError::overflow("listing expiry"))?;
    seller.inventory.debit(item, u64::from(quantity))?;
    Ok(Listing {
        id: ListingId::new(),
        seller: seller.player_id(),
        item,
        quantity,
        price,
        created_at: now,
        expires_at,
        buyer: None,
        purchased_at: None,
    })
}

/// Buy a listing.
///
/// The buyer pays the full price; the seller receives it minus commission.
pub fn purchase(
    buyer: &mut PlayerState,
    seller: &mut PlayerLedger,
    listing: &mut Listing,
    config: &EconomyConfig,
    now: DateTime<Utc>,
) -> Result<ListingPurchaseResult, GameError> {
    if listing.is_purchased() {
        return Err(GameError::terminal(format!("listing {}", listing.id), "purchased"));
    }
    if listing.is_expired(now) {
        return Err(GameError::Precondition(format!(
            "listing {} expired at {}",
            listing.id, listing.expires_at
        )));
    }
    if buyer.player_id() == listing.seller {
        return Err(GameError::Invalid("cannot buy your own listing".into()));
    }
    if seller.player_id != listing.seller {
        return Err(GameError::not_found("seller", listing.seller));
    }
    let proceeds = listing
        .price
        .saturating_sub(commission(listing.price, config.commission_rate));
    buyer.ledger.debit_crystals(listing.price)?;
    seller.credit_crystals(proceeds)?;
    buyer.inventory.credit(listing.item, u64::from(listing.quantity))?;
    listing.buyer = Some(buyer.player_id());
    listing.purchased_at = Some(now);
    tracing::info!(
        buyer = %buyer.player_id(),
        seller = %listing.seller,
        listing = %listing.id,
        price = listing.price,
        proceeds,
        "listing purchased"
    );
    Ok(ListingPurchaseResult {
        success: true,
        listing_id: listing.id,
        price: listing.price,
        seller_proceeds: proceeds,
        item: ItemStack {
            item: listing.item,
            quantity: listing.quantity,
        },
    })
}

fn return_escrow(seller: &mut PlayerState, listing: &Listing) -> Result<(), GameError> {
    if listing.seller != seller.player_id() {
        return Err(GameError::not_found("listing", listing.id));
    }
    if listing.is_purchased() {
        return Err(GameError::terminal(format!("listing {}", listing.id), "purchased"));
    }
    seller.inventory.credit(listing.item, u64::from(listing.quantity))?;
    Ok(())
}

/// Withdraw an unpurchased listing, returning the items. The caller
/// deletes the row.
pub fn cancel(seller: &mut PlayerState, listing: &Listing) -> Result<(), GameError> {
    return_escrow(seller, listing)
}

/// Take back the items of a listing that lapsed unsold.
pub fn reclaim_expired(seller: &mut PlayerState, listing: &Listing, now: DateTime<Utc>) -> Result<(), GameError> {
    if !listing.is_expired(now) {
        return Err(GameError::Precondition(format!(
            "listing {} is live until {}",
            listing.id, listing.expires_at
        )));
    }
    return_escrow(seller, listing)
}

// ---------------------------------------------------------------------------
// Seed shop and NPC market
// ---------------------------------------------------------------------------

/// Buy seeds for crystals.
pub fn buy_seeds(
    player: &mut PlayerState,
    crop: Option<&CropDefinition>,
    quantity: u32,
) -> Result<u64, GameError> {
    let crop = crop.ok_or_else(|| GameError::Invalid("unknown crop".into()))?;
    if quantity == 0 {
        return Err(GameError::Invalid("seed quantity must be positive".into()));
    }
    if player.level() < crop.unlock_level {
        return Err(GameError::LevelTooLow {
            required: crop.unlock_level,
            current: player.level(),
        });
    }
    let cost = crop
        .seed_price
        .checked_mul(u64::from(quantity))
        .ok_or_else(|| GameError::overflow("seed cost"))?;
    player.ledger.debit_crystals(cost)?;
    player.inventory.credit(crop.seed_item()?, u64::from(quantity))?;
    Ok(cost)
}

/// Sell items to the NPC market at the value table's price.
pub fn sell_to_market(
    player: &mut PlayerState,
    item: ItemKind,
    quantity: u32,
    values: &ItemValues,
) -> Result<Awarded, GameError> {
    if quantity == 0 {
        return Err(GameError::Invalid("sell quantity must be positive".into()));
    }
    let unit = values
        .get(item)
        .and_then(|v| v.sell_price)
        .ok_or_else(|| GameError::Invalid(format!("the market does not buy {item}")))?;
    let earned = unit
        .checked_mul(u64::from(quantity))
        .ok_or_else(|| GameError::overflow("sale proceeds"))?;
    player.inventory.debit(item, u64::from(quantity))?;
    player.ledger.credit_crystals(earned)?;
    tracing::info!(player = %player.player_id(), item = %item, quantity, earned, "sold to market");
    Ok(state::awarded(earned, 0, 0, &BTreeMap::new(), 0, player.level()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hexfield_ledger::Inventory;
    use hexfield_types::CropId;
    use rust_decimal_macros::dec;

    use crate::catalog::ItemValue;

    use super::*;

    fn player(crystals: u64, lines: &[(ItemKind, u64)]) -> PlayerState {
        let id = PlayerId::new();
        PlayerState::new(
            PlayerLedger::new(id, crystals, 0),
            Inventory::from_lines(id, lines.iter().copied()),
        )
    }

    fn listed(seller: &mut PlayerState, price: u64, now: DateTime<Utc>) -> Listing {
        create_listing(seller, ItemKind::Craftable(200), 2, price, 0, &EconomyConfig::default(), now).unwrap()
    }

    #[test]
    fn commission_is_floored() {
        assert_eq!(commission(100, dec!(0.05)), 5);
        assert_eq!(commission(30, dec!(0.05)), 1);
        assert_eq!(commission(10, dec!(0.05)), 0);
    }

    #[test]
    fn purchase_moves_items_and_pays_seller() {
        let now = Utc::now();
        let mut seller = player(0, &[(ItemKind::Craftable(200), 5)]);
        let mut listing = listed(&mut seller, 100, now);
        assert_eq!(seller.inventory.quantity(ItemKind::Craftable(200)), 3);

        let mut buyer = player(150, &[]);
        let result = purchase(&mut buyer, &mut seller.ledger, &mut listing, &EconomyConfig::default(), now);
        assert_eq!(result.map(|r| r.seller_proceeds).ok(), Some(95));
        assert_eq!(buyer.ledger.crystals, 50);
        assert_eq!(seller.ledger.crystals, 95);
        assert_eq!(buyer.inventory.quantity(ItemKind::Craftable(200)), 2);
    }

    #[test]
    fn second_purchase_sees_already_purchased() {
        let now = Utc::now();
        let mut seller = player(0, &[(ItemKind::Craftable(200), 2)]);
        let mut listing = listed(&mut seller, 10, now);
        let config = EconomyConfig::default();
        let mut first = player(10, &[]);
        let mut second = player(10, &[]);
        assert!(purchase(&mut first, &mut seller.ledger, &mut listing, &config, now).is_ok());
        let again = purchase(&mut second, &mut seller.ledger, &mut listing, &config, now);
        assert!(matches!(again, Err(GameError::AlreadyTerminal { state: "purchased", .. })));
        assert_eq!(second.ledger.crystals, 10);
    }

    #[test]
    fn seller_cannot_buy_own_listing() {
        let now = Utc::now();
        let mut seller = player(500, &[(ItemKind::Craftable(200), 2)]);
        let mut listing = listed(&mut seller, 10, now);
        let mut seller_ledger = seller.ledger.clone();
        let result = purchase(&mut seller, &mut seller_ledger, &mut listing, &EconomyConfig::default(), now);
        assert!(matches!(result, Err(GameError::Invalid(_))));
    }

    #[test]
    fn expired_listing_can_only_be_reclaimed() {
        let now = Utc::now();
        let mut seller = player(0, &[(ItemKind::Craftable(200), 2)]);
        let mut listing = listed(&mut seller, 10, now);
        assert!(reclaim_expired(&mut seller, &listing, now).is_err());

        let later = listing.expires_at;
        let mut buyer = player(100, &[]);
        let result = purchase(&mut buyer, &mut seller.ledger, &mut listing, &EconomyConfig::default(), later);
        assert!(matches!(result, Err(GameError::Precondition(_))));
        assert!(reclaim_expired(&mut seller, &listing, later).is_ok());
        assert_eq!(seller.inventory.quantity(ItemKind::Craftable(200)), 2);
    }

    #[test]
    fn listing_limit_and_escrow_shortfall() {
        let now = Utc::now();
        let config = EconomyConfig::default();
        let mut seller = player(0, &[(ItemKind::Craftable(200), 1)]);
        let full = create_listing(&mut seller, ItemKind::Craftable(200), 1, 5, 10, &config, now);
        assert!(matches!(full, Err(GameError::LimitReached { .. })));
        let short = create_listing(&mut seller, ItemKind::Craftable(200), 2, 5, 0, &config, now);
        assert!(matches!(short, Err(GameError::Ledger(_))));
    }

    #[test]
    fn cancel_returns_items_to_seller_only() {
        let now = Utc::now();
        let mut seller = player(0, &[(ItemKind::Craftable(200), 2)]);
        let listing = listed(&mut seller, 10, now);
        let mut stranger = player(0, &[]);
        assert!(matches!(cancel(&mut stranger, &listing), Err(GameError::NotFound { .. })));
        assert!(cancel(&mut seller, &listing).is_ok());
        assert_eq!(seller.inventory.quantity(ItemKind::Craftable(200)), 2);
    }

    #[test]
    fn seeds_and_npc_sales() {
        let wheat = CropDefinition {
            id: CropId(1),
            name: "Wheat".into(),
            grow_seconds: Some(120),
            yield_quantity: 3,
            seed_price: 4,
            unlock_level: 1,
        };
        let mut p = player(20, &[(ItemKind::Crop(1), 6)]);
        assert_eq!(buy_seeds(&mut p, Some(&wheat), 5).ok(), Some(20));
        assert_eq!(p.inventory.quantity(ItemKind::Seed(1)), 5);
        assert!(buy_seeds(&mut p, Some(&wheat), 1).is_err());

        let values = ItemValues::new(
            BTreeMap::from([(
                ItemKind::Crop(1),
                ItemValue {
                    sell_price: Some(3),
                    xp_per_unit: 1,
                },
            )]),
            1,
        );
        let sold = sell_to_market(&mut p, ItemKind::Crop(1), 4, &values);
        assert_eq!(sold.map(|a| a.crystals).ok(), Some(Some(12)));
        assert!(matches!(
            sell_to_market(&mut p, ItemKind::Seed(1), 1, &values),
            Err(GameError::Invalid(_))
        ));
    }
}
