//! Axum router construction.
//!
//! One route per game operation. Every route except `GET /health` requires
//! the caller identity header.

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{coven, economy, players, production, progress, social, town};
use crate::state::AppState;

/// Build the complete router.
///
/// CORS allows any origin; the gateway in front of the server is where
/// origins are restricted.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .merge(player_routes())
        .merge(production_routes())
        .merge(town_routes())
        .merge(economy_routes())
        .merge(social_routes())
        .merge(coven_routes())
        .merge(progress_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

fn player_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/players", post(players::create_player))
        .route("/api/me", get(players::get_profile))
        .route("/api/me/inventory", get(players::get_inventory))
}

fn production_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Farm
        .route("/api/farm", get(production::get_farm))
        .route("/api/farm/plots/{plot}/plant", post(production::plant_crop))
        .route("/api/farm/plots/{plot}/harvest", post(production::harvest_crop))
        .route("/api/farm/plots/{plot}/speed-up", post(production::speed_up_crop))
        // Factories
        .route(
            "/api/factories",
            get(production::list_factories).post(production::create_factory),
        )
        .route("/api/factories/{id}/slots", post(production::purchase_factory_slot))
        .route("/api/factories/{id}/upgrade", post(production::upgrade_factory))
        .route("/api/factories/{id}/production", post(production::start_production))
        .route(
            "/api/factories/{id}/slots/{slot}/collect",
            post(production::collect_production),
        )
        .route(
            "/api/factories/{id}/slots/{slot}/speed-up",
            post(production::speed_up_production),
        )
        // Zoo
        .route("/api/zoo", get(production::get_zoo))
        .route("/api/zoo/enclosures", post(production::create_enclosure))
        .route("/api/zoo/enclosures/{id}/animals", post(production::add_animal))
        .route(
            "/api/zoo/enclosures/{id}/breeding",
            post(production::start_breeding).delete(production::cancel_breeding),
        )
        .route(
            "/api/zoo/enclosures/{id}/breeding/collect",
            post(production::collect_breeding),
        )
        .route("/api/zoo/animals/{id}", delete(production::remove_animal))
        .route(
            "/api/zoo/animals/{id}/production",
            post(production::start_animal_production).delete(production::cancel_animal_production),
        )
        .route(
            "/api/zoo/animals/{id}/production/collect",
            post(production::collect_animal_production),
        )
        .route("/api/zoo/animals/{id}/speed-up", post(production::speed_up_animal))
        // Skyport
        .route("/api/skyport/orders", get(production::list_orders))
        .route("/api/skyport/orders/refresh", post(production::refresh_orders))
        .route("/api/skyport/orders/{id}", delete(production::discard_order))
        .route("/api/skyport/orders/{id}/deliver", post(production::start_delivery))
        .route("/api/skyport/orders/{id}/collect", post(production::collect_delivery))
        .route("/api/skyport/orders/{id}/speed-up", post(production::speed_up_delivery))
        // Speed-ups and boosts
        .route("/api/speed-ups/{category}", get(production::speedup_eligibility))
        .route("/api/boosts", post(production::activate_boost))
}

fn town_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/town", get(town::get_town))
        .route("/api/town/buildings", post(town::place_building))
        .route("/api/town/decorations", post(town::place_decoration))
        .route("/api/town/roads", post(town::place_road))
        .route("/api/town/placements/{id}", delete(town::remove_placement))
        .route("/api/town/placements/{id}/move", post(town::move_placement))
        .route("/api/town/placements/{id}/upgrade", post(town::upgrade_building))
}

fn economy_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/market/seeds", post(economy::buy_seeds))
        .route("/api/market/sell", post(economy::sell_to_market))
        .route(
            "/api/market/listings",
            get(economy::browse_listings).post(economy::create_listing),
        )
        .route("/api/market/listings/{id}", delete(economy::cancel_listing))
        .route("/api/market/listings/{id}/purchase", post(economy::purchase_listing))
        .route("/api/market/listings/{id}/reclaim", post(economy::reclaim_expired_listing))
        .route("/api/daily-reward", post(economy::claim_daily_reward))
}

fn social_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/friends", get(social::list_friends))
        .route("/api/friends/{player}", delete(social::remove_friend))
        .route("/api/friends/{player}/request", post(social::send_friend_request))
        .route("/api/friends/{player}/accept", post(social::accept_friend_request))
        .route("/api/friends/{player}/decline", post(social::decline_friend_request))
        .route("/api/friends/{player}/help/plots/{plot}", post(social::help_friend_crop))
        .route(
            "/api/friends/{player}/help/factories/{factory}/slots/{slot}",
            post(social::help_friend_production),
        )
        .route("/api/friends/{player}/help/orders/{order}", post(social::help_fulfill_order))
}

fn coven_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/coven", get(coven::get_coven))
        .route("/api/coven/leave", post(coven::leave_coven))
        .route("/api/coven/leader", post(coven::transfer_leadership))
        .route("/api/coven/members/{player}", delete(coven::kick_member))
        .route("/api/coven/invitations", post(coven::invite_to_coven))
        .route("/api/coven/donations/crystals", post(coven::donate_crystals))
        .route("/api/coven/donations/items", post(coven::donate_items))
        .route(
            "/api/coven/tasks",
            get(coven::list_coven_tasks).post(coven::create_coven_task),
        )
        .route("/api/coven/tasks/{id}/contribute", post(coven::contribute_to_task))
        .route("/api/covens", post(coven::create_coven))
        .route("/api/covens/{id}/join", post(coven::join_coven))
        .route("/api/covens/{id}/members/{player}", get(coven::is_coven_member))
        .route("/api/invitations", get(coven::list_invitations))
        .route("/api/invitations/{id}", delete(coven::cancel_invitation))
        .route("/api/invitations/{id}/respond", post(coven::respond_to_invitation))
}

fn progress_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/achievements", get(progress::list_achievements))
        .route("/api/achievements/{id}/claim", post(progress::claim_achievement))
        .route("/api/quests", get(progress::list_quests))
        .route("/api/quests/{id}/claim", post(progress::claim_quest))
        .route("/api/regattas/{id}", get(progress::get_regatta))
        .route("/api/regattas/{id}/join", post(progress::join_regatta))
        .route(
            "/api/regattas/{id}/tasks/{task}/submit",
            post(progress::submit_regatta_task),
        )
        .route("/api/regattas/{id}/settle", post(progress::settle_regatta))
        .route("/api/regattas/{id}/standings", get(progress::regatta_standings))
}
