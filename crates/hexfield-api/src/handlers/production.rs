//! Farm, factories, zoo, skyport, speed-ups and boosts.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use hexfield_db::views::{AnimalView, BoostView, CancelResult, EnclosureView, FactoryView, OrderView, PlotView};
use hexfield_types::{
    AnimalId, CollectResult, EnclosureId, FactoryId, OrderId, SpeedUpCategory, SpeedUpEligibility,
    SpeedUpResult, StartResult,
};

use super::ApiResult;
use crate::extract::{Caller, ValidJson};
use crate::requests::{
    AddAnimalRequest, BoostRequest, BreedingRequest, CreateEnclosureRequest, CreateFactoryRequest, PlantRequest,
    StartProductionRequest,
};
use crate::state::AppState;

type Shared = State<Arc<AppState>>;

// ---------------------------------------------------------------------------
// Farm
// ---------------------------------------------------------------------------

/// `GET /api/farm`
pub async fn get_farm(State(state): Shared, Caller(player): Caller) -> ApiResult<Vec<PlotView>> {
    Ok(Json(state.game.get_farm(player).await?))
}

/// `POST /api/farm/plots/{plot}/plant`
pub async fn plant_crop(
    State(state): Shared,
    Caller(player): Caller,
    Path(plot): Path<u16>,
    ValidJson(req): ValidJson<PlantRequest>,
) -> ApiResult<StartResult> {
    Ok(Json(state.game.plant_crop(player, plot, req.crop_id).await?))
}

/// `POST /api/farm/plots/{plot}/harvest`
pub async fn harvest_crop(
    State(state): Shared,
    Caller(player): Caller,
    Path(plot): Path<u16>,
) -> ApiResult<CollectResult> {
    Ok(Json(state.game.harvest_crop(player, plot).await?))
}

/// `POST /api/farm/plots/{plot}/speed-up`
pub async fn speed_up_crop(
    State(state): Shared,
    Caller(player): Caller,
    Path(plot): Path<u16>,
) -> ApiResult<SpeedUpResult> {
    Ok(Json(state.game.speed_up_crop(player, plot).await?))
}

// ---------------------------------------------------------------------------
// Factories
// ---------------------------------------------------------------------------

/// `GET /api/factories`
pub async fn list_factories(State(state): Shared, Caller(player): Caller) -> ApiResult<Vec<FactoryView>> {
    Ok(Json(state.game.list_factories(player).await?))
}

/// `POST /api/factories`
pub async fn create_factory(
    State(state): Shared,
    Caller(player): Caller,
    ValidJson(req): ValidJson<CreateFactoryRequest>,
) -> ApiResult<FactoryView> {
    Ok(Json(state.game.create_factory(player, req.factory_type).await?))
}

/// `POST /api/factories/{id}/slots`
pub async fn purchase_factory_slot(
    State(state): Shared,
    Caller(player): Caller,
    Path(factory): Path<FactoryId>,
) -> ApiResult<FactoryView> {
    Ok(Json(state.game.purchase_factory_slot(player, factory).await?))
}

/// `POST /api/factories/{id}/upgrade`
pub async fn upgrade_factory(
    State(state): Shared,
    Caller(player): Caller,
    Path(factory): Path<FactoryId>,
) -> ApiResult<FactoryView> {
    Ok(Json(state.game.upgrade_factory(player, factory).await?))
}

/// `POST /api/factories/{id}/production`
pub async fn start_production(
    State(state): Shared,
    Caller(player): Caller,
    Path(factory): Path<FactoryId>,
    ValidJson(req): ValidJson<StartProductionRequest>,
) -> ApiResult<StartResult> {
    Ok(Json(state.game.start_production(player, factory, req.recipe_id).await?))
}

/// `POST /api/factories/{id}/slots/{slot}/collect`
pub async fn collect_production(
    State(state): Shared,
    Caller(player): Caller,
    Path((factory, slot)): Path<(FactoryId, u16)>,
) -> ApiResult<CollectResult> {
    Ok(Json(state.game.collect_production(player, factory, slot).await?))
}

/// `POST /api/factories/{id}/slots/{slot}/speed-up`
pub async fn speed_up_production(
    State(state): Shared,
    Caller(player): Caller,
    Path((factory, slot)): Path<(FactoryId, u16)>,
) -> ApiResult<SpeedUpResult> {
    Ok(Json(state.game.speed_up_production(player, factory, slot).await?))
}

// ---------------------------------------------------------------------------
// Zoo
// ---------------------------------------------------------------------------

/// `GET /api/zoo`
pub async fn get_zoo(State(state): Shared, Caller(player): Caller) -> ApiResult<Vec<EnclosureView>> {
    Ok(Json(state.game.get_zoo(player).await?))
}

/// `POST /api/zoo/enclosures`
pub async fn create_enclosure(
    State(state): Shared,
    Caller(player): Caller,
    ValidJson(req): ValidJson<CreateEnclosureRequest>,
) -> ApiResult<EnclosureView> {
    Ok(Json(state.game.create_enclosure(player, req.species_id).await?))
}

/// `POST /api/zoo/enclosures/{id}/animals`
pub async fn add_animal(
    State(state): Shared,
    Caller(player): Caller,
    Path(enclosure): Path<EnclosureId>,
    ValidJson(req): ValidJson<AddAnimalRequest>,
) -> ApiResult<AnimalView> {
    Ok(Json(state.game.add_animal(player, enclosure, req.level).await?))
}

/// `DELETE /api/zoo/animals/{id}`
pub async fn remove_animal(
    State(state): Shared,
    Caller(player): Caller,
    Path(animal): Path<AnimalId>,
) -> ApiResult<CancelResult> {
    Ok(Json(state.game.remove_animal(player, animal).await?))
}

/// `POST /api/zoo/animals/{id}/production`
pub async fn start_animal_production(
    State(state): Shared,
    Caller(player): Caller,
    Path(animal): Path<AnimalId>,
) -> ApiResult<StartResult> {
    Ok(Json(state.game.start_animal_production(player, animal).await?))
}

/// `POST /api/zoo/animals/{id}/production/collect`
pub async fn collect_animal_production(
    State(state): Shared,
    Caller(player): Caller,
    Path(animal): Path<AnimalId>,
) -> ApiResult<CollectResult> {
    Ok(Json(state.game.collect_animal_production(player, animal).await?))
}

/// `DELETE /api/zoo/animals/{id}/production`
pub async fn cancel_animal_production(
    State(state): Shared,
    Caller(player): Caller,
    Path(animal): Path<AnimalId>,
) -> ApiResult<CancelResult> {
    Ok(Json(state.game.cancel_animal_production(player, animal).await?))
}

/// `POST /api/zoo/animals/{id}/speed-up`
pub async fn speed_up_animal(
    State(state): Shared,
    Caller(player): Caller,
    Path(animal): Path<AnimalId>,
) -> ApiResult<SpeedUpResult> {
    Ok(Json(state.game.speed_up_animal(player, animal).await?))
}

/// `POST /api/zoo/enclosures/{id}/breeding`
pub async fn start_breeding(
    State(state): Shared,
    Caller(player): Caller,
    Path(enclosure): Path<EnclosureId>,
    ValidJson(req): ValidJson<BreedingRequest>,
) -> ApiResult<StartResult> {
    Ok(Json(
        state
            .game
            .start_breeding(player, enclosure, req.parent_a, req.parent_b)
            .await?,
    ))
}

/// `POST /api/zoo/enclosures/{id}/breeding/collect`
pub async fn collect_breeding(
    State(state): Shared,
    Caller(player): Caller,
    Path(enclosure): Path<EnclosureId>,
) -> ApiResult<CollectResult> {
    Ok(Json(state.game.collect_breeding(player, enclosure).await?))
}

/// `DELETE /api/zoo/enclosures/{id}/breeding`
pub async fn cancel_breeding(
    State(state): Shared,
    Caller(player): Caller,
    Path(enclosure): Path<EnclosureId>,
) -> ApiResult<CancelResult> {
    Ok(Json(state.game.cancel_breeding(player, enclosure).await?))
}

// ---------------------------------------------------------------------------
// Skyport
// ---------------------------------------------------------------------------

/// `GET /api/skyport/orders`
pub async fn list_orders(State(state): Shared, Caller(player): Caller) -> ApiResult<Vec<OrderView>> {
    Ok(Json(state.game.list_orders(player).await?))
}

/// `POST /api/skyport/orders/refresh`
pub async fn refresh_orders(State(state): Shared, Caller(player): Caller) -> ApiResult<Vec<OrderView>> {
    Ok(Json(state.game.refresh_orders(player).await?))
}

/// `POST /api/skyport/orders/{id}/deliver`
pub async fn start_delivery(
    State(state): Shared,
    Caller(player): Caller,
    Path(order): Path<OrderId>,
) -> ApiResult<StartResult> {
    Ok(Json(state.game.start_delivery(player, order).await?))
}

/// `POST /api/skyport/orders/{id}/collect`
pub async fn collect_delivery(
    State(state): Shared,
    Caller(player): Caller,
    Path(order): Path<OrderId>,
) -> ApiResult<CollectResult> {
    Ok(Json(state.game.collect_delivery(player, order).await?))
}

/// `DELETE /api/skyport/orders/{id}`
pub async fn discard_order(
    State(state): Shared,
    Caller(player): Caller,
    Path(order): Path<OrderId>,
) -> ApiResult<CancelResult> {
    Ok(Json(state.game.discard_order(player, order).await?))
}

/// `POST /api/skyport/orders/{id}/speed-up`
pub async fn speed_up_delivery(
    State(state): Shared,
    Caller(player): Caller,
    Path(order): Path<OrderId>,
) -> ApiResult<SpeedUpResult> {
    Ok(Json(state.game.speed_up_delivery(player, order).await?))
}

// ---------------------------------------------------------------------------
// Speed-ups and boosts
// ---------------------------------------------------------------------------

/// `GET /api/speed-ups/{category}` -- display only; every grant rechecks.
pub async fn speedup_eligibility(
    State(state): Shared,
    Caller(player): Caller,
    Path(category): Path<SpeedUpCategory>,
) -> ApiResult<SpeedUpEligibility> {
    Ok(Json(state.game.speedup_eligibility(player, category).await?))
}

/// `POST /api/boosts`
pub async fn activate_boost(
    State(state): Shared,
    Caller(player): Caller,
    ValidJson(req): ValidJson<BoostRequest>,
) -> ApiResult<BoostView> {
    Ok(Json(state.game.activate_boost(player, req.kind).await?))
}
