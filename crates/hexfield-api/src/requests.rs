//! Request bodies and query strings.
//!
//! Shape checks (lengths, positive quantities) happen here with
//! `validator`; game rules are enforced by the procedures.

use serde::Deserialize;
use validator::Validate;

use hexfield_engine::coven::Objective;
use hexfield_types::{BoostKind, BuildingTypeId, CropId, ItemCategory, ItemKey, ItemKind, PlayerId, RecipeId, SpeciesId};

use crate::error::ApiError;

/// Upper bound on quantities accepted in one request.
const MAX_QUANTITY: u32 = 100_000;

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

/// `POST /api/players`
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePlayerRequest {
    /// Name shown to other players.
    #[validate(length(min = 3, max = 24))]
    pub display_name: String,
}

// ---------------------------------------------------------------------------
// Production
// ---------------------------------------------------------------------------

/// `POST /api/farm/plots/{plot}/plant`
#[derive(Debug, Deserialize, Validate)]
pub struct PlantRequest {
    /// Crop to plant; one seed of it is consumed.
    pub crop_id: CropId,
}

/// `POST /api/factories`
#[derive(Debug, Deserialize, Validate)]
pub struct CreateFactoryRequest {
    /// Factory building type.
    pub factory_type: BuildingTypeId,
}

/// `POST /api/factories/{id}/production`
#[derive(Debug, Deserialize, Validate)]
pub struct StartProductionRequest {
    /// Recipe to run.
    pub recipe_id: RecipeId,
}

/// `POST /api/zoo/enclosures`
#[derive(Debug, Deserialize, Validate)]
pub struct CreateEnclosureRequest {
    /// Species the enclosure houses.
    pub species_id: SpeciesId,
}

/// `POST /api/zoo/enclosures/{id}/animals`
#[derive(Debug, Deserialize, Validate)]
pub struct AddAnimalRequest {
    /// Level of the creature taken from inventory.
    #[validate(range(min = 1, max = 9))]
    pub level: u8,
}

/// `POST /api/zoo/enclosures/{id}/breeding`
#[derive(Debug, Deserialize, Validate)]
pub struct BreedingRequest {
    /// First parent.
    pub parent_a: hexfield_types::AnimalId,
    /// Second parent.
    pub parent_b: hexfield_types::AnimalId,
}

/// `POST /api/boosts`
#[derive(Debug, Deserialize, Validate)]
pub struct BoostRequest {
    /// Boost to activate.
    pub kind: BoostKind,
}

// ---------------------------------------------------------------------------
// Town
// ---------------------------------------------------------------------------

/// `POST /api/town/buildings` and `POST /api/town/decorations`
#[derive(Debug, Deserialize, Validate)]
pub struct PlaceRequest {
    /// Building or decoration type.
    pub building_type: BuildingTypeId,
    /// Column of the top-left cell.
    pub x: i32,
    /// Row of the top-left cell.
    pub y: i32,
}

/// `POST /api/town/roads` and `POST /api/town/placements/{id}/move`
#[derive(Debug, Deserialize, Validate)]
pub struct CellRequest {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

// ---------------------------------------------------------------------------
// Economy
// ---------------------------------------------------------------------------

/// `POST /api/market/seeds`
#[derive(Debug, Deserialize, Validate)]
pub struct BuySeedsRequest {
    /// Crop whose seeds to buy.
    pub crop_id: CropId,
    /// Seeds to buy.
    #[validate(range(min = 1, max = MAX_QUANTITY))]
    pub quantity: u32,
}

/// `POST /api/market/sell`, `POST /api/coven/donations/items` and
/// `POST /api/coven/tasks/{id}/contribute`
#[derive(Debug, Deserialize, Validate)]
pub struct ItemQuantityRequest {
    /// Item moved.
    pub item: ItemKind,
    /// Units moved.
    #[validate(range(min = 1, max = MAX_QUANTITY))]
    pub quantity: u32,
}

/// `POST /api/market/listings`
#[derive(Debug, Deserialize, Validate)]
pub struct CreateListingRequest {
    /// Item escrowed.
    pub item: ItemKind,
    /// Units escrowed.
    #[validate(range(min = 1, max = MAX_QUANTITY))]
    pub quantity: u32,
    /// Total asking price in crystals.
    #[validate(range(min = 1))]
    pub price: u64,
}

/// `GET /api/market/listings`
///
/// The item filter is either absent or all of `category` and `base`.
#[derive(Debug, Deserialize, Validate)]
pub struct BrowseQuery {
    /// Item category filter.
    pub category: Option<ItemCategory>,
    /// Item base id filter.
    pub base: Option<u16>,
    /// Creature level filter.
    #[serde(default)]
    pub level: u8,
    /// Page size (default 50).
    #[validate(range(min = 1, max = 200))]
    pub limit: Option<u32>,
}

impl BrowseQuery {
    /// Default page size.
    pub const DEFAULT_LIMIT: u32 = 50;

    /// The item filter, when one was given.
    pub fn item(&self) -> Result<Option<ItemKind>, ApiError> {
        match (self.category, self.base) {
            (None, None) => Ok(None),
            (Some(category), Some(base)) => ItemKind::try_from(ItemKey {
                category,
                base,
                level: self.level,
            })
            .map(Some)
            .map_err(|e| ApiError::BadRequest(e.to_string())),
            _ => Err(ApiError::BadRequest("category and base must be given together".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// Coven
// ---------------------------------------------------------------------------

/// `POST /api/covens`
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCovenRequest {
    /// Unique coven name.
    #[validate(length(min = 3, max = 32))]
    pub name: String,
    /// Whether anyone may join without an invitation.
    #[serde(default)]
    pub public: bool,
}

/// `POST /api/coven/leader` and `POST /api/coven/invitations`
#[derive(Debug, Deserialize, Validate)]
pub struct TargetPlayerRequest {
    /// The other player.
    pub player: PlayerId,
}

/// `POST /api/invitations/{id}/respond`
#[derive(Debug, Deserialize, Validate)]
pub struct RespondRequest {
    /// Accept (join) or decline.
    pub accept: bool,
}

/// `POST /api/coven/donations/crystals`
#[derive(Debug, Deserialize, Validate)]
pub struct DonateCrystalsRequest {
    /// Crystals moved into the pool.
    #[validate(range(min = 1))]
    pub amount: u64,
}

/// `POST /api/coven/tasks`
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    /// Task title.
    #[validate(length(min = 1, max = 64))]
    pub title: String,
    /// What the coven must deliver or produce.
    #[validate(length(min = 1, max = 8))]
    pub objectives: Vec<Objective>,
    /// Reward bundle credited to the pool on completion.
    #[serde(default)]
    pub reward: serde_json::Value,
    /// Points converted into contributor XP.
    #[serde(default)]
    pub reward_points: u64,
}
