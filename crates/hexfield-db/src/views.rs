//! Read models returned by the query procedures.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use hexfield_engine::coven::Objective;
use hexfield_types::{
    BoostKind, BuildingTypeId, CovenId, CovenRole, CovenTaskId, CropId, EnclosureId, FactoryId,
    FriendStatus, InvitationId, InvitationStatus, ItemKind, ItemStack, ListingId, OrderId,
    PlacementId, PlacementKind, PlayerId, RecipeId, RegattaId, RegattaTaskId, SpeciesId, AnimalId,
};

/// A player's ledger and derived town figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    /// Player.
    pub player_id: PlayerId,
    /// Display name.
    pub display_name: String,
    /// Crystal balance.
    pub crystals: u64,
    /// Gem balance.
    pub gems: u64,
    /// Experience toward the next level.
    pub experience: u64,
    /// Current level.
    pub level: u32,
    /// Town population.
    pub population: u32,
    /// Maximum number of factories.
    pub factory_limit: u32,
    /// Current daily login streak.
    pub daily_streak: u32,
    /// Coven, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coven_id: Option<CovenId>,
}

/// A boost and its expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoostView {
    /// Which output it multiplies.
    pub kind: BoostKind,
    /// Multiplier while active.
    pub multiplier: Decimal,
    /// End of the boost.
    pub expires_at: DateTime<Utc>,
    /// Gem balance after paying for it.
    pub gems: u64,
}

/// One inventory line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InventoryLine {
    /// Item.
    pub item: ItemKind,
    /// Quantity held.
    pub quantity: u64,
}

/// A farm plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlotView {
    /// Plot index.
    pub plot_index: u16,
    /// Plot level.
    pub level: u32,
    /// Growing crop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_id: Option<CropId>,
    /// Planting time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planted_at: Option<DateTime<Utc>>,
    /// Harvestable from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,
}

/// An occupied factory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotView {
    /// Slot index.
    pub slot_index: u16,
    /// Recipe in production.
    pub recipe_id: RecipeId,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Completion time.
    pub completes_at: DateTime<Utc>,
}

/// A factory with its computed capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactoryView {
    /// Factory.
    pub id: FactoryId,
    /// Building type it produces for.
    pub building_type: BuildingTypeId,
    /// Site level.
    pub level: u32,
    /// Purchased slots.
    pub base_capacity: u16,
    /// Purchased slots plus building-derived slots.
    pub capacity: u32,
    /// Occupied slots.
    pub slots: Vec<SlotView>,
}

/// An animal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnimalView {
    /// Animal.
    pub id: AnimalId,
    /// Creature level.
    pub level: u8,
    /// Production completion, when producing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producing_until: Option<DateTime<Utc>>,
}

/// An enclosure with its animals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnclosureView {
    /// Enclosure.
    pub id: EnclosureId,
    /// Housed species.
    pub species: SpeciesId,
    /// Places for animals, a pending offspring included.
    pub capacity: u16,
    /// Breeding completion, when breeding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breeding_until: Option<DateTime<Utc>>,
    /// Animals.
    pub animals: Vec<AnimalView>,
}

/// A skyport order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    /// Order.
    pub id: OrderId,
    /// Items to deliver.
    pub requirements: Vec<ItemStack>,
    /// Reward, as stored.
    pub reward: serde_json::Value,
    /// Delivery completion, once started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_completes_at: Option<DateTime<Utc>>,
    /// Friend who supplied the order, if not the owner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplied_by: Option<PlayerId>,
}

/// A placement on the town grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlacementView {
    /// Placement.
    pub id: PlacementId,
    /// Building, decoration or road.
    pub kind: PlacementKind,
    /// Type, absent for roads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub building_type: Option<BuildingTypeId>,
    /// Left column.
    pub x: i32,
    /// Top row.
    pub y: i32,
    /// Width in cells.
    pub width: u16,
    /// Height in cells.
    pub height: u16,
    /// Building level.
    pub level: u32,
}

/// The whole town.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TownView {
    /// Grid width.
    pub width: u16,
    /// Grid height.
    pub height: u16,
    /// Population.
    pub population: u32,
    /// Placements.
    pub placements: Vec<PlacementView>,
}

/// A market listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListingView {
    /// Listing.
    pub id: ListingId,
    /// Seller.
    pub seller: PlayerId,
    /// Item on offer.
    pub item: ItemKind,
    /// Quantity on offer.
    pub quantity: u32,
    /// Total price.
    pub price: u64,
    /// Expiry.
    pub expires_at: DateTime<Utc>,
}

/// One side of a friendship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FriendView {
    /// The other player.
    pub player_id: PlayerId,
    /// Their display name.
    pub display_name: String,
    /// Pending or accepted.
    pub status: FriendStatus,
    /// Who sent the request.
    pub requested_by: PlayerId,
}

/// A coven member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemberView {
    /// Member.
    pub player_id: PlayerId,
    /// Leader or member.
    pub role: CovenRole,
    /// Join time.
    pub joined_at: DateTime<Utc>,
}

/// A pool line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolLine {
    /// Item.
    pub item: ItemKind,
    /// Quantity held by the coven.
    pub quantity: u64,
}

/// A coven with its members and pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CovenView {
    /// Coven.
    pub id: CovenId,
    /// Name.
    pub name: String,
    /// Open to anyone.
    pub public: bool,
    /// Member count.
    pub member_count: u32,
    /// Pool crystals.
    pub crystals: u64,
    /// Pool gems.
    pub gems: u64,
    /// Pool items.
    pub items: Vec<PoolLine>,
    /// Members, oldest first.
    pub members: Vec<MemberView>,
}

/// Outcome of leaving a coven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeaveResult {
    /// Always true.
    pub success: bool,
    /// The coven was deleted with its last member.
    pub disbanded: bool,
    /// Leader after a leader left.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_leader: Option<PlayerId>,
}

/// A coven invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InvitationView {
    /// Invitation.
    pub id: InvitationId,
    /// Inviting coven.
    pub coven_id: CovenId,
    /// Sender.
    pub inviter: PlayerId,
    /// Recipient.
    pub invitee: PlayerId,
    /// Current status.
    pub status: InvitationStatus,
    /// Expiry.
    pub expires_at: DateTime<Utc>,
}

/// A coven task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CovenTaskView {
    /// Task.
    pub id: CovenTaskId,
    /// Title.
    pub title: String,
    /// Objectives with progress.
    pub objectives: Vec<Objective>,
    /// Reward credited to the pool.
    pub reward: serde_json::Value,
    /// Points converted to contributor XP.
    pub reward_points: u64,
    /// Completion time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// An achievement or quest with the caller's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressView {
    /// Definition.
    pub id: i32,
    /// Name.
    pub name: String,
    /// Progress so far, capped at the target.
    pub progress: u64,
    /// Target.
    pub target: u64,
    /// Reward on claim.
    pub reward: serde_json::Value,
    /// Completion time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Claim time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
}

/// A regatta with its tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegattaView {
    /// Regatta.
    pub id: RegattaId,
    /// Name.
    pub name: String,
    /// Window opens.
    pub starts_at: DateTime<Utc>,
    /// Window closes.
    pub ends_at: DateTime<Utc>,
    /// Settlement time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
    /// Tasks and their points.
    pub tasks: Vec<RegattaTaskView>,
}

/// A regatta task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegattaTaskView {
    /// Task.
    pub id: RegattaTaskId,
    /// Items to deliver.
    pub requirements: Vec<ItemStack>,
    /// Points awarded.
    pub points: u64,
}

/// A ranked regatta participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StandingView {
    /// Participant.
    pub player_id: PlayerId,
    /// Points.
    pub points: u64,
    /// 1-based rank.
    pub rank: u32,
}

/// Points after a regatta submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubmissionResult {
    /// Always true.
    pub success: bool,
    /// Points now held.
    pub points: u64,
}

/// Outcome of cancelling a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CancelResult {
    /// Always true.
    pub success: bool,
    /// A running timer was cleared.
    pub cancelled: bool,
}
