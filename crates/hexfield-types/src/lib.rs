//! Shared type definitions for the Hexfield game backend.
//!
//! This crate is the single source of truth for identifiers, item identity
//! and the result payloads returned to clients. Types flow to the
//! `TypeScript` client via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID and catalog-key wrappers
//! - [`item`] -- The tagged [`ItemKind`] and its storage shape
//! - [`bundle`] -- JSON resource bundles (recipes, rewards, requirements)
//! - [`enums`] -- Persisted enumerations
//! - [`results`] -- Procedure result payloads

pub mod bundle;
pub mod enums;
pub mod ids;
pub mod item;
pub mod results;

pub use bundle::{Bundle, BundleError};
pub use enums::{
    BoostKind, BuildingCategory, ConditionType, CovenRole, FriendStatus, HelpAction,
    InvitationStatus, PlacementKind, RewardTier, SpeedUpCategory,
};
pub use ids::{
    AchievementId, AnimalId, BuildingTypeId, CovenId, CovenTaskId, CropId, EnclosureId, FactoryId,
    InvitationId, ListingId, OrderId, OrderTemplateId, PlacementId, PlayerId, QuestId, RecipeId,
    RegattaId, RegattaTaskId, SpeciesId,
};
pub use item::{ItemCategory, ItemKey, ItemKind};
pub use results::{
    Awarded, BalanceResult, CollectResult, ContributionResult, DailyRewardResult, ItemStack,
    ListingPurchaseResult, PlacementResult, SettlementResult, SpeedUpEligibility, SpeedUpResult,
    StartResult,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // Files are written to `bindings/` relative to the crate root.
        use ts_rs::TS;

        let _ = crate::ids::PlayerId::export_all();
        let _ = crate::ids::ListingId::export_all();
        let _ = crate::ids::PlacementId::export_all();
        let _ = crate::item::ItemKey::export_all();
        let _ = crate::enums::SpeedUpCategory::export_all();
        let _ = crate::enums::ConditionType::export_all();
        let _ = crate::results::Awarded::export_all();
        let _ = crate::results::StartResult::export_all();
        let _ = crate::results::CollectResult::export_all();
        let _ = crate::results::SpeedUpResult::export_all();
        let _ = crate::results::SpeedUpEligibility::export_all();
        let _ = crate::results::BalanceResult::export_all();
        let _ = crate::results::PlacementResult::export_all();
        let _ = crate::results::ListingPurchaseResult::export_all();
        let _ = crate::results::ContributionResult::export_all();
        let _ = crate::results::DailyRewardResult::export_all();
        let _ = crate::results::SettlementResult::export_all();
    }
}
