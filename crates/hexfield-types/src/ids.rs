//! Type-safe identifier wrappers.
//!
//! Player-owned rows (factories, animals, listings, covens, ...) are keyed
//! by [`Uuid`] newtypes so a factory id can never be passed where a listing
//! id is expected. Content catalog rows (crops, recipes, building types)
//! use small integer keys because they are authored by hand and referenced
//! from seed data; those get their own newtype family.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[serde(transparent)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Generates a newtype wrapper around an `i32` catalog key.
macro_rules! define_content_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[serde(transparent)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub i32);

        impl $name {
            /// Return the raw catalog key.
            pub const fn get(self) -> i32 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }
    };
}

define_id! {
    /// Opaque player identifier issued by the external identity provider.
    PlayerId
}

define_id! {
    /// A player-created factory (production site).
    FactoryId
}

define_id! {
    /// A zoo enclosure (production site for animals).
    EnclosureId
}

define_id! {
    /// A single animal living in an enclosure.
    AnimalId
}

define_id! {
    /// A skyport delivery order.
    OrderId
}

define_id! {
    /// A building, decoration or road on a player's town grid.
    PlacementId
}

define_id! {
    /// A player-to-player market listing.
    ListingId
}

define_id! {
    /// A coven (guild).
    CovenId
}

define_id! {
    /// A pending or resolved coven invitation.
    InvitationId
}

define_id! {
    /// A collective coven task.
    CovenTaskId
}

define_id! {
    /// A time-boxed regatta event.
    RegattaId
}

define_content_id! {
    /// Catalog key of a crop definition.
    CropId
}

define_content_id! {
    /// Catalog key of a factory recipe.
    RecipeId
}

define_content_id! {
    /// Catalog key of a building, decoration or road type.
    BuildingTypeId
}

define_content_id! {
    /// Catalog key of an animal species.
    SpeciesId
}

define_content_id! {
    /// Catalog key of a skyport order template.
    OrderTemplateId
}

define_content_id! {
    /// Catalog key of an achievement definition.
    AchievementId
}

define_content_id! {
    /// Catalog key of a quest definition.
    QuestId
}

define_content_id! {
    /// Key of a task inside a regatta.
    RegattaTaskId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_bare_uuid() {
        let id = PlayerId::new();
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, format!("\"{}\"", id.into_inner()));
    }

    #[test]
    fn content_ids_serialize_as_bare_integer() {
        let json = serde_json::to_string(&RecipeId(7)).unwrap_or_default();
        assert_eq!(json, "7");
    }

    #[test]
    fn id_display_matches_uuid() {
        let id = FactoryId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }
}
