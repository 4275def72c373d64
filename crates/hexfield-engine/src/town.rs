//! The per-player town grid: buildings, decorations and roads.
//!
//! - [`TownGrid::ensure_placeable`] checks bounds and cell collisions
//! - [`place_building`] runs the full placement gate (count limit,
//!   prerequisite, level, population, cells, cost)
//! - [`TownGrid::population`] and [`TownGrid::count_of_type`] derive the
//!   aggregates other subsystems read (population gating, factory capacity)
//!
//! Prerequisites form a DAG of direct links. Each placement checks only its
//! own immediate prerequisite, and removal never re-validates dependents.

use std::collections::BTreeMap;

use hexfield_ledger::{ProgressionRules, progression};
use hexfield_types::{BuildingCategory, BuildingTypeId, PlacementId, PlacementKind};

use crate::catalog::BuildingType;
use crate::config::TownConfig;
use crate::error::GameError;
use crate::state::PlayerState;

// ---------------------------------------------------------------------------
// Footprints
// ---------------------------------------------------------------------------

/// A rectangle of grid cells anchored at its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footprint {
    /// Column of the top-left cell.
    pub x: i32,
    /// Row of the top-left cell.
    pub y: i32,
    /// Columns covered.
    pub width: u16,
    /// Rows covered.
    pub height: u16,
}

impl Footprint {
    /// A footprint at `(x, y)` of the given size.
    pub const fn new(x: i32, y: i32, width: u16, height: u16) -> Self {
        Self { x, y, width, height }
    }

    /// One past the last column.
    fn right(&self) -> i32 {
        self.x.saturating_add(i32::from(self.width))
    }

    /// One past the last row.
    fn bottom(&self) -> i32 {
        self.y.saturating_add(i32::from(self.height))
    }

    /// Whether any cell is shared with `other`.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.x < other.right() && other.x < self.right() && self.y < other.bottom() && other.y < self.bottom()
    }

    /// First cell shared with `other`, scanning row-major.
    pub fn first_shared_cell(&self, other: &Self) -> Option<(i32, i32)> {
        self.overlaps(other)
            .then(|| (self.x.max(other.x), self.y.max(other.y)))
    }
}

// ---------------------------------------------------------------------------
// Placements
// ---------------------------------------------------------------------------

/// Something occupying cells on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Identifier.
    pub id: PlacementId,
    /// Building, decoration or road.
    pub kind: PlacementKind,
    /// Catalog type; roads have none.
    pub building_type: Option<BuildingTypeId>,
    /// Occupied cells.
    pub footprint: Footprint,
    /// Upgrade level (1 for decorations and roads).
    pub level: u32,
}

/// A successful placement or upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placed {
    /// The placement after the operation.
    pub placement: Placement,
    /// Crystals debited.
    pub cost: u64,
    /// Recomputed population, when the operation changed it.
    pub population: Option<u32>,
}

/// One player's grid with every placement loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TownGrid {
    width: u16,
    height: u16,
    placements: Vec<Placement>,
}

impl TownGrid {
    /// Build from loaded placements.
    pub fn new(placements: Vec<Placement>, config: &TownConfig) -> Self {
        Self {
            width: config.grid_width,
            height: config.grid_height,
            placements,
        }
    }

    /// Every placement.
    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    /// Look up a placement by id.
    pub fn get(&self, id: PlacementId) -> Option<&Placement> {
        self.placements.iter().find(|p| p.id == id)
    }

    /// Placements of one catalog type.
    pub fn count_of_type(&self, building_type: BuildingTypeId) -> u32 {
        let count = self
            .placements
            .iter()
            .filter(|p| p.building_type == Some(building_type))
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Sum of `population_per_level × level` over placed buildings.
    pub fn population(&self, types: &BTreeMap<BuildingTypeId, BuildingType>) -> u32 {
        self.placements
            .iter()
            .filter(|p| p.kind == PlacementKind::Building)
            .filter_map(|p| {
                let per_level = types.get(&p.building_type?)?.population_per_level;
                Some(per_level.saturating_mul(p.level))
            })
            .fold(0_u32, u32::saturating_add)
    }

    /// Reject a footprint that leaves the grid or touches another
    /// placement. `moving` is ignored, so a placement can shift onto cells
    /// it already covers.
    pub fn ensure_placeable(&self, footprint: &Footprint, moving: Option<PlacementId>) -> Result<(), GameError> {
        let inside = footprint.width > 0
            && footprint.height > 0
            && footprint.x >= 0
            && footprint.y >= 0
            && footprint.right() <= i32::from(self.width)
            && footprint.bottom() <= i32::from(self.height);
        if !inside {
            return Err(GameError::OutOfBounds {
                x: footprint.x,
                y: footprint.y,
                width: footprint.width,
                height: footprint.height,
                grid_width: self.width,
                grid_height: self.height,
            });
        }
        let collision = self
            .placements
            .iter()
            .filter(|p| Some(p.id) != moving)
            .find_map(|p| footprint.first_shared_cell(&p.footprint));
        match collision {
            Some((x, y)) => Err(GameError::CellOccupied { x, y }),
            None => Ok(()),
        }
    }

    fn find_mut(&mut self, id: PlacementId) -> Result<&mut Placement, GameError> {
        self.placements
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| GameError::not_found("placement", id))
    }
}

fn contributes_population(building_type: &BuildingType) -> bool {
    building_type.population_per_level > 0
}

fn ensure_count_limit(grid: &TownGrid, building_type: &BuildingType) -> Result<u32, GameError> {
    let placed = grid.count_of_type(building_type.id);
    match building_type.max_count {
        Some(limit) if placed >= limit => Err(GameError::LimitReached {
            what: building_type.name.clone(),
            used: placed,
            limit,
        }),
        _ => Ok(placed),
    }
}

fn ensure_level(player: &PlayerState, required: u32) -> Result<(), GameError> {
    if player.level() < required {
        return Err(GameError::LevelTooLow {
            required,
            current: player.level(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Place a building at `(x, y)`.
///
/// Checked in order: type exists, count limit, prerequisite, level,
/// population, cells. The first building of a type is free; later copies
/// cost `base_cost × (1 − level discount)`, floored.
pub fn place_building(
    player: &mut PlayerState,
    grid: &mut TownGrid,
    building_type: Option<&BuildingType>,
    (x, y): (i32, i32),
    types: &BTreeMap<BuildingTypeId, BuildingType>,
    rules: &ProgressionRules,
) -> Result<Placed, GameError> {
    let building_type = building_type.ok_or_else(|| GameError::Invalid("unknown building type".into()))?;
    if matches!(building_type.category, BuildingCategory::Decoration | BuildingCategory::Road) {
        return Err(GameError::Invalid(format!("{} is not a building", building_type.name)));
    }
    let placed = ensure_count_limit(grid, building_type)?;
    let missing = building_type
        .prerequisite
        .filter(|prerequisite| grid.count_of_type(*prerequisite) == 0);
    if let Some(prerequisite) = missing {
        let building = types
            .get(&prerequisite)
            .map_or_else(|| format!("building type {prerequisite}"), |t| t.name.clone());
        return Err(GameError::MissingPrerequisite { building });
    }
    ensure_level(player, building_type.required_level)?;
    let population = grid.population(types);
    if population < building_type.required_population {
        return Err(GameError::PopulationTooLow {
            required: building_type.required_population,
            current: population,
        });
    }
    let footprint = Footprint::new(x, y, building_type.width, building_type.height);
    grid.ensure_placeable(&footprint, None)?;

    let cost = if placed == 0 {
        0
    } else {
        progression::discounted_cost(building_type.base_cost, player.level(), rules)
    };
    if cost > 0 {
        player.ledger.debit_crystals(cost)?;
    }
    let placement = Placement {
        id: PlacementId::new(),
        kind: PlacementKind::Building,
        building_type: Some(building_type.id),
        footprint,
        level: 1,
    };
    grid.placements.push(placement);
    tracing::info!(
        player = %player.player_id(),
        building_type = %building_type.code,
        x,
        y,
        cost,
        "building placed"
    );
    Ok(Placed {
        placement,
        cost,
        population: contributes_population(building_type).then(|| grid.population(types)),
    })
}

/// Place a decoration at `(x, y)`. Decorations are not subject to the
/// first-copy-free rule.
pub fn place_decoration(
    player: &mut PlayerState,
    grid: &mut TownGrid,
    decoration: Option<&BuildingType>,
    (x, y): (i32, i32),
    rules: &ProgressionRules,
) -> Result<Placed, GameError> {
    let decoration = decoration.ok_or_else(|| GameError::Invalid("unknown decoration".into()))?;
    if decoration.category != BuildingCategory::Decoration {
        return Err(GameError::Invalid(format!("{} is not a decoration", decoration.name)));
    }
    ensure_count_limit(grid, decoration)?;
    ensure_level(player, decoration.required_level)?;
    let footprint = Footprint::new(x, y, decoration.width, decoration.height);
    grid.ensure_placeable(&footprint, None)?;
    let cost = progression::discounted_cost(decoration.base_cost, player.level(), rules);
    if cost > 0 {
        player.ledger.debit_crystals(cost)?;
    }
    let placement = Placement {
        id: PlacementId::new(),
        kind: PlacementKind::Decoration,
        building_type: Some(decoration.id),
        footprint,
        level: 1,
    };
    grid.placements.push(placement);
    Ok(Placed {
        placement,
        cost,
        population: None,
    })
}

/// Lay one road tile at `(x, y)`.
pub fn place_road(
    player: &mut PlayerState,
    grid: &mut TownGrid,
    (x, y): (i32, i32),
    config: &TownConfig,
) -> Result<Placed, GameError> {
    let footprint = Footprint::new(x, y, 1, 1);
    grid.ensure_placeable(&footprint, None)?;
    if config.road_cost > 0 {
        player.ledger.debit_crystals(config.road_cost)?;
    }
    let placement = Placement {
        id: PlacementId::new(),
        kind: PlacementKind::Road,
        building_type: None,
        footprint,
        level: 1,
    };
    grid.placements.push(placement);
    Ok(Placed {
        placement,
        cost: config.road_cost,
        population: None,
    })
}

/// Move a placement so its top-left corner lands on `(x, y)`. Free.
pub fn move_placement(grid: &mut TownGrid, id: PlacementId, (x, y): (i32, i32)) -> Result<Placed, GameError> {
    let current = *grid.get(id).ok_or_else(|| GameError::not_found("placement", id))?;
    let footprint = Footprint {
        x,
        y,
        ..current.footprint
    };
    grid.ensure_placeable(&footprint, Some(id))?;
    let slot = grid.find_mut(id)?;
    slot.footprint = footprint;
    Ok(Placed {
        placement: *slot,
        cost: 0,
        population: None,
    })
}

/// Raise a building's level by one.
///
/// The ceiling is the lower of the type's `max_level` and the level the
/// player's own level unlocks. Costs `upgrade_cost × current level`.
pub fn upgrade_building(
    player: &mut PlayerState,
    grid: &mut TownGrid,
    id: PlacementId,
    types: &BTreeMap<BuildingTypeId, BuildingType>,
    rules: &ProgressionRules,
) -> Result<Placed, GameError> {
    let current = *grid.get(id).ok_or_else(|| GameError::not_found("placement", id))?;
    let building_type = current
        .building_type
        .filter(|_| current.kind == PlacementKind::Building)
        .and_then(|t| types.get(&t))
        .ok_or_else(|| GameError::Invalid("only buildings can be upgraded".into()))?;
    let ceiling = progression::max_building_level(player.level(), building_type.max_level, rules);
    if current.level >= building_type.max_level {
        return Err(GameError::terminal(building_type.name.clone(), "at maximum level"));
    }
    if current.level >= ceiling {
        return Err(GameError::LevelTooLow {
            required: current
                .level
                .saturating_mul(rules.levels_per_building_level),
            current: player.level(),
        });
    }
    let cost = building_type
        .upgrade_cost
        .checked_mul(u64::from(current.level))
        .ok_or_else(|| GameError::overflow("upgrade cost"))?;
    if cost > 0 {
        player.ledger.debit_crystals(cost)?;
    }
    let slot = grid.find_mut(id)?;
    slot.level = slot.level.saturating_add(1);
    let placement = *slot;
    tracing::info!(
        player = %player.player_id(),
        placement = %id,
        level = placement.level,
        cost,
        "building upgraded"
    );
    Ok(Placed {
        placement,
        cost,
        population: contributes_population(building_type).then(|| grid.population(types)),
    })
}

/// Remove a placement. Nothing is refunded.
pub fn remove_placement(
    grid: &mut TownGrid,
    id: PlacementId,
    types: &BTreeMap<BuildingTypeId, BuildingType>,
) -> Result<Placed, GameError> {
    let index = grid
        .placements
        .iter()
        .position(|p| p.id == id)
        .ok_or_else(|| GameError::not_found("placement", id))?;
    let placement = grid.placements.remove(index);
    let affects_population = placement
        .building_type
        .filter(|_| placement.kind == PlacementKind::Building)
        .and_then(|t| types.get(&t))
        .is_some_and(contributes_population);
    Ok(Placed {
        placement,
        cost: 0,
        population: affects_population.then(|| grid.population(types)),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use hexfield_ledger::{Inventory, PlayerLedger};
    use hexfield_types::PlayerId;

    use super::*;

    const HOUSE: BuildingTypeId = BuildingTypeId(1);
    const BAKERY: BuildingTypeId = BuildingTypeId(3);
    const FOUNTAIN: BuildingTypeId = BuildingTypeId(9);

    fn building(id: BuildingTypeId, code: &str, category: BuildingCategory) -> BuildingType {
        BuildingType {
            id,
            code: code.into(),
            name: code.replace('_', " "),
            category,
            width: 2,
            height: 2,
            base_cost: 100,
            max_count: None,
            prerequisite: None,
            required_level: 1,
            required_population: 0,
            population_per_level: 0,
            max_level: 3,
            upgrade_cost: 50,
        }
    }

    fn catalog() -> BTreeMap<BuildingTypeId, BuildingType> {
        let house = BuildingType {
            population_per_level: 5,
            ..building(HOUSE, "cottage", BuildingCategory::House)
        };
        let bakery = BuildingType {
            prerequisite: Some(HOUSE),
            required_population: 5,
            ..building(BAKERY, "rune_bakery", BuildingCategory::Factory)
        };
        let fountain = BuildingType {
            width: 1,
            height: 1,
            base_cost: 40,
            ..building(FOUNTAIN, "fountain", BuildingCategory::Decoration)
        };
        BTreeMap::from([(HOUSE, house), (BAKERY, bakery), (FOUNTAIN, fountain)])
    }

    fn player(crystals: u64, level: u32) -> PlayerState {
        let id = PlayerId::new();
        let mut ledger = PlayerLedger::new(id, crystals, 0);
        ledger.level = level;
        PlayerState::new(ledger, Inventory::new(id))
    }

    fn empty_grid() -> TownGrid {
        TownGrid::new(Vec::new(), &TownConfig::default())
    }

    #[test]
    fn first_building_of_a_type_is_free() {
        let types = catalog();
        let rules = ProgressionRules::default();
        let mut p = player(1000, 1);
        let mut grid = empty_grid();
        let first = place_building(&mut p, &mut grid, types.get(&HOUSE), (0, 0), &types, &rules);
        assert_eq!(first.as_ref().map(|r| r.cost).ok(), Some(0));
        assert_eq!(first.map(|r| r.population).ok(), Some(Some(5)));
        let second = place_building(&mut p, &mut grid, types.get(&HOUSE), (2, 0), &types, &rules);
        assert_eq!(second.map(|r| r.cost).ok(), Some(99));
        assert_eq!(p.ledger.crystals, 901);
    }

    #[test]
    fn discount_applies_after_first_copy() {
        let types = catalog();
        let rules = ProgressionRules::default();
        let mut p = player(1000, 21);
        let mut grid = empty_grid();
        assert!(place_building(&mut p, &mut grid, types.get(&HOUSE), (0, 0), &types, &rules).is_ok());
        let second = place_building(&mut p, &mut grid, types.get(&HOUSE), (2, 0), &types, &rules);
        assert_eq!(second.map(|r| r.cost).ok(), Some(89));
    }

    #[test]
    fn prerequisite_then_population_gate() {
        let types = catalog();
        let rules = ProgressionRules::default();
        let mut p = player(1000, 1);
        let mut grid = empty_grid();
        let blocked = place_building(&mut p, &mut grid, types.get(&BAKERY), (0, 0), &types, &rules);
        assert_eq!(
            blocked.err(),
            Some(GameError::MissingPrerequisite {
                building: "cottage".into()
            })
        );
        assert!(place_building(&mut p, &mut grid, types.get(&HOUSE), (0, 0), &types, &rules).is_ok());
        assert!(place_building(&mut p, &mut grid, types.get(&BAKERY), (4, 4), &types, &rules).is_ok());
    }

    #[test]
    fn population_gate_reports_numbers() {
        let mut types = catalog();
        if let Some(bakery) = types.get_mut(&BAKERY) {
            bakery.required_population = 20;
        }
        let rules = ProgressionRules::default();
        let mut p = player(1000, 1);
        let mut grid = empty_grid();
        assert!(place_building(&mut p, &mut grid, types.get(&HOUSE), (0, 0), &types, &rules).is_ok());
        let result = place_building(&mut p, &mut grid, types.get(&BAKERY), (4, 4), &types, &rules);
        assert_eq!(result.err(), Some(GameError::PopulationTooLow { required: 20, current: 5 }));
    }

    #[test]
    fn decorations_block_buildings() {
        let types = catalog();
        let rules = ProgressionRules::default();
        let mut p = player(1000, 1);
        let mut grid = empty_grid();
        assert!(place_decoration(&mut p, &mut grid, types.get(&FOUNTAIN), (1, 1), &rules).is_ok());
        let result = place_building(&mut p, &mut grid, types.get(&HOUSE), (0, 0), &types, &rules);
        assert_eq!(result.err(), Some(GameError::CellOccupied { x: 1, y: 1 }));
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let types = catalog();
        let rules = ProgressionRules::default();
        let mut p = player(1000, 1);
        let mut grid = empty_grid();
        let result = place_building(&mut p, &mut grid, types.get(&HOUSE), (39, 0), &types, &rules);
        assert!(matches!(result, Err(GameError::OutOfBounds { .. })));
        let result = place_building(&mut p, &mut grid, types.get(&HOUSE), (-1, 0), &types, &rules);
        assert!(matches!(result, Err(GameError::OutOfBounds { .. })));
    }

    #[test]
    fn move_ignores_own_cells() {
        let types = catalog();
        let rules = ProgressionRules::default();
        let mut p = player(1000, 1);
        let mut grid = empty_grid();
        let placed = place_building(&mut p, &mut grid, types.get(&HOUSE), (0, 0), &types, &rules);
        let placed = placed.unwrap();
        let moved = move_placement(&mut grid, placed.placement.id, (1, 0));
        assert_eq!(moved.map(|m| m.placement.footprint.x).ok(), Some(1));
    }

    #[test]
    fn count_limit_is_enforced() {
        let mut types = catalog();
        if let Some(house) = types.get_mut(&HOUSE) {
            house.max_count = Some(1);
        }
        let rules = ProgressionRules::default();
        let mut p = player(1000, 1);
        let mut grid = empty_grid();
        assert!(place_building(&mut p, &mut grid, types.get(&HOUSE), (0, 0), &types, &rules).is_ok());
        let result = place_building(&mut p, &mut grid, types.get(&HOUSE), (5, 5), &types, &rules);
        assert!(matches!(result, Err(GameError::LimitReached { used: 1, limit: 1, .. })));
    }

    #[test]
    fn upgrade_is_gated_by_player_level() {
        let types = catalog();
        let rules = ProgressionRules::default();
        let mut p = player(1000, 1);
        let mut grid = empty_grid();
        let placed = place_building(&mut p, &mut grid, types.get(&HOUSE), (0, 0), &types, &rules);
        let placed = placed.unwrap();
        let id = placed.placement.id;
        assert!(matches!(
            upgrade_building(&mut p, &mut grid, id, &types, &rules),
            Err(GameError::LevelTooLow { .. })
        ));
        p.ledger.level = 10;
        let upgraded = upgrade_building(&mut p, &mut grid, id, &types, &rules);
        assert_eq!(upgraded.as_ref().map(|u| u.cost).ok(), Some(50));
        assert_eq!(upgraded.map(|u| u.population).ok(), Some(Some(10)));
        let upgraded = upgrade_building(&mut p, &mut grid, id, &types, &rules);
        assert_eq!(upgraded.map(|u| u.cost).ok(), Some(100));
        assert!(matches!(
            upgrade_building(&mut p, &mut grid, id, &types, &rules),
            Err(GameError::AlreadyTerminal { .. })
        ));
    }

    #[test]
    fn removal_recomputes_population_without_refund() {
        let types = catalog();
        let rules = ProgressionRules::default();
        let mut p = player(1000, 1);
        let mut grid = empty_grid();
        let placed = place_building(&mut p, &mut grid, types.get(&HOUSE), (0, 0), &types, &rules);
        let placed = placed.unwrap();
        let removed = remove_placement(&mut grid, placed.placement.id, &types);
        assert_eq!(removed.map(|r| r.population).ok(), Some(Some(0)));
        assert_eq!(p.ledger.crystals, 1000);
        assert!(grid.placements().is_empty());
    }

    #[test]
    fn roads_cost_a_flat_price() {
        let config = TownConfig::default();
        let mut p = player(100, 1);
        let mut grid = empty_grid();
        assert_eq!(place_road(&mut p, &mut grid, (0, 0), &config).map(|r| r.cost).ok(), Some(10));
        assert!(matches!(
            place_road(&mut p, &mut grid, (0, 0), &config),
            Err(GameError::CellOccupied { x: 0, y: 0 })
        ));
    }
}
