use crate::catalog::{BuildingId, DefenseId, ShipId};
use crate::models::{PlanetId, Resources};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Planet {
    pub id: PlanetId,
    /// None while uncolonized.
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub min_temperature: i32,
    pub max_temperature: i32,
    pub resources: Resources,
    /// Derived display value, refreshed by the tick pass.
    #[serde(default)]
    pub energy: f64,
    pub buildings: BTreeMap<BuildingId, u32>,
    pub ships: BTreeMap<ShipId, u32>,
    pub defenses: BTreeMap<DefenseId, u32>,
    pub build_queue: Vec<BuildJob>,
    pub shipyard_queue: Vec<ShipyardJob>,
}

impl Planet {
    pub fn building_level(&self, building: BuildingId) -> u32 {
        self.buildings.get(&building).copied().unwrap_or(0)
    }

    pub fn ship_count(&self, ship: ShipId) -> u32 {
        self.ships.get(&ship).copied().unwrap_or(0)
    }

    pub fn defense_count(&self, defense: DefenseId) -> u32 {
        self.defenses.get(&defense).copied().unwrap_or(0)
    }

    pub fn add_ships(&mut self, ship: ShipId, count: u32) {
        if count > 0 {
            *self.ships.entry(ship).or_insert(0) += count;
        }
    }

    pub fn remove_ships(&mut self, ship: ShipId, count: u32) {
        if let Some(existing) = self.ships.get_mut(&ship) {
            *existing = existing.saturating_sub(count);
            if *existing == 0 {
                self.ships.remove(&ship);
            }
        }
    }

    pub fn add_defenses(&mut self, defense: DefenseId, count: u32) {
        if count > 0 {
            *self.defenses.entry(defense).or_insert(0) += count;
        }
    }

    /// The level the head of the build queue will raise this building to,
    /// counting queued jobs ahead of it.
    pub fn pending_level(&self, building: BuildingId) -> u32 {
        self.build_queue
            .iter()
            .filter(|job| job.building == building)
            .map(|job| job.target_level)
            .max()
            .unwrap_or_else(|| self.building_level(building))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildJob {
    pub building: BuildingId,
    pub target_level: u32,
    pub cost: Resources,
    pub started_at: DateTime<Utc>,
    pub completes_at: DateTime<Utc>,
    pub build_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipyardJob {
    pub item: ShipyardItem,
    pub count: u32,
    pub started_at: DateTime<Utc>,
    pub completes_at: DateTime<Utc>,
    pub build_secs: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "id")]
pub enum ShipyardItem {
    Ship(ShipId),
    Defense(DefenseId),
}

impl ShipyardItem {
    pub fn is_defense(&self) -> bool {
        matches!(self, ShipyardItem::Defense(_))
    }
}
