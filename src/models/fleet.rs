use crate::catalog::ShipId;
use crate::models::{PlanetId, Resources, SystemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Mission {
    Transport,
    Deploy,
    Attack,
    Recycle,
    Espionage,
    Colonize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fleet {
    pub id: uuid::Uuid,
    pub owner: String,
    pub ships: BTreeMap<ShipId, u32>,
    pub mission: Mission,
    pub origin: PlanetId,
    pub destination: PlanetId,
    pub cargo: Resources,
    pub fuel_consumed: f64,
    pub departed_at: DateTime<Utc>,
    pub arrives_at: DateTime<Utc>,
    pub returning: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recalled_at: Option<DateTime<Utc>>,
}

impl Fleet {
    pub fn ship_count(&self, ship: ShipId) -> u32 {
        self.ships.get(&ship).copied().unwrap_or(0)
    }

    pub fn total_ships(&self) -> u32 {
        self.ships.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ships.values().all(|&count| count == 0)
    }
}

/// Recoverable wreckage at a coordinate, produced by combat and collected by
/// recyclers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebrisField {
    pub coords: PlanetId,
    pub metal: f64,
    pub crystal: f64,
}

impl DebrisField {
    /// Sub-unit residue left by floored pickups counts as empty.
    pub fn is_empty(&self) -> bool {
        self.metal < 1.0 && self.crystal < 1.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarSystem {
    pub id: SystemId,
    pub name: String,
    pub origin: NameOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum NameOrigin {
    /// From the pre-seeded constant table.
    Seeded,
    /// Procedurally generated on first occupancy.
    Generated,
    /// Chosen by an agent present in the system.
    Named { agent: String },
}
