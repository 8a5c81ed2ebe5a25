use crate::catalog::{BuildingId, DefenseId, ShipId, TechId};
use crate::models::{Mission, PlanetId, Resources};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BattleWinner {
    Attacker,
    Defender,
    #[default]
    Draw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleReport {
    pub id: uuid::Uuid,
    pub at: DateTime<Utc>,
    pub location: PlanetId,
    pub attacker_id: String,
    pub defender_id: String,
    pub rounds: u32,
    pub winner: BattleWinner,
    pub attacker_losses: BTreeMap<ShipId, u32>,
    pub defender_losses: BTreeMap<ShipId, u32>,
    pub defender_defense_losses: BTreeMap<DefenseId, u32>,
    pub defenses_rebuilt: BTreeMap<DefenseId, u32>,
    pub loot: Resources,
    pub debris_metal: f64,
    pub debris_crystal: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum FleetReportKind {
    Dispatched,
    Arrived,
    Returned,
    Deployed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetReport {
    pub id: uuid::Uuid,
    pub at: DateTime<Utc>,
    pub agent_id: String,
    pub fleet_id: uuid::Uuid,
    pub kind: FleetReportKind,
    pub mission: Mission,
    pub origin: PlanetId,
    pub destination: PlanetId,
    pub ships: BTreeMap<ShipId, u32>,
    pub cargo: Resources,
}

/// Espionage findings, layered by the achieved info level: 1 resources,
/// 2 +fleet, 3 +defense, 4 +buildings, 5 +technologies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EspionageReport {
    pub id: uuid::Uuid,
    pub at: DateTime<Utc>,
    pub target: PlanetId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_owner: Option<String>,
    pub info_level: u32,
    pub resources: Resources,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fleet: Option<BTreeMap<ShipId, u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defenses: Option<BTreeMap<DefenseId, u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buildings: Option<BTreeMap<BuildingId, u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technologies: Option<BTreeMap<TechId, u32>>,
    pub probes_sent: u32,
    pub probes_lost: u32,
}
