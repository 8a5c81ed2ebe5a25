use crate::catalog::{BuildingId, DefenseId, ShipId, TechId};
use crate::models::{BattleReport, FleetReport, Mission, PlanetId, Resources, SystemId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Broadcast to connected observers. Delivery is best-effort and lossy: the
/// transport layer drops slow consumers and the core never blocks on it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "event", content = "data")]
pub enum Event {
    Tick {
        tick: u64,
    },
    BuildStarted {
        planet: PlanetId,
        building: BuildingId,
        target_level: u32,
        completes_at: DateTime<Utc>,
    },
    BuildComplete {
        planet: PlanetId,
        building: BuildingId,
        level: u32,
    },
    ResearchStarted {
        agent: String,
        tech: TechId,
        target_level: u32,
        completes_at: DateTime<Utc>,
    },
    ResearchComplete {
        agent: String,
        tech: TechId,
        level: u32,
    },
    ShipComplete {
        planet: PlanetId,
        ship: ShipId,
        count: u32,
    },
    DefenseComplete {
        planet: PlanetId,
        defense: DefenseId,
        count: u32,
    },
    FleetLaunched {
        fleet_id: uuid::Uuid,
        owner: String,
        mission: Mission,
        origin: PlanetId,
        destination: PlanetId,
        arrives_at: DateTime<Utc>,
    },
    FleetArrived {
        fleet_id: uuid::Uuid,
        owner: String,
        mission: Mission,
        destination: PlanetId,
    },
    FleetReturned {
        fleet_id: uuid::Uuid,
        owner: String,
        origin: PlanetId,
    },
    FleetDeployed {
        fleet_id: uuid::Uuid,
        owner: String,
        destination: PlanetId,
    },
    FleetRecalled {
        fleet_id: uuid::Uuid,
        owner: String,
    },
    FleetReturning {
        fleet_id: uuid::Uuid,
        owner: String,
        arrives_at: DateTime<Utc>,
    },
    BattleReport {
        report: BattleReport,
    },
    DebrisCreated {
        coords: PlanetId,
        metal: f64,
        crystal: f64,
    },
    DebrisCollected {
        coords: PlanetId,
        metal: f64,
        crystal: f64,
    },
    PlanetColonized {
        planet: PlanetId,
        agent: String,
    },
    SystemNamed {
        system: SystemId,
        name: String,
    },
    NewMessage {
        recipient: String,
    },
    OnlineCount {
        count: usize,
    },
}

/// Durable rows flowing to the recorder task, which writes them through the
/// store. Sends never block; a full channel drops the record.
#[derive(Debug, Clone)]
pub enum Record {
    Battle(BattleReport),
    Fleet(FleetReport),
    Score {
        agent_id: String,
        tick: u64,
        score: f64,
        planet_count: usize,
    },
}

/// Compact fleet summary used by query endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetView {
    pub id: uuid::Uuid,
    pub owner: String,
    pub mission: Mission,
    pub origin: PlanetId,
    pub destination: PlanetId,
    pub ships: BTreeMap<ShipId, u32>,
    pub cargo: Resources,
    pub arrives_at: DateTime<Utc>,
    pub returning: bool,
}

impl From<&crate::models::Fleet> for FleetView {
    fn from(fleet: &crate::models::Fleet) -> Self {
        Self {
            id: fleet.id,
            owner: fleet.owner.clone(),
            mission: fleet.mission,
            origin: fleet.origin,
            destination: fleet.destination,
            ships: fleet.ships.clone(),
            cargo: fleet.cargo,
            arrives_at: fleet.arrives_at,
            returning: fleet.returning,
        }
    }
}
