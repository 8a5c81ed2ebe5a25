//! Error types for the simulation core

use crate::models::Resources;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every command handler either succeeds or returns exactly one of these,
/// with machine-readable details and no partial mutation left behind.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[serde(tag = "code", rename_all = "camelCase")]
pub enum GameError {
    #[error("Agent not found: {id}")]
    AgentNotFound { id: String },

    #[error("Planet not found: {id}")]
    PlanetNotFound { id: String },

    #[error("Fleet not found: {id}")]
    FleetNotFound { id: String },

    #[error("Not the owner of {planet}")]
    NotOwner { planet: String },

    #[error("Defender is under score protection")]
    ScoreShield { defender_score: f64 },

    #[error("Defender is under time protection, {hours_remaining}h remaining")]
    TimeShield { hours_remaining: i64 },

    #[error("Attacker score exceeds {ratio}x the defender's")]
    RatioShield { ratio: f64 },

    #[error("Origin and destination are the same planet")]
    SamePlanet,

    #[error("Admin privileges required")]
    AdminRequired,

    #[error("Invalid argument: {detail}")]
    InvalidArgument { detail: String },

    #[error("Invalid coordinates: {coords}")]
    InvalidCoordinates { coords: String },

    #[error("Requirements not met: {detail}")]
    RequirementsNotMet { detail: String },

    #[error("Build queue is full ({limit} slots)")]
    QueueFull { limit: usize },

    #[error("Shipyard is already working")]
    ShipyardBusy,

    #[error("Research is already in progress")]
    ResearchInProgress,

    #[error("Colony limit reached ({limit})")]
    ColonyLimit { limit: usize },

    #[error("No free fleet slots ({limit})")]
    FleetSlotsExhausted { limit: usize },

    #[error("Booster is already active")]
    BoosterActive,

    #[error("Defense is capped at {cap} per planet")]
    DefenseCapped { cap: u32 },

    #[error("No debris field at the target")]
    NoDebris,

    #[error("Insufficient resources: need {required:?}, have {available:?}")]
    InsufficientResources {
        required: Resources,
        available: Resources,
    },

    #[error("Insufficient deuterium for fuel: need {required}, have {available}")]
    InsufficientFuel { required: f64, available: f64 },

    #[error("Insufficient currency: need {required}, have {available}")]
    InsufficientCurrency { required: f64, available: f64 },

    #[error("Planet is busy, try again")]
    Busy,

    #[error("Corrupted state: {detail}")]
    Corruption { detail: String },

    #[error("Internal error: {detail}")]
    Internal { detail: String },
}

impl GameError {
    /// Abstract error kind, used for the HTTP status mapping in the adapter.
    pub fn kind(&self) -> ErrorKind {
        use GameError::*;
        match self {
            AgentNotFound { .. } | PlanetNotFound { .. } | FleetNotFound { .. } => {
                ErrorKind::NotFound
            }
            NotOwner { .. } | ScoreShield { .. } | TimeShield { .. } | RatioShield { .. }
            | SamePlanet | AdminRequired => ErrorKind::Forbidden,
            InvalidArgument { .. } | InvalidCoordinates { .. } => ErrorKind::InvalidArgument,
            RequirementsNotMet { .. } | QueueFull { .. } | ShipyardBusy | ResearchInProgress
            | ColonyLimit { .. } | FleetSlotsExhausted { .. } | BoosterActive
            | DefenseCapped { .. } | NoDebris => ErrorKind::Precondition,
            InsufficientResources { .. } | InsufficientFuel { .. }
            | InsufficientCurrency { .. } => ErrorKind::Insufficient,
            Busy => ErrorKind::Conflict,
            Corruption { .. } => ErrorKind::Corruption,
            Internal { .. } => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidArgument,
    Precondition,
    Insufficient,
    Conflict,
    Corruption,
    Internal,
}
