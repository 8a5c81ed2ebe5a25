use crate::catalog::ids::{BoosterId, OfficerId, PoolId, ResourceKind};
use crate::models::Agent;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use maplit::btreemap;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct OfficerStats {
    pub cost: f64,
    pub duration_secs: i64,
    pub build_queue_slots: u32,
    pub fleet_slots: u32,
    /// Multiplier applied to all resource production while active.
    pub production: f64,
    /// Multiplier applied to research time while active.
    pub research_time: f64,
}

#[derive(Debug, Clone)]
pub struct BoosterStats {
    pub cost: f64,
    pub duration_secs: i64,
    /// None boosts all production (the wildcard booster).
    pub resource: Option<ResourceKind>,
    pub multiplier: f64,
}

#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Yearly rate applied linearly over elapsed time.
    pub apr: f64,
    pub lock_secs: i64,
    pub min_stake: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedupKind {
    Build,
    Research,
    Shipyard,
}

lazy_static! {
    pub static ref OFFICERS: BTreeMap<OfficerId, OfficerStats> = btreemap! {
        OfficerId::Overseer => OfficerStats {
            cost: 5000.0, duration_secs: 7 * 86400,
            build_queue_slots: 2, fleet_slots: 0, production: 1.0, research_time: 1.0,
        },
        OfficerId::Admiral => OfficerStats {
            cost: 5000.0, duration_secs: 7 * 86400,
            build_queue_slots: 0, fleet_slots: 2, production: 1.0, research_time: 1.0,
        },
        OfficerId::Prospector => OfficerStats {
            cost: 7500.0, duration_secs: 7 * 86400,
            build_queue_slots: 0, fleet_slots: 0, production: 1.25, research_time: 1.0,
        },
        OfficerId::Technocrat => OfficerStats {
            cost: 6000.0, duration_secs: 7 * 86400,
            build_queue_slots: 0, fleet_slots: 0, production: 1.0, research_time: 0.75,
        },
    };

    pub static ref BOOSTERS: BTreeMap<BoosterId, BoosterStats> = btreemap! {
        BoosterId::MetalBooster => BoosterStats {
            cost: 1500.0, duration_secs: 86400, resource: Some(ResourceKind::Metal), multiplier: 1.3,
        },
        BoosterId::CrystalBooster => BoosterStats {
            cost: 1500.0, duration_secs: 86400, resource: Some(ResourceKind::Crystal), multiplier: 1.3,
        },
        BoosterId::DeuteriumBooster => BoosterStats {
            cost: 2000.0, duration_secs: 86400, resource: Some(ResourceKind::Deuterium), multiplier: 1.3,
        },
        BoosterId::OmniBooster => BoosterStats {
            cost: 3500.0, duration_secs: 12 * 3600, resource: None, multiplier: 1.2,
        },
    };

    pub static ref POOLS: BTreeMap<PoolId, PoolStats> = btreemap! {
        PoolId::NovaPool => PoolStats { apr: 0.12, lock_secs: 7 * 86400, min_stake: 100.0 },
        PoolId::PulsarPool => PoolStats { apr: 0.25, lock_secs: 30 * 86400, min_stake: 1000.0 },
        PoolId::QuasarPool => PoolStats { apr: 0.05, lock_secs: 0, min_stake: 10.0 },
    };
}

/// Currency per remaining hour when finishing a queue early.
pub fn speedup_rate(kind: SpeedupKind) -> f64 {
    match kind {
        SpeedupKind::Build => 40.0,
        SpeedupKind::Research => 60.0,
        SpeedupKind::Shipyard => 30.0,
    }
}

/// Currency per 1000 units when buying raw resources.
pub fn resource_rate(resource: ResourceKind) -> f64 {
    match resource {
        ResourceKind::Metal => 1.0,
        ResourceKind::Crystal => 2.0,
        ResourceKind::Deuterium => 4.0,
    }
}

/// Extra build-queue slots from active officers.
pub fn build_queue_bonus(agent: &Agent, now: DateTime<Utc>) -> usize {
    OFFICERS
        .iter()
        .filter(|(id, _)| agent.officer_active(**id, now))
        .map(|(_, stats)| stats.build_queue_slots as usize)
        .sum()
}

/// Extra fleet slots from active officers.
pub fn fleet_slot_bonus(agent: &Agent, now: DateTime<Utc>) -> usize {
    OFFICERS
        .iter()
        .filter(|(id, _)| agent.officer_active(**id, now))
        .map(|(_, stats)| stats.fleet_slots as usize)
        .sum()
}

pub fn research_time_multiplier(agent: &Agent, now: DateTime<Utc>) -> f64 {
    OFFICERS
        .iter()
        .filter(|(id, _)| agent.officer_active(**id, now))
        .map(|(_, stats)| stats.research_time)
        .product()
}

/// Combined production multiplier for one resource: matching boosters (or the
/// all-production wildcard) times the prospector officer's bonus.
pub fn production_multiplier(agent: &Agent, resource: ResourceKind, now: DateTime<Utc>) -> f64 {
    let boosters: f64 = BOOSTERS
        .iter()
        .filter(|(id, stats)| {
            agent.booster_active(**id, now)
                && stats.resource.map(|r| r == resource).unwrap_or(true)
        })
        .map(|(_, stats)| stats.multiplier)
        .product();
    let officers: f64 = OFFICERS
        .iter()
        .filter(|(id, _)| agent.officer_active(**id, now))
        .map(|(_, stats)| stats.production)
        .product();
    boosters * officers
}
