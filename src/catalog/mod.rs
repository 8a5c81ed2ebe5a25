//! Immutable game content and the pure formula layer. No state lives here;
//! everything is a deterministic function of its inputs.

mod ids;
mod premium;
mod tables;

pub use ids::*;
pub use premium::*;
pub use tables::*;

use crate::models::{Agent, PlanetId, Planet, Resources};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub const MIN_BUILD_SECS: i64 = 30;
pub const MIN_SHIPYARD_SECS: i64 = 15;
pub const MIN_RESEARCH_SECS: i64 = 45;
pub const MIN_TRAVEL_SECS: i64 = 10;

pub fn building_cost(building: BuildingId, current_level: u32) -> Resources {
    let stats = &BUILDINGS[&building];
    stats
        .base_cost
        .scale(stats.cost_factor.powi(current_level as i32))
        .floor()
}

pub fn research_cost(tech: TechId, current_level: u32) -> Resources {
    let stats = &TECHS[&tech];
    stats
        .base_cost
        .scale(stats.cost_factor.powi(current_level as i32))
        .floor()
}

pub fn ship_cost(ship: ShipId, count: u32) -> Resources {
    SHIPS[&ship].cost.scale(count as f64)
}

pub fn defense_cost(defense: DefenseId, count: u32) -> Resources {
    DEFENSES[&defense].cost.scale(count as f64)
}

pub fn build_time(cost: &Resources, robotics: u32, nanite: u32, game_speed: f64) -> i64 {
    queue_time(cost, 2500.0, robotics, nanite, game_speed, MIN_BUILD_SECS)
}

/// Shipyard jobs use a divisor ten times the construction one, which lands
/// small hulls near the 15 s floor at default speed.
pub fn shipyard_time(cost: &Resources, robotics: u32, nanite: u32, game_speed: f64) -> i64 {
    queue_time(cost, 25000.0, robotics, nanite, game_speed, MIN_SHIPYARD_SECS)
}

fn queue_time(
    cost: &Resources,
    divisor: f64,
    robotics: u32,
    nanite: u32,
    game_speed: f64,
    min_secs: i64,
) -> i64 {
    let hours =
        (cost.metal + cost.crystal) / (divisor * (1.0 + robotics as f64) * 2f64.powi(nanite as i32));
    let secs = (hours * 3600.0 / game_speed).floor() as i64;
    secs.max(min_secs)
}

pub fn research_time(cost: &Resources, lab: u32, science: u32, game_speed: f64) -> i64 {
    let discount = 1.0 - (0.05 * science as f64).min(0.5);
    let hours = (cost.metal + cost.crystal) / (1000.0 * (1.0 + lab as f64));
    let secs = (hours * discount * 3600.0 / game_speed).floor() as i64;
    secs.max(MIN_RESEARCH_SECS)
}

pub fn storage_capacity(level: u32) -> f64 {
    (5000.0 * (2.5 * ((20.0 / 33.0) * level as f64).exp()).floor()).floor()
}

/// Closed-form per-second production rates for a planet, before the storage
/// cap is applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductionRates {
    pub metal_per_sec: f64,
    pub crystal_per_sec: f64,
    pub deuterium_per_sec: f64,
    /// Fusion reactor deuterium burn, already scaled to per-second.
    pub fusion_burn_per_sec: f64,
    pub energy_produced: f64,
    pub energy_consumed: f64,
    pub efficiency: f64,
}

pub fn production(
    planet: &Planet,
    agent: Option<&Agent>,
    now: DateTime<Utc>,
    game_speed: f64,
) -> ProductionRates {
    let level = |b| planet.building_level(b) as f64;
    let curve = |base: f64, lvl: f64| base * lvl * 1.1f64.powf(lvl);

    let metal_lvl = level(BuildingId::MetalMine);
    let crystal_lvl = level(BuildingId::CrystalMine);
    let deut_lvl = level(BuildingId::DeuteriumSynthesizer);
    let solar_lvl = level(BuildingId::SolarPlant);
    let fusion_lvl = level(BuildingId::FusionReactor);

    let energy_produced =
        curve(20.0, solar_lvl) + 30.0 * fusion_lvl * 1.05f64.powf(fusion_lvl);
    let energy_consumed =
        curve(10.0, metal_lvl) + curve(10.0, crystal_lvl) + curve(20.0, deut_lvl);
    let efficiency = if energy_consumed <= 0.0 {
        1.0
    } else {
        (energy_produced / energy_consumed).min(1.0)
    };

    // Colder planets synthesize deuterium faster.
    let temp_factor = (1.44 - 0.004 * planet.max_temperature as f64).max(0.0);

    let multiplier = |resource| match agent {
        Some(agent) => production_multiplier(agent, resource, now),
        None => 1.0,
    };
    let per_hour_to_sec = game_speed * efficiency / 3600.0;

    ProductionRates {
        metal_per_sec: curve(30.0, metal_lvl) * multiplier(ResourceKind::Metal) * per_hour_to_sec,
        crystal_per_sec: curve(20.0, crystal_lvl)
            * multiplier(ResourceKind::Crystal)
            * per_hour_to_sec,
        deuterium_per_sec: curve(10.0, deut_lvl)
            * temp_factor
            * multiplier(ResourceKind::Deuterium)
            * per_hour_to_sec,
        fusion_burn_per_sec: 10.0 * fusion_lvl * 1.1f64.powf(fusion_lvl) * game_speed / 3600.0,
        energy_produced,
        energy_consumed,
        efficiency,
    }
}

/// Storage caps for the three stored resources on a planet.
pub fn storage_caps(planet: &Planet) -> Resources {
    Resources {
        metal: storage_capacity(planet.building_level(BuildingId::MetalStorage)),
        crystal: storage_capacity(planet.building_level(BuildingId::CrystalStorage)),
        deuterium: storage_capacity(planet.building_level(BuildingId::DeuteriumTank)),
    }
}

pub fn travel_distance(a: PlanetId, b: PlanetId) -> f64 {
    if a.galaxy != b.galaxy {
        20000.0 * (a.galaxy - b.galaxy).abs() as f64
    } else if a.system != b.system {
        2700.0 + 95.0 * (a.system - b.system).abs() as f64
    } else {
        1000.0 + 5.0 * (a.position - b.position).abs() as f64
    }
}

pub fn travel_time(distance: f64, game_speed: f64) -> i64 {
    ((distance / 100.0 / game_speed).floor() as i64).max(MIN_TRAVEL_SECS)
}

pub fn fuel_consumption(ships: &BTreeMap<ShipId, u32>, distance: f64) -> f64 {
    ships
        .iter()
        .map(|(ship, &count)| {
            let per_ship = (SHIPS[ship].fuel * distance / 35000.0).ceil().max(1.0);
            count as f64 * per_ship
        })
        .sum()
}

pub fn fleet_cargo_capacity(ships: &BTreeMap<ShipId, u32>) -> f64 {
    ships
        .iter()
        .map(|(ship, &count)| count as f64 * SHIPS[ship].cargo)
        .sum()
}

/// Check prerequisite levels against the planet's buildings and the agent's
/// technologies; returns the unmet requirements.
pub fn unmet_requirements(
    requirements: &[Requirement],
    planet: &Planet,
    agent: &Agent,
) -> Vec<Requirement> {
    requirements
        .iter()
        .filter(|req| match req {
            Requirement::Building(building, level) => planet.building_level(*building) < *level,
            Requirement::Tech(tech, level) => agent.tech_level(*tech) < *level,
        })
        .copied()
        .collect()
}

pub fn describe_requirement(req: &Requirement) -> String {
    match req {
        Requirement::Building(building, level) => format!("{} {}", building, level),
        Requirement::Tech(tech, level) => format!("{} {}", tech, level),
    }
}
