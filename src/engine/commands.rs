//! Command verbs. Every handler validates against the catalog and the world
//! invariants, acquires the planet lock(s) it needs, and performs its whole
//! mutation inside one critical section; a failed command leaves no trace.

use crate::catalog::{
    self, BuildingId, DefenseId, ShipId, TechId, BUILDINGS, DEFENSES, SHIPS, TECHS,
};
use crate::config::CONFIG;
use crate::engine::{combat, Engine, Event, Record};
use crate::errors::GameError;
use crate::models::{
    Agent, BuildJob, Fleet, FleetReport, FleetReportKind, Mission, Planet, PlanetId,
    ResearchJob, Resources, ShipyardItem, ShipyardJob, SystemId,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Refund fraction for cancelled jobs and recalled fleets.
const CANCEL_REFUND: f64 = 0.5;

fn job_progress(started_at: DateTime<Utc>, duration_secs: i64, now: DateTime<Utc>) -> f64 {
    if duration_secs <= 0 {
        return 1.0;
    }
    let elapsed = (now - started_at).num_seconds().clamp(0, duration_secs);
    elapsed as f64 / duration_secs as f64
}

fn cancel_refund(cost: &Resources, progress: f64) -> Resources {
    cost.scale((1.0 - progress) * CANCEL_REFUND).floor()
}

fn require_owner(planet: &Planet, agent_id: &str) -> Result<(), GameError> {
    if planet.owner.as_deref() != Some(agent_id) {
        return Err(GameError::NotOwner {
            planet: planet.id.to_string(),
        });
    }
    Ok(())
}

fn require_requirements(
    requirements: &[catalog::Requirement],
    planet: &Planet,
    agent: &Agent,
) -> Result<(), GameError> {
    let unmet = catalog::unmet_requirements(requirements, planet, agent);
    if unmet.is_empty() {
        return Ok(());
    }
    Err(GameError::RequirementsNotMet {
        detail: unmet
            .iter()
            .map(catalog::describe_requirement)
            .collect::<Vec<_>>()
            .join(", "),
    })
}

fn require_affordable(planet: &Planet, cost: &Resources) -> Result<(), GameError> {
    if !planet.resources.covers(cost) {
        return Err(GameError::InsufficientResources {
            required: *cost,
            available: planet.resources,
        });
    }
    Ok(())
}

fn in_bounds(id: PlanetId) -> bool {
    id.galaxy >= 1
        && id.galaxy <= CONFIG.galaxies
        && id.system >= 1
        && id.system <= CONFIG.systems_per_galaxy
        && id.position >= 1
        && id.position <= CONFIG.positions_per_system
}

/// Colonies are planets beyond the home world.
fn colony_limit(agent: &Agent) -> usize {
    1 + (agent.tech_level(TechId::Astrophysics) / 2) as usize
}

fn fleet_slot_limit(agent: &Agent, now: DateTime<Utc>) -> usize {
    2 + agent.tech_level(TechId::ComputerTech) as usize + catalog::fleet_slot_bonus(agent, now)
}

/// Recompute queue timings after the head changed.
fn reanchor_build_queue(queue: &mut [BuildJob], now: DateTime<Utc>) {
    let mut cursor = now;
    for job in queue.iter_mut() {
        job.started_at = cursor;
        job.completes_at = cursor + Duration::seconds(job.build_secs);
        cursor = job.completes_at;
    }
}

impl Engine {
    /// Create (or fetch) the agent for a wallet. The adapter has already
    /// authenticated the wallet signature.
    pub fn register(
        &self,
        wallet: &str,
        display_name: &str,
        ip: &str,
    ) -> Result<Agent, GameError> {
        let display_name = display_name.trim();
        if !CONFIG.display_name_filter.is_match(display_name) {
            return Err(GameError::InvalidArgument {
                detail: "invalid display name".to_string(),
            });
        }
        let now = Utc::now();
        let agent =
            self.with_rng(|rng| self.universe.register_agent(wallet, display_name, ip, now, rng))?;
        self.mark_dirty();
        Ok(agent)
    }

    pub async fn build(
        &self,
        agent_id: &str,
        planet_id: PlanetId,
        building: BuildingId,
    ) -> Result<BuildJob, GameError> {
        let _guard = self.locks.acquire(planet_id).await?;
        self.build_inner(agent_id, planet_id, building, Utc::now())
    }

    fn build_inner(
        &self,
        agent_id: &str,
        planet_id: PlanetId,
        building: BuildingId,
        now: DateTime<Utc>,
    ) -> Result<BuildJob, GameError> {
        let planet = self.universe.get_planet(planet_id)?;
        require_owner(&planet, agent_id)?;
        let agent = self.universe.get_agent(agent_id)?;

        let limit = 1 + catalog::build_queue_bonus(&agent, now);
        if planet.build_queue.len() >= limit {
            return Err(GameError::QueueFull { limit });
        }
        let stats = &BUILDINGS[&building];
        require_requirements(&stats.requirements, &planet, &agent)?;

        let current = planet.pending_level(building);
        let cost = catalog::building_cost(building, current);
        require_affordable(&planet, &cost)?;

        let build_secs = catalog::build_time(
            &cost,
            planet.building_level(BuildingId::RoboticsFactory),
            planet.building_level(BuildingId::NaniteFactory),
            CONFIG.game_speed,
        );
        let started_at = planet
            .build_queue
            .last()
            .map(|job| job.completes_at.max(now))
            .unwrap_or(now);
        let job = BuildJob {
            building,
            target_level: current + 1,
            cost,
            started_at,
            completes_at: started_at + Duration::seconds(build_secs),
            build_secs,
        };
        self.mutate_planet(planet_id, |planet| {
            planet.resources = planet.resources - cost;
            planet.build_queue.push(job.clone());
            Ok(())
        })?;
        self.emit(Event::BuildStarted {
            planet: planet_id,
            building,
            target_level: job.target_level,
            completes_at: job.completes_at,
        });
        Ok(job)
    }

    /// Pop the head of the build queue, refunding half the unspent fraction.
    pub async fn cancel_build(
        &self,
        agent_id: &str,
        planet_id: PlanetId,
    ) -> Result<Resources, GameError> {
        let _guard = self.locks.acquire(planet_id).await?;
        let now = Utc::now();
        let planet = self.universe.get_planet(planet_id)?;
        require_owner(&planet, agent_id)?;
        if planet.build_queue.is_empty() {
            return Err(GameError::InvalidArgument {
                detail: "build queue is empty".to_string(),
            });
        }
        self.mutate_planet(planet_id, |planet| {
            let job = planet.build_queue.remove(0);
            let refund = cancel_refund(
                &job.cost,
                job_progress(job.started_at, job.build_secs, now),
            );
            planet.resources = planet.resources + refund;
            reanchor_build_queue(&mut planet.build_queue, now);
            Ok(refund)
        })
    }

    pub async fn research(
        &self,
        agent_id: &str,
        planet_id: PlanetId,
        tech: TechId,
    ) -> Result<ResearchJob, GameError> {
        let _guard = self.locks.acquire(planet_id).await?;
        self.research_inner(agent_id, planet_id, tech, Utc::now())
    }

    fn research_inner(
        &self,
        agent_id: &str,
        planet_id: PlanetId,
        tech: TechId,
        now: DateTime<Utc>,
    ) -> Result<ResearchJob, GameError> {
        let planet = self.universe.get_planet(planet_id)?;
        require_owner(&planet, agent_id)?;
        let agent = self.universe.get_agent(agent_id)?;
        if !agent.research_queue.is_empty() {
            return Err(GameError::ResearchInProgress);
        }
        let lab = planet.building_level(BuildingId::ResearchLab);
        if lab < 1 {
            return Err(GameError::RequirementsNotMet {
                detail: "researchLab 1".to_string(),
            });
        }
        let stats = &TECHS[&tech];
        if lab < stats.lab_level {
            return Err(GameError::RequirementsNotMet {
                detail: format!("researchLab {}", stats.lab_level),
            });
        }
        require_requirements(&stats.requirements, &planet, &agent)?;

        let current = agent.tech_level(tech);
        let cost = catalog::research_cost(tech, current);
        require_affordable(&planet, &cost)?;

        let science = agent.tech_level(TechId::ResearchNetwork);
        let base_secs = catalog::research_time(&cost, lab, science, CONFIG.game_speed);
        let research_secs =
            ((base_secs as f64 * catalog::research_time_multiplier(&agent, now)) as i64).max(1);
        let job = ResearchJob {
            tech,
            target_level: current + 1,
            cost,
            started_at: now,
            completes_at: now + Duration::seconds(research_secs),
            research_secs,
        };
        self.mutate_planet(planet_id, |planet| {
            planet.resources = planet.resources - cost;
            Ok(())
        })?;
        self.mutate_agent(agent_id, |agent| {
            agent.research_queue.push(job.clone());
            Ok(())
        })?;
        self.emit(Event::ResearchStarted {
            agent: agent_id.to_string(),
            tech,
            target_level: job.target_level,
            completes_at: job.completes_at,
        });
        Ok(job)
    }

    /// Cancel the running research; the refund lands on the agent's first
    /// planet.
    pub async fn cancel_research(&self, agent_id: &str) -> Result<Resources, GameError> {
        let agent = self.universe.get_agent(agent_id)?;
        let home = *agent.planets.first().ok_or_else(|| GameError::Internal {
            detail: "agent has no planets".to_string(),
        })?;
        let _guard = self.locks.acquire(home).await?;
        let now = Utc::now();
        let job = self.mutate_agent(agent_id, |agent| {
            if agent.research_queue.is_empty() {
                return Err(GameError::InvalidArgument {
                    detail: "no research in progress".to_string(),
                });
            }
            Ok(agent.research_queue.remove(0))
        })?;
        let refund = cancel_refund(
            &job.cost,
            job_progress(job.started_at, job.research_secs, now),
        );
        self.mutate_planet(home, |planet| {
            planet.resources = planet.resources + refund;
            Ok(())
        })?;
        Ok(refund)
    }

    pub async fn build_ship(
        &self,
        agent_id: &str,
        planet_id: PlanetId,
        ship: ShipId,
        count: u32,
    ) -> Result<ShipyardJob, GameError> {
        let _guard = self.locks.acquire(planet_id).await?;
        self.shipyard_inner(agent_id, planet_id, ShipyardItem::Ship(ship), count, Utc::now())
    }

    pub async fn build_defense(
        &self,
        agent_id: &str,
        planet_id: PlanetId,
        defense: DefenseId,
        count: u32,
    ) -> Result<ShipyardJob, GameError> {
        let _guard = self.locks.acquire(planet_id).await?;
        self.shipyard_inner(
            agent_id,
            planet_id,
            ShipyardItem::Defense(defense),
            count,
            Utc::now(),
        )
    }

    fn shipyard_inner(
        &self,
        agent_id: &str,
        planet_id: PlanetId,
        item: ShipyardItem,
        count: u32,
        now: DateTime<Utc>,
    ) -> Result<ShipyardJob, GameError> {
        if count == 0 {
            return Err(GameError::InvalidArgument {
                detail: "count must be a positive integer".to_string(),
            });
        }
        let planet = self.universe.get_planet(planet_id)?;
        require_owner(&planet, agent_id)?;
        let agent = self.universe.get_agent(agent_id)?;
        if planet.building_level(BuildingId::Shipyard) < 1 {
            return Err(GameError::RequirementsNotMet {
                detail: "shipyard 1".to_string(),
            });
        }
        if !planet.shipyard_queue.is_empty() {
            return Err(GameError::ShipyardBusy);
        }

        let (cost, unit_cost) = match item {
            ShipyardItem::Ship(ship) => {
                require_requirements(&SHIPS[&ship].requirements, &planet, &agent)?;
                (catalog::ship_cost(ship, count), SHIPS[&ship].cost)
            }
            ShipyardItem::Defense(defense) => {
                let stats = &DEFENSES[&defense];
                require_requirements(&stats.requirements, &planet, &agent)?;
                if let Some(cap) = stats.cap {
                    if planet.defense_count(defense) + count > cap {
                        return Err(GameError::DefenseCapped { cap });
                    }
                }
                (catalog::defense_cost(defense, count), stats.cost)
            }
        };
        require_affordable(&planet, &cost)?;

        let per_unit = catalog::shipyard_time(
            &unit_cost,
            planet.building_level(BuildingId::RoboticsFactory),
            planet.building_level(BuildingId::NaniteFactory),
            CONFIG.game_speed,
        );
        let build_secs = per_unit * count as i64;
        let job = ShipyardJob {
            item,
            count,
            started_at: now,
            completes_at: now + Duration::seconds(build_secs),
            build_secs,
        };
        self.mutate_planet(planet_id, |planet| {
            planet.resources = planet.resources - cost;
            planet.shipyard_queue.push(job.clone());
            Ok(())
        })?;
        Ok(job)
    }

    pub async fn send_fleet(
        &self,
        agent_id: &str,
        from: PlanetId,
        to: PlanetId,
        ships: BTreeMap<ShipId, u32>,
        mission: Mission,
        cargo: Resources,
    ) -> Result<Fleet, GameError> {
        if from == to {
            return Err(GameError::SamePlanet);
        }
        if !in_bounds(to) || !in_bounds(from) {
            return Err(GameError::InvalidCoordinates {
                coords: to.to_string(),
            });
        }
        let ships: BTreeMap<ShipId, u32> =
            ships.into_iter().filter(|(_, count)| *count > 0).collect();
        if ships.is_empty() {
            return Err(GameError::InvalidArgument {
                detail: "fleet has no ships".to_string(),
            });
        }
        if !cargo.is_valid() {
            return Err(GameError::InvalidArgument {
                detail: "cargo amounts must be finite non-negative numbers".to_string(),
            });
        }

        // Dispatch reads the destination without its lock; only the origin
        // is mutated here.
        let _guard = self.locks.acquire(from).await?;
        let now = Utc::now();
        let origin = self.universe.get_planet(from)?;
        require_owner(&origin, agent_id)?;
        let agent = self.universe.get_agent(agent_id)?;

        let slot_limit = fleet_slot_limit(&agent, now);
        if self.universe.active_fleet_count(agent_id) >= slot_limit {
            return Err(GameError::FleetSlotsExhausted { limit: slot_limit });
        }
        for (ship, count) in &ships {
            if origin.ship_count(*ship) < *count {
                return Err(GameError::RequirementsNotMet {
                    detail: format!("not enough {} on {}", ship, from),
                });
            }
        }
        self.validate_mission(&agent, to, &ships, mission, now)?;

        let capacity = catalog::fleet_cargo_capacity(&ships);
        if cargo.total() > capacity {
            return Err(GameError::RequirementsNotMet {
                detail: format!("cargo exceeds fleet capacity {}", capacity),
            });
        }
        let distance = catalog::travel_distance(from, to);
        let fuel = catalog::fuel_consumption(&ships, distance);
        let deuterium_needed = cargo.deuterium + fuel;
        if origin.resources.deuterium < deuterium_needed {
            return Err(GameError::InsufficientFuel {
                required: deuterium_needed,
                available: origin.resources.deuterium,
            });
        }
        let cargo_cost = Resources::new(cargo.metal, cargo.crystal, deuterium_needed);
        require_affordable(&origin, &cargo_cost)?;

        let travel_secs = catalog::travel_time(distance, CONFIG.game_speed);
        let fleet = Fleet {
            id: Uuid::new_v4(),
            owner: agent_id.to_string(),
            ships: ships.clone(),
            mission,
            origin: from,
            destination: to,
            cargo,
            fuel_consumed: fuel,
            departed_at: now,
            arrives_at: now + Duration::seconds(travel_secs),
            returning: false,
            recalled_at: None,
        };
        self.mutate_planet(from, |planet| {
            for (ship, count) in &ships {
                planet.remove_ships(*ship, *count);
            }
            planet.resources = planet.resources - cargo_cost;
            Ok(())
        })?;
        self.universe.fleets.insert(fleet.id, fleet.clone());

        self.record(Record::Fleet(FleetReport {
            id: Uuid::new_v4(),
            at: now,
            agent_id: agent_id.to_string(),
            fleet_id: fleet.id,
            kind: FleetReportKind::Dispatched,
            mission,
            origin: from,
            destination: to,
            ships,
            cargo,
        }));
        self.emit(Event::FleetLaunched {
            fleet_id: fleet.id,
            owner: agent_id.to_string(),
            mission,
            origin: from,
            destination: to,
            arrives_at: fleet.arrives_at,
        });
        Ok(fleet)
    }

    fn validate_mission(
        &self,
        agent: &Agent,
        to: PlanetId,
        ships: &BTreeMap<ShipId, u32>,
        mission: Mission,
        now: DateTime<Utc>,
    ) -> Result<(), GameError> {
        let destination = self.universe.get_planet(to).ok();
        match mission {
            Mission::Transport | Mission::Deploy => {
                let owned = destination
                    .as_ref()
                    .map(|planet| planet.owner.as_deref() == Some(agent.id.as_str()))
                    .unwrap_or(false);
                if !owned {
                    return Err(GameError::NotOwner {
                        planet: to.to_string(),
                    });
                }
            }
            Mission::Attack => {
                let defender_id = destination
                    .as_ref()
                    .and_then(|planet| planet.owner.clone())
                    .ok_or_else(|| GameError::RequirementsNotMet {
                        detail: "attack requires an occupied planet".to_string(),
                    })?;
                if defender_id == agent.id {
                    return Err(GameError::InvalidArgument {
                        detail: "cannot attack your own planet".to_string(),
                    });
                }
                let defender = self.universe.get_agent(&defender_id)?;
                if defender.score < CONFIG.newbie_score_floor {
                    return Err(GameError::ScoreShield {
                        defender_score: defender.score,
                    });
                }
                let age_hours = (now - defender.created_at).num_hours();
                if age_hours < CONFIG.newbie_age_hours {
                    return Err(GameError::TimeShield {
                        hours_remaining: CONFIG.newbie_age_hours - age_hours,
                    });
                }
                if agent.score > CONFIG.newbie_score_ratio * defender.score {
                    return Err(GameError::RatioShield {
                        ratio: CONFIG.newbie_score_ratio,
                    });
                }
            }
            Mission::Colonize => {
                if !ships.contains_key(&ShipId::ColonyShip) {
                    return Err(GameError::RequirementsNotMet {
                        detail: "colonization requires a colony ship".to_string(),
                    });
                }
                let occupied = destination
                    .as_ref()
                    .map(|planet| planet.owner.is_some())
                    .unwrap_or(false);
                if occupied {
                    return Err(GameError::RequirementsNotMet {
                        detail: "position is already occupied".to_string(),
                    });
                }
                let limit = colony_limit(agent);
                if agent.planets.len().saturating_sub(1) >= limit {
                    return Err(GameError::ColonyLimit { limit });
                }
            }
            Mission::Recycle => {
                if !ships.contains_key(&ShipId::Recycler) {
                    return Err(GameError::RequirementsNotMet {
                        detail: "recycling requires recyclers".to_string(),
                    });
                }
                let has_debris = self
                    .universe
                    .get_debris(to)
                    .map(|field| !field.is_empty())
                    .unwrap_or(false);
                if !has_debris {
                    return Err(GameError::NoDebris);
                }
            }
            Mission::Espionage => {
                if !ships.contains_key(&ShipId::EspionageProbe) {
                    return Err(GameError::RequirementsNotMet {
                        detail: "espionage requires probes".to_string(),
                    });
                }
                let own = destination
                    .as_ref()
                    .map(|planet| planet.owner.as_deref() == Some(agent.id.as_str()))
                    .unwrap_or(false);
                if own {
                    return Err(GameError::InvalidArgument {
                        detail: "cannot spy on your own planet".to_string(),
                    });
                }
                if destination.is_none() {
                    return Err(GameError::PlanetNotFound { id: to.to_string() });
                }
            }
        }
        Ok(())
    }

    /// Recall: before the midpoint the fleet turns around immediately and
    /// half the unspent fuel fraction comes back; after it, the fleet
    /// finishes its leg and returns from there.
    pub async fn recall_fleet(&self, agent_id: &str, fleet_id: Uuid) -> Result<Fleet, GameError> {
        let fleet = self.universe.get_fleet(fleet_id)?;
        if fleet.owner != agent_id {
            return Err(GameError::FleetNotFound {
                id: fleet_id.to_string(),
            });
        }
        if fleet.returning {
            return Err(GameError::InvalidArgument {
                detail: "fleet is already returning".to_string(),
            });
        }
        let _guard = self.locks.acquire(fleet.origin).await?;
        let now = Utc::now();
        let mut fleet = self.universe.get_fleet(fleet_id)?;
        let total_secs = (fleet.arrives_at - fleet.departed_at).num_seconds();
        let progress = job_progress(fleet.departed_at, total_secs, now);
        if progress < 0.5 {
            let elapsed = now - fleet.departed_at;
            fleet.returning = true;
            fleet.recalled_at = Some(now);
            fleet.arrives_at = now + elapsed;
            let refund = (fleet.fuel_consumed * (1.0 - progress) * CANCEL_REFUND).floor();
            fleet.fuel_consumed -= refund;
            self.mutate_planet(fleet.origin, |planet| {
                planet.resources.deuterium =
                    crate::util::saturating_add(planet.resources.deuterium, refund);
                Ok(())
            })?;
        } else {
            fleet.recalled_at = Some(now);
        }
        self.universe.fleets.insert(fleet.id, fleet.clone());
        self.emit(Event::FleetRecalled {
            fleet_id,
            owner: agent_id.to_string(),
        });
        Ok(fleet)
    }

    /// Rename a star system the agent is present in.
    pub async fn name_system(
        &self,
        agent_id: &str,
        system: SystemId,
        name: &str,
    ) -> Result<String, GameError> {
        let name = name.trim();
        if name.len() < 3 || name.len() > 32 {
            return Err(GameError::InvalidArgument {
                detail: "system name must be 3-32 characters".to_string(),
            });
        }
        let agent = self.universe.get_agent(agent_id)?;
        let present = agent
            .planets
            .iter()
            .any(|planet| planet.system_id() == system);
        if !present {
            return Err(GameError::RequirementsNotMet {
                detail: "no presence in that system".to_string(),
            });
        }
        if self.universe.name_taken(name) {
            return Err(GameError::RequirementsNotMet {
                detail: "name already in use".to_string(),
            });
        }
        self.universe.set_system_name(system, name.to_string(), agent_id);
        self.emit(Event::SystemNamed {
            system,
            name: name.to_string(),
        });
        Ok(name.to_string())
    }

    /// Pure what-if battle. Reads current state, mutates nothing.
    pub fn simulate_combat(
        &self,
        agent_id: &str,
        defender_planet: PlanetId,
        ships: BTreeMap<ShipId, u32>,
        trials: u32,
        seed: u64,
    ) -> Result<combat::SimulationSummary, GameError> {
        let agent = self.universe.get_agent(agent_id)?;
        let planet = self.universe.get_planet(defender_planet)?;
        let defender_tech = planet
            .owner
            .as_deref()
            .and_then(|id| self.universe.get_agent(id).ok())
            .map(|defender| combat::TechLevels::of(&defender))
            .unwrap_or_default();
        Ok(combat::simulate(
            &ships,
            combat::TechLevels::of(&agent),
            &planet.ships,
            &planet.defenses,
            defender_tech,
            trials.clamp(1, 100),
            seed,
        ))
    }

    /// Execute up to ten actions against one planet under a single lock
    /// window, stopping at the first error.
    pub async fn queue_actions(
        &self,
        agent_id: &str,
        planet_id: PlanetId,
        actions: Vec<QueuedAction>,
    ) -> Result<Vec<ActionOutcome>, GameError> {
        if actions.len() > 10 {
            return Err(GameError::InvalidArgument {
                detail: "at most 10 actions per batch".to_string(),
            });
        }
        let _guard = self.locks.acquire(planet_id).await?;
        let now = Utc::now();
        let mut outcomes = Vec::with_capacity(actions.len());
        let mut failed = false;
        for (index, action) in actions.into_iter().enumerate() {
            if failed {
                outcomes.push(ActionOutcome {
                    index,
                    status: ActionStatus::NotExecuted,
                    error: None,
                });
                continue;
            }
            let outcome = self.run_queued_action(agent_id, planet_id, &action, now);
            let outcome = match outcome {
                Ok(status) => ActionOutcome {
                    index,
                    status,
                    error: None,
                },
                Err(err) => {
                    failed = true;
                    ActionOutcome {
                        index,
                        status: ActionStatus::Error,
                        error: Some(err),
                    }
                }
            };
            let _ = self.mutate_agent(agent_id, |agent| {
                agent.push_decision(crate::models::DecisionEntry {
                    at: now,
                    planet: planet_id,
                    action: action.describe(),
                    status: outcome.status.to_string(),
                });
                Ok(())
            });
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn run_queued_action(
        &self,
        agent_id: &str,
        planet_id: PlanetId,
        action: &QueuedAction,
        now: DateTime<Utc>,
    ) -> Result<ActionStatus, GameError> {
        match action {
            QueuedAction::Build {
                building,
                target_level,
            } => {
                if let Some(target) = target_level {
                    let planet = self.universe.get_planet(planet_id)?;
                    if planet.pending_level(*building) >= *target {
                        return Ok(ActionStatus::Skipped);
                    }
                }
                self.build_inner(agent_id, planet_id, *building, now)?;
                Ok(ActionStatus::Success)
            }
            QueuedAction::Research { tech, target_level } => {
                if let Some(target) = target_level {
                    let agent = self.universe.get_agent(agent_id)?;
                    if agent.tech_level(*tech) >= *target {
                        return Ok(ActionStatus::Skipped);
                    }
                }
                self.research_inner(agent_id, planet_id, *tech, now)?;
                Ok(ActionStatus::Success)
            }
            QueuedAction::BuildShip { ship, count } => {
                self.shipyard_inner(agent_id, planet_id, ShipyardItem::Ship(*ship), *count, now)?;
                Ok(ActionStatus::Success)
            }
            QueuedAction::BuildDefense { defense, count } => {
                self.shipyard_inner(
                    agent_id,
                    planet_id,
                    ShipyardItem::Defense(*defense),
                    *count,
                    now,
                )?;
                Ok(ActionStatus::Success)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum QueuedAction {
    Build {
        building: BuildingId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_level: Option<u32>,
    },
    Research {
        tech: TechId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_level: Option<u32>,
    },
    BuildShip {
        ship: ShipId,
        count: u32,
    },
    BuildDefense {
        defense: DefenseId,
        count: u32,
    },
}

impl QueuedAction {
    fn describe(&self) -> String {
        match self {
            QueuedAction::Build { building, .. } => format!("build {}", building),
            QueuedAction::Research { tech, .. } => format!("research {}", tech),
            QueuedAction::BuildShip { ship, count } => format!("buildShip {} x{}", ship, count),
            QueuedAction::BuildDefense { defense, count } => {
                format!("buildDefense {} x{}", defense, count)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Skipped,
    Error,
    NotExecuted,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub index: usize,
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<GameError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{register, test_engine};
    use crate::engine::EngineRx;
    use crate::universe::new_planet;
    use maplit::btreemap;
    use std::sync::Arc;

    fn give_planet(engine: &Engine, agent_id: &str, id: PlanetId) {
        let mut planet = new_planet(id, Some(agent_id.to_string()), 40);
        planet.resources = Resources::new(500.0, 300.0, 100.0);
        engine.universe.planets.insert(id, planet);
        engine
            .mutate_agent(agent_id, |agent| {
                agent.planets.push(id);
                Ok(())
            })
            .unwrap();
    }

    fn set_resources(engine: &Engine, id: PlanetId, resources: Resources) {
        engine
            .mutate_planet(id, |planet| {
                planet.resources = resources;
                Ok(())
            })
            .unwrap();
    }

    fn add_ships(engine: &Engine, id: PlanetId, ship: ShipId, count: u32) {
        engine
            .mutate_planet(id, |planet| {
                planet.add_ships(ship, count);
                Ok(())
            })
            .unwrap();
    }

    /// Level the planet's buildings so production noise cannot drift the
    /// exact resource assertions below.
    fn strip_buildings(engine: &Engine, id: PlanetId) {
        engine
            .mutate_planet(id, |planet| {
                planet.buildings.clear();
                Ok(())
            })
            .unwrap();
    }

    /// An unoccupied position in the same system as `near`.
    fn empty_position_in_system(engine: &Engine, near: PlanetId) -> PlanetId {
        (1..=CONFIG.positions_per_system)
            .map(|position| PlanetId::new(near.galaxy, near.system, position))
            .find(|candidate| !engine.universe.planets.contains_key(candidate))
            .expect("system is full")
    }

    fn setup() -> (Arc<Engine>, EngineRx) {
        test_engine(1)
    }

    #[tokio::test]
    async fn test_metal_mine_upgrade_cycle() {
        let (engine, _rx) = setup();
        let agent = register(&engine, "0xbuilder");
        let home = agent.planets[0];

        let job = engine
            .build("0xbuilder", home, BuildingId::MetalMine)
            .await
            .unwrap();
        assert_eq!(job.target_level, 2);
        assert_eq!(job.cost, Resources::new(90.0, 22.0, 0.0));

        let planet = engine.universe.get_planet(home).unwrap();
        assert_eq!(planet.resources.metal, 410.0);
        assert_eq!(planet.resources.crystal, 278.0);
        assert_eq!(planet.build_queue.len(), 1);

        // Not done one second before completion.
        engine
            .run_tick(job.completes_at - Duration::seconds(1))
            .await;
        let planet = engine.universe.get_planet(home).unwrap();
        assert_eq!(planet.building_level(BuildingId::MetalMine), 1);

        engine.run_tick(job.completes_at).await;
        let planet = engine.universe.get_planet(home).unwrap();
        assert_eq!(planet.building_level(BuildingId::MetalMine), 2);
        assert!(planet.build_queue.is_empty());
        // The spent cost lands on the owner's score.
        let agent = engine.universe.get_agent("0xbuilder").unwrap();
        assert_eq!(agent.score, 112.0);
    }

    #[tokio::test]
    async fn test_cancel_build_refund_law() {
        let (engine, _rx) = setup();
        let agent = register(&engine, "0xcancel");
        let home = agent.planets[0];

        let job = engine
            .build("0xcancel", home, BuildingId::MetalMine)
            .await
            .unwrap();
        let before = engine.universe.get_planet(home).unwrap().resources;
        // Cancelled within the same second: progress 0, refund half, floored.
        let refund = engine.cancel_build("0xcancel", home).await.unwrap();
        assert_eq!(refund, Resources::new(45.0, 11.0, 0.0));
        let after = engine.universe.get_planet(home).unwrap();
        assert_eq!(after.resources.metal, before.metal + 45.0);
        assert_eq!(after.resources.crystal, before.crystal + 11.0);
        assert!(after.build_queue.is_empty());
        let _ = job;
    }

    #[tokio::test]
    async fn test_build_queue_limit_without_overseer() {
        let (engine, _rx) = setup();
        let agent = register(&engine, "0xqueue");
        let home = agent.planets[0];
        set_resources(&engine, home, Resources::new(50000.0, 50000.0, 0.0));

        engine.build("0xqueue", home, BuildingId::MetalMine).await.unwrap();
        let err = engine
            .build("0xqueue", home, BuildingId::CrystalMine)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::QueueFull { limit: 1 }));
    }

    #[tokio::test]
    async fn test_transport_round_trip() {
        let (engine, _rx) = setup();
        let agent = register(&engine, "0xhauler");
        let home = agent.planets[0];
        let depot = empty_position_in_system(&engine, home);
        give_planet(&engine, "0xhauler", depot);

        strip_buildings(&engine, home);
        set_resources(&engine, home, Resources::new(1000.0, 500.0, 300.0));
        add_ships(&engine, home, ShipId::SmallCargo, 5);

        let cargo = Resources::new(100.0, 50.0, 0.0);
        let fleet = engine
            .send_fleet(
                "0xhauler",
                home,
                depot,
                btreemap! { ShipId::SmallCargo => 5 },
                Mission::Transport,
                cargo,
            )
            .await
            .unwrap();
        let fuel = fleet.fuel_consumed;
        assert!(fuel >= 5.0);

        let origin = engine.universe.get_planet(home).unwrap();
        assert_eq!(origin.ship_count(ShipId::SmallCargo), 0);
        assert_eq!(origin.resources.metal, 900.0);
        assert_eq!(origin.resources.crystal, 450.0);
        assert_eq!(origin.resources.deuterium, 300.0 - fuel);

        // Outbound arrival: cargo lands at the depot, fleet turns around.
        engine.run_tick(fleet.arrives_at).await;
        let depot_planet = engine.universe.get_planet(depot).unwrap();
        assert_eq!(depot_planet.resources.metal, 600.0);
        assert_eq!(depot_planet.resources.crystal, 350.0);
        let fleet = engine.universe.get_fleet(fleet.id).unwrap();
        assert!(fleet.returning);
        assert_eq!(fleet.cargo, Resources::default());

        // Return leg: ships are home, resources are pre-dispatch minus cargo
        // and fuel.
        engine.run_tick(fleet.arrives_at).await;
        assert!(engine.universe.get_fleet(fleet.id).is_err());
        let origin = engine.universe.get_planet(home).unwrap();
        assert_eq!(origin.ship_count(ShipId::SmallCargo), 5);
        assert_eq!(origin.resources.metal, 900.0);
        assert_eq!(origin.resources.deuterium, 300.0 - fuel);
    }

    #[tokio::test]
    async fn test_transport_requires_owned_destination() {
        let (engine, _rx) = setup();
        let sender = register(&engine, "0xsender");
        let other = register(&engine, "0xother");
        let home = sender.planets[0];
        add_ships(&engine, home, ShipId::SmallCargo, 1);
        set_resources(&engine, home, Resources::new(1000.0, 500.0, 5000.0));

        let err = engine
            .send_fleet(
                "0xsender",
                home,
                other.planets[0],
                btreemap! { ShipId::SmallCargo => 1 },
                Mission::Transport,
                Resources::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::NotOwner { .. }));
    }

    #[tokio::test]
    async fn test_attack_loot_clamp() {
        let (engine, _rx) = setup();
        let attacker = register(&engine, "0xraider");
        let defender = register(&engine, "0xvictim");
        let origin = attacker.planets[0];
        let target = defender.planets[0];

        engine
            .mutate_agent("0xvictim", |agent| {
                agent.score = 50000.0;
                agent.created_at = Utc::now() - Duration::hours(100);
                Ok(())
            })
            .unwrap();
        strip_buildings(&engine, origin);
        strip_buildings(&engine, target);
        set_resources(&engine, target, Resources::new(10000.0, 10000.0, 10000.0));
        set_resources(&engine, origin, Resources::new(0.0, 0.0, 10000.0));
        // Four large cargos: 100k capacity, no defense in the way.
        add_ships(&engine, origin, ShipId::LargeCargo, 4);

        let fleet = engine
            .send_fleet(
                "0xraider",
                origin,
                target,
                btreemap! { ShipId::LargeCargo => 4 },
                Mission::Attack,
                Resources::default(),
            )
            .await
            .unwrap();

        engine.run_tick(fleet.arrives_at).await;
        // Loot is the 50% cap, not capacity-bound.
        let target_planet = engine.universe.get_planet(target).unwrap();
        assert_eq!(
            target_planet.resources,
            Resources::new(5000.0, 5000.0, 5000.0)
        );
        let fleet = engine.universe.get_fleet(fleet.id).unwrap();
        assert!(fleet.returning);
        assert_eq!(fleet.cargo, Resources::new(5000.0, 5000.0, 5000.0));
        assert_eq!(fleet.ship_count(ShipId::LargeCargo), 4);

        // Spoils unload at home on the return leg.
        engine.run_tick(fleet.arrives_at).await;
        let origin_planet = engine.universe.get_planet(origin).unwrap();
        assert_eq!(origin_planet.resources.metal, 5000.0);
        assert_eq!(origin_planet.resources.crystal, 5000.0);
    }

    #[tokio::test]
    async fn test_colonize_limit_revalidated_at_arrival() {
        let (engine, _rx) = setup();
        let agent = register(&engine, "0xsettler");
        let home = agent.planets[0];
        set_resources(&engine, home, Resources::new(0.0, 0.0, 500000.0));
        add_ships(&engine, home, ShipId::ColonyShip, 2);

        // First mission stays in-system (10s hop), second crosses a galaxy
        // boundary and lands later.
        let near = empty_position_in_system(&engine, home);
        let far_galaxy = home.galaxy % CONFIG.galaxies + 1;
        let far = PlanetId::new(far_galaxy, home.system, home.position);

        let first = engine
            .send_fleet(
                "0xsettler",
                home,
                near,
                btreemap! { ShipId::ColonyShip => 1 },
                Mission::Colonize,
                Resources::default(),
            )
            .await
            .unwrap();
        let second = engine
            .send_fleet(
                "0xsettler",
                home,
                far,
                btreemap! { ShipId::ColonyShip => 1 },
                Mission::Colonize,
                Resources::default(),
            )
            .await
            .unwrap();
        assert!(first.arrives_at < second.arrives_at);

        engine.run_tick(first.arrives_at).await;
        let colony = engine.universe.get_planet(near).unwrap();
        assert_eq!(colony.owner.as_deref(), Some("0xsettler"));
        assert_eq!(colony.resources, Resources::new(500.0, 300.0, 100.0));
        let agent = engine.universe.get_agent("0xsettler").unwrap();
        assert_eq!(agent.planets.len(), 2);

        // Second arrival: the limit is re-checked and the fleet turns
        // around, colony ship intact.
        engine.run_tick(second.arrives_at).await;
        assert!(engine.universe.get_planet(far).is_err());
        let fleet = engine.universe.get_fleet(second.id).unwrap();
        assert!(fleet.returning);
        assert_eq!(fleet.ship_count(ShipId::ColonyShip), 1);
    }

    #[tokio::test]
    async fn test_storage_cap_suppresses_production_but_loot_overflows() {
        let (engine, _rx) = setup();
        let agent = register(&engine, "0xhoarder");
        let home = agent.planets[0];
        engine
            .mutate_planet(home, |planet| {
                planet.buildings.insert(BuildingId::MetalMine, 10);
                planet.buildings.insert(BuildingId::SolarPlant, 15);
                Ok(())
            })
            .unwrap();
        let caps = catalog::storage_caps(&engine.universe.get_planet(home).unwrap());
        set_resources(&engine, home, Resources::new(caps.metal, 0.0, 0.0));

        let now = Utc::now();
        engine.run_tick(now).await;
        let planet = engine.universe.get_planet(home).unwrap();
        assert_eq!(planet.resources.metal, caps.metal);

        // Loot pushes past the cap; production stays suppressed.
        engine
            .mutate_planet(home, |planet| {
                planet.resources.metal += 5000.0;
                Ok(())
            })
            .unwrap();
        engine.run_tick(now + Duration::seconds(1)).await;
        let planet = engine.universe.get_planet(home).unwrap();
        assert_eq!(planet.resources.metal, caps.metal + 5000.0);
    }

    #[tokio::test]
    async fn test_newbie_protection_shields() {
        let (engine, _rx) = setup();
        let attacker = register(&engine, "0xbully");
        let defender = register(&engine, "0xnewbie");
        let origin = attacker.planets[0];
        let target = defender.planets[0];
        engine
            .mutate_agent("0xbully", |agent| {
                agent.score = 50000.0;
                Ok(())
            })
            .unwrap();
        set_resources(&engine, origin, Resources::new(0.0, 0.0, 50000.0));
        add_ships(&engine, origin, ShipId::LightFighter, 10);
        let ships = btreemap! { ShipId::LightFighter => 10 };

        // Score shield: the defender hasn't built up yet.
        engine
            .mutate_agent("0xnewbie", |agent| {
                agent.score = 800.0;
                Ok(())
            })
            .unwrap();
        let err = engine
            .send_fleet("0xbully", origin, target, ships.clone(), Mission::Attack, Resources::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::ScoreShield { defender_score } if defender_score == 800.0));

        // Time shield: enough score, too young an account.
        engine
            .mutate_agent("0xnewbie", |agent| {
                agent.score = 20000.0;
                agent.created_at = Utc::now() - Duration::hours(10);
                Ok(())
            })
            .unwrap();
        let err = engine
            .send_fleet("0xbully", origin, target, ships.clone(), Mission::Attack, Resources::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::TimeShield { hours_remaining: 38 }));

        // Ratio shield: attacker more than 10x the defender.
        engine
            .mutate_agent("0xnewbie", |agent| {
                agent.score = 4000.0;
                agent.created_at = Utc::now() - Duration::hours(100);
                Ok(())
            })
            .unwrap();
        let err = engine
            .send_fleet("0xbully", origin, target, ships.clone(), Mission::Attack, Resources::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::RatioShield { .. }));

        // An even match goes through.
        engine
            .mutate_agent("0xnewbie", |agent| {
                agent.score = 40000.0;
                Ok(())
            })
            .unwrap();
        engine
            .send_fleet("0xbully", origin, target, ships, Mission::Attack, Resources::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fleet_slots_exhausted() {
        let (engine, _rx) = setup();
        let agent = register(&engine, "0xadmiral");
        let home = agent.planets[0];
        let depot = empty_position_in_system(&engine, home);
        give_planet(&engine, "0xadmiral", depot);
        set_resources(&engine, home, Resources::new(1000.0, 500.0, 50000.0));
        add_ships(&engine, home, ShipId::SmallCargo, 10);
        let ships = || btreemap! { ShipId::SmallCargo => 1 };

        // Base limit: 2 + computerTech 0 + no admiral.
        engine
            .send_fleet("0xadmiral", home, depot, ships(), Mission::Transport, Resources::default())
            .await
            .unwrap();
        engine
            .send_fleet("0xadmiral", home, depot, ships(), Mission::Transport, Resources::default())
            .await
            .unwrap();
        let err = engine
            .send_fleet("0xadmiral", home, depot, ships(), Mission::Transport, Resources::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::FleetSlotsExhausted { limit: 2 }));

        // Computer tech widens the cap.
        engine
            .mutate_agent("0xadmiral", |agent| {
                agent.technologies.insert(TechId::ComputerTech, 1);
                Ok(())
            })
            .unwrap();
        engine
            .send_fleet("0xadmiral", home, depot, ships(), Mission::Transport, Resources::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_recall_pre_midpoint_refunds_fuel() {
        let (engine, _rx) = setup();
        let agent = register(&engine, "0xrecall");
        let home = agent.planets[0];
        let depot = empty_position_in_system(&engine, home);
        give_planet(&engine, "0xrecall", depot);
        strip_buildings(&engine, home);
        set_resources(&engine, home, Resources::new(1000.0, 500.0, 300.0));
        add_ships(&engine, home, ShipId::SmallCargo, 2);

        let fleet = engine
            .send_fleet(
                "0xrecall",
                home,
                depot,
                btreemap! { ShipId::SmallCargo => 2 },
                Mission::Transport,
                Resources::default(),
            )
            .await
            .unwrap();
        let fuel = fleet.fuel_consumed;
        let after_dispatch = engine.universe.get_planet(home).unwrap().resources.deuterium;

        // Recalled at progress 0: half the fuel comes back.
        let recalled = engine.recall_fleet("0xrecall", fleet.id).await.unwrap();
        assert!(recalled.returning);
        let refund = (fuel * 0.5).floor();
        let origin = engine.universe.get_planet(home).unwrap();
        assert_eq!(origin.resources.deuterium, after_dispatch + refund);

        // And it comes home with its ships.
        engine.run_tick(recalled.arrives_at).await;
        let origin = engine.universe.get_planet(home).unwrap();
        assert_eq!(origin.ship_count(ShipId::SmallCargo), 2);
        assert!(engine.universe.get_fleet(fleet.id).is_err());
    }

    #[tokio::test]
    async fn test_queue_actions_statuses() {
        let (engine, _rx) = setup();
        let agent = register(&engine, "0xbatch");
        let home = agent.planets[0];

        let outcomes = engine
            .queue_actions(
                "0xbatch",
                home,
                vec![
                    QueuedAction::Build {
                        building: BuildingId::MetalMine,
                        target_level: Some(2),
                    },
                    // Already pending at level 2 from the action above.
                    QueuedAction::Build {
                        building: BuildingId::MetalMine,
                        target_level: Some(2),
                    },
                    // Queue slot is taken: stops the batch here.
                    QueuedAction::Build {
                        building: BuildingId::CrystalMine,
                        target_level: None,
                    },
                    QueuedAction::BuildShip {
                        ship: ShipId::LightFighter,
                        count: 1,
                    },
                ],
            )
            .await
            .unwrap();

        let statuses: Vec<ActionStatus> = outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                ActionStatus::Success,
                ActionStatus::Skipped,
                ActionStatus::Error,
                ActionStatus::NotExecuted,
            ]
        );
        assert!(matches!(
            outcomes[2].error,
            Some(GameError::QueueFull { .. })
        ));

        // The batch landed in the decision log, newest first.
        let agent = engine.universe.get_agent("0xbatch").unwrap();
        assert_eq!(agent.decisions.len(), 4);
        assert_eq!(agent.decisions[0].status, "not_executed");
        assert_eq!(agent.decisions[3].status, "success");
    }

    #[tokio::test]
    async fn test_shield_dome_cap() {
        let (engine, _rx) = setup();
        let agent = register(&engine, "0xdome");
        let home = agent.planets[0];
        engine
            .mutate_planet(home, |planet| {
                planet.buildings.insert(BuildingId::Shipyard, 1);
                Ok(())
            })
            .unwrap();
        engine
            .mutate_agent("0xdome", |agent| {
                agent.technologies.insert(TechId::ShieldingTech, 2);
                Ok(())
            })
            .unwrap();
        set_resources(&engine, home, Resources::new(100000.0, 100000.0, 0.0));

        let err = engine
            .build_defense("0xdome", home, DefenseId::SmallShieldDome, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::DefenseCapped { cap: 1 }));
        engine
            .build_defense("0xdome", home, DefenseId::SmallShieldDome, 1)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_shipyard_single_job() {
        let (engine, _rx) = setup();
        let agent = register(&engine, "0xyard");
        let home = agent.planets[0];
        engine
            .mutate_planet(home, |planet| {
                planet.buildings.insert(BuildingId::Shipyard, 2);
                Ok(())
            })
            .unwrap();
        engine
            .mutate_agent("0xyard", |agent| {
                agent.technologies.insert(TechId::CombustionDrive, 1);
                Ok(())
            })
            .unwrap();
        set_resources(&engine, home, Resources::new(100000.0, 100000.0, 0.0));

        let job = engine
            .build_ship("0xyard", home, ShipId::LightFighter, 3)
            .await
            .unwrap();
        let err = engine
            .build_ship("0xyard", home, ShipId::LightFighter, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::ShipyardBusy));

        engine.run_tick(job.completes_at).await;
        let planet = engine.universe.get_planet(home).unwrap();
        assert_eq!(planet.ship_count(ShipId::LightFighter), 3);
        assert!(planet.shipyard_queue.is_empty());
    }

    #[tokio::test]
    async fn test_espionage_report_levels_and_return() {
        let (engine, _rx) = setup();
        let spy = register(&engine, "0xspy");
        let mark = register(&engine, "0xmark");
        let origin = spy.planets[0];
        let target = mark.planets[0];
        set_resources(&engine, origin, Resources::new(0.0, 0.0, 1000.0));
        add_ships(&engine, origin, ShipId::EspionageProbe, 2);

        let fleet = engine
            .send_fleet(
                "0xspy",
                origin,
                target,
                btreemap! { ShipId::EspionageProbe => 2 },
                Mission::Espionage,
                Resources::default(),
            )
            .await
            .unwrap();
        engine.run_tick(fleet.arrives_at).await;

        let spy_agent = engine.universe.get_agent("0xspy").unwrap();
        let report = spy_agent.spy_reports.front().expect("report missing");
        // 2 + floor(2/2) + 0 tech delta = level 3.
        assert_eq!(report.info_level, 3);
        assert!(report.fleet.is_some());
        assert!(report.defenses.is_some());
        assert!(report.buildings.is_none());
        assert_eq!(report.probes_lost, 0);

        // No counter-espionage probes: everything comes home.
        let fleet = engine.universe.get_fleet(fleet.id).unwrap();
        assert!(fleet.returning);
        assert_eq!(fleet.ship_count(ShipId::EspionageProbe), 2);
    }

    #[tokio::test]
    async fn test_research_lifecycle() {
        let (engine, _rx) = setup();
        let agent = register(&engine, "0xlab");
        let home = agent.planets[0];
        engine
            .mutate_planet(home, |planet| {
                planet.buildings.insert(BuildingId::ResearchLab, 1);
                Ok(())
            })
            .unwrap();
        set_resources(&engine, home, Resources::new(10000.0, 10000.0, 10000.0));

        // One running job per agent.
        let job = engine
            .research("0xlab", home, TechId::EnergyTech)
            .await
            .unwrap();
        let err = engine
            .research("0xlab", home, TechId::ComputerTech)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::ResearchInProgress));

        engine.run_tick(job.completes_at).await;
        let agent = engine.universe.get_agent("0xlab").unwrap();
        assert_eq!(agent.tech_level(TechId::EnergyTech), 1);
        assert!(agent.research_queue.is_empty());

        // Prerequisites gate deeper techs.
        let err = engine
            .research("0xlab", home, TechId::LaserTech)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::RequirementsNotMet { .. }));
    }

    #[tokio::test]
    async fn test_name_system() {
        let (engine, _rx) = setup();
        let agent = register(&engine, "0xnamer");
        let system = agent.planets[0].system_id();

        let err = engine
            .name_system("0xnamer", SystemId::new(4, 77), "Elsewhere Reach")
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::RequirementsNotMet { .. }));

        engine
            .name_system("0xnamer", system, "Butcher's Nebula")
            .await
            .unwrap();
        assert_eq!(
            engine.universe.system_name(system).as_deref(),
            Some("Butcher's Nebula")
        );
        // Names are unique universe-wide.
        let other = register(&engine, "0xother");
        let err = engine
            .name_system("0xother", other.planets[0].system_id(), "Butcher's Nebula")
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::RequirementsNotMet { .. }));
    }

    #[tokio::test]
    async fn test_simulate_combat_is_pure_and_deterministic() {
        let (engine, _rx) = setup();
        let attacker = register(&engine, "0xsim");
        let defender = register(&engine, "0xtarget");
        let target = defender.planets[0];
        engine
            .mutate_planet(target, |planet| {
                planet.add_defenses(DefenseId::RocketLauncher, 20);
                Ok(())
            })
            .unwrap();
        let before = engine.universe.get_planet(target).unwrap();

        let ships = btreemap! { ShipId::Cruiser => 10 };
        let first = engine
            .simulate_combat("0xsim", target, ships.clone(), 10, 99)
            .unwrap();
        let second = engine
            .simulate_combat("0xsim", target, ships, 10, 99)
            .unwrap();
        assert_eq!(first.attacker_wins, second.attacker_wins);
        assert_eq!(first.mean_defender_survivors, second.mean_defender_survivors);

        // No state was touched.
        let after = engine.universe.get_planet(target).unwrap();
        assert_eq!(before.defense_count(DefenseId::RocketLauncher), after.defense_count(DefenseId::RocketLauncher));
        assert!(engine.universe.fleets.is_empty());
        let _ = attacker;
    }
}
