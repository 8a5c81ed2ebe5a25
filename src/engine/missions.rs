//! Fleet arrival handlers. Each runs under the lock(s) of the planets it
//! mutates: the destination on the outbound leg, the origin on the return
//! leg, always acquired in origin-before-destination order when both are
//! needed.

use crate::catalog::{self, ShipId};
use crate::engine::{combat, Engine, Event, Record};
use crate::errors::GameError;
use crate::models::{
    BattleReport, BattleWinner, DebrisField, EspionageReport, Fleet, FleetReport,
    FleetReportKind, Mission, Resources,
};
use crate::universe::{new_planet, position_temperature};
use crate::util;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

pub async fn process_arrival(
    engine: &Engine,
    fleet_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), GameError> {
    let fleet = match engine.universe.get_fleet(fleet_id) {
        Ok(fleet) => fleet,
        // Already resolved by an earlier handler this pass.
        Err(_) => return Ok(()),
    };
    if fleet.arrives_at > now {
        return Ok(());
    }
    if fleet.returning {
        return handle_return(engine, fleet, now).await;
    }
    match fleet.mission {
        Mission::Transport => handle_transport(engine, fleet, now).await,
        Mission::Deploy => handle_deploy(engine, fleet, now).await,
        Mission::Attack => handle_attack(engine, fleet, now).await,
        Mission::Recycle => handle_recycle(engine, fleet, now).await,
        Mission::Espionage => handle_espionage(engine, fleet, now).await,
        Mission::Colonize => handle_colonize(engine, fleet, now).await,
    }
}

/// Flip an outbound fleet onto its return leg in place.
fn start_return(engine: &Engine, fleet: &mut Fleet, now: DateTime<Utc>) {
    let distance = catalog::travel_distance(fleet.destination, fleet.origin);
    let secs = catalog::travel_time(distance, crate::config::CONFIG.game_speed);
    fleet.returning = true;
    fleet.departed_at = now;
    fleet.arrives_at = now + Duration::seconds(secs);
    engine.universe.fleets.insert(fleet.id, fleet.clone());
    engine.emit(Event::FleetReturning {
        fleet_id: fleet.id,
        owner: fleet.owner.clone(),
        arrives_at: fleet.arrives_at,
    });
}

fn fleet_report(fleet: &Fleet, kind: FleetReportKind, now: DateTime<Utc>) -> FleetReport {
    FleetReport {
        id: Uuid::new_v4(),
        at: now,
        agent_id: fleet.owner.clone(),
        fleet_id: fleet.id,
        kind,
        mission: fleet.mission,
        origin: fleet.origin,
        destination: fleet.destination,
        ships: fleet.ships.clone(),
        cargo: fleet.cargo,
    }
}

/// Return leg: merge ships and cargo back into the origin planet, then
/// retire the fleet.
async fn handle_return(engine: &Engine, fleet: Fleet, now: DateTime<Utc>) -> Result<(), GameError> {
    let _guard = engine.locks.acquire(fleet.origin).await?;
    let merged = engine.mutate_planet(fleet.origin, |planet| {
        if planet.owner.as_deref() != Some(fleet.owner.as_str()) {
            return Ok(false);
        }
        for (ship, count) in &fleet.ships {
            planet.add_ships(*ship, *count);
        }
        planet.resources.metal = util::saturating_add(planet.resources.metal, fleet.cargo.metal);
        planet.resources.crystal =
            util::saturating_add(planet.resources.crystal, fleet.cargo.crystal);
        planet.resources.deuterium =
            util::saturating_add(planet.resources.deuterium, fleet.cargo.deuterium);
        Ok(true)
    });
    match merged {
        Ok(true) => {}
        Ok(false) | Err(GameError::PlanetNotFound { .. }) => {
            // Origin was lost while the fleet was out; ships scatter.
            warn!("fleet {} returned to a foreign origin {}", fleet.id, fleet.origin);
        }
        Err(err) => return Err(err),
    }
    engine.universe.fleets.remove(&fleet.id);
    engine.record(Record::Fleet(fleet_report(&fleet, FleetReportKind::Returned, now)));
    engine.emit(Event::FleetReturned {
        fleet_id: fleet.id,
        owner: fleet.owner.clone(),
        origin: fleet.origin,
    });
    Ok(())
}

/// Transport: unload at the destination, come home empty.
async fn handle_transport(
    engine: &Engine,
    mut fleet: Fleet,
    now: DateTime<Utc>,
) -> Result<(), GameError> {
    let _guard = engine.locks.acquire(fleet.destination).await?;
    engine.mutate_planet(fleet.destination, |planet| {
        planet.resources.metal = util::saturating_add(planet.resources.metal, fleet.cargo.metal);
        planet.resources.crystal =
            util::saturating_add(planet.resources.crystal, fleet.cargo.crystal);
        planet.resources.deuterium =
            util::saturating_add(planet.resources.deuterium, fleet.cargo.deuterium);
        Ok(())
    })?;
    engine.record(Record::Fleet(fleet_report(&fleet, FleetReportKind::Arrived, now)));
    engine.emit(Event::FleetArrived {
        fleet_id: fleet.id,
        owner: fleet.owner.clone(),
        mission: fleet.mission,
        destination: fleet.destination,
    });
    fleet.cargo = Resources::default();
    start_return(engine, &mut fleet, now);
    Ok(())
}

/// Deploy: hand the ships and cargo over if the destination is still ours,
/// otherwise turn around.
async fn handle_deploy(
    engine: &Engine,
    mut fleet: Fleet,
    now: DateTime<Utc>,
) -> Result<(), GameError> {
    let _guard = engine.locks.acquire(fleet.destination).await?;
    if fleet.recalled_at.is_some() {
        start_return(engine, &mut fleet, now);
        return Ok(());
    }
    let delivered = engine.mutate_planet(fleet.destination, |planet| {
        if planet.owner.as_deref() != Some(fleet.owner.as_str()) {
            return Ok(false);
        }
        for (ship, count) in &fleet.ships {
            planet.add_ships(*ship, *count);
        }
        planet.resources.metal = util::saturating_add(planet.resources.metal, fleet.cargo.metal);
        planet.resources.crystal =
            util::saturating_add(planet.resources.crystal, fleet.cargo.crystal);
        planet.resources.deuterium =
            util::saturating_add(planet.resources.deuterium, fleet.cargo.deuterium);
        Ok(true)
    })?;
    if delivered {
        engine.universe.fleets.remove(&fleet.id);
        engine.record(Record::Fleet(fleet_report(&fleet, FleetReportKind::Deployed, now)));
        engine.emit(Event::FleetDeployed {
            fleet_id: fleet.id,
            owner: fleet.owner.clone(),
            destination: fleet.destination,
        });
    } else {
        start_return(engine, &mut fleet, now);
    }
    Ok(())
}

/// The 50% loot cap, bounded by what the survivors can carry: proportional
/// split, remainders filled in resource order.
fn compute_loot(defender: Resources, capacity: f64) -> Resources {
    let want = defender.scale(0.5).floor();
    let total = want.total();
    if total <= capacity {
        return want;
    }
    let scale = capacity / total;
    let mut loot = want.scale(scale).floor();
    let mut remainder = capacity.floor() - loot.total();
    for pick in [0, 1, 2] {
        let (have, cap) = match pick {
            0 => (&mut loot.metal, want.metal),
            1 => (&mut loot.crystal, want.crystal),
            _ => (&mut loot.deuterium, want.deuterium),
        };
        let extra = remainder.min(cap - *have).max(0.0);
        *have += extra;
        remainder -= extra;
    }
    loot
}

async fn handle_attack(
    engine: &Engine,
    mut fleet: Fleet,
    now: DateTime<Utc>,
) -> Result<(), GameError> {
    // Combat touches the defender planet and re-anchors the fleet to its
    // origin; take both locks in canonical order.
    let _guards = engine
        .locks
        .acquire_pair(fleet.origin, fleet.destination)
        .await?;
    let planet = match engine.universe.get_planet(fleet.destination) {
        Ok(planet) => planet,
        Err(_) => {
            start_return(engine, &mut fleet, now);
            return Ok(());
        }
    };
    let defender_id = match planet.owner.clone() {
        Some(owner) if owner != fleet.owner => owner,
        _ => {
            start_return(engine, &mut fleet, now);
            return Ok(());
        }
    };

    let attacker = engine.universe.get_agent(&fleet.owner)?;
    let defender = engine.universe.get_agent(&defender_id)?;
    let outcome = engine.with_rng(|rng| {
        combat::resolve(
            &fleet.ships,
            combat::TechLevels::of(&attacker),
            &planet.ships,
            &planet.defenses,
            combat::TechLevels::of(&defender),
            rng,
        )
    });

    // 70% of each lost defense unit is rebuilt from the rubble.
    let rebuilt = engine.with_rng(|rng| {
        use rand::Rng as _;
        let mut rebuilt = std::collections::BTreeMap::new();
        for (defense, &lost) in &outcome.defense_losses {
            let mut back = 0;
            for _ in 0..lost {
                if rng.random_bool(0.70) {
                    back += 1;
                }
            }
            if back > 0 {
                rebuilt.insert(*defense, back);
            }
        }
        rebuilt
    });

    let mut loot = Resources::default();
    if outcome.winner == BattleWinner::Attacker {
        let capacity = catalog::fleet_cargo_capacity(&outcome.attacker_survivors);
        loot = compute_loot(planet.resources, capacity);
    }

    engine.mutate_planet(fleet.destination, |planet| {
        planet.ships = outcome.defender_survivors.clone();
        planet.defenses = outcome.defense_survivors.clone();
        for (defense, count) in &rebuilt {
            planet.add_defenses(*defense, *count);
        }
        planet.resources.metal = (planet.resources.metal - loot.metal).max(0.0);
        planet.resources.crystal = (planet.resources.crystal - loot.crystal).max(0.0);
        planet.resources.deuterium = (planet.resources.deuterium - loot.deuterium).max(0.0);
        Ok(())
    })?;

    let (debris_metal, debris_crystal) =
        combat::debris_from_losses(&outcome.attacker_losses, &outcome.defender_losses);
    if debris_metal > 0.0 || debris_crystal > 0.0 {
        let coords = fleet.destination;
        let mut entry = engine
            .universe
            .debris
            .entry(coords)
            .or_insert_with(|| DebrisField {
                coords,
                metal: 0.0,
                crystal: 0.0,
            });
        entry.metal += debris_metal;
        entry.crystal += debris_crystal;
        drop(entry);
        engine.emit(Event::DebrisCreated {
            coords,
            metal: debris_metal,
            crystal: debris_crystal,
        });
    }

    let report = BattleReport {
        id: Uuid::new_v4(),
        at: now,
        location: fleet.destination,
        attacker_id: fleet.owner.clone(),
        defender_id: defender_id.clone(),
        rounds: outcome.rounds,
        winner: outcome.winner,
        attacker_losses: outcome.attacker_losses.clone(),
        defender_losses: outcome.defender_losses.clone(),
        defender_defense_losses: outcome.defense_losses.clone(),
        defenses_rebuilt: rebuilt,
        loot,
        debris_metal,
        debris_crystal,
    };
    engine.record(Record::Battle(report.clone()));
    engine.emit(Event::BattleReport { report });

    if outcome.attacker_survivors.is_empty() {
        engine.universe.fleets.remove(&fleet.id);
        return Ok(());
    }
    fleet.ships = outcome.attacker_survivors;
    fleet.cargo = loot;
    start_return(engine, &mut fleet, now);
    Ok(())
}

/// Recycle: proportional pickup limited by the recyclers' cargo capacity.
async fn handle_recycle(
    engine: &Engine,
    mut fleet: Fleet,
    now: DateTime<Utc>,
) -> Result<(), GameError> {
    let _guard = engine.locks.acquire(fleet.destination).await?;
    let capacity = fleet.ship_count(ShipId::Recycler) as f64
        * catalog::SHIPS[&ShipId::Recycler].cargo;
    let collected = match engine.universe.debris.get_mut(&fleet.destination) {
        Some(mut field) => {
            let total = field.metal + field.crystal;
            let take = total.min(capacity);
            let (metal, crystal) = if total > 0.0 {
                (
                    (field.metal * take / total).floor(),
                    (field.crystal * take / total).floor(),
                )
            } else {
                (0.0, 0.0)
            };
            field.metal -= metal;
            field.crystal -= crystal;
            Some((metal, crystal))
        }
        None => None,
    };
    if let Some((metal, crystal)) = collected {
        if engine
            .universe
            .get_debris(fleet.destination)
            .map(|field| field.is_empty())
            .unwrap_or(false)
        {
            engine.universe.debris.remove(&fleet.destination);
        }
        fleet.cargo.metal += metal;
        fleet.cargo.crystal += crystal;
        engine.emit(Event::DebrisCollected {
            coords: fleet.destination,
            metal,
            crystal,
        });
    }
    engine.record(Record::Fleet(fleet_report(&fleet, FleetReportKind::Arrived, now)));
    start_return(engine, &mut fleet, now);
    Ok(())
}

async fn handle_espionage(
    engine: &Engine,
    mut fleet: Fleet,
    now: DateTime<Utc>,
) -> Result<(), GameError> {
    let _guard = engine.locks.acquire(fleet.destination).await?;
    let planet = match engine.universe.get_planet(fleet.destination) {
        Ok(planet) => planet,
        Err(_) => {
            start_return(engine, &mut fleet, now);
            return Ok(());
        }
    };
    let attacker = engine.universe.get_agent(&fleet.owner)?;
    let defender = planet
        .owner
        .as_deref()
        .and_then(|id| engine.universe.get_agent(id).ok());

    let probes = fleet.ship_count(ShipId::EspionageProbe);
    let attacker_esp = attacker.tech_level(catalog::TechId::EspionageTech) as i64;
    let defender_esp = defender
        .as_ref()
        .map(|d| d.tech_level(catalog::TechId::EspionageTech) as i64)
        .unwrap_or(0);
    let tech_delta = attacker_esp - defender_esp;
    let info_level = (2 + (probes as i64) / 2 + tech_delta).clamp(1, 5) as u32;

    let report = EspionageReport {
        id: Uuid::new_v4(),
        at: now,
        target: fleet.destination,
        target_owner: planet.owner.clone(),
        info_level,
        resources: planet.resources,
        fleet: (info_level >= 2).then(|| planet.ships.clone()),
        defenses: (info_level >= 3).then(|| planet.defenses.clone()),
        buildings: (info_level >= 4).then(|| planet.buildings.clone()),
        technologies: (info_level >= 5)
            .then(|| defender.as_ref().map(|d| d.technologies.clone()).unwrap_or_default()),
        probes_sent: probes,
        probes_lost: 0,
    };

    // Counter-espionage: each probe independently risks detection.
    let defender_probes = planet.ship_count(ShipId::EspionageProbe);
    let loss_chance = (defender_probes as f64 * 0.02 * probes as f64
        * 1.1f64.powi(-tech_delta as i32))
    .min(0.95);
    let lost = engine.with_rng(|rng| {
        use rand::Rng as _;
        (0..probes)
            .filter(|_| loss_chance > 0.0 && rng.random_bool(loss_chance))
            .count() as u32
    });

    let mut report = report;
    report.probes_lost = lost;
    engine.mutate_agent(&fleet.owner, |agent| {
        agent.push_spy_report(report.clone());
        Ok(())
    })?;

    let survivors = probes - lost;
    if survivors == 0 {
        engine.universe.fleets.remove(&fleet.id);
        info!("all probes lost spying on {}", fleet.destination);
        return Ok(());
    }
    fleet.ships.insert(ShipId::EspionageProbe, survivors);
    start_return(engine, &mut fleet, now);
    Ok(())
}

/// Colonize: revalidate at arrival; on failure the fleet turns around with
/// its colony ship intact.
async fn handle_colonize(
    engine: &Engine,
    mut fleet: Fleet,
    now: DateTime<Utc>,
) -> Result<(), GameError> {
    let _guard = engine.locks.acquire(fleet.destination).await?;
    if fleet.recalled_at.is_some() {
        start_return(engine, &mut fleet, now);
        return Ok(());
    }
    let occupied = engine
        .universe
        .planets
        .get(&fleet.destination)
        .map(|planet| planet.owner.is_some())
        .unwrap_or(false);
    let agent = engine.universe.get_agent(&fleet.owner)?;
    let limit = 1 + (agent.tech_level(catalog::TechId::Astrophysics) / 2) as usize;
    // Colonies are planets beyond the home world, same rule as dispatch.
    if occupied || agent.planets.len().saturating_sub(1) >= limit {
        start_return(engine, &mut fleet, now);
        return Ok(());
    }

    fleet.remove_one_colony_ship();
    let max_temperature =
        engine.with_rng(|rng| position_temperature(fleet.destination.position, rng));
    let mut colony = new_planet(
        fleet.destination,
        Some(fleet.owner.clone()),
        max_temperature,
    );
    colony.resources = Resources::new(500.0, 300.0, 100.0) + fleet.cargo;
    for (ship, count) in &fleet.ships {
        colony.add_ships(*ship, *count);
    }
    engine.universe.planets.insert(fleet.destination, colony);
    engine.mutate_agent(&fleet.owner, |agent| {
        agent.planets.push(fleet.destination);
        Ok(())
    })?;
    let name = engine.with_rng(|rng| {
        engine
            .universe
            .ensure_system_named(fleet.destination.system_id(), rng)
    });
    info!(
        "{} colonized {} in system {}",
        fleet.owner, fleet.destination, name
    );
    engine.universe.fleets.remove(&fleet.id);
    engine.record(Record::Fleet(fleet_report(&fleet, FleetReportKind::Deployed, now)));
    engine.emit(Event::PlanetColonized {
        planet: fleet.destination,
        agent: fleet.owner.clone(),
    });
    Ok(())
}

impl Fleet {
    fn remove_one_colony_ship(&mut self) {
        if let Some(count) = self.ships.get_mut(&ShipId::ColonyShip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.ships.remove(&ShipId::ColonyShip);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loot_respects_half_cap_when_capacity_is_ample() {
        let defender = Resources::new(10000.0, 10000.0, 10000.0);
        let loot = compute_loot(defender, 100000.0);
        assert_eq!(loot, Resources::new(5000.0, 5000.0, 5000.0));
    }

    #[test]
    fn test_loot_fills_capacity_proportionally() {
        let defender = Resources::new(30000.0, 15000.0, 15000.0);
        // want = 15000/7500/7500 = 30000 total, capacity 3000.
        let loot = compute_loot(defender, 3000.0);
        assert_eq!(loot.total(), 3000.0);
        assert_eq!(loot.metal, 1500.0);
        assert_eq!(loot.crystal, 750.0);
        assert_eq!(loot.deuterium, 750.0);
    }

    #[test]
    fn test_loot_remainder_fill() {
        let defender = Resources::new(101.0, 101.0, 101.0);
        // want = 50 each; capacity 100 -> proportional floor gives 33 each,
        // remainder 1 goes to metal.
        let loot = compute_loot(defender, 100.0);
        assert_eq!(loot.total(), 100.0);
        assert_eq!(loot.metal, 34.0);
        assert_eq!(loot.crystal, 33.0);
        assert_eq!(loot.deuterium, 33.0);
    }

    #[test]
    fn test_loot_zero_capacity() {
        let defender = Resources::new(10000.0, 10000.0, 10000.0);
        let loot = compute_loot(defender, 0.0);
        assert_eq!(loot.total(), 0.0);
    }
}
