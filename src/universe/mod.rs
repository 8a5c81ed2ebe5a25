pub mod names;

use crate::catalog::BuildingId;
use crate::config::CONFIG;
use crate::errors::GameError;
use crate::models::{
    Agent, DebrisField, Fleet, NameOrigin, Planet, PlanetId, Resources, StarSystem, SystemId,
};
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;
use uuid::Uuid;

/// In-memory authoritative state. Reads are lock-free; every mutation that
/// changes a planet, its owner agent's queues, or a fleet anchored to a
/// planet happens under that planet's lock (see `locks`).
pub struct Universe {
    pub agents: DashMap<String, Agent>,
    pub planets: DashMap<PlanetId, Planet>,
    pub fleets: DashMap<Uuid, Fleet>,
    pub debris: DashMap<PlanetId, DebrisField>,
    pub systems: DashMap<SystemId, StarSystem>,
    tick: AtomicU64,
    star_names: DashSet<String>,
    wallets_by_ip: DashMap<String, BTreeSet<String>>,
}

/// The atomic world image exchanged with the store at load and save.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniverseSnapshot {
    pub agents: Vec<Agent>,
    pub planets: Vec<Planet>,
    pub fleets: Vec<Fleet>,
    pub debris: Vec<DebrisField>,
    pub systems: Vec<StarSystem>,
    pub tick: u64,
    #[serde(default)]
    pub wallets_by_ip: BTreeMap<String, BTreeSet<String>>,
}

impl Universe {
    pub fn new() -> Self {
        Self::from_snapshot(UniverseSnapshot::default())
    }

    pub fn from_snapshot(snapshot: UniverseSnapshot) -> Self {
        let universe = Self {
            agents: DashMap::new(),
            planets: DashMap::new(),
            fleets: DashMap::new(),
            debris: DashMap::new(),
            systems: DashMap::new(),
            tick: AtomicU64::new(snapshot.tick),
            star_names: DashSet::new(),
            wallets_by_ip: DashMap::new(),
        };
        for agent in snapshot.agents {
            universe.agents.insert(agent.id.clone(), agent);
        }
        for planet in snapshot.planets {
            universe.planets.insert(planet.id, planet);
        }
        for fleet in snapshot.fleets {
            universe.fleets.insert(fleet.id, fleet);
        }
        for field in snapshot.debris {
            universe.debris.insert(field.coords, field);
        }
        for system in snapshot.systems {
            universe.star_names.insert(system.name.clone());
            universe.systems.insert(system.id, system);
        }
        for (ip, wallets) in snapshot.wallets_by_ip {
            universe.wallets_by_ip.insert(ip, wallets);
        }
        info!(
            "Universe loaded: {} agents, {} planets, {} fleets at tick {}",
            universe.agents.len(),
            universe.planets.len(),
            universe.fleets.len(),
            universe.tick()
        );
        universe
    }

    pub fn snapshot(&self) -> UniverseSnapshot {
        UniverseSnapshot {
            agents: self.agents.iter().map(|e| e.value().clone()).collect(),
            planets: self.planets.iter().map(|e| e.value().clone()).collect(),
            fleets: self.fleets.iter().map(|e| e.value().clone()).collect(),
            debris: self.debris.iter().map(|e| e.value().clone()).collect(),
            systems: self.systems.iter().map(|e| e.value().clone()).collect(),
            tick: self.tick(),
            wallets_by_ip: self
                .wallets_by_ip
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::SeqCst)
    }

    pub fn advance_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get_agent(&self, id: &str) -> Result<Agent, GameError> {
        self.agents
            .get(id)
            .map(|a| a.value().clone())
            .ok_or_else(|| GameError::AgentNotFound { id: id.to_string() })
    }

    pub fn get_planet(&self, id: PlanetId) -> Result<Planet, GameError> {
        self.planets
            .get(&id)
            .map(|p| p.value().clone())
            .ok_or_else(|| GameError::PlanetNotFound { id: id.to_string() })
    }

    pub fn get_fleet(&self, id: Uuid) -> Result<Fleet, GameError> {
        self.fleets
            .get(&id)
            .map(|f| f.value().clone())
            .ok_or_else(|| GameError::FleetNotFound { id: id.to_string() })
    }

    pub fn fleets_by_owner(&self, owner: &str) -> Vec<Fleet> {
        self.fleets
            .iter()
            .filter(|e| e.value().owner == owner)
            .map(|e| e.value().clone())
            .collect()
    }

    /// All active fleets count against the owner's slots, returning included.
    pub fn active_fleet_count(&self, owner: &str) -> usize {
        self.fleets.iter().filter(|e| e.value().owner == owner).count()
    }

    pub fn system_planets(&self, system: SystemId) -> Vec<Planet> {
        let mut planets: Vec<Planet> = self
            .planets
            .iter()
            .filter(|e| e.key().system_id() == system)
            .map(|e| e.value().clone())
            .collect();
        planets.sort_by_key(|p| p.id.position);
        planets
    }

    pub fn get_debris(&self, coords: PlanetId) -> Option<DebrisField> {
        self.debris.get(&coords).map(|d| d.value().clone())
    }

    pub fn system_name(&self, system: SystemId) -> Option<String> {
        self.systems.get(&system).map(|s| s.value().name.clone())
    }

    pub fn name_taken(&self, name: &str) -> bool {
        self.star_names.contains(name)
    }

    /// Record an explicitly chosen name, displacing any generated one.
    pub fn set_system_name(&self, system: SystemId, name: String, agent: &str) {
        if let Some(previous) = self.systems.get(&system).map(|s| s.value().name.clone()) {
            self.star_names.remove(&previous);
        }
        self.star_names.insert(name.clone());
        self.systems.insert(
            system,
            StarSystem {
                id: system,
                name,
                origin: NameOrigin::Named {
                    agent: agent.to_string(),
                },
            },
        );
    }

    /// Resolve the pre-seeded table, else draw procedurally against the
    /// global name set. Bounded retries; falls back to the bare coordinate
    /// string if the namespace is exhausted.
    pub fn ensure_system_named(&self, system: SystemId, rng: &mut impl Rng) -> String {
        if let Some(existing) = self.system_name(system) {
            return existing;
        }
        let (name, origin) = match names::seeded_name(system) {
            Some(seeded) => (seeded.to_string(), NameOrigin::Seeded),
            None => {
                let mut drawn = None;
                for _ in 0..names::MAX_NAME_ATTEMPTS {
                    let candidate = names::draw_name(rng);
                    if self.star_names.insert(candidate.clone()) {
                        drawn = Some(candidate);
                        break;
                    }
                }
                (
                    drawn.unwrap_or_else(|| format!("System {}", system)),
                    NameOrigin::Generated,
                )
            }
        };
        self.star_names.insert(name.clone());
        self.systems.insert(
            system,
            StarSystem {
                id: system,
                name: name.clone(),
                origin,
            },
        );
        name
    }

    /// Create an agent with its home world at a random empty position.
    /// Idempotent for an already-registered wallet; capped per source IP.
    pub fn register_agent(
        &self,
        wallet: &str,
        display_name: &str,
        ip: &str,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
    ) -> Result<Agent, GameError> {
        if let Some(existing) = self.agents.get(wallet) {
            return Ok(existing.value().clone());
        }

        {
            let wallets = self
                .wallets_by_ip
                .entry(ip.to_string())
                .or_default();
            if wallets.len() >= CONFIG.max_wallets_per_ip && !wallets.contains(wallet) {
                return Err(GameError::RequirementsNotMet {
                    detail: format!("wallet limit reached for this address ({})", CONFIG.max_wallets_per_ip),
                });
            }
        }

        let home = self
            .find_empty_position(rng)
            .ok_or_else(|| GameError::Internal {
                detail: "no free planet positions left".to_string(),
            })?;

        let max_temperature = position_temperature(home.position, rng);
        let mut planet = new_planet(home, Some(wallet.to_string()), max_temperature);
        planet.resources = Resources::new(500.0, 300.0, 100.0);
        planet.energy = 50.0;
        planet.buildings.insert(BuildingId::MetalMine, 1);
        planet.buildings.insert(BuildingId::SolarPlant, 1);

        let agent = Agent {
            id: wallet.to_string(),
            name: display_name.to_string(),
            created_at: now,
            planets: vec![home],
            score: 0.0,
            currency: 0.0,
            officers: BTreeMap::new(),
            boosters: BTreeMap::new(),
            stakes: Vec::new(),
            technologies: BTreeMap::new(),
            research_queue: Vec::new(),
            profile: None,
            alliance: None,
            spy_reports: Default::default(),
            decisions: Default::default(),
        };

        self.ensure_system_named(home.system_id(), rng);
        self.planets.insert(home, planet);
        self.agents.insert(wallet.to_string(), agent.clone());
        self.wallets_by_ip
            .entry(ip.to_string())
            .or_default()
            .insert(wallet.to_string());
        info!("Registered agent {} ({}) at {}", wallet, display_name, home);
        Ok(agent)
    }

    fn find_empty_position(&self, rng: &mut impl Rng) -> Option<PlanetId> {
        for _ in 0..1000 {
            let candidate = PlanetId::new(
                rng.random_range(1..=CONFIG.galaxies),
                rng.random_range(1..=CONFIG.systems_per_galaxy),
                rng.random_range(1..=CONFIG.positions_per_system),
            );
            if !self.planets.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self::new()
    }
}

/// Bare planet shell; callers fill in resources and buildings.
pub fn new_planet(id: PlanetId, owner: Option<String>, max_temperature: i32) -> Planet {
    Planet {
        id,
        owner,
        name: None,
        min_temperature: max_temperature - 40,
        max_temperature,
        resources: Resources::default(),
        energy: 0.0,
        buildings: BTreeMap::new(),
        ships: BTreeMap::new(),
        defenses: BTreeMap::new(),
        build_queue: Vec::new(),
        shipyard_queue: Vec::new(),
    }
}

/// Inner positions bake, outer ones freeze.
pub fn position_temperature(position: i32, rng: &mut impl Rng) -> i32 {
    140 - position * 10 + rng.random_range(0..10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng as _;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_register_agent_idempotent() {
        let universe = Universe::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let now = Utc::now();
        let first = universe
            .register_agent("0xwallet", "Player One", "10.0.0.1", now, &mut rng)
            .unwrap();
        let second = universe
            .register_agent("0xwallet", "Another Name", "10.0.0.1", now, &mut rng)
            .unwrap();
        assert_eq!(first.planets, second.planets);
        assert_eq!(universe.agents.len(), 1);
        assert_eq!(universe.planets.len(), 1);

        let home = universe.get_planet(first.planets[0]).unwrap();
        assert_eq!(home.owner.as_deref(), Some("0xwallet"));
        assert_eq!(home.resources, Resources::new(500.0, 300.0, 100.0));
        assert_eq!(home.building_level(BuildingId::MetalMine), 1);
        assert_eq!(home.building_level(BuildingId::SolarPlant), 1);
        assert!(universe.system_name(first.planets[0].system_id()).is_some());
    }

    #[test]
    fn test_register_agent_ip_cap() {
        let universe = Universe::new();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let now = Utc::now();
        for i in 0..CONFIG.max_wallets_per_ip {
            universe
                .register_agent(&format!("0xw{}", i), "P", "10.0.0.9", now, &mut rng)
                .unwrap();
        }
        let err = universe
            .register_agent("0xoverflow", "P", "10.0.0.9", now, &mut rng)
            .unwrap_err();
        assert!(matches!(err, GameError::RequirementsNotMet { .. }));
        // A different address is unaffected.
        universe
            .register_agent("0xoverflow", "P", "10.0.0.10", now, &mut rng)
            .unwrap();
    }

    #[test]
    fn test_generated_system_names_are_unique() {
        let universe = Universe::new();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut seen = std::collections::BTreeSet::new();
        for system in 1..=120 {
            let name = universe.ensure_system_named(SystemId::new(4, system), &mut rng);
            assert!(seen.insert(name.clone()), "duplicate name {}", name);
            // Re-asking returns the recorded name.
            assert_eq!(
                universe.ensure_system_named(SystemId::new(4, system), &mut rng),
                name
            );
        }
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let universe = Universe::new();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let now = Utc::now();
        universe
            .register_agent("0xsnap", "Snap", "10.1.1.1", now, &mut rng)
            .unwrap();
        let snapshot = universe.snapshot();
        let restored = Universe::from_snapshot(snapshot);
        assert_eq!(restored.agents.len(), 1);
        assert_eq!(restored.planets.len(), 1);
        assert!(restored.get_agent("0xsnap").is_ok());
        // Issued names survive the round trip: generation can't reuse them.
        let agent = restored.get_agent("0xsnap").unwrap();
        let name = restored.system_name(agent.planets[0].system_id()).unwrap();
        assert!(restored.name_taken(&name));
    }
}
