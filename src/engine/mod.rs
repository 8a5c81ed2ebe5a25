pub mod combat;
pub mod commands;
pub mod events;
pub mod missions;
pub mod persist;
pub mod premium;

pub use events::{Event, FleetView, Record};

use crate::catalog::{self, ProductionRates};
use crate::config::CONFIG;
use crate::errors::GameError;
use crate::locks::PlanetLocks;
use crate::models::{Agent, Planet, PlanetId, Resources};
use crate::universe::Universe;
use crate::util;
use chrono::{DateTime, Utc};
use rand::SeedableRng as _;
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};

/// The simulation engine: owns the world, the per-planet locks, the seeded
/// PRNG, and the outbound channels. Constructed once at boot and shared by
/// the tick loop and every command handler.
pub struct Engine {
    pub universe: Arc<Universe>,
    pub locks: PlanetLocks,
    event_tx: broadcast::Sender<Event>,
    record_tx: mpsc::Sender<Record>,
    dirty_tx: mpsc::Sender<()>,
    rng: Mutex<ChaCha8Rng>,
}

/// Receiver ends for the durable-record and persistence-signal channels,
/// consumed by the recorder and writer tasks.
pub struct EngineRx {
    pub records: mpsc::Receiver<Record>,
    pub dirty: mpsc::Receiver<()>,
}

impl Engine {
    pub fn new(universe: Arc<Universe>, seed: u64) -> (Arc<Self>, EngineRx) {
        let (event_tx, _) = broadcast::channel(256);
        let (record_tx, record_rx) = mpsc::channel(1024);
        let (dirty_tx, dirty_rx) = mpsc::channel(4);
        let engine = Arc::new(Self {
            universe,
            locks: PlanetLocks::new(Duration::from_millis(CONFIG.lock_timeout_ms)),
            event_tx,
            record_tx,
            dirty_tx,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        });
        (
            engine,
            EngineRx {
                records: record_rx,
                dirty: dirty_rx,
            },
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Let the transport layer report its subscriber count to observers.
    pub fn publish_online_count(&self, count: usize) {
        self.emit(Event::OnlineCount { count });
    }

    /// Announce a delivered private message to connected observers.
    pub fn publish_new_message(&self, recipient: &str) {
        self.emit(Event::NewMessage {
            recipient: recipient.to_string(),
        });
    }

    pub(crate) fn emit(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn record(&self, record: Record) {
        if self.record_tx.try_send(record).is_err() {
            debug!("record channel full, dropping row");
        }
    }

    pub(crate) fn mark_dirty(&self) {
        let _ = self.dirty_tx.try_send(());
    }

    pub(crate) fn with_rng<T>(&self, f: impl FnOnce(&mut ChaCha8Rng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap();
        f(&mut rng)
    }

    /// Mutate one agent atomically. Callers touching a planet or its queues
    /// hold the planet lock; agent-only mutations are serialized by the
    /// registry entry itself.
    pub(crate) fn mutate_agent<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Agent) -> Result<T, GameError>,
    ) -> Result<T, GameError> {
        let mut entry = self
            .universe
            .agents
            .get_mut(id)
            .ok_or_else(|| GameError::AgentNotFound { id: id.to_string() })?;
        f(entry.value_mut())
    }

    /// Mutate one planet. The caller must hold the planet's lock.
    pub(crate) fn mutate_planet<T>(
        &self,
        id: PlanetId,
        f: impl FnOnce(&mut Planet) -> Result<T, GameError>,
    ) -> Result<T, GameError> {
        let mut entry = self
            .universe
            .planets
            .get_mut(&id)
            .ok_or_else(|| GameError::PlanetNotFound { id: id.to_string() })?;
        f(entry.value_mut())
    }

    /// Run the tick loop at the configured period until the process stops.
    pub async fn run_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_millis(CONFIG.tick_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.run_tick(Utc::now()).await;
        }
    }

    /// One full simulation pass. Takes `now` so tests can drive synthetic
    /// time; the loop passes the wall clock.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> u64 {
        let tick = self.universe.advance_tick();

        let planet_ids: Vec<PlanetId> =
            self.universe.planets.iter().map(|e| *e.key()).collect();
        for planet_id in planet_ids {
            match self.locks.acquire(planet_id).await {
                Ok(_guard) => {
                    if let Err(err) = self.tick_planet(planet_id, now) {
                        error!("tick failed for planet {}: {}", planet_id, err);
                    }
                }
                Err(_) => warn!("planet {} busy, skipping this tick", planet_id),
            }
        }

        let due_fleets: Vec<uuid::Uuid> = self
            .universe
            .fleets
            .iter()
            .filter(|e| e.value().arrives_at <= now)
            .map(|e| *e.key())
            .collect();
        for fleet_id in due_fleets {
            if let Err(err) = missions::process_arrival(self, fleet_id, now).await {
                error!("fleet {} arrival failed: {}", fleet_id, err);
            }
        }

        let agent_ids: Vec<String> = self.universe.agents.iter().map(|e| e.key().clone()).collect();
        for agent_id in &agent_ids {
            if let Err(err) = self.tick_research(agent_id, now).await {
                error!("research tick failed for {}: {}", agent_id, err);
            }
        }

        if tick % CONFIG.persist_interval_ticks == 0 {
            self.mark_dirty();
        }
        if tick % CONFIG.score_snapshot_interval_ticks == 0 {
            for agent_id in &agent_ids {
                if let Ok(agent) = self.universe.get_agent(agent_id) {
                    self.record(Record::Score {
                        agent_id: agent.id,
                        tick,
                        score: agent.score,
                        planet_count: agent.planets.len(),
                    });
                }
            }
        }

        self.locks.sweep();
        self.emit(Event::Tick { tick });
        tick
    }

    /// Production and queue advancement for one planet. Lock held by caller.
    fn tick_planet(&self, planet_id: PlanetId, now: DateTime<Utc>) -> Result<(), GameError> {
        let planet = self.universe.get_planet(planet_id)?;
        let owner = planet.owner.clone();
        let owner_agent = owner
            .as_deref()
            .and_then(|id| self.universe.get_agent(id).ok());

        let rates = catalog::production(&planet, owner_agent.as_ref(), now, CONFIG.game_speed);
        let caps = catalog::storage_caps(&planet);
        let dt = CONFIG.tick_ms as f64 / 1000.0;

        let mut completed_builds = Vec::new();
        let mut completed_ship_jobs = Vec::new();
        self.mutate_planet(planet_id, |planet| {
            apply_production(planet, &rates, &caps, dt);
            planet.energy = rates.energy_produced - rates.energy_consumed;

            while planet
                .build_queue
                .first()
                .map(|job| job.completes_at <= now)
                .unwrap_or(false)
            {
                let job = planet.build_queue.remove(0);
                planet.buildings.insert(job.building, job.target_level);
                completed_builds.push(job);
            }

            if planet
                .shipyard_queue
                .first()
                .map(|job| job.completes_at <= now)
                .unwrap_or(false)
            {
                let job = planet.shipyard_queue.remove(0);
                match job.item {
                    crate::models::ShipyardItem::Ship(ship) => planet.add_ships(ship, job.count),
                    crate::models::ShipyardItem::Defense(defense) => {
                        planet.add_defenses(defense, job.count)
                    }
                }
                completed_ship_jobs.push(job);
            }
            Ok(())
        })?;

        for job in completed_builds {
            if let Some(owner) = &owner {
                self.mutate_agent(owner, |agent| {
                    agent.score = util::saturating_add(agent.score, job.cost.total());
                    Ok(())
                })?;
            }
            self.emit(Event::BuildComplete {
                planet: planet_id,
                building: job.building,
                level: job.target_level,
            });
        }
        for job in completed_ship_jobs {
            match job.item {
                crate::models::ShipyardItem::Ship(ship) => self.emit(Event::ShipComplete {
                    planet: planet_id,
                    ship,
                    count: job.count,
                }),
                crate::models::ShipyardItem::Defense(defense) => {
                    self.emit(Event::DefenseComplete {
                        planet: planet_id,
                        defense,
                        count: job.count,
                    })
                }
            }
        }
        Ok(())
    }

    /// Advance the agent's research queue head, under the lock of the planet
    /// the research was started from (the agent's first planet).
    async fn tick_research(&self, agent_id: &str, now: DateTime<Utc>) -> Result<(), GameError> {
        let agent = self.universe.get_agent(agent_id)?;
        let due = agent
            .research_queue
            .first()
            .map(|job| job.completes_at <= now)
            .unwrap_or(false);
        if !due {
            return Ok(());
        }
        let _guard = match agent.planets.first() {
            Some(planet_id) => Some(self.locks.acquire(*planet_id).await?),
            None => None,
        };
        let completed = self.mutate_agent(agent_id, |agent| {
            let due = agent
                .research_queue
                .first()
                .map(|job| job.completes_at <= now)
                .unwrap_or(false);
            if !due {
                return Ok(None);
            }
            let job = agent.research_queue.remove(0);
            agent.technologies.insert(job.tech, job.target_level);
            agent.score = util::saturating_add(agent.score, job.cost.total());
            Ok(Some(job))
        })?;
        if let Some(job) = completed {
            self.emit(Event::ResearchComplete {
                agent: agent_id.to_string(),
                tech: job.tech,
                level: job.target_level,
            });
        }
        Ok(())
    }
}

/// Storage-cap rules: stock strictly below the cap fills up to the cap;
/// stock at or above it (loot, purchases) suppresses production entirely
/// until it falls back under. Fusion burn debits deuterium regardless.
pub fn apply_production(
    planet: &mut Planet,
    rates: &ProductionRates,
    caps: &Resources,
    dt_secs: f64,
) {
    fn fill(current: f64, rate: f64, cap: f64, dt: f64) -> f64 {
        if current < cap {
            (current + rate * dt).min(cap)
        } else {
            current
        }
    }
    planet.resources.metal = fill(planet.resources.metal, rates.metal_per_sec, caps.metal, dt_secs);
    planet.resources.crystal = fill(
        planet.resources.crystal,
        rates.crystal_per_sec,
        caps.crystal,
        dt_secs,
    );
    planet.resources.deuterium = fill(
        planet.resources.deuterium,
        rates.deuterium_per_sec,
        caps.deuterium,
        dt_secs,
    );
    planet.resources.deuterium =
        (planet.resources.deuterium - rates.fusion_burn_per_sec * dt_secs).max(0.0);
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::Agent;
    use rand::Rng as _;

    /// Engine over a fresh in-memory universe with a fixed seed; channels
    /// are wired but the receivers are kept alive by the harness.
    pub fn test_engine(seed: u64) -> (Arc<Engine>, EngineRx) {
        Engine::new(Arc::new(Universe::new()), seed)
    }

    pub fn register(engine: &Engine, wallet: &str) -> Agent {
        let now = Utc::now();
        engine.with_rng(|rng| {
            let ip: String = format!("10.0.{}.{}", rng.random_range(0..250), rng.random_range(0..250));
            engine
                .universe
                .register_agent(wallet, wallet, &ip, now, rng)
                .unwrap()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BuildingId;
    use crate::universe::new_planet;

    fn planet_with(
        metal: f64,
        metal_mine: u32,
        solar: u32,
        storage: u32,
    ) -> Planet {
        let mut planet = new_planet(PlanetId::new(1, 1, 8), Some("owner".into()), 40);
        planet.resources.metal = metal;
        planet.buildings.insert(BuildingId::MetalMine, metal_mine);
        planet.buildings.insert(BuildingId::SolarPlant, solar);
        planet.buildings.insert(BuildingId::MetalStorage, storage);
        planet
    }

    #[test]
    fn test_production_fills_to_cap_and_stops() {
        let mut planet = planet_with(0.0, 5, 10, 0);
        let rates = catalog::production(&planet, None, Utc::now(), 10.0);
        let caps = catalog::storage_caps(&planet);
        assert!(rates.metal_per_sec > 0.0);

        // A normal tick accrues.
        apply_production(&mut planet, &rates, &caps, 1.0);
        assert!(planet.resources.metal > 0.0);

        // Just below the cap: the addition clamps exactly at the cap.
        planet.resources.metal = caps.metal - 0.5;
        apply_production(&mut planet, &rates, &caps, 1.0);
        assert_eq!(planet.resources.metal, caps.metal);

        // At the cap: no further production.
        apply_production(&mut planet, &rates, &caps, 1.0);
        assert_eq!(planet.resources.metal, caps.metal);
    }

    #[test]
    fn test_overfilled_store_suppresses_production() {
        let mut planet = planet_with(0.0, 5, 10, 0);
        let rates = catalog::production(&planet, None, Utc::now(), 10.0);
        let caps = catalog::storage_caps(&planet);
        // Loot pushed the stock over the cap; production stays off and the
        // overage is preserved.
        planet.resources.metal = caps.metal + 5000.0;
        apply_production(&mut planet, &rates, &caps, 1.0);
        assert_eq!(planet.resources.metal, caps.metal + 5000.0);
    }

    #[test]
    fn test_fusion_burn_debits_even_when_capped() {
        let mut planet = planet_with(0.0, 0, 0, 0);
        planet.buildings.insert(BuildingId::FusionReactor, 3);
        let rates = catalog::production(&planet, None, Utc::now(), 10.0);
        let caps = catalog::storage_caps(&planet);
        assert!(rates.fusion_burn_per_sec > 0.0);
        planet.resources.deuterium = 100.0;
        apply_production(&mut planet, &rates, &caps, 1.0);
        assert!(planet.resources.deuterium < 100.0);
        // Burn clamps at zero, never negative.
        planet.resources.deuterium = 0.0;
        apply_production(&mut planet, &rates, &caps, 1.0);
        assert_eq!(planet.resources.deuterium, 0.0);
    }
}
