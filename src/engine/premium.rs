//! Premium-currency commands: officers, boosters, speedups, resource
//! purchases, and staking. Every deduction goes through the safe-balance
//! check; a corrupted balance fails the purchase instead of being normalized.

use crate::catalog::{
    resource_rate, speedup_rate, BoosterId, OfficerId, PoolId, ResourceKind, SpeedupKind,
    BOOSTERS, OFFICERS, POOLS,
};
use crate::engine::Engine;
use crate::errors::GameError;
use crate::models::{BoosterStatus, OfficerStatus, PlanetId, Stake};
use crate::util;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

const SECS_PER_YEAR: f64 = 365.0 * 86400.0;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", tag = "queue", content = "planet")]
pub enum SpeedupTarget {
    Build(PlanetId),
    Research,
    Shipyard(PlanetId),
}

fn require_positive_amount(amount: f64) -> Result<(), GameError> {
    if !amount.is_finite() || amount <= 0.0 || amount > util::SAFE_MAX {
        return Err(GameError::InvalidArgument {
            detail: format!("invalid amount: {}", amount),
        });
    }
    Ok(())
}

fn stake_reward(stake: &Stake, now: DateTime<Utc>) -> f64 {
    let pool = &POOLS[&stake.pool_id];
    let elapsed = (now - stake.last_claim_at).num_seconds().max(0) as f64;
    stake.amount * pool.apr * elapsed / SECS_PER_YEAR
}

impl Engine {
    /// Hire or extend an officer. Re-hiring stacks duration on top of the
    /// current expiry.
    pub fn hire_officer(
        &self,
        agent_id: &str,
        officer: OfficerId,
    ) -> Result<OfficerStatus, GameError> {
        let stats = &OFFICERS[&officer];
        let now = Utc::now();
        self.mutate_agent(agent_id, |agent| {
            agent.currency = util::checked_spend(agent.currency, stats.cost)?;
            let duration = Duration::seconds(stats.duration_secs);
            let status = match agent.officers.get(&officer) {
                Some(existing) => OfficerStatus {
                    hired_at: existing.hired_at,
                    expires_at: existing.expires_at.max(now) + duration,
                },
                None => OfficerStatus {
                    hired_at: now,
                    expires_at: now + duration,
                },
            };
            agent.officers.insert(officer, status);
            Ok(status)
        })
    }

    /// Boosters do not stack on themselves; re-activation while running is
    /// rejected.
    pub fn activate_booster(
        &self,
        agent_id: &str,
        booster: BoosterId,
    ) -> Result<BoosterStatus, GameError> {
        let stats = &BOOSTERS[&booster];
        let now = Utc::now();
        self.mutate_agent(agent_id, |agent| {
            if agent.booster_active(booster, now) {
                return Err(GameError::BoosterActive);
            }
            agent.currency = util::checked_spend(agent.currency, stats.cost)?;
            let status = BoosterStatus {
                activated_at: now,
                expires_at: now + Duration::seconds(stats.duration_secs),
            };
            agent.boosters.insert(booster, status);
            Ok(status)
        })
    }

    /// Finish a queue head early; cost scales with the time bought off.
    pub async fn speedup(
        &self,
        agent_id: &str,
        target: SpeedupTarget,
    ) -> Result<f64, GameError> {
        let now = Utc::now();
        match target {
            SpeedupTarget::Build(planet_id) => {
                let _guard = self.locks.acquire(planet_id).await?;
                let planet = self.universe.get_planet(planet_id)?;
                if planet.owner.as_deref() != Some(agent_id) {
                    return Err(GameError::NotOwner {
                        planet: planet_id.to_string(),
                    });
                }
                let head = planet.build_queue.first().ok_or(GameError::InvalidArgument {
                    detail: "nothing to speed up".to_string(),
                })?;
                let cost = speedup_cost(head.completes_at, now, SpeedupKind::Build);
                self.mutate_agent(agent_id, |agent| {
                    agent.currency = util::checked_spend(agent.currency, cost)?;
                    Ok(())
                })?;
                self.mutate_planet(planet_id, |planet| {
                    if let Some(head) = planet.build_queue.first_mut() {
                        head.completes_at = now;
                    }
                    let mut cursor = now;
                    for job in planet.build_queue.iter_mut().skip(1) {
                        job.started_at = cursor;
                        job.completes_at = cursor + Duration::seconds(job.build_secs);
                        cursor = job.completes_at;
                    }
                    Ok(())
                })?;
                Ok(cost)
            }
            SpeedupTarget::Research => {
                let agent = self.universe.get_agent(agent_id)?;
                let home = *agent.planets.first().ok_or_else(|| GameError::Internal {
                    detail: "agent has no planets".to_string(),
                })?;
                let _guard = self.locks.acquire(home).await?;
                self.mutate_agent(agent_id, |agent| {
                    let head = agent.research_queue.first().ok_or(GameError::InvalidArgument {
                        detail: "no research in progress".to_string(),
                    })?;
                    let cost = speedup_cost(head.completes_at, now, SpeedupKind::Research);
                    agent.currency = util::checked_spend(agent.currency, cost)?;
                    agent.research_queue[0].completes_at = now;
                    Ok(cost)
                })
            }
            SpeedupTarget::Shipyard(planet_id) => {
                let _guard = self.locks.acquire(planet_id).await?;
                let planet = self.universe.get_planet(planet_id)?;
                if planet.owner.as_deref() != Some(agent_id) {
                    return Err(GameError::NotOwner {
                        planet: planet_id.to_string(),
                    });
                }
                let head = planet.shipyard_queue.first().ok_or(GameError::InvalidArgument {
                    detail: "shipyard is idle".to_string(),
                })?;
                let cost = speedup_cost(head.completes_at, now, SpeedupKind::Shipyard);
                self.mutate_agent(agent_id, |agent| {
                    agent.currency = util::checked_spend(agent.currency, cost)?;
                    Ok(())
                })?;
                self.mutate_planet(planet_id, |planet| {
                    if let Some(head) = planet.shipyard_queue.first_mut() {
                        head.completes_at = now;
                    }
                    Ok(())
                })?;
                Ok(cost)
            }
        }
    }

    /// Swap currency for raw resources; the purchase may push the store past
    /// its cap (production then idles until it drains).
    pub async fn buy_resources(
        &self,
        agent_id: &str,
        planet_id: PlanetId,
        resource: ResourceKind,
        amount: f64,
    ) -> Result<f64, GameError> {
        require_positive_amount(amount)?;
        let _guard = self.locks.acquire(planet_id).await?;
        let planet = self.universe.get_planet(planet_id)?;
        if planet.owner.as_deref() != Some(agent_id) {
            return Err(GameError::NotOwner {
                planet: planet_id.to_string(),
            });
        }
        let cost = (amount / 1000.0 * resource_rate(resource)).ceil();
        self.mutate_agent(agent_id, |agent| {
            agent.currency = util::checked_spend(agent.currency, cost)?;
            Ok(())
        })?;
        self.mutate_planet(planet_id, |planet| {
            let slot = match resource {
                ResourceKind::Metal => &mut planet.resources.metal,
                ResourceKind::Crystal => &mut planet.resources.crystal,
                ResourceKind::Deuterium => &mut planet.resources.deuterium,
            };
            *slot = util::saturating_add(*slot, amount);
            Ok(())
        })?;
        Ok(cost)
    }

    /// Admin credit drop. The adapter has already checked the admin token.
    pub fn grant_currency(&self, agent_id: &str, amount: f64) -> Result<f64, GameError> {
        require_positive_amount(amount)?;
        self.mutate_agent(agent_id, |agent| {
            if !agent.currency.is_finite() {
                return Err(GameError::Corruption {
                    detail: format!("balance is not a finite number: {}", agent.currency),
                });
            }
            agent.currency = util::saturating_add(agent.currency, amount);
            Ok(agent.currency)
        })
    }

    pub fn stake(&self, agent_id: &str, pool_id: PoolId, amount: f64) -> Result<Stake, GameError> {
        require_positive_amount(amount)?;
        let pool = &POOLS[&pool_id];
        if amount < pool.min_stake {
            return Err(GameError::RequirementsNotMet {
                detail: format!("minimum stake for {} is {}", pool_id, pool.min_stake),
            });
        }
        let now = Utc::now();
        self.mutate_agent(agent_id, |agent| {
            agent.currency = util::checked_spend(agent.currency, amount)?;
            let stake = Stake {
                id: Uuid::new_v4(),
                pool_id,
                amount,
                staked_at: now,
                last_claim_at: now,
            };
            agent.stakes.push(stake.clone());
            Ok(stake)
        })
    }

    /// Pay out accrued rewards, leaving the principal staked.
    pub fn claim_stake(&self, agent_id: &str, stake_id: Uuid) -> Result<f64, GameError> {
        let now = Utc::now();
        self.mutate_agent(agent_id, |agent| {
            let stake = agent
                .stakes
                .iter_mut()
                .find(|stake| stake.id == stake_id)
                .ok_or_else(|| GameError::InvalidArgument {
                    detail: format!("unknown stake {}", stake_id),
                })?;
            let reward = stake_reward(stake, now);
            stake.last_claim_at = now;
            agent.currency = util::saturating_add(agent.currency, reward);
            Ok(reward)
        })
    }

    /// Return principal plus accrued rewards once the lock period is over.
    pub fn unstake(&self, agent_id: &str, stake_id: Uuid) -> Result<f64, GameError> {
        let now = Utc::now();
        self.mutate_agent(agent_id, |agent| {
            let index = agent
                .stakes
                .iter()
                .position(|stake| stake.id == stake_id)
                .ok_or_else(|| GameError::InvalidArgument {
                    detail: format!("unknown stake {}", stake_id),
                })?;
            let pool = &POOLS[&agent.stakes[index].pool_id];
            let unlocks_at = agent.stakes[index].staked_at + Duration::seconds(pool.lock_secs);
            if now < unlocks_at {
                return Err(GameError::RequirementsNotMet {
                    detail: format!("stake locked until {}", unlocks_at),
                });
            }
            let stake = agent.stakes.remove(index);
            let payout = stake.amount + stake_reward(&stake, now);
            agent.currency = util::saturating_add(agent.currency, payout);
            Ok(payout)
        })
    }

    /// Roll accrued rewards into the principal.
    pub fn compound_stake(&self, agent_id: &str, stake_id: Uuid) -> Result<Stake, GameError> {
        let now = Utc::now();
        self.mutate_agent(agent_id, |agent| {
            let stake = agent
                .stakes
                .iter_mut()
                .find(|stake| stake.id == stake_id)
                .ok_or_else(|| GameError::InvalidArgument {
                    detail: format!("unknown stake {}", stake_id),
                })?;
            let reward = stake_reward(stake, now);
            stake.amount = util::saturating_add(stake.amount, reward);
            stake.last_claim_at = now;
            Ok(stake.clone())
        })
    }
}

fn speedup_cost(completes_at: DateTime<Utc>, now: DateTime<Utc>, kind: SpeedupKind) -> f64 {
    let remaining_secs = (completes_at - now).num_seconds().max(0) as f64;
    (remaining_secs / 3600.0 * speedup_rate(kind)).ceil()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BuildingId;
    use crate::engine::test_support::{register, test_engine};
    use crate::models::Resources;

    fn fund(engine: &Engine, agent_id: &str, amount: f64) {
        engine
            .mutate_agent(agent_id, |agent| {
                agent.currency = amount;
                Ok(())
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_hire_officer_extends_on_rehire() {
        let (engine, _rx) = test_engine(5);
        register(&engine, "0xboss");
        fund(&engine, "0xboss", 20000.0);

        let first = engine.hire_officer("0xboss", OfficerId::Overseer).unwrap();
        let second = engine.hire_officer("0xboss", OfficerId::Overseer).unwrap();
        assert_eq!(first.hired_at, second.hired_at);
        let stats = &OFFICERS[&OfficerId::Overseer];
        assert_eq!(
            second.expires_at,
            first.expires_at + Duration::seconds(stats.duration_secs)
        );
        let agent = engine.universe.get_agent("0xboss").unwrap();
        assert_eq!(agent.currency, 20000.0 - 2.0 * stats.cost);
    }

    #[tokio::test]
    async fn test_overseer_widens_build_queue() {
        let (engine, _rx) = test_engine(5);
        let agent = register(&engine, "0xwide");
        let home = agent.planets[0];
        fund(&engine, "0xwide", 10000.0);
        engine
            .mutate_planet(home, |planet| {
                planet.resources = Resources::new(50000.0, 50000.0, 0.0);
                Ok(())
            })
            .unwrap();

        engine.hire_officer("0xwide", OfficerId::Overseer).unwrap();
        engine.build("0xwide", home, BuildingId::MetalMine).await.unwrap();
        engine.build("0xwide", home, BuildingId::CrystalMine).await.unwrap();
        engine.build("0xwide", home, BuildingId::SolarPlant).await.unwrap();
        let err = engine
            .build("0xwide", home, BuildingId::MetalStorage)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::QueueFull { limit: 3 }));
    }

    #[tokio::test]
    async fn test_booster_does_not_stack() {
        let (engine, _rx) = test_engine(5);
        register(&engine, "0xboost");
        fund(&engine, "0xboost", 10000.0);

        engine
            .activate_booster("0xboost", BoosterId::MetalBooster)
            .unwrap();
        let err = engine
            .activate_booster("0xboost", BoosterId::MetalBooster)
            .unwrap_err();
        assert!(matches!(err, GameError::BoosterActive));
        // A different booster is fine.
        engine
            .activate_booster("0xboost", BoosterId::CrystalBooster)
            .unwrap();
    }

    #[tokio::test]
    async fn test_insufficient_currency() {
        let (engine, _rx) = test_engine(5);
        register(&engine, "0xbroke");
        let err = engine
            .hire_officer("0xbroke", OfficerId::Admiral)
            .unwrap_err();
        assert!(matches!(err, GameError::InsufficientCurrency { .. }));
        // Nothing was hired.
        let agent = engine.universe.get_agent("0xbroke").unwrap();
        assert!(agent.officers.is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_balance_fails_purchase() {
        let (engine, _rx) = test_engine(5);
        register(&engine, "0xnan");
        engine
            .mutate_agent("0xnan", |agent| {
                agent.currency = f64::NAN;
                Ok(())
            })
            .unwrap();
        let err = engine
            .hire_officer("0xnan", OfficerId::Admiral)
            .unwrap_err();
        assert!(matches!(err, GameError::Corruption { .. }));
        let err = engine.grant_currency("0xnan", 100.0).unwrap_err();
        assert!(matches!(err, GameError::Corruption { .. }));
    }

    #[tokio::test]
    async fn test_speedup_build_completes_on_next_tick() {
        let (engine, _rx) = test_engine(5);
        let agent = register(&engine, "0ximpatient");
        let home = agent.planets[0];
        fund(&engine, "0ximpatient", 1000.0);

        engine
            .build("0ximpatient", home, BuildingId::MetalMine)
            .await
            .unwrap();
        let cost = engine
            .speedup("0ximpatient", SpeedupTarget::Build(home))
            .await
            .unwrap();
        // 30s remaining at 40/h rounds up to one credit.
        assert_eq!(cost, 1.0);

        engine.run_tick(Utc::now()).await;
        let planet = engine.universe.get_planet(home).unwrap();
        assert_eq!(planet.building_level(BuildingId::MetalMine), 2);
    }

    #[tokio::test]
    async fn test_buy_resources_can_exceed_cap() {
        let (engine, _rx) = test_engine(5);
        let agent = register(&engine, "0xwhale");
        let home = agent.planets[0];
        fund(&engine, "0xwhale", 100000.0);

        let cap = crate::catalog::storage_capacity(0);
        let cost = engine
            .buy_resources("0xwhale", home, ResourceKind::Metal, cap * 2.0)
            .await
            .unwrap();
        assert_eq!(cost, (cap * 2.0 / 1000.0).ceil());
        let planet = engine.universe.get_planet(home).unwrap();
        assert!(planet.resources.metal > cap);
    }

    #[tokio::test]
    async fn test_stake_lifecycle() {
        let (engine, _rx) = test_engine(5);
        register(&engine, "0xyield");
        fund(&engine, "0xyield", 5000.0);

        let stake = engine
            .stake("0xyield", PoolId::QuasarPool, 1000.0)
            .unwrap();
        let agent = engine.universe.get_agent("0xyield").unwrap();
        assert_eq!(agent.currency, 4000.0);

        // Backdate the stake a year: one full APR period accrues.
        engine
            .mutate_agent("0xyield", |agent| {
                let entry = agent.stakes.first_mut().unwrap();
                entry.staked_at = entry.staked_at - Duration::days(365);
                entry.last_claim_at = entry.staked_at;
                Ok(())
            })
            .unwrap();
        let reward = engine.claim_stake("0xyield", stake.id).unwrap();
        assert!((reward - 50.0).abs() < 1.0);

        let payout = engine.unstake("0xyield", stake.id).unwrap();
        assert!(payout >= 1000.0);
        let agent = engine.universe.get_agent("0xyield").unwrap();
        assert!(agent.stakes.is_empty());
    }

    #[tokio::test]
    async fn test_unstake_respects_lock_period() {
        let (engine, _rx) = test_engine(5);
        register(&engine, "0xlocked");
        fund(&engine, "0xlocked", 5000.0);

        let stake = engine
            .stake("0xlocked", PoolId::NovaPool, 500.0)
            .unwrap();
        let err = engine.unstake("0xlocked", stake.id).unwrap_err();
        assert!(matches!(err, GameError::RequirementsNotMet { .. }));

        // Compounding is allowed while locked.
        engine.compound_stake("0xlocked", stake.id).unwrap();
    }

    #[tokio::test]
    async fn test_stake_minimum() {
        let (engine, _rx) = test_engine(5);
        register(&engine, "0xsmall");
        fund(&engine, "0xsmall", 5000.0);
        let err = engine
            .stake("0xsmall", PoolId::PulsarPool, 10.0)
            .unwrap_err();
        assert!(matches!(err, GameError::RequirementsNotMet { .. }));
    }
}
