//! Per-planet mutual exclusion with bounded wait.
//!
//! A lock scopes a single planet and, by handler contract, the owner agent's
//! queues when the operation mutates only that owner. Handlers that touch two
//! planets acquire origin before destination and never hold more than two.

use crate::errors::GameError;
use crate::models::PlanetId;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct PlanetLocks {
    locks: DashMap<PlanetId, Arc<Mutex<()>>>,
    timeout: Duration,
}

pub type PlanetGuard = OwnedMutexGuard<()>;

impl PlanetLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    /// Acquire the lock for one planet, waiting up to the configured bound.
    /// The returned guard releases on every exit path.
    pub async fn acquire(&self, planet: PlanetId) -> Result<PlanetGuard, GameError> {
        let lock = self
            .locks
            .entry(planet)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        tokio::time::timeout(self.timeout, lock.lock_owned())
            .await
            .map_err(|_| GameError::Busy)
    }

    /// Acquire two planets in canonical origin-then-destination order.
    pub async fn acquire_pair(
        &self,
        origin: PlanetId,
        destination: PlanetId,
    ) -> Result<(PlanetGuard, Option<PlanetGuard>), GameError> {
        let first = self.acquire(origin).await?;
        if origin == destination {
            return Ok((first, None));
        }
        let second = self.acquire(destination).await?;
        Ok((first, Some(second)))
    }

    /// Drop lock entries nobody is waiting on. Called from the tick pass so
    /// the map doesn't grow with every planet ever touched.
    pub fn sweep(&self) {
        self.locks
            .retain(|_, lock| Arc::strong_count(lock) > 1 || lock.try_lock().is_err());
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planet() -> PlanetId {
        PlanetId::new(1, 1, 1)
    }

    #[tokio::test]
    async fn test_exclusive_hold() {
        let locks = PlanetLocks::new(Duration::from_millis(50));
        let guard = locks.acquire(planet()).await.unwrap();
        let err = locks.acquire(planet()).await.unwrap_err();
        assert!(matches!(err, GameError::Busy));
        drop(guard);
        assert!(locks.acquire(planet()).await.is_ok());
    }

    #[tokio::test]
    async fn test_waits_for_release() {
        let locks = Arc::new(PlanetLocks::new(Duration::from_secs(5)));
        let guard = locks.acquire(planet()).await.unwrap();
        let locks_clone = locks.clone();
        let waiter = tokio::spawn(async move { locks_clone.acquire(planet()).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_distinct_planets_do_not_contend() {
        let locks = PlanetLocks::new(Duration::from_millis(50));
        let _a = locks.acquire(PlanetId::new(1, 1, 1)).await.unwrap();
        let _b = locks.acquire(PlanetId::new(1, 1, 2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_drops_idle_entries() {
        let locks = PlanetLocks::new(Duration::from_millis(50));
        {
            let _guard = locks.acquire(planet()).await.unwrap();
            locks.sweep();
            // Held lock survives the sweep.
            assert_eq!(locks.len(), 1);
        }
        locks.sweep();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_pair_same_planet_takes_one_lock() {
        let locks = PlanetLocks::new(Duration::from_millis(50));
        let (_guard, second) = locks.acquire_pair(planet(), planet()).await.unwrap();
        assert!(second.is_none());
    }
}
