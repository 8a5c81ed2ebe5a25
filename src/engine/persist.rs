//! Persistence plumbing: a debounced single-writer task fed by the tick
//! loop's dirty signal, and a recorder task draining durable report rows.
//! Neither ever panics the simulation; failures are logged and retried on
//! the next signal.

use crate::config::CONFIG;
use crate::database::DbClient;
use crate::engine::Record;
use crate::universe::Universe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

pub async fn run_writer(db: DbClient, universe: Arc<Universe>, mut dirty: mpsc::Receiver<()>) {
    while dirty.recv().await.is_some() {
        tokio::time::sleep(Duration::from_millis(CONFIG.save_debounce_ms)).await;
        // Coalesce every signal that arrived during the debounce window.
        while dirty.try_recv().is_ok() {}
        let snapshot = universe.snapshot();
        match db.save_universe(&snapshot).await {
            Ok(()) => debug!("saved universe at tick {}", snapshot.tick),
            Err(err) => error!("universe save failed, will retry: {}", err),
        }
    }
}

pub async fn run_recorder(db: DbClient, mut records: mpsc::Receiver<Record>) {
    while let Some(record) = records.recv().await {
        let result = match &record {
            Record::Battle(report) => db.append_battle_report(report).await,
            Record::Fleet(report) => db.append_fleet_report(report).await,
            Record::Score {
                agent_id,
                tick,
                score,
                planet_count,
            } => {
                db.append_score_snapshot(agent_id, *tick, *score, *planet_count)
                    .await
            }
        };
        if let Err(err) = result {
            error!("failed to append record: {}", err);
        }
    }
}
