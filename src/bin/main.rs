use rand::Rng as _;
use std::sync::Arc;
use tracing::{error, info};
use voidwar::config::CONFIG;
use voidwar::database::DbClient;
use voidwar::engine::{persist, Engine};
use voidwar::universe::Universe;
use voidwar::web_api_server::WebApiServer;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!(
        "Starting voidwar server (speed {}, tick {}ms)",
        CONFIG.game_speed, CONFIG.tick_ms
    );

    // A failed load at boot is fatal; a half-read universe must never tick.
    let db = DbClient::new().await;
    let snapshot = db.load_universe().await;
    let universe = Arc::new(Universe::from_snapshot(snapshot));

    let seed = CONFIG
        .combat_seed
        .unwrap_or_else(|| rand::rng().random());
    info!("Engine PRNG seed: {}", seed);
    let (engine, rx) = Engine::new(universe.clone(), seed);

    tokio::spawn(persist::run_writer(db.clone(), universe.clone(), rx.dirty));
    tokio::spawn(persist::run_recorder(db.clone(), rx.records));
    tokio::spawn(engine.clone().run_loop());

    let server = WebApiServer::new(&engine, &db);
    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    // Final save on the way out.
    if let Err(err) = db.save_universe(&universe.snapshot()).await {
        error!("final save failed: {}", err);
    } else {
        info!("Final save complete at tick {}", universe.tick());
    }
}
