use lazy_static::lazy_static;
use regex::Regex;

pub struct Config {
    pub game_speed: f64,
    pub galaxies: i32,
    pub systems_per_galaxy: i32,
    pub positions_per_system: i32,
    pub max_wallets_per_ip: usize,
    pub lock_timeout_ms: u64,
    pub tick_ms: u64,
    pub save_debounce_ms: u64,
    pub persist_interval_ticks: u64,
    pub score_snapshot_interval_ticks: u64,
    pub newbie_score_floor: f64,
    pub newbie_age_hours: i64,
    pub newbie_score_ratio: f64,
    pub display_name_filter: Regex,
    pub http_addr: String,
    pub combat_seed: Option<u64>,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(val) if !val.is_empty() => val
            .parse()
            .unwrap_or_else(|_| panic!("Invalid value for {}", key)),
        _ => default,
    }
}

lazy_static! {
    pub static ref CONFIG: Config = {
        let combat_seed = match std::env::var("COMBAT_SEED") {
            Ok(val) if !val.is_empty() => {
                Some(val.parse().expect("Invalid COMBAT_SEED"))
            }
            _ => None,
        };
        Config {
            game_speed: env_parse("GAME_SPEED", 10.0),
            galaxies: env_parse("GALAXIES", 5),
            systems_per_galaxy: env_parse("SYSTEMS_PER_GALAXY", 200),
            positions_per_system: env_parse("POSITIONS_PER_SYSTEM", 15),
            max_wallets_per_ip: env_parse("MAX_WALLETS_PER_IP", 3),
            lock_timeout_ms: env_parse("LOCK_TIMEOUT_MS", 5000),
            tick_ms: env_parse("TICK_MS", 1000),
            save_debounce_ms: env_parse("SAVE_DEBOUNCE_MS", 100),
            persist_interval_ticks: env_parse("PERSIST_INTERVAL_TICKS", 10),
            score_snapshot_interval_ticks: env_parse("SCORE_SNAPSHOT_INTERVAL_TICKS", 100),
            newbie_score_floor: env_parse("NEWBIE_SCORE_FLOOR", 1000.0),
            newbie_age_hours: env_parse("NEWBIE_AGE_HOURS", 48),
            newbie_score_ratio: env_parse("NEWBIE_SCORE_RATIO", 10.0),
            display_name_filter: Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 _\-]{1,23}$")
                .expect("Invalid display name regex"),
            http_addr: env_parse("HTTP_ADDR", "0.0.0.0:8080".to_string()),
            combat_seed,
        }
    };
}
