//! Star-system naming: a small pre-seeded table plus a procedural generator.
//! Uniqueness is enforced against the universe-wide issued-name set; the
//! generator retries a bounded number of draws.

use crate::models::SystemId;
use rand::seq::IndexedRandom as _;
use rand::Rng;

pub const MAX_NAME_ATTEMPTS: usize = 100;

const PREFIXES: &[&str] = &[
    "Alpha", "Beta", "Gamma", "Delta", "Epsilon", "Theta", "Sigma", "Tau", "Omicron", "Zeta",
];

const ROOTS: &[&str] = &[
    "Cygnus", "Orion", "Vega", "Altair", "Rigel", "Antares", "Castor", "Pollux", "Deneb",
    "Spica", "Arcturus", "Capella", "Mirach", "Alcor", "Thuban", "Sargas", "Nashira", "Electra",
];

const SUFFIXES: &[&str] = &[
    "Prime", "Major", "Minor", "Secundus", "Tertius", "Reach", "Expanse", "Gate",
];

const STANDALONE: &[&str] = &[
    "Serpens", "Aquila", "Lyra", "Draco", "Corvus", "Phoenix", "Hydra", "Pegasus", "Cetus",
    "Volans", "Tucana", "Carina", "Fornax", "Grus", "Lacerta",
];

const MODIFIERS: &[&str] = &["Rift", "Verge", "Cluster", "Drift", "Veil", "Shoal", "Maw"];

const NUMERALS: &[&str] = &[
    "I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "XI", "XII",
];

/// Names fixed before the universe opened; everything else is generated.
pub fn seeded_name(id: SystemId) -> Option<&'static str> {
    match (id.galaxy, id.system) {
        (1, 1) => Some("Haven Prime"),
        (1, 2) => Some("Kessler's Drift"),
        (1, 100) => Some("Meridian Gate"),
        (2, 1) => Some("Outer Veritas"),
        (3, 50) => Some("The Anvil"),
        (5, 200) => Some("Terminus"),
        _ => None,
    }
}

/// One candidate draw in one of three styles.
pub fn draw_name(rng: &mut impl Rng) -> String {
    match rng.random_range(0..3) {
        0 => format!(
            "{} {} {}",
            PREFIXES.choose(rng).unwrap(),
            ROOTS.choose(rng).unwrap(),
            SUFFIXES.choose(rng).unwrap()
        ),
        1 => format!(
            "{} {}",
            STANDALONE.choose(rng).unwrap(),
            MODIFIERS.choose(rng).unwrap()
        ),
        _ => format!(
            "{} {}",
            ROOTS.choose(rng).unwrap(),
            NUMERALS.choose(rng).unwrap()
        ),
    }
}
