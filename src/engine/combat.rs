//! Deterministic battle resolution. All randomness comes from the caller's
//! seedable PRNG, so a fixed seed reproduces the full engagement.

use crate::catalog::{self, DefenseId, ShipId, TechId, UnitType, DEFENSES, RAPIDFIRE, SHIPS};
use crate::models::BattleWinner;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;

pub const MAX_ROUNDS: u32 = 6;

/// Hull fraction below which a damaged unit risks going up on every
/// subsequent hit.
const EXPLOSION_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, Default)]
pub struct TechLevels {
    pub weapons: u32,
    pub shielding: u32,
    pub armour: u32,
}

impl TechLevels {
    pub fn of(agent: &crate::models::Agent) -> Self {
        Self {
            weapons: agent.tech_level(TechId::WeaponsTech),
            shielding: agent.tech_level(TechId::ShieldingTech),
            armour: agent.tech_level(TechId::ArmourTech),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CombatOutcome {
    pub winner: BattleWinner,
    pub rounds: u32,
    pub attacker_survivors: BTreeMap<ShipId, u32>,
    pub attacker_losses: BTreeMap<ShipId, u32>,
    pub defender_survivors: BTreeMap<ShipId, u32>,
    pub defender_losses: BTreeMap<ShipId, u32>,
    pub defense_survivors: BTreeMap<DefenseId, u32>,
    pub defense_losses: BTreeMap<DefenseId, u32>,
}

#[derive(Debug, Clone)]
struct Unit {
    unit_type: UnitType,
    attack: f64,
    max_shield: f64,
    shield: f64,
    hull: f64,
    initial_hull: f64,
    alive: bool,
}

impl Unit {
    fn ship(ship: ShipId, tech: TechLevels) -> Self {
        let stats = &SHIPS[&ship];
        let hull = (stats.base_hull() / 10.0) * (1.0 + 0.1 * tech.armour as f64);
        Self {
            unit_type: UnitType::Ship(ship),
            attack: stats.attack * (1.0 + 0.1 * tech.weapons as f64),
            max_shield: stats.shield * (1.0 + 0.1 * tech.shielding as f64),
            shield: 0.0,
            hull,
            initial_hull: hull,
            alive: true,
        }
    }

    fn defense(defense: DefenseId, tech: TechLevels) -> Self {
        let stats = &DEFENSES[&defense];
        let hull = (stats.base_hull() / 10.0) * (1.0 + 0.1 * tech.armour as f64);
        Self {
            unit_type: UnitType::Defense(defense),
            attack: stats.attack * (1.0 + 0.1 * tech.weapons as f64),
            max_shield: stats.shield * (1.0 + 0.1 * tech.shielding as f64),
            shield: 0.0,
            hull,
            initial_hull: hull,
            alive: true,
        }
    }
}

fn expand_side(
    ships: &BTreeMap<ShipId, u32>,
    defenses: Option<&BTreeMap<DefenseId, u32>>,
    tech: TechLevels,
) -> Vec<Unit> {
    let mut units = Vec::new();
    for (ship, &count) in ships {
        for _ in 0..count {
            units.push(Unit::ship(*ship, tech));
        }
    }
    if let Some(defenses) = defenses {
        for (defense, &count) in defenses {
            for _ in 0..count {
                units.push(Unit::defense(*defense, tech));
            }
        }
    }
    units
}

fn alive_indices(units: &[Unit]) -> Vec<usize> {
    units
        .iter()
        .enumerate()
        .filter(|(_, unit)| unit.alive)
        .map(|(index, _)| index)
        .collect()
}

/// One shot. Damage goes to shield first, then hull; a shot under 1% of the
/// current shield bounces entirely. A unit already below the hull threshold
/// risks destruction on every hit that lands.
fn apply_shot(target: &mut Unit, damage: f64, rng: &mut impl Rng) {
    if target.shield > 0.0 && damage < 0.01 * target.shield {
        return;
    }
    if damage <= target.shield {
        target.shield -= damage;
    } else {
        let breach = damage - target.shield;
        target.shield = 0.0;
        target.hull -= breach;
    }
    if target.hull <= 0.0 {
        target.alive = false;
        return;
    }
    if target.hull < EXPLOSION_THRESHOLD * target.initial_hull {
        let explosion_chance = 1.0 - target.hull / target.initial_hull;
        if rng.random_bool(explosion_chance.clamp(0.0, 1.0)) {
            target.hull = 0.0;
            target.alive = false;
        }
    }
}

/// A unit fires once, then chains rapidfire bonus shots while the dice allow.
fn fire(shooter: Unit, targets: &mut [Unit], rng: &mut impl Rng) {
    let rapidfire = match shooter.unit_type {
        UnitType::Ship(ship) => RAPIDFIRE.get(&ship),
        UnitType::Defense(_) => None,
    };
    loop {
        let candidates = alive_indices(targets);
        if candidates.is_empty() {
            return;
        }
        let target_index = candidates[rng.random_range(0..candidates.len())];
        let target_type = targets[target_index].unit_type;
        apply_shot(&mut targets[target_index], shooter.attack, rng);

        let chain = rapidfire
            .and_then(|table| table.get(&target_type))
            .copied()
            .filter(|&r| r > 1)
            .map(|r| {
                let r = r as f64;
                rng.random_bool((r - 1.0) / r)
            })
            .unwrap_or(false);
        if !chain {
            return;
        }
    }
}

fn volley(shooters: &[Unit], targets: &mut [Unit], rng: &mut impl Rng) {
    for index in 0..shooters.len() {
        if !shooters[index].alive {
            continue;
        }
        fire(shooters[index].clone(), targets, rng);
        if alive_indices(targets).is_empty() {
            return;
        }
    }
}

fn tally(units: &[Unit]) -> (BTreeMap<ShipId, u32>, BTreeMap<DefenseId, u32>) {
    let mut ships = BTreeMap::new();
    let mut defenses = BTreeMap::new();
    for unit in units.iter().filter(|unit| unit.alive) {
        match unit.unit_type {
            UnitType::Ship(ship) => *ships.entry(ship).or_insert(0) += 1,
            UnitType::Defense(defense) => *defenses.entry(defense).or_insert(0) += 1,
        }
    }
    (ships, defenses)
}

fn losses<K: Ord + Copy>(
    initial: &BTreeMap<K, u32>,
    survivors: &BTreeMap<K, u32>,
) -> BTreeMap<K, u32> {
    initial
        .iter()
        .filter_map(|(key, &count)| {
            let lost = count - survivors.get(key).copied().unwrap_or(0);
            (lost > 0).then_some((*key, lost))
        })
        .collect()
}

pub fn resolve(
    attacker_ships: &BTreeMap<ShipId, u32>,
    attacker_tech: TechLevels,
    defender_ships: &BTreeMap<ShipId, u32>,
    defender_defenses: &BTreeMap<DefenseId, u32>,
    defender_tech: TechLevels,
    rng: &mut impl Rng,
) -> CombatOutcome {
    let mut attackers = expand_side(attacker_ships, None, attacker_tech);
    let mut defenders = expand_side(defender_ships, Some(defender_defenses), defender_tech);

    let mut rounds = 0;
    while rounds < MAX_ROUNDS {
        let attackers_left = !alive_indices(&attackers).is_empty();
        let defenders_left = !alive_indices(&defenders).is_empty();
        if !attackers_left || !defenders_left {
            break;
        }
        rounds += 1;

        for unit in attackers.iter_mut().chain(defenders.iter_mut()) {
            if unit.alive {
                unit.shield = unit.max_shield;
            }
        }
        volley(&attackers, &mut defenders, rng);
        volley(&defenders, &mut attackers, rng);
    }

    let (attacker_survivors, _) = tally(&attackers);
    let (defender_survivors, defense_survivors) = tally(&defenders);

    let attacker_alive = attacker_survivors.values().any(|&count| count > 0);
    let defender_alive = defender_survivors.values().any(|&count| count > 0)
        || defense_survivors.values().any(|&count| count > 0);
    let winner = match (attacker_alive, defender_alive) {
        (true, false) => BattleWinner::Attacker,
        (false, true) => BattleWinner::Defender,
        _ => BattleWinner::Draw,
    };

    CombatOutcome {
        winner,
        rounds,
        attacker_losses: losses(attacker_ships, &attacker_survivors),
        defender_losses: losses(defender_ships, &defender_survivors),
        defense_losses: losses(defender_defenses, &defense_survivors),
        attacker_survivors,
        defender_survivors,
        defense_survivors,
    }
}

/// Debris left behind: 30% of the metal and crystal cost of every destroyed
/// ship on both sides. Defenses do not contribute.
pub fn debris_from_losses(
    attacker_losses: &BTreeMap<ShipId, u32>,
    defender_losses: &BTreeMap<ShipId, u32>,
) -> (f64, f64) {
    let mut metal = 0.0;
    let mut crystal = 0.0;
    for (ship, &count) in attacker_losses.iter().chain(defender_losses.iter()) {
        let cost = catalog::ship_cost(*ship, count);
        metal += 0.30 * cost.metal;
        crystal += 0.30 * cost.crystal;
    }
    (metal, crystal)
}

/// Stateless what-if battle summary over N trials.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub trials: u32,
    pub attacker_wins: u32,
    pub defender_wins: u32,
    pub draws: u32,
    pub mean_attacker_survivors: f64,
    pub mean_defender_survivors: f64,
}

pub fn simulate(
    attacker_ships: &BTreeMap<ShipId, u32>,
    attacker_tech: TechLevels,
    defender_ships: &BTreeMap<ShipId, u32>,
    defender_defenses: &BTreeMap<DefenseId, u32>,
    defender_tech: TechLevels,
    trials: u32,
    seed: u64,
) -> SimulationSummary {
    use rand::SeedableRng as _;
    let mut summary = SimulationSummary {
        trials,
        attacker_wins: 0,
        defender_wins: 0,
        draws: 0,
        mean_attacker_survivors: 0.0,
        mean_defender_survivors: 0.0,
    };
    for trial in 0..trials {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed.wrapping_add(trial as u64));
        let outcome = resolve(
            attacker_ships,
            attacker_tech,
            defender_ships,
            defender_defenses,
            defender_tech,
            &mut rng,
        );
        match outcome.winner {
            BattleWinner::Attacker => summary.attacker_wins += 1,
            BattleWinner::Defender => summary.defender_wins += 1,
            BattleWinner::Draw => summary.draws += 1,
        }
        summary.mean_attacker_survivors +=
            outcome.attacker_survivors.values().sum::<u32>() as f64;
        summary.mean_defender_survivors += (outcome.defender_survivors.values().sum::<u32>()
            + outcome.defense_survivors.values().sum::<u32>())
            as f64;
    }
    if trials > 0 {
        summary.mean_attacker_survivors /= trials as f64;
        summary.mean_defender_survivors /= trials as f64;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use rand::SeedableRng as _;
    use rand_chacha::ChaCha8Rng;

    fn fighters_vs_launchers() -> (BTreeMap<ShipId, u32>, BTreeMap<DefenseId, u32>) {
        (
            btreemap! { ShipId::LightFighter => 50 },
            btreemap! { DefenseId::RocketLauncher => 50 },
        )
    }

    #[test]
    fn test_combat_is_deterministic_under_fixed_seed() {
        let (attacker, defenses) = fighters_vs_launchers();
        let run = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            resolve(
                &attacker,
                TechLevels::default(),
                &BTreeMap::new(),
                &defenses,
                TechLevels::default(),
                &mut rng,
            )
        };
        let first = run(42);
        let second = run(42);
        assert_eq!(first.winner, second.winner);
        assert_eq!(first.rounds, second.rounds);
        assert_eq!(first.attacker_survivors, second.attacker_survivors);
        assert_eq!(first.defense_survivors, second.defense_survivors);
        // A different seed is allowed to differ; it must still terminate.
        let other = run(43);
        assert!(other.rounds <= MAX_ROUNDS);
    }

    #[test]
    fn test_fighters_break_rocket_lines() {
        // Canonical baseline: a 4:1 fighter wing levels the rocket line.
        let attacker = btreemap! { ShipId::LightFighter => 200 };
        let defenses = btreemap! { DefenseId::RocketLauncher => 50 };
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let outcome = resolve(
            &attacker,
            TechLevels::default(),
            &BTreeMap::new(),
            &defenses,
            TechLevels::default(),
            &mut rng,
        );
        assert_eq!(outcome.winner, BattleWinner::Attacker);
        assert!(outcome.rounds <= MAX_ROUNDS);
        assert_eq!(outcome.defense_survivors.values().sum::<u32>(), 0);
        assert!(outcome.attacker_survivors[&ShipId::LightFighter] > 0);
    }

    #[test]
    fn test_even_match_favors_the_fighters() {
        // Rocket launchers cannot chew through fighter hulls inside the
        // round limit, so the defense never outright wins an even match.
        let (attacker, defenses) = fighters_vs_launchers();
        let summary = simulate(
            &attacker,
            TechLevels::default(),
            &BTreeMap::new(),
            &defenses,
            TechLevels::default(),
            30,
            11,
        );
        assert_eq!(summary.defender_wins, 0);
        assert!(summary.attacker_wins >= 1);
        assert_eq!(
            summary.attacker_wins + summary.defender_wins + summary.draws,
            summary.trials
        );
    }

    #[test]
    fn test_overwhelming_defense_wins() {
        let attacker = btreemap! { ShipId::LightFighter => 1 };
        let defenses = btreemap! { DefenseId::PlasmaTurret => 20 };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let outcome = resolve(
            &attacker,
            TechLevels::default(),
            &BTreeMap::new(),
            &defenses,
            TechLevels::default(),
            &mut rng,
        );
        assert_eq!(outcome.winner, BattleWinner::Defender);
        assert_eq!(outcome.attacker_losses[&ShipId::LightFighter], 1);
    }

    #[test]
    fn test_weapons_tech_scales_damage() {
        let attacker = btreemap! { ShipId::Cruiser => 30 };
        let defenses = btreemap! { DefenseId::HeavyLaser => 30 };
        let weak = simulate(
            &attacker,
            TechLevels::default(),
            &BTreeMap::new(),
            &defenses,
            TechLevels::default(),
            20,
            5,
        );
        let strong = simulate(
            &attacker,
            TechLevels {
                weapons: 10,
                shielding: 10,
                armour: 10,
            },
            &BTreeMap::new(),
            &defenses,
            TechLevels::default(),
            20,
            5,
        );
        assert!(strong.attacker_wins >= weak.attacker_wins);
        assert!(strong.mean_attacker_survivors >= weak.mean_attacker_survivors);
    }

    #[test]
    fn test_debris_only_counts_ships() {
        let attacker_losses = btreemap! { ShipId::LightFighter => 10 };
        let defender_losses = BTreeMap::new();
        let (metal, crystal) = debris_from_losses(&attacker_losses, &defender_losses);
        // 10 fighters at 3000/1000 each, 30% recoverable.
        assert_eq!(metal, 9000.0);
        assert_eq!(crystal, 3000.0);
    }

    #[test]
    fn test_losses_and_survivors_partition_the_force() {
        let (attacker, defenses) = fighters_vs_launchers();
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let outcome = resolve(
            &attacker,
            TechLevels::default(),
            &BTreeMap::new(),
            &defenses,
            TechLevels::default(),
            &mut rng,
        );
        let surviving = outcome
            .attacker_survivors
            .get(&ShipId::LightFighter)
            .copied()
            .unwrap_or(0);
        let lost = outcome
            .attacker_losses
            .get(&ShipId::LightFighter)
            .copied()
            .unwrap_or(0);
        assert_eq!(surviving + lost, 50);
        let def_surviving = outcome
            .defense_survivors
            .get(&DefenseId::RocketLauncher)
            .copied()
            .unwrap_or(0);
        let def_lost = outcome
            .defense_losses
            .get(&DefenseId::RocketLauncher)
            .copied()
            .unwrap_or(0);
        assert_eq!(def_surviving + def_lost, 50);
    }
}
