use crate::catalog::ids::*;
use crate::models::Resources;
use lazy_static::lazy_static;
use maplit::btreemap;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Building(BuildingId, u32),
    Tech(TechId, u32),
}

#[derive(Debug, Clone)]
pub struct BuildingStats {
    pub base_cost: Resources,
    pub cost_factor: f64,
    pub requirements: Vec<Requirement>,
}

#[derive(Debug, Clone)]
pub struct ShipStats {
    pub cost: Resources,
    pub cargo: f64,
    /// Per-trip fuel rate, scaled by distance.
    pub fuel: f64,
    pub attack: f64,
    pub shield: f64,
    pub requirements: Vec<Requirement>,
}

impl ShipStats {
    /// Structural integrity; combat hull is a tenth of this.
    pub fn base_hull(&self) -> f64 {
        self.cost.metal + self.cost.crystal
    }
}

#[derive(Debug, Clone)]
pub struct DefenseStats {
    pub cost: Resources,
    pub attack: f64,
    pub shield: f64,
    /// Per-planet cap, e.g. one shield dome of each kind.
    pub cap: Option<u32>,
    pub requirements: Vec<Requirement>,
}

impl DefenseStats {
    pub fn base_hull(&self) -> f64 {
        self.cost.metal + self.cost.crystal
    }
}

#[derive(Debug, Clone)]
pub struct TechStats {
    pub base_cost: Resources,
    pub cost_factor: f64,
    /// Required research-lab level on the researching planet.
    pub lab_level: u32,
    pub requirements: Vec<Requirement>,
}

fn res(metal: f64, crystal: f64, deuterium: f64) -> Resources {
    Resources::new(metal, crystal, deuterium)
}

use Requirement::{Building as ReqB, Tech as ReqT};

lazy_static! {
    pub static ref BUILDINGS: BTreeMap<BuildingId, BuildingStats> = {
        use BuildingId::*;
        btreemap! {
            MetalMine => BuildingStats { base_cost: res(60.0, 15.0, 0.0), cost_factor: 1.5, requirements: vec![] },
            CrystalMine => BuildingStats { base_cost: res(48.0, 24.0, 0.0), cost_factor: 1.5, requirements: vec![] },
            DeuteriumSynthesizer => BuildingStats { base_cost: res(225.0, 75.0, 0.0), cost_factor: 1.5, requirements: vec![] },
            SolarPlant => BuildingStats { base_cost: res(75.0, 30.0, 0.0), cost_factor: 1.5, requirements: vec![] },
            FusionReactor => BuildingStats {
                base_cost: res(900.0, 360.0, 180.0),
                cost_factor: 1.8,
                requirements: vec![ReqB(DeuteriumSynthesizer, 5), ReqT(TechId::EnergyTech, 3)],
            },
            RoboticsFactory => BuildingStats { base_cost: res(400.0, 120.0, 200.0), cost_factor: 1.5, requirements: vec![] },
            NaniteFactory => BuildingStats {
                base_cost: res(1_000_000.0, 500_000.0, 100_000.0),
                cost_factor: 1.5,
                requirements: vec![ReqB(RoboticsFactory, 10), ReqT(TechId::ComputerTech, 10)],
            },
            Shipyard => BuildingStats {
                base_cost: res(400.0, 200.0, 100.0),
                cost_factor: 1.5,
                requirements: vec![ReqB(RoboticsFactory, 2)],
            },
            ResearchLab => BuildingStats { base_cost: res(200.0, 400.0, 200.0), cost_factor: 1.5, requirements: vec![] },
            MetalStorage => BuildingStats { base_cost: res(1000.0, 0.0, 0.0), cost_factor: 2.0, requirements: vec![] },
            CrystalStorage => BuildingStats { base_cost: res(1000.0, 500.0, 0.0), cost_factor: 2.0, requirements: vec![] },
            DeuteriumTank => BuildingStats { base_cost: res(1000.0, 1000.0, 0.0), cost_factor: 2.0, requirements: vec![] },
        }
    };

    pub static ref SHIPS: BTreeMap<ShipId, ShipStats> = {
        use ShipId::*;
        btreemap! {
            SmallCargo => ShipStats {
                cost: res(2000.0, 2000.0, 0.0), cargo: 5000.0, fuel: 10.0, attack: 5.0, shield: 10.0,
                requirements: vec![ReqB(BuildingId::Shipyard, 2), ReqT(TechId::CombustionDrive, 2)],
            },
            LargeCargo => ShipStats {
                cost: res(6000.0, 6000.0, 0.0), cargo: 25000.0, fuel: 50.0, attack: 5.0, shield: 25.0,
                requirements: vec![ReqB(BuildingId::Shipyard, 4), ReqT(TechId::CombustionDrive, 6)],
            },
            LightFighter => ShipStats {
                cost: res(3000.0, 1000.0, 0.0), cargo: 50.0, fuel: 20.0, attack: 50.0, shield: 10.0,
                requirements: vec![ReqB(BuildingId::Shipyard, 1), ReqT(TechId::CombustionDrive, 1)],
            },
            HeavyFighter => ShipStats {
                cost: res(6000.0, 4000.0, 0.0), cargo: 100.0, fuel: 75.0, attack: 150.0, shield: 25.0,
                requirements: vec![ReqB(BuildingId::Shipyard, 3), ReqT(TechId::ArmourTech, 2), ReqT(TechId::ImpulseDrive, 2)],
            },
            Cruiser => ShipStats {
                cost: res(20000.0, 7000.0, 2000.0), cargo: 800.0, fuel: 300.0, attack: 400.0, shield: 50.0,
                requirements: vec![ReqB(BuildingId::Shipyard, 5), ReqT(TechId::ImpulseDrive, 4), ReqT(TechId::IonTech, 2)],
            },
            Battleship => ShipStats {
                cost: res(45000.0, 15000.0, 0.0), cargo: 1500.0, fuel: 500.0, attack: 1000.0, shield: 200.0,
                requirements: vec![ReqB(BuildingId::Shipyard, 7), ReqT(TechId::HyperspaceDrive, 4)],
            },
            ColonyShip => ShipStats {
                cost: res(10000.0, 20000.0, 10000.0), cargo: 7500.0, fuel: 1000.0, attack: 50.0, shield: 100.0,
                requirements: vec![ReqB(BuildingId::Shipyard, 4), ReqT(TechId::ImpulseDrive, 3)],
            },
            Recycler => ShipStats {
                cost: res(10000.0, 6000.0, 2000.0), cargo: 20000.0, fuel: 300.0, attack: 1.0, shield: 10.0,
                requirements: vec![ReqB(BuildingId::Shipyard, 4), ReqT(TechId::CombustionDrive, 6), ReqT(TechId::ShieldingTech, 2)],
            },
            EspionageProbe => ShipStats {
                cost: res(0.0, 1000.0, 0.0), cargo: 5.0, fuel: 1.0, attack: 0.0, shield: 0.01,
                requirements: vec![ReqB(BuildingId::Shipyard, 3), ReqT(TechId::CombustionDrive, 3), ReqT(TechId::EspionageTech, 2)],
            },
            Bomber => ShipStats {
                cost: res(50000.0, 25000.0, 15000.0), cargo: 500.0, fuel: 1000.0, attack: 1000.0, shield: 500.0,
                requirements: vec![ReqB(BuildingId::Shipyard, 8), ReqT(TechId::ImpulseDrive, 6), ReqT(TechId::PlasmaTech, 5)],
            },
            Destroyer => ShipStats {
                cost: res(60000.0, 50000.0, 15000.0), cargo: 2000.0, fuel: 1000.0, attack: 2000.0, shield: 500.0,
                requirements: vec![ReqB(BuildingId::Shipyard, 9), ReqT(TechId::HyperspaceDrive, 6), ReqT(TechId::HyperspaceTech, 5)],
            },
            Battlecruiser => ShipStats {
                cost: res(30000.0, 40000.0, 15000.0), cargo: 750.0, fuel: 250.0, attack: 700.0, shield: 400.0,
                requirements: vec![ReqB(BuildingId::Shipyard, 8), ReqT(TechId::HyperspaceTech, 5), ReqT(TechId::HyperspaceDrive, 5), ReqT(TechId::LaserTech, 12)],
            },
        }
    };

    pub static ref DEFENSES: BTreeMap<DefenseId, DefenseStats> = {
        use DefenseId::*;
        btreemap! {
            RocketLauncher => DefenseStats {
                cost: res(2000.0, 0.0, 0.0), attack: 40.0, shield: 20.0, cap: None,
                requirements: vec![ReqB(BuildingId::Shipyard, 1)],
            },
            LightLaser => DefenseStats {
                cost: res(1500.0, 500.0, 0.0), attack: 100.0, shield: 25.0, cap: None,
                requirements: vec![ReqB(BuildingId::Shipyard, 2), ReqT(TechId::LaserTech, 3)],
            },
            HeavyLaser => DefenseStats {
                cost: res(6000.0, 2000.0, 0.0), attack: 250.0, shield: 100.0, cap: None,
                requirements: vec![ReqB(BuildingId::Shipyard, 4), ReqT(TechId::EnergyTech, 3), ReqT(TechId::LaserTech, 6)],
            },
            GaussCannon => DefenseStats {
                cost: res(20000.0, 15000.0, 2000.0), attack: 1100.0, shield: 200.0, cap: None,
                requirements: vec![ReqB(BuildingId::Shipyard, 6), ReqT(TechId::WeaponsTech, 3), ReqT(TechId::EnergyTech, 6), ReqT(TechId::ShieldingTech, 1)],
            },
            IonCannon => DefenseStats {
                cost: res(2000.0, 6000.0, 0.0), attack: 150.0, shield: 500.0, cap: None,
                requirements: vec![ReqB(BuildingId::Shipyard, 4), ReqT(TechId::IonTech, 4)],
            },
            PlasmaTurret => DefenseStats {
                cost: res(50000.0, 50000.0, 30000.0), attack: 3000.0, shield: 300.0, cap: None,
                requirements: vec![ReqB(BuildingId::Shipyard, 8), ReqT(TechId::PlasmaTech, 7)],
            },
            SmallShieldDome => DefenseStats {
                cost: res(10000.0, 10000.0, 0.0), attack: 1.0, shield: 2000.0, cap: Some(1),
                requirements: vec![ReqB(BuildingId::Shipyard, 1), ReqT(TechId::ShieldingTech, 2)],
            },
            LargeShieldDome => DefenseStats {
                cost: res(50000.0, 50000.0, 0.0), attack: 1.0, shield: 10000.0, cap: Some(1),
                requirements: vec![ReqB(BuildingId::Shipyard, 6), ReqT(TechId::ShieldingTech, 6)],
            },
        }
    };

    pub static ref TECHS: BTreeMap<TechId, TechStats> = {
        use TechId::*;
        btreemap! {
            EnergyTech => TechStats { base_cost: res(0.0, 800.0, 400.0), cost_factor: 2.0, lab_level: 1, requirements: vec![] },
            LaserTech => TechStats { base_cost: res(200.0, 100.0, 0.0), cost_factor: 2.0, lab_level: 1, requirements: vec![ReqT(EnergyTech, 2)] },
            IonTech => TechStats { base_cost: res(1000.0, 300.0, 100.0), cost_factor: 2.0, lab_level: 4, requirements: vec![ReqT(LaserTech, 5), ReqT(EnergyTech, 4)] },
            HyperspaceTech => TechStats { base_cost: res(0.0, 4000.0, 2000.0), cost_factor: 2.0, lab_level: 7, requirements: vec![ReqT(EnergyTech, 5), ReqT(ShieldingTech, 5)] },
            PlasmaTech => TechStats { base_cost: res(2000.0, 4000.0, 1000.0), cost_factor: 2.0, lab_level: 4, requirements: vec![ReqT(EnergyTech, 8), ReqT(LaserTech, 10), ReqT(IonTech, 5)] },
            CombustionDrive => TechStats { base_cost: res(400.0, 0.0, 600.0), cost_factor: 2.0, lab_level: 1, requirements: vec![ReqT(EnergyTech, 1)] },
            ImpulseDrive => TechStats { base_cost: res(2000.0, 4000.0, 600.0), cost_factor: 2.0, lab_level: 2, requirements: vec![ReqT(EnergyTech, 1)] },
            HyperspaceDrive => TechStats { base_cost: res(10000.0, 20000.0, 6000.0), cost_factor: 2.0, lab_level: 7, requirements: vec![ReqT(HyperspaceTech, 3)] },
            EspionageTech => TechStats { base_cost: res(200.0, 1000.0, 200.0), cost_factor: 2.0, lab_level: 3, requirements: vec![] },
            ComputerTech => TechStats { base_cost: res(0.0, 400.0, 600.0), cost_factor: 2.0, lab_level: 1, requirements: vec![] },
            Astrophysics => TechStats { base_cost: res(4000.0, 8000.0, 4000.0), cost_factor: 1.75, lab_level: 3, requirements: vec![ReqT(EspionageTech, 4), ReqT(ImpulseDrive, 3)] },
            ResearchNetwork => TechStats { base_cost: res(240_000.0, 400_000.0, 160_000.0), cost_factor: 2.0, lab_level: 10, requirements: vec![ReqT(ComputerTech, 8), ReqT(HyperspaceTech, 8)] },
            WeaponsTech => TechStats { base_cost: res(800.0, 200.0, 0.0), cost_factor: 2.0, lab_level: 4, requirements: vec![] },
            ShieldingTech => TechStats { base_cost: res(200.0, 600.0, 0.0), cost_factor: 2.0, lab_level: 6, requirements: vec![ReqT(EnergyTech, 3)] },
            ArmourTech => TechStats { base_cost: res(1000.0, 0.0, 0.0), cost_factor: 2.0, lab_level: 2, requirements: vec![] },
        }
    };

    /// Rapidfire: the chance of an immediate bonus shot against the target
    /// type is `(r - 1) / r`.
    pub static ref RAPIDFIRE: BTreeMap<ShipId, BTreeMap<UnitType, u32>> = {
        use ShipId::*;
        let probe = UnitType::Ship(EspionageProbe);
        btreemap! {
            HeavyFighter => btreemap! { UnitType::Ship(SmallCargo) => 3, probe => 5 },
            Cruiser => btreemap! {
                UnitType::Ship(LightFighter) => 6,
                UnitType::Defense(DefenseId::RocketLauncher) => 10,
                probe => 5,
            },
            Battleship => btreemap! { probe => 5 },
            Bomber => btreemap! {
                UnitType::Defense(DefenseId::RocketLauncher) => 20,
                UnitType::Defense(DefenseId::LightLaser) => 20,
                UnitType::Defense(DefenseId::HeavyLaser) => 10,
                UnitType::Defense(DefenseId::IonCannon) => 10,
            },
            Destroyer => btreemap! {
                UnitType::Defense(DefenseId::LightLaser) => 10,
                UnitType::Ship(Battlecruiser) => 2,
                probe => 5,
            },
            Battlecruiser => btreemap! {
                UnitType::Ship(SmallCargo) => 3,
                UnitType::Ship(LargeCargo) => 3,
                UnitType::Ship(HeavyFighter) => 4,
                UnitType::Ship(Cruiser) => 4,
                UnitType::Ship(Battleship) => 7,
            },
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_every_identifier_has_stats() {
        for building in BuildingId::iter() {
            assert!(BUILDINGS.contains_key(&building), "{building}");
        }
        for ship in ShipId::iter() {
            assert!(SHIPS.contains_key(&ship), "{ship}");
        }
        for defense in DefenseId::iter() {
            assert!(DEFENSES.contains_key(&defense), "{defense}");
        }
        for tech in TechId::iter() {
            assert!(TECHS.contains_key(&tech), "{tech}");
        }
    }

    #[test]
    fn test_shield_domes_are_capped() {
        assert_eq!(DEFENSES[&DefenseId::SmallShieldDome].cap, Some(1));
        assert_eq!(DEFENSES[&DefenseId::LargeShieldDome].cap, Some(1));
    }

    #[test]
    fn test_rapidfire_references_valid_units() {
        for (ship, targets) in RAPIDFIRE.iter() {
            assert!(SHIPS.contains_key(ship));
            for (target, r) in targets {
                assert!(*r > 1);
                match target {
                    UnitType::Ship(s) => assert!(SHIPS.contains_key(s)),
                    UnitType::Defense(d) => assert!(DEFENSES.contains_key(d)),
                }
            }
        }
    }
}
