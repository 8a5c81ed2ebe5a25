use serde::{Deserialize, Serialize};

/// Identifier enums for all game content. Unknown or reserved identifiers
/// fail to parse at the boundary, before any table lookup.
macro_rules! id_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
            strum::Display,
            strum::EnumString,
            strum::EnumIter,
        )]
        #[serde(rename_all = "camelCase")]
        #[strum(serialize_all = "camelCase")]
        pub enum $name {
            $($variant),+
        }
    };
}

id_enum!(BuildingId {
    MetalMine,
    CrystalMine,
    DeuteriumSynthesizer,
    SolarPlant,
    FusionReactor,
    RoboticsFactory,
    NaniteFactory,
    Shipyard,
    ResearchLab,
    MetalStorage,
    CrystalStorage,
    DeuteriumTank,
});

id_enum!(ShipId {
    SmallCargo,
    LargeCargo,
    LightFighter,
    HeavyFighter,
    Cruiser,
    Battleship,
    ColonyShip,
    Recycler,
    EspionageProbe,
    Bomber,
    Destroyer,
    Battlecruiser,
});

id_enum!(DefenseId {
    RocketLauncher,
    LightLaser,
    HeavyLaser,
    GaussCannon,
    IonCannon,
    PlasmaTurret,
    SmallShieldDome,
    LargeShieldDome,
});

id_enum!(TechId {
    EnergyTech,
    LaserTech,
    IonTech,
    HyperspaceTech,
    PlasmaTech,
    CombustionDrive,
    ImpulseDrive,
    HyperspaceDrive,
    EspionageTech,
    ComputerTech,
    Astrophysics,
    ResearchNetwork,
    WeaponsTech,
    ShieldingTech,
    ArmourTech,
});

id_enum!(OfficerId {
    Overseer,
    Admiral,
    Prospector,
    Technocrat,
});

id_enum!(BoosterId {
    MetalBooster,
    CrystalBooster,
    DeuteriumBooster,
    OmniBooster,
});

id_enum!(PoolId {
    NovaPool,
    PulsarPool,
    QuasarPool,
});

id_enum!(ResourceKind {
    Metal,
    Crystal,
    Deuterium,
});

/// A combat participant type: a ship on either side or a defensive
/// installation on the defending side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "id")]
pub enum UnitType {
    Ship(ShipId),
    Defense(DefenseId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_identifiers_parse_camel_case() {
        assert_eq!(
            BuildingId::from_str("metalMine").unwrap(),
            BuildingId::MetalMine
        );
        assert_eq!(
            ShipId::from_str("lightFighter").unwrap(),
            ShipId::LightFighter
        );
        assert_eq!(TechId::from_str("astrophysics").unwrap(), TechId::Astrophysics);
        assert_eq!(BuildingId::MetalMine.to_string(), "metalMine");
    }

    #[test]
    fn test_reserved_identifiers_rejected() {
        // Prototype-style key collisions cannot reach the tables.
        assert!(BuildingId::from_str("__proto__").is_err());
        assert!(BuildingId::from_str("constructor").is_err());
        assert!(ShipId::from_str("hasOwnProperty").is_err());
        assert!(ShipId::from_str("deathStar").is_err());
    }
}
