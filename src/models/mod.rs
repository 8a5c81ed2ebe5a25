mod agent;
mod coords;
mod fleet;
mod planet;
mod reports;

pub use agent::*;
pub use coords::*;
pub use fleet::*;
pub use planet::*;
pub use reports::*;

use serde::{Deserialize, Serialize};

/// Stored resource amounts on a planet or carried by a fleet. Energy is a
/// derived display value and lives on the planet directly.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    pub metal: f64,
    pub crystal: f64,
    pub deuterium: f64,
}

impl Resources {
    pub fn new(metal: f64, crystal: f64, deuterium: f64) -> Self {
        Self {
            metal,
            crystal,
            deuterium,
        }
    }

    pub fn total(&self) -> f64 {
        self.metal + self.crystal + self.deuterium
    }

    pub fn floor(&self) -> Self {
        Self {
            metal: self.metal.floor(),
            crystal: self.crystal.floor(),
            deuterium: self.deuterium.floor(),
        }
    }

    pub fn scale(&self, factor: f64) -> Self {
        Self {
            metal: self.metal * factor,
            crystal: self.crystal * factor,
            deuterium: self.deuterium * factor,
        }
    }

    pub fn covers(&self, cost: &Resources) -> bool {
        self.metal >= cost.metal && self.crystal >= cost.crystal && self.deuterium >= cost.deuterium
    }

    pub fn is_valid(&self) -> bool {
        crate::util::is_valid_amount(self.metal)
            && crate::util::is_valid_amount(self.crystal)
            && crate::util::is_valid_amount(self.deuterium)
    }
}

impl std::ops::Add for Resources {
    type Output = Resources;
    fn add(self, rhs: Resources) -> Resources {
        Resources {
            metal: self.metal + rhs.metal,
            crystal: self.crystal + rhs.crystal,
            deuterium: self.deuterium + rhs.deuterium,
        }
    }
}

impl std::ops::Sub for Resources {
    type Output = Resources;
    fn sub(self, rhs: Resources) -> Resources {
        Resources {
            metal: self.metal - rhs.metal,
            crystal: self.crystal - rhs.crystal,
            deuterium: self.deuterium - rhs.deuterium,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resources_covers() {
        let stored = Resources::new(500.0, 300.0, 100.0);
        assert!(stored.covers(&Resources::new(90.0, 22.0, 0.0)));
        assert!(!stored.covers(&Resources::new(501.0, 0.0, 0.0)));
    }

    #[test]
    fn test_planet_id_roundtrip() {
        let id: PlanetId = "1:42:7".parse().unwrap();
        assert_eq!(id.galaxy, 1);
        assert_eq!(id.system, 42);
        assert_eq!(id.position, 7);
        assert_eq!(id.to_string(), "1:42:7");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""1:42:7""#);
        let back: PlanetId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_planet_id_rejects_garbage() {
        assert!("".parse::<PlanetId>().is_err());
        assert!("1:2".parse::<PlanetId>().is_err());
        assert!("a:b:c".parse::<PlanetId>().is_err());
        assert!("1:2:3:4".parse::<PlanetId>().is_err());
        assert!("0:5:5".parse::<PlanetId>().is_err());
    }
}
