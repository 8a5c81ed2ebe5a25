use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Planet coordinates, written `galaxy:system:position`. Doubles as the
/// planet's identifier everywhere, including map keys in the wire format, so
/// it serializes as the display string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlanetId {
    pub galaxy: i32,
    pub system: i32,
    pub position: i32,
}

impl PlanetId {
    pub fn new(galaxy: i32, system: i32, position: i32) -> Self {
        Self {
            galaxy,
            system,
            position,
        }
    }

    pub fn system_id(&self) -> SystemId {
        SystemId {
            galaxy: self.galaxy,
            system: self.system,
        }
    }
}

impl fmt::Display for PlanetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.galaxy, self.system, self.position)
    }
}

impl FromStr for PlanetId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let galaxy = parse_coord(parts.next(), s)?;
        let system = parse_coord(parts.next(), s)?;
        let position = parse_coord(parts.next(), s)?;
        if parts.next().is_some() {
            return Err(format!("invalid coordinates: {}", s));
        }
        Ok(PlanetId {
            galaxy,
            system,
            position,
        })
    }
}

/// A star system, written `galaxy:system`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId {
    pub galaxy: i32,
    pub system: i32,
}

impl SystemId {
    pub fn new(galaxy: i32, system: i32) -> Self {
        Self { galaxy, system }
    }

    pub fn planet(&self, position: i32) -> PlanetId {
        PlanetId::new(self.galaxy, self.system, position)
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.galaxy, self.system)
    }
}

impl FromStr for SystemId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let galaxy = parse_coord(parts.next(), s)?;
        let system = parse_coord(parts.next(), s)?;
        if parts.next().is_some() {
            return Err(format!("invalid system coordinates: {}", s));
        }
        Ok(SystemId { galaxy, system })
    }
}

fn parse_coord(part: Option<&str>, full: &str) -> Result<i32, String> {
    let value: i32 = part
        .ok_or_else(|| format!("invalid coordinates: {}", full))?
        .parse()
        .map_err(|_| format!("invalid coordinates: {}", full))?;
    if value < 1 {
        return Err(format!("invalid coordinates: {}", full));
    }
    Ok(value)
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

string_serde!(PlanetId);
string_serde!(SystemId);
