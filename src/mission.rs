use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Closed vocabulary of mission commands understood by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Takeoff,
    Waypoint,
    Loiter,
    Survey,
    Rtl,
    Unrecognized,
}

impl CommandKind {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.to_ascii_lowercase()).as_deref() {
            Some("takeoff") => Self::Takeoff,
            Some("waypoint") => Self::Waypoint,
            Some("loiter") => Self::Loiter,
            Some("survey") => Self::Survey,
            Some("rtl") => Self::Rtl,
            _ => Self::Unrecognized,
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Takeoff => "🛫",
            Self::Waypoint => "📍",
            Self::Loiter => "🔄",
            Self::Survey => "🔍",
            Self::Rtl => "🏠",
            Self::Unrecognized => "📌",
        }
    }
}

/// `MAV_CMD` ids the planning service emits in place of `command_type` once a
/// plan has been converted to MISSION_ITEM_INT form.
const MAV_CMD_NAMES: &[(u64, &str)] = &[
    (16, "waypoint"),
    (17, "loiter"),
    (18, "loiter"),
    (19, "loiter"),
    (20, "rtl"),
    (21, "land"),
    (22, "takeoff"),
];

/// MISSION_ITEM_INT carries coordinates as degrees * 1e7.
const COORD_SCALE: f64 = 1e7;

/// Heading is either numeric degrees or a named direction such as `north`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Heading {
    Degrees(f64),
    Named(String),
}

impl fmt::Display for Heading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Heading::Degrees(deg) => write!(f, "{}", deg),
            Heading::Named(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionItem {
    pub seq: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude_units: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mgrs: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<Heading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_reference_frame: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius_units: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_behavior: Option<String>,

    /// Remaining wire fields (MAVLink `frame`, `x`, `param1`, ...). Only read
    /// as fallbacks for display; carried so the state sent back is lossless.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MissionItem {
    pub fn new(seq: i64, command_type: &str) -> Self {
        Self {
            seq,
            command_type: Some(command_type.to_string()),
            altitude: None,
            altitude_units: None,
            latitude: None,
            longitude: None,
            mgrs: None,
            distance: None,
            distance_units: None,
            heading: None,
            relative_reference_frame: None,
            radius: None,
            radius_units: None,
            search_target: None,
            detection_behavior: None,
            extra: Map::new(),
        }
    }

    /// Command name from `command_type`, or from the numeric MAVLink
    /// `command` when the item arrives in wire form.
    pub fn command_name(&self) -> Option<&str> {
        self.command_type.as_deref().or_else(|| {
            let id = self.extra.get("command")?.as_u64()?;
            MAV_CMD_NAMES
                .iter()
                .find(|(cmd, _)| *cmd == id)
                .map(|(_, name)| *name)
        })
    }

    pub fn kind(&self) -> CommandKind {
        CommandKind::parse(self.command_name())
    }

    /// Altitude with its units. Wire-form `z` is already in meters; zero
    /// means unset.
    pub fn altitude_reading(&self) -> Option<(f64, &str)> {
        match self.altitude {
            Some(alt) => Some((alt, self.altitude_units.as_deref().unwrap_or("units"))),
            None => self
                .wire_number("z")
                .filter(|z| *z != 0.0)
                .map(|z| (z, "meters")),
        }
    }

    /// Latitude/longitude, falling back to wire-form `x`/`y`. A zeroed
    /// `x`/`y` pair carries no position.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        if let (Some(lat), Some(lon)) = (self.latitude, self.longitude) {
            return Some((lat, lon));
        }
        match (self.wire_number("x"), self.wire_number("y")) {
            (Some(x), Some(y)) if x != 0.0 || y != 0.0 => {
                Some((x / COORD_SCALE, y / COORD_SCALE))
            }
            _ => None,
        }
    }

    /// Loiter radius with its units, falling back to wire-form `param3`.
    pub fn radius_reading(&self) -> Option<(f64, &str)> {
        match self.radius {
            Some(radius) => Some((radius, self.radius_units.as_deref().unwrap_or("units"))),
            None if self.kind() == CommandKind::Loiter => self
                .wire_number("param3")
                .filter(|r| *r > 0.0)
                .map(|r| (r, "meters")),
            None => None,
        }
    }

    fn wire_number(&self, key: &str) -> Option<f64> {
        self.extra.get(key).and_then(Value::as_f64)
    }
}

/// Reference to a mission item by sequence number, as used in delta lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub seq: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub valid: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub errors: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub warnings: Vec<String>,
}

/// Treats an explicit `null` list the same as a missing one.
pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mission {
    pub items: Vec<MissionItem>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Mission {
    pub fn new(items: Vec<MissionItem>) -> Self {
        let now = Utc::now();
        Self {
            items,
            created_at: now,
            modified_at: now,
        }
    }
}
