use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Payload of a `telemetry` push event. Every field is optional; `null` is
/// treated the same as an absent field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TelemetryUpdate {
    #[serde(default)]
    pub home: Option<GeoPoint>,
    #[serde(default)]
    pub position: Option<GeoPoint>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub armed: Option<bool>,
}

/// Latest known vehicle state as seen through the telemetry feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VehicleTelemetrySnapshot {
    pub home: Option<GeoPoint>,
    pub position: Option<GeoPoint>,
    /// Meters above ground level.
    pub altitude: Option<f64>,
    /// Degrees.
    pub heading: Option<f64>,
    pub armed: bool,
}

impl VehicleTelemetrySnapshot {
    /// Fields missing from the update keep their prior value, except `armed`
    /// which always follows the update and falls back to `false`.
    pub fn apply(&mut self, update: TelemetryUpdate) {
        if let Some(home) = update.home {
            self.home = Some(home);
        }
        if let Some(position) = update.position {
            self.position = Some(position);
        }
        if let Some(altitude) = update.altitude {
            self.altitude = Some(altitude);
        }
        if let Some(heading) = update.heading {
            self.heading = Some(heading);
        }
        self.armed = update.armed.unwrap_or(false);
    }
}
