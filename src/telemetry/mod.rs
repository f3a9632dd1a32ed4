pub mod client;
pub mod packet;

#[cfg(test)]
mod tests;

pub use client::TelemetryClient;

use crate::vehicle::GeoPoint;

/// Read-only view of telemetry readiness, consulted by the planning session
/// when it builds a request.
pub trait Readiness: Send + Sync {
    /// Connected to the feed and the home position is known.
    fn is_ready(&self) -> bool;

    fn home_position(&self) -> Option<GeoPoint>;
}
