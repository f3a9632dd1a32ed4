//! Pure state-to-view rendering. Every function here is deterministic over its
//! inputs so views can be rebuilt from current state at any time.

use serde::Serialize;
use std::collections::HashSet;

use crate::mission::{CommandKind, ItemRef, MissionItem, Validation};
use crate::vehicle::{GeoPoint, VehicleTelemetrySnapshot};

pub const NO_MISSION_ITEMS: &str = "No mission items yet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Agent,
    Info,
    Warning,
    Error,
}

impl MessageKind {
    pub fn css_class(self) -> &'static str {
        match self {
            MessageKind::User => "user-message",
            MessageKind::Agent => "agent-message",
            MessageKind::Info => "info-message",
            MessageKind::Warning => "warning-message",
            MessageKind::Error => "error-message",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub kind: MessageKind,
    pub text: String,
}

impl ChatMessage {
    pub fn new(kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Badge {
    #[serde(rename = "NEW")]
    New,
    #[serde(rename = "MODIFIED")]
    Modified,
}

impl Badge {
    pub fn label(self) -> &'static str {
        match self {
            Badge::New => "NEW",
            Badge::Modified => "MODIFIED",
        }
    }
}

/// Per-response change sets. Only used while rendering that response.
#[derive(Debug, Clone, Default)]
pub struct DeltaAnnotation {
    pub added: HashSet<i64>,
    pub modified: HashSet<i64>,
    pub deleted: usize,
}

impl DeltaAnnotation {
    pub fn new(added: &[ItemRef], modified: &[ItemRef], deleted: &[ItemRef]) -> Self {
        Self {
            added: added.iter().map(|r| r.seq).collect(),
            modified: modified.iter().map(|r| r.seq).collect(),
            deleted: deleted.len(),
        }
    }

    fn badge_for(&self, seq: i64) -> Option<Badge> {
        if self.added.contains(&seq) {
            Some(Badge::New)
        } else if self.modified.contains(&seq) {
            Some(Badge::Modified)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionItemView {
    pub icon: &'static str,
    pub index: usize,
    pub command: String,
    pub badge: Option<Badge>,
    pub details: Vec<String>,
}

impl MissionItemView {
    /// Header line, e.g. `📍 1. WAYPOINT NEW`.
    pub fn title(&self) -> String {
        let mut title = format!("{} {}. {}", self.icon, self.index, self.command);
        if let Some(badge) = self.badge {
            title.push(' ');
            title.push_str(badge.label());
        }
        title
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationView {
    pub valid: bool,
    pub icon: &'static str,
    pub label: &'static str,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum MissionPanelView {
    Empty {
        placeholder: &'static str,
    },
    Items {
        items: Vec<MissionItemView>,
        removed: usize,
        validation: Option<ValidationView>,
    },
}

impl Default for MissionPanelView {
    fn default() -> Self {
        MissionPanelView::Empty {
            placeholder: NO_MISSION_ITEMS,
        }
    }
}

impl MissionPanelView {
    pub fn items(&self) -> &[MissionItemView] {
        match self {
            MissionPanelView::Empty { .. } => &[],
            MissionPanelView::Items { items, .. } => items,
        }
    }
}

pub fn render_mission(
    items: &[MissionItem],
    deltas: &DeltaAnnotation,
    validation: Option<&Validation>,
) -> MissionPanelView {
    if items.is_empty() {
        return MissionPanelView::default();
    }

    let items = items
        .iter()
        .enumerate()
        .map(|(i, item)| render_item(i + 1, item, deltas))
        .collect();

    MissionPanelView::Items {
        items,
        removed: deltas.deleted,
        validation: validation.map(render_validation),
    }
}

fn render_item(index: usize, item: &MissionItem, deltas: &DeltaAnnotation) -> MissionItemView {
    let kind = item.kind();
    let command = item.command_name().unwrap_or("unknown").to_uppercase();

    MissionItemView {
        icon: kind.icon(),
        index,
        command,
        badge: deltas.badge_for(item.seq),
        details: item_details(item),
    }
}

fn units(unit: &Option<String>) -> &str {
    unit.as_deref().unwrap_or("units")
}

fn item_details(item: &MissionItem) -> Vec<String> {
    let mut details = Vec::new();

    if let Some((alt, unit)) = item.altitude_reading() {
        details.push(format!("Altitude: {} {}", alt, unit));
    }

    // Position sources in priority order: explicit coordinates, MGRS, relative.
    if let Some((lat, lon)) = item.coordinates() {
        details.push(format!("Position: {:.6}, {:.6}", lat, lon));
    } else if let Some(mgrs) = &item.mgrs {
        details.push(format!("MGRS: {}", mgrs));
    } else if let (Some(distance), Some(heading)) = (item.distance, &item.heading) {
        let mut relative = format!(
            "Relative: {} {} {}",
            distance,
            units(&item.distance_units),
            heading
        );
        if let Some(frame) = &item.relative_reference_frame {
            relative.push_str(&format!(" from {}", frame));
        }
        details.push(relative);
    }

    if let Some((radius, unit)) = item.radius_reading() {
        details.push(format!("Radius: {} {}", radius, unit));
    }

    if let Some(heading) = &item.heading {
        if item.kind() == CommandKind::Takeoff {
            details.push(format!("Heading: {}", heading));
        }
    }

    if let Some(target) = &item.search_target {
        details.push(format!("Search target: {}", target));
    }
    if let Some(behavior) = &item.detection_behavior {
        details.push(format!("Detection: {}", behavior));
    }

    details
}

fn render_validation(validation: &Validation) -> ValidationView {
    let (icon, label) = if validation.valid {
        ("✅", "Mission valid")
    } else {
        ("❌", "Mission invalid")
    };
    ValidationView {
        valid: validation.valid,
        icon,
        label,
        errors: validation.errors.clone(),
        warnings: validation.warnings.clone(),
    }
}

/// Status section for the telemetry feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryView {
    pub connected: bool,
    pub status: &'static str,
    pub home: Option<String>,
    pub position: Option<String>,
    pub altitude: Option<String>,
    pub heading: Option<String>,
    pub armed: &'static str,
    pub show_connection_help: bool,
    pub mission_transfer_enabled: bool,
}

pub fn render_telemetry(connected: bool, snapshot: &VehicleTelemetrySnapshot) -> TelemetryView {
    let ready = connected && snapshot.home.is_some();
    let status = if connected {
        "Connected"
    } else {
        "Disconnected"
    };
    TelemetryView {
        connected,
        status,
        home: snapshot.home.as_ref().map(format_point),
        position: snapshot.position.as_ref().map(format_point),
        altitude: snapshot.altitude.map(|alt| format!("{:.1} m", alt)),
        heading: snapshot.heading.map(|deg| format!("{:.0}°", deg)),
        armed: if snapshot.armed { "ARMED" } else { "DISARMED" },
        show_connection_help: !ready,
        mission_transfer_enabled: connected,
    }
}

fn format_point(point: &GeoPoint) -> String {
    format!("{:.6}, {:.6}", point.latitude, point.longitude)
}
