use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::config::PlannerConfig;
use crate::mission::{null_as_empty, ItemRef, MissionItem, Validation};
use crate::vehicle::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Mission,
    Command,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Mission => f.write_str("mission"),
            Mode::Command => f.write_str("command"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanRequest {
    pub user_input: String,
    pub mode: Mode,
    /// Always serialized, `null` when there is no live mission.
    pub mission_state: Option<Vec<MissionItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_position: Option<GeoPoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub mission_items: Option<Vec<MissionItem>>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub added_items: Vec<ItemRef>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub modified_items: Vec<ItemRef>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub deleted_items: Vec<ItemRef>,
    #[serde(default)]
    pub validation: Option<Validation>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub agent_initialized: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub mavlink_connected: bool,
}

/// HTTP client for the planning service.
#[derive(Debug, Clone)]
pub struct PlanningClient {
    http: reqwest::Client,
    base_url: String,
}

impl PlanningClient {
    pub fn new(config: &PlannerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("gcs-console/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        let url = format!("{}/api/status", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?
            .error_for_status()?;

        response
            .json()
            .await
            .context("Malformed status response")
    }

    /// Posts a planning request. `success:false` bodies come back as `Ok`
    /// whatever the HTTP status; only requests that cannot complete or
    /// produce an unreadable body are errors.
    pub async fn plan(&self, request: &PlanRequest) -> Result<PlanResponse> {
        let url = format!("{}/api/plan", self.base_url);
        let request_id = Uuid::new_v4();
        debug!(
            "[{}] POST {} mode={} items={}",
            request_id,
            url,
            request.mode,
            request.mission_state.as_ref().map_or(0, |items| items.len())
        );

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .context("Failed to read planning response")?;
        debug!("[{}] {} ({} bytes)", request_id, status, body.len());

        match serde_json::from_slice::<PlanResponse>(&body) {
            Ok(plan) => Ok(plan),
            Err(e) if status.is_success() => Err(anyhow!("Malformed planning response: {}", e)),
            Err(_) => Err(anyhow!("Planning service returned {}", status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_null_mission_state() {
        let request = PlanRequest {
            user_input: "takeoff to 50 feet".to_string(),
            mode: Mode::Command,
            mission_state: None,
            home_position: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "user_input": "takeoff to 50 feet",
                "mode": "command",
                "mission_state": null
            })
        );
    }

    #[test]
    fn request_carries_home_position_when_known() {
        let request = PlanRequest {
            user_input: "add rtl".to_string(),
            mode: Mode::Mission,
            mission_state: Some(vec![MissionItem::new(1, "takeoff")]),
            home_position: Some(GeoPoint {
                latitude: 1.5,
                longitude: -2.5,
            }),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["mode"], "mission");
        assert_eq!(value["mission_state"][0]["command_type"], "takeoff");
        assert_eq!(value["home_position"]["longitude"], -2.5);
    }

    #[test]
    fn status_reports_vehicle_link() {
        let status: StatusResponse = serde_json::from_value(json!({
            "status": "running",
            "agent_initialized": true,
            "mavlink_connected": true
        }))
        .unwrap();
        assert!(status.agent_initialized);
        assert!(status.mavlink_connected);

        let sparse: StatusResponse = serde_json::from_value(json!({"status": "starting"})).unwrap();
        assert!(!sparse.agent_initialized);
        assert!(!sparse.mavlink_connected);
    }

    #[test]
    fn sparse_response_uses_defaults() {
        let response: PlanResponse =
            serde_json::from_value(json!({"success": false, "error": "Missing required field"}))
                .unwrap();
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Missing required field"));
        assert!(response.mission_items.is_none());
        assert!(response.added_items.is_empty());
        assert!(response.validation.is_none());
    }

    #[test]
    fn delta_lists_accept_full_items_or_null() {
        let response: PlanResponse = serde_json::from_value(json!({
            "success": true,
            "mode": "mission",
            "added_items": [{"seq": 2, "command_type": "waypoint", "latitude": 1.0}],
            "modified_items": null,
            "validation": {"valid": true, "errors": null, "warnings": []}
        }))
        .unwrap();
        assert_eq!(response.mode, Some(Mode::Mission));
        assert_eq!(response.added_items, vec![ItemRef { seq: 2 }]);
        assert!(response.modified_items.is_empty());
        assert!(response.validation.unwrap().errors.is_empty());
    }
}
