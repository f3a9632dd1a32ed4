use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::api::{Mode, PlanRequest, PlanResponse, PlanningClient};
use crate::mission::Mission;
use crate::telemetry::Readiness;
use crate::view::{render_mission, ChatMessage, DeltaAnnotation, MessageKind, MissionPanelView};

pub const COMMAND_MODE_INFO: &str =
    "Command mode: each command creates a fresh mission. Nothing carries over between commands.";
pub const MISSION_MODE_INFO: &str =
    "Mission mode: build your mission incrementally. Each command adds to or edits the current mission.";
pub const NOT_READY_WARNING: &str =
    "⚠️ Vehicle home position unknown. Connect the telemetry feed so the planner can anchor the mission.";
const GENERIC_FAILURE: &str = "Planning request failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatHistoryEntry {
    pub role: Role,
    pub content: String,
}

/// What happened to a submitted message. The user-facing result is always the
/// rendered view; this is for callers and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    Rejected,
    ChatCleared,
    Completed,
    ServerFailed,
    TransportFailed,
    /// The mode changed while the request was in flight.
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlsView {
    pub planner_connected: bool,
    pub loading: bool,
    pub input_focused: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub mode: Mode,
    pub chat: Vec<ChatMessage>,
    pub mission_panel: MissionPanelView,
    pub controls: ControlsView,
}

impl SessionView {
    pub fn can_send(&self, input: &str) -> bool {
        self.controls.planner_connected && !self.controls.loading && !input.trim().is_empty()
    }
}

#[derive(Debug)]
struct Session {
    mode: Mode,
    /// Incremented on every mode switch; responses from an older epoch are stale.
    epoch: u64,
    sending: bool,
    planner_connected: bool,
    mission: Option<Mission>,
    history: Vec<ChatHistoryEntry>,
    chat: Vec<ChatMessage>,
    panel: MissionPanelView,
    input_focused: bool,
}

impl Session {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            epoch: 0,
            sending: false,
            planner_connected: false,
            mission: None,
            history: Vec::new(),
            chat: vec![ChatMessage::new(MessageKind::Info, mode_info(mode))],
            panel: MissionPanelView::default(),
            input_focused: true,
        }
    }

    fn push(&mut self, kind: MessageKind, text: impl Into<String>) {
        self.chat.push(ChatMessage::new(kind, text));
    }

    fn apply_success(&mut self, user_input: &str, response: PlanResponse) {
        if let Some(output) = &response.output {
            self.push(MessageKind::Agent, output.clone());
        }

        let items = response.mission_items.as_ref();
        if let Some(items) = items.filter(|items| !items.is_empty()) {
            debug!("Replacing mission with {} items", items.len());
            self.mission = Some(Mission::new(items.clone()));
        }

        self.history.push(ChatHistoryEntry {
            role: Role::User,
            content: user_input.to_string(),
        });
        self.history.push(ChatHistoryEntry {
            role: Role::Assistant,
            content: response.output.clone().unwrap_or_default(),
        });

        if let Some(items) = &response.mission_items {
            let deltas = DeltaAnnotation::new(
                &response.added_items,
                &response.modified_items,
                &response.deleted_items,
            );
            self.panel = render_mission(items, &deltas, response.validation.as_ref());
        }
    }
}

fn mode_info(mode: Mode) -> &'static str {
    match mode {
        Mode::Command => COMMAND_MODE_INFO,
        Mode::Mission => MISSION_MODE_INFO,
    }
}

/// Owns the conversation and mission state for one console session.
pub struct PlanningSessionController {
    api: PlanningClient,
    telemetry: Arc<dyn Readiness>,
    session: Mutex<Session>,
}

impl PlanningSessionController {
    pub fn new(api: PlanningClient, telemetry: Arc<dyn Readiness>) -> Self {
        Self {
            api,
            telemetry,
            session: Mutex::new(Session::new(Mode::Mission)),
        }
    }

    /// Queries the planning service status and updates the connection flag.
    pub async fn check_connection(&self) -> bool {
        let connected = match self.api.status().await {
            Ok(status) => {
                info!(
                    "Planning service status: {} (agent initialized: {}, vehicle link: {})",
                    status.status.as_deref().unwrap_or("unknown"),
                    status.agent_initialized,
                    status.mavlink_connected
                );
                status.agent_initialized
            }
            Err(e) => {
                warn!("Planning service unreachable: {:#}", e);
                false
            }
        };

        self.session.lock().await.planner_connected = connected;
        connected
    }

    pub async fn send_message(&self, text: &str) -> SendOutcome {
        let text = text.trim();

        let (request, epoch) = {
            let mut session = self.session.lock().await;
            if text.is_empty() || !session.planner_connected || session.sending {
                debug!(
                    "Rejecting message (empty: {}, connected: {}, sending: {})",
                    text.is_empty(),
                    session.planner_connected,
                    session.sending
                );
                return SendOutcome::Rejected;
            }

            if text.eq_ignore_ascii_case("clear") {
                session.chat.clear();
                return SendOutcome::ChatCleared;
            }

            let mission_state = session
                .mission
                .as_ref()
                .map(|mission| mission.items.clone());
            if mission_state.is_none() && !self.telemetry.is_ready() {
                session.push(MessageKind::Warning, NOT_READY_WARNING);
            }

            session.push(MessageKind::User, text);
            session.sending = true;
            session.input_focused = false;

            let request = PlanRequest {
                user_input: text.to_string(),
                mode: session.mode,
                mission_state,
                home_position: self.telemetry.home_position(),
            };
            (request, session.epoch)
        };

        info!("Sending {} request: {}", request.mode, request.user_input);
        let result = self.api.plan(&request).await;

        let mut session = self.session.lock().await;
        session.sending = false;
        session.input_focused = true;

        if session.epoch != epoch {
            warn!(
                "Discarding planning response for '{}': mode changed while in flight",
                request.user_input
            );
            if result.is_err() {
                session.planner_connected = false;
            }
            return SendOutcome::Discarded;
        }

        match result {
            Ok(response) if response.success => {
                session.apply_success(text, response);
                SendOutcome::Completed
            }
            Ok(response) => {
                let reason = response.error.as_deref().unwrap_or(GENERIC_FAILURE);
                warn!("Planning service reported failure: {}", reason);
                session.push(MessageKind::Error, format!("Error: {}", reason));
                SendOutcome::ServerFailed
            }
            Err(e) => {
                error!("Planning request failed: {:#}", e);
                session.push(MessageKind::Error, format!("Connection error: {:#}", e));
                session.planner_connected = false;
                SendOutcome::TransportFailed
            }
        }
    }

    /// Starts a fresh conversation in `mode`. Mission and chat are cleared
    /// together under one lock.
    pub async fn switch_mode(&self, mode: Mode) {
        let mut session = self.session.lock().await;
        info!("Switching to {} mode", mode);

        session.mode = mode;
        session.epoch += 1;
        session.chat.clear();
        session.panel = MissionPanelView::default();
        session.mission = None;
        session.history.clear();
        session.push(MessageKind::Info, mode_info(mode));
        session.input_focused = true;
    }

    pub async fn view(&self) -> SessionView {
        let session = self.session.lock().await;
        SessionView {
            mode: session.mode,
            chat: session.chat.clone(),
            mission_panel: session.panel.clone(),
            controls: ControlsView {
                planner_connected: session.planner_connected,
                loading: session.sending,
                input_focused: session.input_focused,
            },
        }
    }

    pub async fn can_send(&self, input: &str) -> bool {
        self.view().await.can_send(input)
    }

    pub async fn mission(&self) -> Option<Mission> {
        self.session.lock().await.mission.clone()
    }

    pub async fn history(&self) -> Vec<ChatHistoryEntry> {
        self.session.lock().await.history.clone()
    }
}
