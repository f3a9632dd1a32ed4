use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::planning::{Mode, PlanningSessionController, SendOutcome, SessionView};
use crate::telemetry::TelemetryClient;
use crate::view::{MissionItemView, MissionPanelView, TelemetryView, ValidationView};

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<PlanningSessionController>,
    pub telemetry: Arc<TelemetryClient>,
}

// View Models
#[derive(Debug, Serialize)]
pub struct ConsoleViewModel {
    pub version: String,
    pub session: SessionView,
    pub telemetry: TelemetryView,
}

#[derive(Debug, Deserialize)]
pub struct ChatForm {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ModeForm {
    pub mode: Mode,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub outcome: SendOutcome,
    pub session: SessionView,
}

// Template
#[derive(Template)]
#[template(path = "console.html")]
struct ConsolePage {
    status: ConsoleViewModel,
    mission_items: Vec<MissionItemView>,
    placeholder: Option<&'static str>,
    removed: usize,
    validation: Option<ValidationView>,
}

impl ConsolePage {
    fn new(status: ConsoleViewModel) -> Self {
        let panel = &status.session.mission_panel;
        let (mission_items, placeholder, removed, validation) = match panel {
            MissionPanelView::Empty { placeholder } => (Vec::new(), Some(*placeholder), 0, None),
            MissionPanelView::Items {
                items,
                removed,
                validation,
            } => (items.clone(), None, *removed, validation.clone()),
        };
        Self {
            status,
            mission_items,
            placeholder,
            removed,
            validation,
        }
    }

    fn send_disabled(&self) -> bool {
        let controls = &self.status.session.controls;
        !controls.planner_connected || controls.loading
    }

    fn is_command_mode(&self) -> bool {
        self.status.session.mode == Mode::Command
    }
}

impl ConsoleViewModel {
    async fn new(state: &AppState) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            session: state.session.view().await,
            telemetry: state.telemetry.view(),
        }
    }
}

// Routes and Handlers
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(console_page))
        .route("/chat", post(chat_form))
        .route("/mode", post(mode_form))
        .route("/status/check", post(status_check))
        .route("/telemetry/connect", post(telemetry_connect))
        .route("/telemetry/disconnect", post(telemetry_disconnect))
        .route("/api/session", get(session_api))
        .route("/api/telemetry", get(telemetry_api))
        .route("/api/chat", post(chat_api))
        .route("/api/mode", post(mode_api))
        .with_state(state)
}

async fn console_page(State(state): State<AppState>) -> Response {
    let page = ConsolePage::new(ConsoleViewModel::new(&state).await);
    match page.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("Failed to render console page: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn chat_form(State(state): State<AppState>, Form(form): Form<ChatForm>) -> Redirect {
    state.session.send_message(&form.text).await;
    Redirect::to("/")
}

async fn mode_form(State(state): State<AppState>, Form(form): Form<ModeForm>) -> Redirect {
    state.session.switch_mode(form.mode).await;
    Redirect::to("/")
}

async fn status_check(State(state): State<AppState>) -> Redirect {
    state.session.check_connection().await;
    Redirect::to("/")
}

async fn telemetry_connect(State(state): State<AppState>) -> Redirect {
    state.telemetry.connect().await;
    Redirect::to("/")
}

async fn telemetry_disconnect(State(state): State<AppState>) -> Redirect {
    state.telemetry.disconnect().await;
    Redirect::to("/")
}

async fn session_api(State(state): State<AppState>) -> Json<ConsoleViewModel> {
    Json(ConsoleViewModel::new(&state).await)
}

async fn telemetry_api(State(state): State<AppState>) -> Json<TelemetryView> {
    Json(state.telemetry.view())
}

async fn chat_api(State(state): State<AppState>, Json(body): Json<ChatForm>) -> Json<ChatReply> {
    let outcome = state.session.send_message(&body.text).await;
    Json(ChatReply {
        outcome,
        session: state.session.view().await,
    })
}

async fn mode_api(State(state): State<AppState>, Json(body): Json<ModeForm>) -> Json<SessionView> {
    state.session.switch_mode(body.mode).await;
    Json(state.session.view().await)
}
