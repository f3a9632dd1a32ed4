use anyhow::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{timeout, Duration};

use super::packet::FeedEvent;
use super::{Readiness, TelemetryClient};
use crate::config::TelemetryConfig;
use crate::vehicle::{GeoPoint, TelemetryUpdate};
use crate::view::TelemetryView;

const NSP: &str = "/ws/telemetry";
const CLOSE: &str = "__close__";

#[derive(Clone)]
struct FeedFixture {
    pushes: broadcast::Sender<String>,
    seen: mpsc::UnboundedSender<String>,
}

struct Feed {
    url: String,
    pushes: broadcast::Sender<String>,
    seen: mpsc::UnboundedReceiver<String>,
}

impl Feed {
    fn push(&self, frame: &str) {
        self.pushes.send(frame.to_string()).unwrap();
    }

    async fn expect_frame(&mut self, expected: &str) {
        timeout(Duration::from_secs(5), async {
            while let Some(frame) = self.seen.recv().await {
                if frame == expected {
                    return;
                }
            }
            panic!("feed closed before {:?} arrived", expected);
        })
        .await
        .expect("timed out waiting for client frame");
    }
}

async fn spawn_feed() -> Feed {
    let (pushes, _) = broadcast::channel(16);
    let (seen_tx, seen) = mpsc::unbounded_channel();
    let fixture = FeedFixture {
        pushes: pushes.clone(),
        seen: seen_tx,
    };

    let app = Router::new()
        .route("/socket.io/", get(upgrade))
        .with_state(fixture);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Feed {
        url: format!("ws://{}/socket.io/?EIO=4&transport=websocket", addr),
        pushes,
        seen,
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(fixture): State<FeedFixture>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, fixture))
}

async fn serve_socket(mut socket: WebSocket, fixture: FeedFixture) {
    let mut pushes = fixture.pushes.subscribe();
    let open = r#"0{"sid":"fixture","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;
    if socket.send(Message::Text(open.to_string())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = fixture.seen.send(text.clone());
                    if text == format!("40{},", NSP) {
                        let ack = format!(r#"40{},{{"sid":"nsp-fixture"}}"#, NSP);
                        let _ = socket.send(Message::Text(ack)).await;
                    }
                }
                Some(Ok(_)) => {}
                _ => break,
            },
            push = pushes.recv() => match push {
                Ok(frame) if frame == CLOSE => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                Ok(frame) => {
                    if socket.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
        }
    }
}

fn config(url: &str) -> TelemetryConfig {
    TelemetryConfig {
        url: url.to_string(),
        namespace: NSP.to_string(),
        connect_timeout_secs: 2,
        auto_connect: false,
    }
}

async fn wait_for(
    rx: &mut watch::Receiver<TelemetryView>,
    pred: impl FnMut(&TelemetryView) -> bool,
) -> TelemetryView {
    timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timed out waiting for telemetry view")
        .expect("telemetry view channel closed")
        .clone()
}

fn telemetry_frame(json: &str) -> String {
    format!(r#"42{},["telemetry",{}]"#, NSP, json)
}

#[tokio::test]
async fn connect_then_home_makes_client_ready() {
    let mut feed = spawn_feed().await;
    let client = TelemetryClient::new(config(&feed.url));
    let mut views = client.subscribe();

    client.connect().await;
    feed.expect_frame("40/ws/telemetry,").await;
    let view = wait_for(&mut views, |v| v.connected).await;
    assert!(view.show_connection_help);
    assert!(view.mission_transfer_enabled);
    assert!(!client.is_ready());

    feed.push(&telemetry_frame(
        r#"{"connected":true,"home":{"latitude":47.397742,"longitude":8.545594,"altitude":488.0},"altitude":10.0,"armed":true}"#,
    ));
    let view = wait_for(&mut views, |v| !v.show_connection_help).await;
    assert_eq!(view.armed, "ARMED");
    assert_eq!(view.altitude.as_deref(), Some("10.0 m"));
    assert!(client.is_ready());
    assert_eq!(
        client.home_position(),
        Some(GeoPoint {
            latitude: 47.397742,
            longitude: 8.545594
        })
    );
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let mut feed = spawn_feed().await;
    let client = TelemetryClient::new(config(&feed.url));
    let mut views = client.subscribe();

    client.connect().await;
    wait_for(&mut views, |v| v.connected).await;

    feed.push("2");
    feed.expect_frame("3").await;
}

#[tokio::test]
async fn server_close_clears_home_and_readiness() {
    let mut feed = spawn_feed().await;
    let client = TelemetryClient::new(config(&feed.url));
    let mut views = client.subscribe();

    client.connect().await;
    feed.expect_frame("40/ws/telemetry,").await;
    feed.push(&telemetry_frame(
        r#"{"home":{"latitude":1.0,"longitude":2.0}}"#,
    ));
    wait_for(&mut views, |v| v.connected && v.home.is_some()).await;

    feed.push(CLOSE);
    let view = wait_for(&mut views, |v| !v.connected).await;
    assert!(view.home.is_none());
    assert!(view.show_connection_help);
    assert!(!view.mission_transfer_enabled);
    assert!(!client.is_ready());
    assert!(client.home_position().is_none());
}

#[tokio::test]
async fn disconnect_sends_namespace_leave_and_is_repeatable() {
    let mut feed = spawn_feed().await;
    let client = TelemetryClient::new(config(&feed.url));
    let mut views = client.subscribe();

    client.connect().await;
    wait_for(&mut views, |v| v.connected).await;

    client.disconnect().await;
    feed.expect_frame("41/ws/telemetry,").await;
    assert!(!client.is_connected());
    assert!(!client.view().connected);

    client.disconnect().await;
    assert!(!client.is_connected());
}

#[tokio::test]
async fn failed_connect_leaves_client_disconnected() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = TelemetryClient::new(config(&format!(
        "ws://{}/socket.io/?EIO=4&transport=websocket",
        addr
    )));
    client.connect().await;

    assert!(!client.is_connected());
    assert!(!client.is_ready());
    let view = client.view();
    assert_eq!(view.status, "Disconnected");
    assert!(view.show_connection_help);
}

#[tokio::test]
async fn reconnect_replaces_previous_connection() {
    let mut feed = spawn_feed().await;
    let client = TelemetryClient::new(config(&feed.url));
    let mut views = client.subscribe();

    client.connect().await;
    wait_for(&mut views, |v| v.connected).await;

    client.connect().await;
    feed.expect_frame("40/ws/telemetry,").await;
    feed.expect_frame("40/ws/telemetry,").await;
    wait_for(&mut views, |v| v.connected).await;

    feed.push(&telemetry_frame(r#"{"heading":182.4}"#));
    let view = wait_for(&mut views, |v| v.heading.is_some()).await;
    assert_eq!(view.heading.as_deref(), Some("182°"));
    assert!(client.is_connected());
}

#[tokio::test]
async fn events_from_a_replaced_connection_are_ignored() -> Result<()> {
    let mut feed = spawn_feed().await;
    let client = TelemetryClient::new(config(&feed.url));
    let mut views = client.subscribe();

    client.connect().await;
    feed.expect_frame("40/ws/telemetry,").await;
    wait_for(&mut views, |v| v.connected).await;
    let first = client.generation();

    client.connect().await;
    feed.expect_frame("40/ws/telemetry,").await;
    wait_for(&mut views, |v| v.connected).await;
    assert_ne!(client.generation(), first);

    client.inject_from(first, FeedEvent::Disconnect)?;
    assert!(client.is_connected());
    assert!(client.view().connected);

    let current = client.generation();
    client.disconnect().await;
    feed.expect_frame("41/ws/telemetry,").await;

    client.inject_from(current, FeedEvent::Connect)?;
    client.inject_from(
        current,
        FeedEvent::Telemetry(TelemetryUpdate {
            home: Some(GeoPoint {
                latitude: 1.0,
                longitude: 2.0,
            }),
            ..Default::default()
        }),
    )?;
    assert!(!client.is_connected());
    assert!(!client.is_ready());
    assert_eq!(client.snapshot()?, Default::default());
    assert!(!client.view().connected);
    Ok(())
}

#[test]
fn armed_tracks_latest_update_and_disconnect_resets() -> Result<()> {
    let client = TelemetryClient::new(config("ws://127.0.0.1:1/socket.io/"));

    client.inject(FeedEvent::Connect)?;
    client.inject(FeedEvent::Telemetry(TelemetryUpdate {
        home: Some(GeoPoint {
            latitude: 1.0,
            longitude: 2.0,
        }),
        armed: Some(true),
        ..Default::default()
    }))?;
    assert!(client.snapshot()?.armed);
    assert!(client.is_ready());

    client.inject(FeedEvent::Telemetry(TelemetryUpdate {
        altitude: Some(25.0),
        ..Default::default()
    }))?;
    let snapshot = client.snapshot()?;
    assert!(!snapshot.armed);
    assert_eq!(snapshot.altitude, Some(25.0));
    assert!(snapshot.home.is_some());

    client.inject(FeedEvent::Disconnect)?;
    assert!(!client.is_ready());
    assert_eq!(client.snapshot()?, Default::default());
    Ok(())
}
