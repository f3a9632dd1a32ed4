//! Minimal Engine.IO v4 / Socket.IO text framing for the telemetry feed.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use crate::vehicle::TelemetryUpdate;

pub const PONG: &str = "3";
pub const TELEMETRY_EVENT: &str = "telemetry";

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Open,
    Close,
    Ping,
    Pong,
    Connect { namespace: String },
    Disconnect { namespace: String },
    Event {
        namespace: String,
        name: String,
        payload: Value,
    },
    ConnectError {
        namespace: String,
        message: String,
    },
    Noop,
}

/// Events the telemetry client reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Connect,
    Disconnect,
    Telemetry(TelemetryUpdate),
}

pub fn connect_frame(namespace: &str) -> String {
    format!("40{},", namespace)
}

pub fn disconnect_frame(namespace: &str) -> String {
    format!("41{},", namespace)
}

pub fn parse_frame(text: &str) -> Result<Frame> {
    let mut chars = text.chars();
    let engine = chars.next().ok_or_else(|| anyhow!("Empty frame"))?;
    let rest = chars.as_str();

    match engine {
        '0' => Ok(Frame::Open),
        '1' => Ok(Frame::Close),
        '2' => Ok(Frame::Ping),
        '3' => Ok(Frame::Pong),
        '4' => parse_socket_packet(rest),
        '6' => Ok(Frame::Noop),
        other => Err(anyhow!("Unknown engine packet type '{}'", other)),
    }
}

fn parse_socket_packet(text: &str) -> Result<Frame> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| anyhow!("Missing socket packet type"))?;
    let (namespace, body) = split_namespace(chars.as_str());

    match kind {
        '0' => Ok(Frame::Connect { namespace }),
        '1' => Ok(Frame::Disconnect { namespace }),
        '2' => {
            // Skip an optional ack id before the JSON array.
            let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
            let value: Value = serde_json::from_str(body).context("Malformed event")?;
            let mut args = match value {
                Value::Array(args) => args.into_iter(),
                _ => return Err(anyhow!("Event payload is not an array")),
            };
            let name = match args.next() {
                Some(Value::String(name)) => name,
                _ => return Err(anyhow!("Event without a name")),
            };
            Ok(Frame::Event {
                namespace,
                name,
                payload: args.next().unwrap_or(Value::Null),
            })
        }
        '4' => {
            let message = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
                .unwrap_or_else(|| body.to_string());
            Ok(Frame::ConnectError { namespace, message })
        }
        other => Err(anyhow!("Unsupported socket packet type '{}'", other)),
    }
}

fn split_namespace(text: &str) -> (String, &str) {
    if text.starts_with('/') {
        match text.find(',') {
            Some(idx) => (text[..idx].to_string(), &text[idx + 1..]),
            None => (text.to_string(), ""),
        }
    } else {
        ("/".to_string(), text)
    }
}

impl Frame {
    /// Maps a frame to a telemetry event when it belongs to `namespace`.
    pub fn into_event(self, namespace: &str) -> Result<Option<FeedEvent>> {
        match self {
            Frame::Connect { namespace: nsp } if nsp == namespace => Ok(Some(FeedEvent::Connect)),
            Frame::Disconnect { namespace: nsp } if nsp == namespace => {
                Ok(Some(FeedEvent::Disconnect))
            }
            Frame::Close => Ok(Some(FeedEvent::Disconnect)),
            Frame::Event {
                namespace: nsp,
                name,
                payload,
            } if nsp == namespace && name == TELEMETRY_EVENT => {
                let update = serde_json::from_value(payload)
                    .context("Malformed telemetry payload")?;
                Ok(Some(FeedEvent::Telemetry(update)))
            }
            _ => Ok(None),
        }
    }
}
