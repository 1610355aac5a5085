//! Glue between the extension's internal message bus and the bridge.
//!
//! Every UI surface sends `{cmd, params}` envelopes and expects exactly one
//! asynchronous response; host events and control notifications are
//! broadcast to all surfaces best-effort. Three commands are handled here
//! without touching the channel: the liveness probe and the two
//! connect-control operations.

use crate::bridge::NativeBridge;
use purewolf_protocol::EventFrame;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_with::skip_serializing_none;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

pub const CMD_NATIVE_PING: &str = "native_ping";
pub const CMD_NATIVE_DISCONNECT: &str = "native_disconnect";
pub const CMD_NATIVE_RECONNECT: &str = "native_reconnect";
pub const UI_CLOSED: &str = "ui_closed";

/// Inbound bus envelope: either a UI lifecycle notice (`{type: ...}`) or a
/// command destined for the host (`{cmd, params}`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum UiMessage {
    Lifecycle {
        #[serde(rename = "type")]
        kind: String,
    },
    Command {
        cmd: String,
        #[serde(default = "empty_params")]
        params: Value,
    },
}

fn empty_params() -> Value {
    Value::Object(Map::new())
}

/// The single response every bus message gets: `{ok, result?, error?}`,
/// plus `alive` for the liveness probe.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct UiResponse {
    pub ok: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub alive: Option<bool>,
}

impl UiResponse {
    pub fn acked() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    fn alive(alive: bool) -> Self {
        Self {
            ok: true,
            alive: Some(alive),
            ..Self::default()
        }
    }
}

/// One bus message plus the slot its single response goes into.
pub struct UiRequest {
    pub message: UiMessage,
    pub respond: oneshot::Sender<UiResponse>,
}

/// Broadcast to every UI surface. Delivery is best-effort; no surface need
/// be listening.
#[derive(Clone, Debug, PartialEq)]
pub enum UiBroadcast {
    /// An unsolicited host event, e.g. sync progress.
    HostEvent(EventFrame),
    NativeDisconnect,
    NativeReconnect,
}

impl UiBroadcast {
    /// The wire shape surfaces receive: `{event, ...payload}` for host
    /// events, `{cmd}` for control notifications.
    pub fn to_value(&self) -> Value {
        match self {
            Self::HostEvent(frame) => {
                let mut fields = match &frame.payload {
                    Value::Object(payload) => payload.clone(),
                    _ => Map::new(),
                };
                fields.insert("event".to_string(), Value::String(frame.name.clone()));
                Value::Object(fields)
            }
            Self::NativeDisconnect => serde_json::json!({"cmd": CMD_NATIVE_DISCONNECT}),
            Self::NativeReconnect => serde_json::json!({"cmd": CMD_NATIVE_RECONNECT}),
        }
    }
}

/// Routes bus traffic into the bridge. Returns the broadcast sender that UI
/// surfaces subscribe to and the router task handle.
pub fn spawn_router(
    bridge: NativeBridge,
    requests: mpsc::UnboundedReceiver<UiRequest>,
) -> (broadcast::Sender<UiBroadcast>, JoinHandle<()>) {
    let (broadcasts, _) = broadcast::channel(64);
    let events_pump = spawn_event_pump(bridge.clone(), broadcasts.clone());
    let task = tokio::spawn(route_requests(bridge, requests, broadcasts.clone()));
    let handle = tokio::spawn(async move {
        let _ = task.await;
        events_pump.abort();
    });
    (broadcasts, handle)
}

async fn route_requests(
    bridge: NativeBridge,
    mut requests: mpsc::UnboundedReceiver<UiRequest>,
    broadcasts: broadcast::Sender<UiBroadcast>,
) {
    while let Some(UiRequest { message, respond }) = requests.recv().await {
        match message {
            UiMessage::Lifecycle { kind } if kind == UI_CLOSED => {
                // UI detach is acknowledged immediately and never reaches
                // the bridge.
                let _ = respond.send(UiResponse::acked());
            }
            UiMessage::Lifecycle { kind } => {
                let _ = respond.send(UiResponse::error(format!("unknown message type {kind}")));
            }
            UiMessage::Command { cmd, params } => {
                dispatch_command(&bridge, &broadcasts, cmd, params, respond);
            }
        }
    }
}

fn dispatch_command(
    bridge: &NativeBridge,
    broadcasts: &broadcast::Sender<UiBroadcast>,
    cmd: String,
    params: Value,
    respond: oneshot::Sender<UiResponse>,
) {
    if cmd == CMD_NATIVE_PING {
        let _ = respond.send(UiResponse::alive(bridge.is_alive()));
        return;
    }
    if cmd == CMD_NATIVE_DISCONNECT {
        let _ = broadcasts.send(UiBroadcast::NativeDisconnect);
        let bridge = bridge.clone();
        tokio::spawn(async move {
            bridge.disconnect().await;
            let _ = respond.send(UiResponse::acked());
        });
        return;
    }
    if cmd == CMD_NATIVE_RECONNECT {
        let _ = broadcasts.send(UiBroadcast::NativeReconnect);
        let bridge = bridge.clone();
        tokio::spawn(async move {
            let response = match bridge.reconnect().await {
                Ok(()) => UiResponse::acked(),
                Err(err) => UiResponse::error(err.to_string()),
            };
            let _ = respond.send(response);
        });
        return;
    }

    // Everything else goes to the host verbatim. The response slot stays
    // open until the bridge settles, and a bridge failure becomes an
    // `{ok: false, error}` response rather than a dead bus channel.
    let bridge = bridge.clone();
    tokio::spawn(async move {
        let response = match bridge.call(cmd, params).await {
            Ok(reply) => UiResponse {
                ok: reply.ok,
                result: reply.result,
                error: reply.error,
                alive: None,
            },
            Err(err) => UiResponse::error(err.to_string()),
        };
        let _ = respond.send(response);
    });
}

fn spawn_event_pump(
    bridge: NativeBridge,
    broadcasts: broadcast::Sender<UiBroadcast>,
) -> JoinHandle<()> {
    let mut events = bridge.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(frame) => {
                    let _ = broadcasts.send(UiBroadcast::HostEvent(frame));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "UI event fan-out lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
