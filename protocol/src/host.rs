//! Typed payloads for the commands and events the PureWolf host exposes.
//!
//! The bridge itself never looks inside `params`/`result`; these types exist
//! for the surfaces that do (UI glue, the debugging CLI, host-side tests).

use crate::EventFrame;
use serde::Deserialize;
use serde::Serialize;

pub const CMD_SET_NODE: &str = "set_node";
pub const CMD_DISCONNECT_NODE: &str = "disconnect_node";
pub const CMD_LOAD_SCID: &str = "load_scid";
pub const CMD_SERVER_STATUS: &str = "server_status";
pub const CMD_LIST_SCIDS: &str = "list_scids";
/// Fire-and-forget; the host exits without replying.
pub const CMD_SHUTDOWN: &str = "shutdown";

pub const EVENT_SYNC_PROGRESS: &str = "sync_progress";
pub const EVENT_SYNC_COMPLETE: &str = "sync_complete";
pub const EVENT_NODE_UNREACHABLE: &str = "node_unreachable";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SetNodeParams {
    pub node: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoadScidParams {
    pub scid: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoadScidResult {
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ListScidsResult {
    pub scids: Vec<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Heights {
    pub indexed: i64,
    pub chain: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ServerStatusResult {
    pub tela: bool,
    pub gnomon: bool,
    pub connected: bool,
    pub node: String,
    #[serde(default)]
    pub heights: Heights,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncProgress {
    pub indexed: i64,
    pub chain: i64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncComplete {
    pub height: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeUnreachable {
    pub node: String,
}

/// The known host events, decoded from a generic [`EventFrame`]. Unknown
/// event names return `None`; the bridge still fans the raw frame out.
#[derive(Clone, Debug, PartialEq)]
pub enum HostEvent {
    SyncProgress(SyncProgress),
    SyncComplete(SyncComplete),
    NodeUnreachable(NodeUnreachable),
}

impl HostEvent {
    pub fn decode(frame: &EventFrame) -> Option<Self> {
        let payload = frame.payload.clone();
        match frame.name.as_str() {
            EVENT_SYNC_PROGRESS => serde_json::from_value(payload).ok().map(Self::SyncProgress),
            EVENT_SYNC_COMPLETE => serde_json::from_value(payload).ok().map(Self::SyncComplete),
            EVENT_NODE_UNREACHABLE => serde_json::from_value(payload)
                .ok()
                .map(Self::NodeUnreachable),
            _ => None,
        }
    }
}
