//! Wire envelope for the `tela-nm/1` native-messaging protocol.
//!
//! A frame is one length-prefixed JSON object exchanged with the host
//! process. Outbound frames carry a command (with a request id when a reply
//! is expected, without one for fire-and-forget control messages). Inbound
//! frames are either a correlated reply echoing a request id or an
//! unsolicited event; the distinction is made exactly once, at parse time.

pub mod host;
mod wire;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::fmt;

pub use wire::DecodeError;
pub use wire::EncodeError;
pub use wire::MAX_INBOUND_FRAME;
pub use wire::encode_frame;
pub use wire::frame_len;

pub const PROTOCOL: &str = "tela-nm/1";

/// Identifier correlating a request frame with its reply frame.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Frame sent to the host: `{proto, id?, cmd, params}`.
///
/// `id` is absent for fire-and-forget control messages such as `shutdown`.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OutboundFrame {
    pub proto: String,
    pub id: Option<RequestId>,
    pub cmd: String,
    pub params: Value,
}

impl OutboundFrame {
    pub fn request(id: RequestId, cmd: impl Into<String>, params: Value) -> Self {
        Self {
            proto: PROTOCOL.to_string(),
            id: Some(id),
            cmd: cmd.into(),
            params,
        }
    }

    pub fn control(cmd: impl Into<String>) -> Self {
        Self {
            proto: PROTOCOL.to_string(),
            id: None,
            cmd: cmd.into(),
            params: Value::Object(Map::new()),
        }
    }
}

/// Envelope-level reply fields: `{ok, result?, error?}`.
///
/// The bridge delivers these verbatim; interpreting `ok`/`error` belongs to
/// the caller that issued the command.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct HostReply {
    #[serde(default)]
    pub ok: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// Unsolicited event frame. The host puts event payload fields at the top
/// level of the frame (`{"event":"sync_progress","indexed":N,"chain":M}`),
/// so `payload` holds everything left after the `event` name is removed.
#[derive(Clone, Debug, PartialEq)]
pub struct EventFrame {
    pub name: String,
    pub payload: Value,
}

/// An inbound frame, classified exactly once at parse time.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Reply { id: RequestId, reply: HostReply },
    Event(EventFrame),
}

impl Inbound {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Classifies a frame: an `event` name wins, then a numeric `id`.
    /// Frames with neither (including the string-id pushes some hosts emit)
    /// are unroutable and must be dropped by the caller.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let Value::Object(mut fields) = value else {
            return Err(DecodeError::NotAnObject);
        };

        if let Some(event) = fields.remove("event") {
            let Value::String(name) = event else {
                return Err(DecodeError::Unroutable);
            };
            return Ok(Self::Event(EventFrame {
                name,
                payload: Value::Object(fields),
            }));
        }

        let Some(id) = fields.get("id").and_then(Value::as_u64) else {
            return Err(DecodeError::Unroutable);
        };
        let reply: HostReply = serde_json::from_value(Value::Object(fields))?;
        Ok(Self::Reply {
            id: RequestId(id),
            reply,
        })
    }
}
