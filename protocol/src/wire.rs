use serde::Serialize;
use thiserror::Error;

/// Hard cap on inbound frame size. Native messaging limits host-to-browser
/// messages to 1 MiB; anything larger is a framing error, not a real frame.
pub const MAX_INBOUND_FRAME: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to serialize frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame of {len} bytes does not fit in a u32 length prefix")]
    TooLarge { len: usize },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid frame JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("inbound frame of {len} bytes exceeds the {MAX_INBOUND_FRAME} byte limit")]
    Oversize { len: usize },
    #[error("frame has neither an event name nor a numeric request id")]
    Unroutable,
}

/// Encodes a frame as the native-messaging wire unit: a 4-byte little-endian
/// length prefix followed by that many bytes of JSON.
pub fn encode_frame<T: Serialize>(frame: &T) -> Result<Vec<u8>, EncodeError> {
    let body = serde_json::to_vec(frame)?;
    let len = u32::try_from(body.len()).map_err(|_| EncodeError::TooLarge { len: body.len() })?;
    let mut buf = Vec::with_capacity(4 + body.len());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Decodes a length prefix, enforcing [`MAX_INBOUND_FRAME`].
pub fn frame_len(header: [u8; 4]) -> Result<usize, DecodeError> {
    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_INBOUND_FRAME {
        return Err(DecodeError::Oversize { len });
    }
    Ok(len)
}
