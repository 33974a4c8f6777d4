//! `roomproto`: the JSON envelope spoken by the room service.
//!
//! Every websocket text frame carries a JSON array of objects. Each object is tagged by its
//! `m` field:
//! - server -> client: [`ServerMsg`] (`hi`, `ch`, `a`, `t`, `p`, `bye`, anything else is
//!   kept as [`ServerMsg::Other`])
//! - client -> server: [`ClientMsg`] (`hi`, `ch`, `a`, `chown`, `m`, `userset`, `t`)
//!
//! Elements of a frame decode independently; one malformed element does not poison the rest
//! of the batch.

pub mod msg;

pub use msg::{ChannelInfo, ClientMsg, Crown, Participant, ServerMsg, User, UserSet};

#[derive(Debug)]
pub enum ProtoError {
    NotArray,
    Json(serde_json::Error),
}

impl std::fmt::Display for ProtoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtoError::NotArray => write!(f, "frame is not a JSON array"),
            ProtoError::Json(e) => write!(f, "bad json: {e}"),
        }
    }
}

impl std::error::Error for ProtoError {}

impl From<serde_json::Error> for ProtoError {
    fn from(e: serde_json::Error) -> Self {
        ProtoError::Json(e)
    }
}

/// Decodes one text frame. Elements that don't match a known shape become
/// [`ServerMsg::Other`].
pub fn decode_frame(s: &str) -> Result<Vec<ServerMsg>, ProtoError> {
    let v: serde_json::Value = serde_json::from_str(s)?;
    let serde_json::Value::Array(items) = v else {
        return Err(ProtoError::NotArray);
    };

    Ok(items
        .into_iter()
        .map(|it| serde_json::from_value::<ServerMsg>(it).unwrap_or(ServerMsg::Other))
        .collect())
}

pub fn encode_frame(msgs: &[ClientMsg]) -> Result<String, ProtoError> {
    Ok(serde_json::to_string(msgs)?)
}
