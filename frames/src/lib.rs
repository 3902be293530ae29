//! Shared chat frame model and JSON codec for the realtime WS transport.
//!
//! This crate owns the wire representation exchanged with the chat backend.
//! Inbound frames are lenient about `id` and `timestamp` (either may be
//! missing, ids may arrive as strings or numbers) so the session layer can
//! stamp or synthesize them. Outbound envelopes are always fully populated.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Error returned by the frame codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text is not JSON, or does not describe a known frame type.
    #[error("failed to decode chat frame: {0}")]
    Decode(#[source] serde_json::Error),
    /// Serializing an outbound envelope failed.
    #[error("failed to encode chat frame: {0}")]
    Encode(#[source] serde_json::Error),
    /// A frame type that requires a field arrived without it.
    #[error("`{kind}` frame is missing `{field}`")]
    MissingField { kind: FrameKind, field: &'static str },
}

/// Discriminator carried in the `type` field of every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// A chat message written by a participant.
    Message,
    /// System notice: a participant entered the room.
    UserJoined,
    /// System notice: a participant left the room.
    UserLeft,
}

impl FrameKind {
    /// Wire spelling of the discriminator.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::UserJoined => "user_joined",
            Self::UserLeft => "user_left",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frame received from the backend.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct InboundFrame {
    /// Frame type.
    #[serde(rename = "type")]
    pub kind: FrameKind,
    /// De-duplication token. Numbers are normalized to their decimal string.
    #[serde(default, deserialize_with = "deserialize_id")]
    pub id: Option<String>,
    /// Author of a message, or subject of a join/leave notice.
    #[serde(default)]
    pub username: Option<String>,
    /// Message text or notice text.
    #[serde(default)]
    pub content: Option<String>,
    /// Event time. Accepts RFC 3339 strings or Unix milliseconds.
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<OffsetDateTime>,
}

/// The envelope the client sends when a participant posts a message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Always [`FrameKind::Message`].
    #[serde(rename = "type")]
    pub kind: FrameKind,
    /// Trimmed message text.
    pub content: String,
    /// Client-side send time.
    #[serde(rename = "clientTimestamp", with = "time::serde::rfc3339")]
    pub client_timestamp: OffsetDateTime,
}

impl OutboundMessage {
    #[must_use]
    pub fn new(content: impl Into<String>, client_timestamp: OffsetDateTime) -> Self {
        Self {
            kind: FrameKind::Message,
            content: content.into(),
            client_timestamp,
        }
    }
}

/// Decode one inbound text frame.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed JSON or an unknown `type`, and
/// [`CodecError::MissingField`] when a `message` frame has no `username`.
pub fn decode_frame(text: &str) -> Result<InboundFrame, CodecError> {
    let frame: InboundFrame = serde_json::from_str(text).map_err(CodecError::Decode)?;
    if frame.kind == FrameKind::Message && frame.username.as_deref().is_none_or(str::is_empty) {
        return Err(CodecError::MissingField {
            kind: frame.kind,
            field: "username",
        });
    }
    Ok(frame)
}

/// Encode an outbound envelope as a single JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the timestamp cannot be rendered as
/// RFC 3339 (years outside 0..=9999).
pub fn encode_outbound(message: &OutboundMessage) -> Result<String, CodecError> {
    serde_json::to_string(message).map_err(CodecError::Encode)
}

/// Decode an outbound envelope. Used by backends and test stand-ins that
/// receive what the client sends.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] when the text is not a valid envelope.
pub fn decode_outbound(text: &str) -> Result<OutboundMessage, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Decode)
}

// =============================================================================
// LENIENT FIELD DECODING
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Millis(i64),
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Text(text)) => Some(text),
        Some(RawId::Number(number)) => Some(number.to_string()),
        None => None,
    };
    // An empty id cannot deduplicate anything; treat it as absent.
    Ok(id.filter(|id| !id.is_empty()))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let Some(raw) = Option::<RawTimestamp>::deserialize(deserializer)? else {
        return Ok(None);
    };

    match raw {
        RawTimestamp::Text(text) => OffsetDateTime::parse(&text, &Rfc3339)
            .map(Some)
            .map_err(D::Error::custom),
        RawTimestamp::Millis(millis) => {
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
                .map(Some)
                .map_err(D::Error::custom)
        }
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
