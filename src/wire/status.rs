//! Status messages the service sends as text frames.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ProtocolViolation;

const SAVE_DURATION: &str = "saveDuration";

#[derive(Debug, Deserialize)]
struct Envelope {
    /// Absent and `null` both decode to `None`.
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(rename = "_saveDuration")]
    save_duration: Option<SaveDurationPayload>,
}

#[derive(Debug, Deserialize)]
struct SaveDurationPayload {
    tag: String,
    duration: i64,
}

/// A decoded status message.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusMessage {
    /// The measured duration for a `duration_ref` token.
    SaveDuration { tag: String, duration: Duration },
    /// A message type this client does not handle.
    Other(String),
}

impl StatusMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolViolation> {
        let envelope: Envelope = serde_json::from_str(text)?;
        if envelope.kind.as_deref() != Some(SAVE_DURATION) {
            return Ok(Self::Other(envelope.kind.unwrap_or_default()));
        }
        let payload = envelope
            .save_duration
            .ok_or_else(|| ProtocolViolation::MissingPayload(SAVE_DURATION.to_string()))?;
        let nanos = u64::try_from(payload.duration).map_err(|_| {
            ProtocolViolation::NegativeDuration {
                tag: payload.tag.clone(),
                nanos: payload.duration,
            }
        })?;
        Ok(Self::SaveDuration {
            tag: payload.tag,
            duration: Duration::from_nanos(nanos),
        })
    }
}
