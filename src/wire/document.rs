//! Serializer: audio tree → JSON document.
//!
//! One depth-first pass. `SaveDuration` nodes allocate a reference token in
//! the [`FetchContext`] and emit it as `duration_ref`. Durations go on the
//! wire as integer nanoseconds.

use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use super::context::FetchContext;
use super::format::Format;
use crate::builder::{AudioBuilder, AudioNode};
use crate::error::{PodioError, Result};

/// The single message that opens a compile session.
#[derive(Debug, Serialize)]
pub struct OpeningMessage {
    pub format: Format,
    pub body: Value,
}

impl OpeningMessage {
    /// Serialize `root` into an opening message, registering its references in `ctx`.
    pub fn new(format: Format, root: &AudioBuilder, ctx: &mut FetchContext) -> Result<Self> {
        Ok(Self {
            format,
            body: serialize(root, ctx)?,
        })
    }

    pub fn to_text(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| PodioError::InvalidNode(e.to_string()))
    }
}

/// Convert a tree into its wire document.
pub fn serialize(root: &AudioBuilder, ctx: &mut FetchContext) -> Result<Value> {
    let doc = match root.node() {
        AudioNode::Remote { url } => json!({ "type": "remote", "url": url }),
        AudioNode::Loop { body, count } => {
            json!({ "type": "loop", "count": count, "body": serialize(body, ctx)? })
        }
        AudioNode::Concat { list } => {
            let list = list
                .iter()
                .map(|item| serialize(item, ctx))
                .collect::<Result<Vec<_>>>()?;
            json!({ "type": "concat", "list": list })
        }
        AudioNode::PadLeft { body, duration } => json!({
            "type": "padLeft",
            "duration": nanos(*duration)?,
            "body": serialize(body, ctx)?,
        }),
        AudioNode::PadRight { body, duration } => json!({
            "type": "padRight",
            "duration": nanos(*duration)?,
            "body": serialize(body, ctx)?,
        }),
        AudioNode::Background { body, background } => json!({
            "type": "background",
            "body": serialize(body, ctx)?,
            "background": serialize(background, ctx)?,
        }),
        AudioNode::Volume { body, factor } => {
            if !factor.is_finite() {
                return Err(PodioError::InvalidNode(format!(
                    "volume factor must be finite, got {factor}"
                )));
            }
            json!({ "type": "volume", "body": serialize(body, ctx)?, "volume": factor })
        }
        AudioNode::FadeIn { body, duration } => json!({
            "type": "fadeIn",
            "body": serialize(body, ctx)?,
            "duration": nanos(*duration)?,
        }),
        AudioNode::FadeOut { body, duration } => json!({
            "type": "fadeOut",
            "body": serialize(body, ctx)?,
            "duration": nanos(*duration)?,
        }),
        AudioNode::SaveDuration { body, slot } => {
            let body = serialize(body, ctx)?;
            let token = ctx.register(slot);
            json!({ "type": "saveDuration", "body": body, "duration_ref": token })
        }
    };
    Ok(doc)
}

fn nanos(duration: Duration) -> Result<i64> {
    i64::try_from(duration.as_nanos()).map_err(|_| {
        PodioError::InvalidNode(format!("duration {duration:?} does not fit in i64 nanoseconds"))
    })
}
