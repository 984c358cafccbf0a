//! Audio expression tree.
//!
//! Trees are immutable. Every combinator wraps the receiver in a new node
//! and returns it, so one tree can be reused inside several larger ones.

use std::sync::Arc;
use std::time::Duration;

use super::slot::DurationSlot;

/// One operation in an audio pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioNode {
    /// Fetch audio from a URL.
    Remote { url: String },
    /// Replay `body` an additional `count` times (`count + 1` playbacks).
    Loop { body: AudioBuilder, count: u32 },
    /// Play each entry in order. An empty list renders as silence.
    Concat { list: Vec<AudioBuilder> },
    /// Prepend silence.
    PadLeft { body: AudioBuilder, duration: Duration },
    /// Append silence.
    PadRight { body: AudioBuilder, duration: Duration },
    /// Mix `background`, looped to cover `body`, under `body`.
    Background {
        body: AudioBuilder,
        background: AudioBuilder,
    },
    /// Scale amplitude; 1.0 leaves it unchanged.
    Volume { body: AudioBuilder, factor: f64 },
    /// Linear fade-in from the start.
    FadeIn { body: AudioBuilder, duration: Duration },
    /// Linear fade-out at the end.
    FadeOut { body: AudioBuilder, duration: Duration },
    /// Report the rendered duration of `body` into `slot`.
    SaveDuration { body: AudioBuilder, slot: DurationSlot },
}

/// Handle to an immutable audio tree.
///
/// Cloning is cheap and shares the underlying nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuilder {
    node: Arc<AudioNode>,
}

/// Fetch audio from a URL.
pub fn remote(url: impl Into<String>) -> AudioBuilder {
    AudioBuilder::remote(url)
}

/// Play the given trees one after another.
pub fn concat(list: impl IntoIterator<Item = AudioBuilder>) -> AudioBuilder {
    AudioBuilder::concat(list)
}

impl AudioBuilder {
    fn wrap(node: AudioNode) -> Self {
        Self {
            node: Arc::new(node),
        }
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self::wrap(AudioNode::Remote { url: url.into() })
    }

    pub fn concat(list: impl IntoIterator<Item = AudioBuilder>) -> Self {
        Self::wrap(AudioNode::Concat {
            list: list.into_iter().collect(),
        })
    }

    /// The node at the root of this tree.
    pub fn node(&self) -> &AudioNode {
        &self.node
    }

    /// Whether both handles share the same root node.
    pub fn ptr_eq(&self, other: &AudioBuilder) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// How many times the audio is replayed, not played.
    ///
    /// `remote(url).repeat(3)` plays the clip four times in total.
    pub fn repeat(&self, count: u32) -> Self {
        Self::wrap(AudioNode::Loop {
            body: self.clone(),
            count,
        })
    }

    /// Add silence to the beginning of the audio.
    pub fn pad_left(&self, duration: Duration) -> Self {
        Self::wrap(AudioNode::PadLeft {
            body: self.clone(),
            duration,
        })
    }

    /// Add silence to the end of the audio.
    pub fn pad_right(&self, duration: Duration) -> Self {
        Self::wrap(AudioNode::PadRight {
            body: self.clone(),
            duration,
        })
    }

    /// Background audio is looped until this audio ends.
    pub fn with_background(&self, background: &AudioBuilder) -> Self {
        Self::wrap(AudioNode::Background {
            body: self.clone(),
            background: background.clone(),
        })
    }

    /// Half the input volume is `volume(0.5)`; 150% is `volume(1.5)`.
    pub fn volume(&self, factor: f64) -> Self {
        Self::wrap(AudioNode::Volume {
            body: self.clone(),
            factor,
        })
    }

    pub fn fade_in(&self, duration: Duration) -> Self {
        Self::wrap(AudioNode::FadeIn {
            body: self.clone(),
            duration,
        })
    }

    pub fn fade_out(&self, duration: Duration) -> Self {
        Self::wrap(AudioNode::FadeOut {
            body: self.clone(),
            duration,
        })
    }

    /// Have the service report this audio's duration into `slot`.
    ///
    /// ```no_run
    /// # use podio::{remote, DurationSlot};
    /// let length = DurationSlot::new();
    /// let tree = remote("https://example.com/a.mp3").save_duration(&length);
    /// ```
    pub fn save_duration(&self, slot: &DurationSlot) -> Self {
        Self::wrap(AudioNode::SaveDuration {
            body: self.clone(),
            slot: slot.clone(),
        })
    }
}

impl From<&str> for AudioBuilder {
    fn from(url: &str) -> Self {
        Self::remote(url)
    }
}

impl From<String> for AudioBuilder {
    fn from(url: String) -> Self {
        Self::remote(url)
    }
}

impl FromIterator<AudioBuilder> for AudioBuilder {
    fn from_iter<I: IntoIterator<Item = AudioBuilder>>(iter: I) -> Self {
        Self::concat(iter)
    }
}
