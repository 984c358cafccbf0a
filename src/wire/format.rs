//! Output formats the service can compile to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    #[serde(rename = "mp3")]
    Mp3,
    #[serde(rename = "wav")]
    Wav,
    #[serde(rename = "opus")]
    Opus,
    /// PCM, signed 16-bit little-endian.
    #[serde(rename = "s16le")]
    Pcm16Le,
}

impl Format {
    pub const ALL: [Format; 4] = [Format::Mp3, Format::Wav, Format::Opus, Format::Pcm16Le];

    /// Name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Mp3 => "mp3",
            Format::Wav => "wav",
            Format::Opus => "opus",
            Format::Pcm16Le => "s16le",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown format '{s}' (expected mp3, wav, opus or s16le)"))
    }
}
