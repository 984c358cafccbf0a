//! Error types for the compile client.

use thiserror::Error;

/// A violation of the status-message protocol by the peer.
#[derive(Error, Debug)]
pub enum ProtocolViolation {
    #[error("malformed status message: {0}")]
    MalformedStatus(#[from] serde_json::Error),

    #[error("status message of type '{0}' is missing its payload")]
    MissingPayload(String),

    #[error("unknown duration reference: {0}")]
    UnknownReference(String),

    #[error("duration reference resolved twice: {0}")]
    DuplicateReference(String),

    #[error("negative duration {nanos}ns for reference {tag}")]
    NegativeDuration { tag: String, nanos: i64 },
}

#[derive(Error, Debug)]
pub enum PodioError {
    #[error("failed to connect: {source}{}", .body.as_deref().map(|b| format!(": {b}")).unwrap_or_default())]
    Connect {
        #[source]
        source: tungstenite::Error,
        body: Option<String>,
    },

    #[error("failed to send compile request: {0}")]
    Send(#[source] tungstenite::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("connection closed abnormally with code {code}: {reason}")]
    AbnormalClose { code: u16, reason: String },

    #[error("failed to read frame: {0}")]
    Read(#[source] tungstenite::Error),

    #[error("failed to write compiled audio: {0}")]
    SinkWrite(#[source] std::io::Error),

    #[error("compile cancelled")]
    Cancelled,

    #[error("invalid audio node: {0}")]
    InvalidNode(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PodioError {
    /// Wrap a handshake failure, keeping the peer's rejection body if it sent one.
    pub fn connect(source: tungstenite::Error) -> Self {
        let body = match &source {
            tungstenite::Error::Http(response) => response
                .body()
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .filter(|b| !b.is_empty()),
            _ => None,
        };
        Self::Connect { source, body }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, PodioError>;
