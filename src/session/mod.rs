//! Compile sessions over a WebSocket: connection setup, cancellation and the read loop.

pub mod cancel;
pub mod controller;
pub mod transport;

pub use cancel::CancelToken;
pub use controller::{Session, SessionState, SessionSummary};
pub use transport::{connect, ConnectOptions, Connection, FrameTransport};
