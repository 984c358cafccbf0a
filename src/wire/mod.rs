//! Wire layer: tree serialization, reference tracking and status decoding.

pub mod context;
pub mod document;
pub mod format;
pub mod status;

pub use context::FetchContext;
pub use document::{serialize, OpeningMessage};
pub use format::Format;
pub use status::StatusMessage;
