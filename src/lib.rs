//! podio: client for a remote audio compilation service.
//!
//! Describe a pipeline as an immutable tree, then compile it remotely and
//! stream the result back:
//!
//! ```no_run
//! use std::time::Duration;
//! use podio::{remote, CancelToken, Client, DurationSlot, Format};
//!
//! let length = DurationSlot::new();
//! let tree = remote("https://example.com/voice.mp3")
//!     .pad_left(Duration::from_millis(500))
//!     .with_background(&remote("https://example.com/music.mp3").volume(0.2))
//!     .fade_out(Duration::from_secs(2))
//!     .save_duration(&length);
//!
//! let mut out = std::fs::File::create("episode.mp3")?;
//! Client::new("api-key").compile(Format::Mp3, &tree, &mut out, &CancelToken::new())?;
//! println!("{:?}", length.get());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod wire;

pub use builder::{concat, remote, AudioBuilder, AudioNode, DurationSlot};
pub use client::Client;
pub use config::ClientConfig;
pub use error::{PodioError, ProtocolViolation, Result};
pub use session::{CancelToken, ConnectOptions, SessionSummary};
pub use wire::Format;
