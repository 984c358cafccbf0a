//! Audio pipeline builder: immutable expression trees and duration slots.

pub mod ast;
pub mod slot;

pub use ast::{concat, remote, AudioBuilder, AudioNode};
pub use slot::DurationSlot;
