//! Per-call table of pending duration references.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use uuid::Uuid;

use crate::builder::DurationSlot;
use crate::error::ProtocolViolation;

/// Maps reference tokens handed to the service back to the caller's slots.
///
/// Created fresh for each compile call, filled while serializing and
/// consulted while reading status messages. Never shared between calls.
#[derive(Debug, Default)]
pub struct FetchContext {
    pending: HashMap<String, DurationSlot>,
    resolved: HashSet<String>,
}

impl FetchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh token for `slot` and remember the pairing.
    pub fn register(&mut self, slot: &DurationSlot) -> String {
        let token = Uuid::new_v4().to_string();
        self.pending.insert(token.clone(), slot.clone());
        token
    }

    /// Write `duration` into the slot registered under `tag`.
    pub fn resolve(&mut self, tag: &str, duration: Duration) -> Result<(), ProtocolViolation> {
        match self.pending.remove(tag) {
            Some(slot) => {
                slot.set(duration);
                self.resolved.insert(tag.to_string());
                Ok(())
            }
            None if self.resolved.contains(tag) => {
                Err(ProtocolViolation::DuplicateReference(tag.to_string()))
            }
            None => Err(ProtocolViolation::UnknownReference(tag.to_string())),
        }
    }

    /// Tokens still waiting for a duration.
    pub fn pending_tags(&self) -> impl Iterator<Item = &str> {
        self.pending.keys().map(String::as_str)
    }

    pub fn is_pending(&self, tag: &str) -> bool {
        self.pending.contains_key(tag)
    }

    /// Tokens allocated so far, resolved or not.
    pub fn len(&self) -> usize {
        self.pending.len() + self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
