//! Duration slots: caller-owned cells that receive a measured duration.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A writable handle to a duration the service will measure.
///
/// Clones share the same cell, so the handle placed in a tree and the one
/// the caller keeps observe the same value. Written at most once per tag
/// during a compile call, after the matching status message arrives.
#[derive(Clone, Default)]
pub struct DurationSlot {
    cell: Arc<Mutex<Option<Duration>>>,
}

impl DurationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The resolved duration, or `None` if the service has not reported one.
    pub fn get(&self) -> Option<Duration> {
        *self.lock()
    }

    pub fn is_resolved(&self) -> bool {
        self.get().is_some()
    }

    /// Clear the cell so the tree can be compiled again.
    pub fn reset(&self) {
        *self.lock() = None;
    }

    pub(crate) fn set(&self, duration: Duration) {
        *self.lock() = Some(duration);
    }

    /// Whether two handles point at the same cell.
    pub fn same_cell(&self, other: &DurationSlot) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Duration>> {
        // The cell holds plain data; a poisoned lock still has a usable value.
        self.cell.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PartialEq for DurationSlot {
    fn eq(&self, other: &Self) -> bool {
        self.same_cell(other)
    }
}

impl fmt::Debug for DurationSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DurationSlot").field(&self.get()).finish()
    }
}
