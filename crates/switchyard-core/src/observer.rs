//! Active-modem-change observers.
//!
//! Replaces the registrant-list pattern with an ordered set of callback
//! handles. Registration fires the callback once immediately with the
//! current state, then again on every subsequent change.

use crate::diag::Snapshot;

/// Callback invoked with each new snapshot. Runs on the switcher thread;
/// must not block.
pub type ObserverFn = Box<dyn FnMut(&Snapshot) + Send>;

/// Handle returned from registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Ordered set of registered observers.
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<(ObserverId, ObserverFn)>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer and fires it immediately with `current`.
    pub fn register(&mut self, id: ObserverId, mut callback: ObserverFn, current: &Snapshot) {
        callback(current);
        self.observers.push((id, callback));
    }

    /// Removes an observer. Idempotent; returns whether it was present.
    pub fn unregister(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    /// Notifies all observers, in registration order.
    pub fn notify(&mut self, snapshot: &Snapshot) {
        for (_, callback) in &mut self.observers {
            callback(snapshot);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}
