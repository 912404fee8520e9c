//! Keyed one-shot timers for the event loop.
//!
//! The loop never sleeps on its own; between events it asks the queue for
//! the next deadline and waits on the channel with that timeout. Scheduling
//! the same key again replaces the pending entry, and cancellation is
//! idempotent.

use quanta::Instant;

/// Identifies a pending timer so it can be cancelled or replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKey {
    /// Constant-backoff retry of the modem command for one modem.
    CommandRetry(usize),
    /// Forcibly drop the held network-path-change observation.
    PathWatchExpiry,
}

/// A small set of pending one-shot timers.
///
/// The entry count is bounded by the modem count plus one, so a plain
/// vector beats a heap here.
#[derive(Debug, Default)]
pub struct TimerQueue {
    entries: Vec<(Instant, TimerKey)>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `key` to fire at `deadline`, replacing any pending entry
    /// with the same key.
    pub fn schedule(&mut self, key: TimerKey, deadline: Instant) {
        self.cancel(key);
        self.entries.push((deadline, key));
    }

    /// Removes the pending entry for `key`, if any. Safe to call when
    /// nothing is pending.
    pub fn cancel(&mut self, key: TimerKey) {
        self.entries.retain(|(_, k)| *k != key);
    }

    pub fn is_scheduled(&self, key: TimerKey) -> bool {
        self.entries.iter().any(|(_, k)| *k == key)
    }

    /// The earliest pending deadline, if any timer is scheduled.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|(d, _)| *d).min()
    }

    /// Removes and returns every key whose deadline is at or before `now`,
    /// earliest first.
    pub fn fire_due(&mut self, now: Instant) -> Vec<TimerKey> {
        let mut due: Vec<(Instant, TimerKey)> = Vec::new();
        self.entries.retain(|(d, k)| {
            if *d <= now {
                due.push((*d, *k));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(d, _)| *d);
        due.into_iter().map(|(_, k)| k).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fires_only_due_entries() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        q.schedule(TimerKey::CommandRetry(0), now + Duration::from_secs(1));
        q.schedule(TimerKey::CommandRetry(1), now + Duration::from_secs(10));

        let fired = q.fire_due(now + Duration::from_secs(2));
        assert_eq!(fired, vec![TimerKey::CommandRetry(0)]);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn fires_in_deadline_order() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        q.schedule(TimerKey::PathWatchExpiry, now + Duration::from_secs(2));
        q.schedule(TimerKey::CommandRetry(0), now + Duration::from_secs(1));

        let fired = q.fire_due(now + Duration::from_secs(3));
        assert_eq!(
            fired,
            vec![TimerKey::CommandRetry(0), TimerKey::PathWatchExpiry]
        );
        assert!(q.is_empty());
    }

    #[test]
    fn reschedule_replaces_pending_entry() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        q.schedule(TimerKey::CommandRetry(1), now + Duration::from_secs(1));
        q.schedule(TimerKey::CommandRetry(1), now + Duration::from_secs(5));
        assert_eq!(q.len(), 1);
        assert!(q.is_scheduled(TimerKey::CommandRetry(1)));
        assert!(!q.is_scheduled(TimerKey::CommandRetry(0)));

        assert!(q.fire_due(now + Duration::from_secs(2)).is_empty());
        assert_eq!(
            q.fire_due(now + Duration::from_secs(6)),
            vec![TimerKey::CommandRetry(1)]
        );
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        q.schedule(TimerKey::PathWatchExpiry, now + Duration::from_secs(1));
        assert!(q.is_scheduled(TimerKey::PathWatchExpiry));
        q.cancel(TimerKey::PathWatchExpiry);
        q.cancel(TimerKey::PathWatchExpiry);
        assert!(!q.is_scheduled(TimerKey::PathWatchExpiry));
        assert!(q.is_empty());
        assert!(q.next_deadline().is_none());
    }

    #[test]
    fn next_deadline_is_earliest() {
        let mut q = TimerQueue::new();
        let now = Instant::now();
        q.schedule(TimerKey::CommandRetry(0), now + Duration::from_secs(5));
        q.schedule(TimerKey::PathWatchExpiry, now + Duration::from_secs(2));
        assert_eq!(q.next_deadline(), Some(now + Duration::from_secs(2)));
    }
}
