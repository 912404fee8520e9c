//! Opportunistic subscription switching with pre-commit validation.
//!
//! Before the switcher trusts a candidate opportunistic subscription it can
//! run an asynchronous probe that confirms the data path actually works.
//! At most one validation session is in flight; any new switch request
//! first cancels the old one. The coordinator never commits state itself —
//! it returns a [`SwitchAction`] and the evaluator applies it, so commit
//! ordering (commit, then report success) stays in one place.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::event::{EventSink, SwitcherEvent};
use crate::subscription::{SubId, SubscriptionDirectory};

/// Terminal result reported to a switch requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchResult {
    Success,
    /// The target is not an active subscription.
    InactiveSubscription,
    /// The validation probe reported the data path unusable.
    ValidationFailed,
}

/// One-shot reply to the party that requested a switch.
pub type ReplyFn = Box<dyn FnOnce(SwitchResult) + Send>;

/// Completion handed to the probe; re-enters the loop as `ValidationDone`.
pub type ProbeCallback = Box<dyn FnOnce(SubId, bool) + Send>;

/// External data-path validation probe.
pub trait ValidationProbe: Send {
    /// Starts a probe of `sub` with the given expiration. Fire-and-forget;
    /// the callback must be invoked exactly once unless `stop` intervenes.
    fn validate(&mut self, sub: SubId, timeout: Duration, done: ProbeCallback);

    /// Cancels any in-flight probe. Idempotent.
    fn stop(&mut self);

    fn is_validating(&self) -> bool;

    /// The subscription under validation, if a probe is in flight.
    fn sub_in_validation(&self) -> Option<SubId>;

    /// Whether the platform supports validation at all.
    fn is_supported(&self) -> bool;
}

/// What the evaluator must do after a coordinator call.
pub enum SwitchAction {
    /// Nothing further; any reply was already sent.
    Handled,
    /// Commit `target` as the opportunistic subscription, then report
    /// success on `reply`.
    Commit {
        target: Option<SubId>,
        reply: Option<ReplyFn>,
    },
}

/// Invokes a reply if one was supplied.
pub fn send_reply(reply: Option<ReplyFn>, result: SwitchResult) {
    if let Some(reply) = reply {
        reply(result);
    }
}

/// Drives validation sessions for opportunistic switch requests.
pub struct ValidationCoordinator {
    probe: Box<dyn ValidationProbe>,
    /// Reply for the requester waiting on an in-flight validation.
    pending_reply: Option<ReplyFn>,
    expiration: Duration,
    events: EventSink,
}

impl ValidationCoordinator {
    pub fn new(probe: Box<dyn ValidationProbe>, expiration: Duration, events: EventSink) -> Self {
        ValidationCoordinator {
            probe,
            pending_reply: None,
            expiration,
            events,
        }
    }

    /// The subscription currently under validation, consulted by request
    /// routing so an internet request for a sub being validated stays
    /// routable.
    pub fn sub_in_validation(&self) -> Option<SubId> {
        self.probe.sub_in_validation()
    }

    /// Handles a request to switch the opportunistic subscription to `sub`.
    ///
    /// `current` is the currently committed opportunistic subscription.
    pub fn request_switch(
        &mut self,
        sub: SubId,
        need_validation: bool,
        current: Option<SubId>,
        directory: &dyn SubscriptionDirectory,
        reply: Option<ReplyFn>,
    ) -> SwitchAction {
        if !directory.is_active_sub(sub) {
            warn!(%sub, "cannot switch data to inactive subscription");
            send_reply(reply, SwitchResult::InactiveSubscription);
            return SwitchAction::Handled;
        }

        // A session for another target, or one whose validation is newly
        // unneeded, is superseded. Its requester never hears back.
        if self.probe.is_validating()
            && (!need_validation || self.probe.sub_in_validation() != Some(sub))
        {
            debug!(%sub, "cancelling superseded validation");
            self.probe.stop();
            self.pending_reply = None;
        }

        if Some(sub) == current {
            send_reply(reply, SwitchResult::Success);
            return SwitchAction::Handled;
        }

        if need_validation && self.probe.is_supported() {
            info!(%sub, "starting validation for opportunistic switch");
            self.pending_reply = reply;
            let events = self.events.clone();
            self.probe.validate(
                sub,
                self.expiration,
                Box::new(move |sub, passed| {
                    events(SwitcherEvent::ValidationDone { sub, passed });
                }),
            );
            SwitchAction::Handled
        } else {
            SwitchAction::Commit {
                target: Some(sub),
                reply,
            }
        }
    }

    /// Handles the probe result. Pass commits the target; failure reports a
    /// terminal error with no automatic retry. Either way the session ends.
    pub fn on_validation_result(&mut self, sub: SubId, passed: bool) -> SwitchAction {
        info!(%sub, passed, "validation finished");
        let reply = self.pending_reply.take();
        if passed {
            SwitchAction::Commit {
                target: Some(sub),
                reply,
            }
        } else {
            send_reply(reply, SwitchResult::ValidationFailed);
            SwitchAction::Handled
        }
    }

    /// Reverts to the primary subscription, cancelling any in-flight
    /// validation.
    pub fn request_unset(&mut self, reply: Option<ReplyFn>) -> SwitchAction {
        if self.probe.is_validating() {
            self.probe.stop();
            self.pending_reply = None;
        }
        SwitchAction::Commit {
            target: None,
            reply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct ProbeState {
        validating: Option<SubId>,
        validate_calls: Vec<SubId>,
        stop_calls: u32,
    }

    #[derive(Clone)]
    struct StubProbe {
        state: Arc<Mutex<ProbeState>>,
        supported: bool,
    }

    impl StubProbe {
        fn new(supported: bool) -> Self {
            StubProbe {
                state: Arc::new(Mutex::new(ProbeState::default())),
                supported,
            }
        }
    }

    impl ValidationProbe for StubProbe {
        fn validate(&mut self, sub: SubId, _timeout: Duration, _done: ProbeCallback) {
            let mut st = self.state.lock().unwrap();
            st.validating = Some(sub);
            st.validate_calls.push(sub);
        }
        fn stop(&mut self) {
            let mut st = self.state.lock().unwrap();
            st.validating = None;
            st.stop_calls += 1;
        }
        fn is_validating(&self) -> bool {
            self.state.lock().unwrap().validating.is_some()
        }
        fn sub_in_validation(&self) -> Option<SubId> {
            self.state.lock().unwrap().validating
        }
        fn is_supported(&self) -> bool {
            self.supported
        }
    }

    struct StubDirectory(HashSet<SubId>);

    impl StubDirectory {
        fn with_active(ids: &[i32]) -> Self {
            StubDirectory(ids.iter().map(|&s| SubId(s)).collect())
        }
    }

    impl SubscriptionDirectory for StubDirectory {
        fn default_data_sub(&self) -> Option<SubId> {
            None
        }
        fn sub_for_modem(&self, _modem: usize) -> Option<SubId> {
            None
        }
        fn is_active_sub(&self, sub: SubId) -> bool {
            self.0.contains(&sub)
        }
        fn is_user_data_enabled(&self, _sub: SubId) -> bool {
            true
        }
    }

    fn null_sink() -> EventSink {
        Arc::new(|_| {})
    }

    fn capture_reply() -> (Option<ReplyFn>, Arc<Mutex<Option<SwitchResult>>>) {
        let slot = Arc::new(Mutex::new(None));
        let inner = slot.clone();
        (
            Some(Box::new(move |r| *inner.lock().unwrap() = Some(r))),
            slot,
        )
    }

    fn coordinator(probe: StubProbe) -> ValidationCoordinator {
        ValidationCoordinator::new(Box::new(probe), Duration::from_secs(2), null_sink())
    }

    #[test]
    fn inactive_sub_fails_immediately() {
        let probe = StubProbe::new(true);
        let mut coord = coordinator(probe.clone());
        let dir = StubDirectory::with_active(&[]);
        let (reply, result) = capture_reply();

        let action = coord.request_switch(SubId(20), true, None, &dir, reply);
        assert!(matches!(action, SwitchAction::Handled));
        assert_eq!(
            *result.lock().unwrap(),
            Some(SwitchResult::InactiveSubscription)
        );
        assert!(probe.state.lock().unwrap().validate_calls.is_empty());
    }

    #[test]
    fn same_committed_target_succeeds_without_validation() {
        let probe = StubProbe::new(true);
        let mut coord = coordinator(probe.clone());
        let dir = StubDirectory::with_active(&[20]);
        let (reply, result) = capture_reply();

        let action = coord.request_switch(SubId(20), true, Some(SubId(20)), &dir, reply);
        assert!(matches!(action, SwitchAction::Handled));
        assert_eq!(*result.lock().unwrap(), Some(SwitchResult::Success));
        assert!(probe.state.lock().unwrap().validate_calls.is_empty());
    }

    #[test]
    fn validation_started_when_needed_and_supported() {
        let probe = StubProbe::new(true);
        let mut coord = coordinator(probe.clone());
        let dir = StubDirectory::with_active(&[20]);
        let (reply, result) = capture_reply();

        let action = coord.request_switch(SubId(20), true, None, &dir, reply);
        assert!(matches!(action, SwitchAction::Handled));
        assert!(result.lock().unwrap().is_none(), "reply deferred");
        assert_eq!(probe.state.lock().unwrap().validate_calls, vec![SubId(20)]);
    }

    #[test]
    fn unsupported_probe_commits_directly() {
        let probe = StubProbe::new(false);
        let mut coord = coordinator(probe.clone());
        let dir = StubDirectory::with_active(&[20]);

        let action = coord.request_switch(SubId(20), true, None, &dir, None);
        match action {
            SwitchAction::Commit { target, .. } => assert_eq!(target, Some(SubId(20))),
            SwitchAction::Handled => panic!("expected direct commit"),
        }
        assert!(probe.state.lock().unwrap().validate_calls.is_empty());
    }

    #[test]
    fn new_target_supersedes_in_flight_validation() {
        let probe = StubProbe::new(true);
        let mut coord = coordinator(probe.clone());
        let dir = StubDirectory::with_active(&[20, 30]);

        coord.request_switch(SubId(20), true, None, &dir, None);
        coord.request_switch(SubId(30), true, None, &dir, None);

        let st = probe.state.lock().unwrap();
        assert_eq!(st.stop_calls, 1);
        assert_eq!(st.validate_calls, vec![SubId(20), SubId(30)]);
    }

    #[test]
    fn validation_newly_unneeded_cancels_and_commits() {
        let probe = StubProbe::new(true);
        let mut coord = coordinator(probe.clone());
        let dir = StubDirectory::with_active(&[20]);

        coord.request_switch(SubId(20), true, None, &dir, None);
        let action = coord.request_switch(SubId(20), false, None, &dir, None);

        assert_eq!(probe.state.lock().unwrap().stop_calls, 1);
        assert!(matches!(
            action,
            SwitchAction::Commit {
                target: Some(SubId(20)),
                ..
            }
        ));
    }

    #[test]
    fn failed_validation_reports_terminal_failure() {
        let probe = StubProbe::new(true);
        let mut coord = coordinator(probe.clone());
        let dir = StubDirectory::with_active(&[20]);
        let (reply, result) = capture_reply();

        coord.request_switch(SubId(20), true, None, &dir, reply);
        probe.clone().stop(); // probe session ends with the result
        let action = coord.on_validation_result(SubId(20), false);

        assert!(matches!(action, SwitchAction::Handled));
        assert_eq!(
            *result.lock().unwrap(),
            Some(SwitchResult::ValidationFailed)
        );
    }

    #[test]
    fn passed_validation_commits_with_pending_reply() {
        let probe = StubProbe::new(true);
        let mut coord = coordinator(probe.clone());
        let dir = StubDirectory::with_active(&[20]);
        let (reply, result) = capture_reply();

        coord.request_switch(SubId(20), true, None, &dir, reply);
        let action = coord.on_validation_result(SubId(20), true);

        match action {
            SwitchAction::Commit { target, reply } => {
                assert_eq!(target, Some(SubId(20)));
                send_reply(reply, SwitchResult::Success);
            }
            SwitchAction::Handled => panic!("expected commit"),
        }
        assert_eq!(*result.lock().unwrap(), Some(SwitchResult::Success));
    }

    #[test]
    fn unset_cancels_validation_and_reverts() {
        let probe = StubProbe::new(true);
        let mut coord = coordinator(probe.clone());
        let dir = StubDirectory::with_active(&[20]);

        coord.request_switch(SubId(20), true, None, &dir, None);
        let action = coord.request_unset(None);

        assert_eq!(probe.state.lock().unwrap().stop_calls, 1);
        assert!(matches!(action, SwitchAction::Commit { target: None, .. }));
    }
}
