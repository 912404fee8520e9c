//! Manually resolved validation probe.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use switchyard_core::subscription::SubId;
use switchyard_core::validation::{ProbeCallback, ValidationProbe};

#[derive(Default)]
struct ProbeState {
    pending: Option<(SubId, ProbeCallback)>,
    validations: Vec<SubId>,
    stops: u32,
}

/// Holds each probe request until the test resolves it with
/// [`SimProbe::complete`].
#[derive(Clone)]
pub struct SimProbe {
    state: Arc<Mutex<ProbeState>>,
    supported: bool,
}

impl SimProbe {
    pub fn new(supported: bool) -> Self {
        SimProbe {
            state: Arc::new(Mutex::new(ProbeState::default())),
            supported,
        }
    }

    /// Every subscription a probe was started for, in order.
    pub fn validations(&self) -> Vec<SubId> {
        self.lock().validations.clone()
    }

    pub fn stop_count(&self) -> u32 {
        self.lock().stops
    }

    /// Resolves the in-flight probe with `passed`. Returns whether a probe
    /// was actually pending.
    pub fn complete(&self, passed: bool) -> bool {
        let pending = self.lock().pending.take();
        match pending {
            Some((sub, done)) => {
                debug!(%sub, passed, "sim probe resolved");
                done(sub, passed);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ValidationProbe for SimProbe {
    fn validate(&mut self, sub: SubId, _timeout: Duration, done: ProbeCallback) {
        debug!(%sub, "sim probe started");
        let mut state = self.lock();
        state.validations.push(sub);
        state.pending = Some((sub, done));
    }

    fn stop(&mut self) {
        let mut state = self.lock();
        if state.pending.take().is_some() {
            state.stops += 1;
        }
    }

    fn is_validating(&self) -> bool {
        self.lock().pending.is_some()
    }

    fn sub_in_validation(&self) -> Option<SubId> {
        self.lock().pending.as_ref().map(|(sub, _)| *sub)
    }

    fn is_supported(&self) -> bool {
        self.supported
    }
}
