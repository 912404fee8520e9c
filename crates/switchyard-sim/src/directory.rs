//! Scriptable in-memory subscription directory.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use switchyard_core::subscription::{SubId, SubscriptionDirectory};

#[derive(Default)]
struct DirectoryState {
    default_sub: Option<SubId>,
    bindings: Vec<Option<SubId>>,
    active: HashSet<SubId>,
    data_enabled: HashSet<SubId>,
}

/// Shared-state directory; clones observe each other's mutations, so a test
/// can hand one clone to the switcher and keep another for scripting.
#[derive(Clone, Default)]
pub struct SimDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl SimDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_default_sub(&self, sub: Option<SubId>) {
        self.lock().default_sub = sub;
    }

    /// Binds `sub` to `modem` and marks it active.
    pub fn bind(&self, modem: usize, sub: SubId) {
        let mut state = self.lock();
        if state.bindings.len() <= modem {
            state.bindings.resize(modem + 1, None);
        }
        state.bindings[modem] = Some(sub);
        state.active.insert(sub);
    }

    /// Removes the binding for `modem` and deactivates its subscription.
    pub fn unbind(&self, modem: usize) {
        let mut state = self.lock();
        if let Some(slot) = state.bindings.get_mut(modem) {
            if let Some(sub) = slot.take() {
                state.active.remove(&sub);
            }
        }
    }

    pub fn set_active(&self, sub: SubId, active: bool) {
        let mut state = self.lock();
        if active {
            state.active.insert(sub);
        } else {
            state.active.remove(&sub);
        }
    }

    pub fn set_data_enabled(&self, sub: SubId, enabled: bool) {
        let mut state = self.lock();
        if enabled {
            state.data_enabled.insert(sub);
        } else {
            state.data_enabled.remove(&sub);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SubscriptionDirectory for SimDirectory {
    fn default_data_sub(&self) -> Option<SubId> {
        self.lock().default_sub
    }

    fn sub_for_modem(&self, modem: usize) -> Option<SubId> {
        self.lock().bindings.get(modem).copied().flatten()
    }

    fn is_active_sub(&self, sub: SubId) -> bool {
        self.lock().active.contains(&sub)
    }

    fn is_user_data_enabled(&self, sub: SubId) -> bool {
        self.lock().data_enabled.contains(&sub)
    }
}
