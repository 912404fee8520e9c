//! Simulated modem HAL with scriptable failures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use switchyard_core::hal::{CommandError, CompletionFn, ModemHal};

/// A command as it hit the (simulated) wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalCommand {
    SetDataAllowed { modem: usize, allowed: bool },
    SetPreferredDataModem { modem: usize },
}

#[derive(Default)]
struct HalState {
    commands: Vec<HalCommand>,
    /// Remaining scripted failures per modem.
    fail_counts: HashMap<usize, u32>,
}

/// Records every command and completes it synchronously. Completions
/// succeed unless a failure was scripted with [`SimModemHal::fail_next`].
#[derive(Clone)]
pub struct SimModemHal {
    state: Arc<Mutex<HalState>>,
    supports_preferred: bool,
}

impl SimModemHal {
    pub fn new(supports_preferred: bool) -> Self {
        SimModemHal {
            state: Arc::new(Mutex::new(HalState::default())),
            supports_preferred,
        }
    }

    /// Every command issued so far, in order.
    pub fn commands(&self) -> Vec<HalCommand> {
        self.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    /// Makes the next `times` commands to `modem` complete with an error.
    pub fn fail_next(&self, modem: usize, times: u32) {
        self.lock().fail_counts.insert(modem, times);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, command: HalCommand, modem: usize) -> Result<(), CommandError> {
        let mut state = self.lock();
        state.commands.push(command);
        match state.fail_counts.get_mut(&modem) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(CommandError("simulated modem failure".into()))
            }
            _ => Ok(()),
        }
    }
}

impl ModemHal for SimModemHal {
    fn set_data_allowed(&self, modem: usize, allowed: bool, done: CompletionFn) {
        debug!(modem, allowed, "sim hal: set_data_allowed");
        let result = self.record(HalCommand::SetDataAllowed { modem, allowed }, modem);
        done(result);
    }

    fn set_preferred_data_modem(&self, modem: usize, done: CompletionFn) {
        debug!(modem, "sim hal: set_preferred_data_modem");
        let result = self.record(HalCommand::SetPreferredDataModem { modem }, modem);
        done(result);
    }

    fn supports_preferred_data(&self) -> bool {
        self.supports_preferred
    }
}
