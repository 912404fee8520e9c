//! Hardware command dispatch.
//!
//! Translates a desired per-modem state into the right HAL command for the
//! discovered command mode. Dispatch is fire-and-forget; completions come
//! back through the event loop, and the evaluator schedules constant-backoff
//! retries off failed completions.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::event::{EventSink, SwitcherEvent};
use crate::hal::{CompletionFn, HalCommandMode, ModemHal};

/// Snapshot of the evaluator state a command is derived from.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext {
    pub mode: HalCommandMode,
    /// Desired active flag of the target modem.
    pub active: bool,
    /// Currently preferred modem, if any.
    pub preferred: Option<usize>,
}

/// Issues modem commands and routes completions back into the loop.
pub struct CommandDispatcher {
    hal: Arc<dyn ModemHal>,
    num_modems: usize,
    events: EventSink,
}

impl CommandDispatcher {
    pub fn new(hal: Arc<dyn ModemHal>, num_modems: usize, events: EventSink) -> Self {
        CommandDispatcher {
            hal,
            num_modems,
            events,
        }
    }

    pub fn supports_preferred_data(&self) -> bool {
        self.hal.supports_preferred_data()
    }

    /// Issues the command appropriate for `ctx` to `modem`.
    ///
    /// Returns whether a command was actually put on the wire, so the
    /// caller can timestamp the modem state. Legacy allow-data is skipped
    /// on single-modem devices; the preferred-data command is only sent to
    /// the preferred modem itself.
    pub fn send(&self, modem: usize, ctx: CommandContext) -> bool {
        if modem >= self.num_modems {
            warn!(modem, "dropping command for out-of-range modem");
            return false;
        }

        let events = self.events.clone();
        let done: CompletionFn = Box::new(move |result| {
            events(SwitcherEvent::ModemCommandDone { modem, result });
        });

        match ctx.mode {
            HalCommandMode::LegacyAllowData | HalCommandMode::Unknown => {
                if self.num_modems > 1 {
                    debug!(modem, allowed = ctx.active, "set_data_allowed");
                    self.hal.set_data_allowed(modem, ctx.active, done);
                    true
                } else {
                    false
                }
            }
            HalCommandMode::PreferredDataModem => {
                if Some(modem) == ctx.preferred {
                    debug!(modem, "set_preferred_data_modem");
                    self.hal.set_preferred_data_modem(modem, done);
                    true
                } else {
                    false
                }
            }
        }
    }
}
