//! The asynchronous modem command interface.
//!
//! Both commands are fire-and-forget: the HAL must never block, and the
//! completion it is handed re-enters the event loop as a
//! [`SwitcherEvent::ModemCommandDone`](crate::event::SwitcherEvent) event.

use std::fmt;

use serde::Serialize;

/// Which hardware command family the radio supports for data-path control.
///
/// Discovered once when the radio first reports available and immutable for
/// the rest of the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum HalCommandMode {
    /// Radio capability not yet discovered.
    #[default]
    Unknown,
    /// Per-modem allow/disallow data commands.
    LegacyAllowData,
    /// A single command naming exactly one modem as the data path.
    PreferredDataModem,
}

impl fmt::Display for HalCommandMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HalCommandMode::Unknown => "unknown",
            HalCommandMode::LegacyAllowData => "legacy-allow-data",
            HalCommandMode::PreferredDataModem => "preferred-data-modem",
        };
        f.write_str(s)
    }
}

/// Transient hardware failure reported by a command completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError(pub String);

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "modem command failed: {}", self.0)
    }
}

impl std::error::Error for CommandError {}

/// Completion handed to the HAL alongside each command.
pub type CompletionFn = Box<dyn FnOnce(Result<(), CommandError>) + Send + 'static>;

/// The per-modem hardware command surface.
pub trait ModemHal: Send + Sync {
    /// Legacy command: allow or disallow packet data on one modem.
    fn set_data_allowed(&self, modem: usize, allowed: bool, done: CompletionFn);

    /// Advanced command: name one modem as the preferred data path.
    fn set_preferred_data_modem(&self, modem: usize, done: CompletionFn);

    /// Whether the radio supports the preferred-data command family.
    fn supports_preferred_data(&self) -> bool;
}
