//! Typed events for the single-consumer switcher loop.
//!
//! Every external stimulus is converted into one of these variants and
//! enqueued; the worker thread applies them strictly in arrival order, so
//! no other synchronization is needed around switcher state.

use std::fmt;
use std::sync::Arc;

use crate::hal::CommandError;
use crate::observer::{ObserverFn, ObserverId};
use crate::request::DataRequest;
use crate::subscription::SubId;
use crate::validation::ReplyFn;

/// Posts an event back into the switcher loop. Handed to collaborators
/// (HAL completions, validation probe) so their results re-enter the loop
/// instead of mutating state directly.
pub type EventSink = Arc<dyn Fn(SwitcherEvent) + Send + Sync>;

/// A serialized stimulus for the switcher.
pub enum SwitcherEvent {
    /// The subscription directory contents changed.
    SubscriptionsChanged,
    /// The user-selected default data subscription changed.
    PrimaryDataSubChanged,
    /// A request source needs network connectivity.
    RequestNetwork(DataRequest),
    /// A request source released a previous requirement.
    ReleaseNetwork(DataRequest),
    /// The device entered or left an emergency condition.
    EmergencyToggle(bool),
    /// One modem's radio capability changed (e.g. modem restart); its
    /// current command should be re-sent.
    RadioCapabilityChanged { modem: usize },
    /// The radio stack became available; the command mode can be discovered.
    RadioAvailable,
    /// The modem carrying an active or alerting voice call changed.
    /// `None` means no call anywhere.
    VoiceCallChanged { modem: Option<usize> },
    /// A subscription's user data-enabled setting flipped.
    DataEnabledChanged,
    /// Request to switch the opportunistic data subscription. `None` target
    /// reverts to the primary subscription.
    SetOpportunisticSub {
        target: Option<SubId>,
        need_validation: bool,
        reply: Option<ReplyFn>,
    },
    /// The validation probe finished.
    ValidationDone { sub: SubId, passed: bool },
    /// A modem command completed, possibly with a transient error.
    ModemCommandDone {
        modem: usize,
        result: Result<(), CommandError>,
    },
    /// The maximum simultaneous active modem count changed.
    MaxActiveChanged(usize),
    /// The default network path settled after a data switch.
    DefaultPathAvailable,
    /// Register an active-modem-change observer; fires once immediately.
    RegisterObserver { id: ObserverId, callback: ObserverFn },
    UnregisterObserver(ObserverId),
    /// Render the diagnostics dump and send it on the reply channel.
    Dump(crossbeam_channel::Sender<String>),
    /// Stop the worker loop.
    Shutdown,
}

impl SwitcherEvent {
    /// Short stable name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SwitcherEvent::SubscriptionsChanged => "subscriptions-changed",
            SwitcherEvent::PrimaryDataSubChanged => "primary-data-sub-changed",
            SwitcherEvent::RequestNetwork(_) => "request-network",
            SwitcherEvent::ReleaseNetwork(_) => "release-network",
            SwitcherEvent::EmergencyToggle(_) => "emergency-toggle",
            SwitcherEvent::RadioCapabilityChanged { .. } => "radio-capability-changed",
            SwitcherEvent::RadioAvailable => "radio-available",
            SwitcherEvent::VoiceCallChanged { .. } => "voice-call-changed",
            SwitcherEvent::DataEnabledChanged => "data-enabled-changed",
            SwitcherEvent::SetOpportunisticSub { .. } => "set-opportunistic-sub",
            SwitcherEvent::ValidationDone { .. } => "validation-done",
            SwitcherEvent::ModemCommandDone { .. } => "modem-command-done",
            SwitcherEvent::MaxActiveChanged(_) => "max-active-changed",
            SwitcherEvent::DefaultPathAvailable => "default-path-available",
            SwitcherEvent::RegisterObserver { .. } => "register-observer",
            SwitcherEvent::UnregisterObserver(_) => "unregister-observer",
            SwitcherEvent::Dump(_) => "dump",
            SwitcherEvent::Shutdown => "shutdown",
        }
    }
}

impl fmt::Debug for SwitcherEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}
