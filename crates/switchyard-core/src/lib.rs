//! # Switchyard — Multi-Modem Data-Subscription Scheduler
//!
//! Decides, at every moment, which of a device's modems may carry data
//! traffic and which one is preferred for default internet. Inputs (network
//! requests, subscription changes, voice calls, emergencies, hardware
//! capability) arrive as events on a single worker thread; each event runs
//! one evaluation cycle that diffs desired state against current state and
//! issues modem commands for the difference.
//!
//! The crate is hardware-agnostic: the modem HAL, the subscription
//! directory, and the data-path validation probe are traits, implemented by
//! the platform (or by `switchyard-sim` in tests).

pub mod config;
pub mod diag;
pub mod dispatch;
pub mod event;
pub mod hal;
pub mod observer;
pub mod preference;
pub mod request;
pub mod runtime;
pub mod subscription;
pub mod switcher;
pub mod timer;
pub mod validation;

pub use config::SwitcherConfig;
pub use diag::{ModemSnapshot, Snapshot};
pub use event::{EventSink, SwitcherEvent};
pub use hal::{CommandError, CompletionFn, HalCommandMode, ModemHal};
pub use observer::{ObserverFn, ObserverId};
pub use request::{Capability, DataRequest, PriorityRequestSet, RequestOrigin, SubSpecifier};
pub use runtime::SwitcherRuntime;
pub use subscription::{SubId, SubscriptionDirectory};
pub use switcher::DataSwitcher;
pub use validation::{ProbeCallback, ReplyFn, SwitchResult, ValidationProbe};
