//! Subscriber identity types and the read-only subscription directory.
//!
//! The directory is maintained by an external subscription authority; the
//! switcher only queries it and mirrors the modem-to-subscription bindings
//! into its own state once per evaluation cycle.

use std::fmt;

use serde::Serialize;

/// A subscriber identity that can be bound to a modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubId(pub i32);

impl fmt::Display for SubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only view of the external subscription authority.
///
/// Implementations must be cheap to query; the switcher polls the full
/// modem-to-subscription map on every evaluation cycle.
pub trait SubscriptionDirectory: Send + Sync {
    /// The user-selected default data subscription, if any.
    fn default_data_sub(&self) -> Option<SubId>;

    /// The subscription currently bound to the given modem, if any.
    fn sub_for_modem(&self, modem: usize) -> Option<SubId>;

    /// Whether the given subscription is currently active (provisioned and
    /// usable).
    fn is_active_sub(&self, sub: SubId) -> bool;

    /// Whether the user has enabled mobile data on the given subscription.
    /// Read by the voice-continuity preference rule.
    fn is_user_data_enabled(&self, sub: SubId) -> bool;
}
