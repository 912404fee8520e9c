//! Preferred-modem resolution.
//!
//! A pure function over a snapshot of switcher inputs. The evaluator calls
//! it once per cycle and diffs the result; it never caches or mutates
//! anything itself.

use crate::subscription::{SubId, SubscriptionDirectory};

/// The resolved preference for default data traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Preference {
    /// The modem that should carry default data, if any is suitable.
    pub modem: Option<usize>,
    /// The subscription bound to that modem.
    pub sub: Option<SubId>,
}

/// Inputs to one resolution pass.
pub struct PreferenceInputs<'a> {
    /// Mirrored modem-to-subscription bindings, indexed by modem.
    pub modem_subs: &'a [Option<SubId>],
    /// User-selected default data subscription.
    pub primary: Option<SubId>,
    /// Committed opportunistic subscription, if any.
    pub opportunistic: Option<SubId>,
    /// Modem with an active or alerting voice call, if any.
    pub in_call_modem: Option<usize>,
    pub directory: &'a dyn SubscriptionDirectory,
}

/// Resolves the preferred modem from the given snapshot.
///
/// Rules, in order:
/// 1. A modem carrying a voice call whose subscription has user data
///    enabled wins outright — switching data elsewhere would drop anyway.
///    A stale in-call index (no bound subscription) falls through.
/// 2. Otherwise the logical preferred subscription is the opportunistic one
///    while it is active, else the primary.
/// 3. That subscription maps to its bound modem; no binding means no
///    preference.
pub fn resolve(inputs: &PreferenceInputs<'_>) -> Preference {
    if let Some(modem) = inputs.in_call_modem {
        if let Some(sub) = inputs.modem_subs.get(modem).copied().flatten() {
            if inputs.directory.is_user_data_enabled(sub) {
                return Preference {
                    modem: Some(modem),
                    sub: Some(sub),
                };
            }
        }
    }

    let logical = match inputs.opportunistic {
        Some(oppt) if inputs.directory.is_active_sub(oppt) => Some(oppt),
        _ => inputs.primary,
    };

    let modem = logical.and_then(|sub| {
        inputs
            .modem_subs
            .iter()
            .position(|bound| *bound == Some(sub))
    });

    Preference {
        modem,
        sub: modem.and_then(|m| inputs.modem_subs[m]),
    }
}
