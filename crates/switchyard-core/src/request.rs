//! Data connectivity requests and the priority-ordered request set.
//!
//! External request sources hand the switcher a stream of "need network" /
//! "release network" stimuli. Each request names a capability and an
//! optional target subscription. The set keeps them sorted so the evaluator
//! can fill modem capacity greedily in priority order.

use tracing::warn;

use crate::subscription::SubId;

/// The connectivity capability a request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// General internet traffic. Policy allows at most one modem to carry it.
    Internet,
    Mms,
    Supl,
    Dun,
    Fota,
    Ims,
    Cbs,
    Xcap,
    Rcs,
    Eims,
}

/// Which subscription a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubSpecifier {
    /// No target named: route to whichever modem is preferred.
    Preferred,
    /// An explicit target subscription.
    Exact(SubId),
    /// A malformed specifier. Requests carrying this are unroutable until
    /// they are released and re-issued.
    Invalid,
}

impl SubSpecifier {
    /// Parses an optional specifier string from a request source.
    ///
    /// A missing specifier means "preferred"; a present but malformed one
    /// maps to [`SubSpecifier::Invalid`] rather than an error, so the
    /// request is kept but never routed.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => SubSpecifier::Preferred,
            Some(s) => match s.trim().parse::<i32>() {
                Ok(id) => SubSpecifier::Exact(SubId(id)),
                Err(_) => {
                    warn!(specifier = s, "malformed subscription specifier");
                    SubSpecifier::Invalid
                }
            },
        }
    }
}

/// Priority class of a request, declared by its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequestOrigin {
    /// System-originated requests sort ahead of everything else.
    Privileged,
    Ordinary,
}

/// An outstanding requirement for data connectivity.
///
/// Two requests are equal when they name the same (specifier, capability)
/// pair; the origin only affects ordering.
#[derive(Debug, Clone, Copy)]
pub struct DataRequest {
    pub capability: Capability,
    pub specifier: SubSpecifier,
    pub origin: RequestOrigin,
}

impl DataRequest {
    /// A request with no target subscription.
    pub fn preferred(capability: Capability, origin: RequestOrigin) -> Self {
        DataRequest {
            capability,
            specifier: SubSpecifier::Preferred,
            origin,
        }
    }

    /// A request targeting an explicit subscription.
    pub fn for_sub(capability: Capability, sub: SubId, origin: RequestOrigin) -> Self {
        DataRequest {
            capability,
            specifier: SubSpecifier::Exact(sub),
            origin,
        }
    }
}

impl PartialEq for DataRequest {
    fn eq(&self, other: &Self) -> bool {
        self.capability == other.capability && self.specifier == other.specifier
    }
}

impl Eq for DataRequest {}

/// Outstanding requests, highest priority first.
///
/// Mutated only by `add`/`remove`; re-sorted (stably) on every insertion so
/// ties keep their arrival order.
#[derive(Debug, Default)]
pub struct PriorityRequestSet {
    requests: Vec<DataRequest>,
}

impl PriorityRequestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the request unless an equal one is already present.
    /// Returns whether the set changed (and a re-evaluation is warranted).
    pub fn add(&mut self, request: DataRequest) -> bool {
        if self.requests.contains(&request) {
            return false;
        }
        self.requests.push(request);
        self.requests.sort_by_key(|r| r.origin);
        true
    }

    /// Removes the request if present. Returns whether the set changed.
    pub fn remove(&mut self, request: &DataRequest) -> bool {
        match self.requests.iter().position(|r| r == request) {
            Some(idx) => {
                self.requests.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Iterates requests in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &DataRequest> {
        self.requests.iter()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
