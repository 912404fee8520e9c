//! Diagnostics: the bounded decision log and observable state snapshots.

use std::collections::VecDeque;

use quanta::Instant;
use serde::Serialize;

use crate::hal::HalCommandMode;
use crate::subscription::SubId;

/// Bounded ring buffer of recent decision lines, oldest evicted first.
///
/// Lines are prefixed with seconds since the switcher started so a dump
/// reads as a relative timeline.
#[derive(Debug)]
pub struct DecisionLog {
    lines: VecDeque<String>,
    capacity: usize,
    started: Instant,
}

impl DecisionLog {
    pub fn new(capacity: usize) -> Self {
        DecisionLog {
            lines: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            started: Instant::now(),
        }
    }

    pub fn push(&mut self, line: impl AsRef<str>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        let at = self.started.elapsed().as_secs_f64();
        self.lines.push_back(format!("+{at:.3}s {}", line.as_ref()));
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Per-modem observable state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct ModemSnapshot {
    pub active: bool,
    /// Subscription currently bound to this modem, as last mirrored.
    pub sub: Option<SubId>,
    /// Seconds since a command was last dispatched to this modem.
    pub last_command_secs_ago: Option<f64>,
}

/// Read-only snapshot of the switcher's externally visible state.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct Snapshot {
    pub modems: Vec<ModemSnapshot>,
    pub preferred_modem: Option<usize>,
    pub preferred_sub: Option<SubId>,
    pub opportunistic_sub: Option<SubId>,
    pub hal_mode: HalCommandMode,
    pub max_active_modems: usize,
}
