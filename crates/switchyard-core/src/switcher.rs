//! The central control-loop step.
//!
//! [`DataSwitcher`] owns all mutable scheduler state and is driven from a
//! single thread: the runtime feeds it one [`SwitcherEvent`] at a time plus
//! due timer firings. Each stimulus funnels into [`DataSwitcher::evaluate`],
//! which recomputes the desired active-modem set from the full input
//! snapshot, diffs it against current state, and issues hardware commands
//! for the difference. With unchanged inputs it is a strict no-op.

use std::fmt::Write as _;
use std::sync::Arc;

use quanta::Instant;
use tracing::{debug, info, warn};

use crate::config::SwitcherConfig;
use crate::diag::{DecisionLog, ModemSnapshot, Snapshot};
use crate::dispatch::{CommandContext, CommandDispatcher};
use crate::event::{EventSink, SwitcherEvent};
use crate::hal::{CommandError, HalCommandMode, ModemHal};
use crate::observer::ObserverSet;
use crate::preference::{self, Preference, PreferenceInputs};
use crate::request::{Capability, DataRequest, PriorityRequestSet, SubSpecifier};
use crate::subscription::{SubId, SubscriptionDirectory};
use crate::timer::{TimerKey, TimerQueue};
use crate::validation::{self, SwitchAction, SwitchResult, ValidationCoordinator, ValidationProbe};

/// `requests_changed` argument values, matching the stimulus vocabulary.
pub const REQUESTS_CHANGED: bool = true;
pub const REQUESTS_UNCHANGED: bool = false;

/// Per-modem scheduler-owned state.
#[derive(Debug, Clone, Copy, Default)]
struct ModemState {
    active: bool,
    /// When a command was last dispatched to this modem.
    last_command: Option<Instant>,
}

/// Multi-modem data-subscription scheduler.
pub struct DataSwitcher {
    config: SwitcherConfig,
    directory: Arc<dyn SubscriptionDirectory>,
    dispatcher: CommandDispatcher,
    validation: ValidationCoordinator,
    requests: PriorityRequestSet,

    modems: Vec<ModemState>,
    /// Mirror of the directory's modem-to-subscription map, refreshed each
    /// evaluation cycle so deltas can be detected.
    modem_subs: Vec<Option<SubId>>,
    primary_sub: Option<SubId>,
    opportunistic_sub: Option<SubId>,
    in_call_modem: Option<usize>,
    preference: Preference,
    hal_mode: HalCommandMode,
    /// Mode as of the last evaluation, for flip detection.
    seen_hal_mode: HalCommandMode,
    max_active: usize,
    /// Active-modem limit as of the last evaluation.
    seen_max_active: usize,
    emergency: bool,
    /// Armed after a data switch starts; dropped when the default network
    /// path settles or the watch times out.
    path_watch: bool,

    observers: ObserverSet,
    timers: TimerQueue,
    log: DecisionLog,
}

impl DataSwitcher {
    pub fn new(
        config: SwitcherConfig,
        directory: Arc<dyn SubscriptionDirectory>,
        hal: Arc<dyn ModemHal>,
        probe: Box<dyn ValidationProbe>,
        events: EventSink,
    ) -> Self {
        let num_modems = config.num_modems;
        let dispatcher = CommandDispatcher::new(hal, num_modems, events.clone());
        let validation =
            ValidationCoordinator::new(probe, config.validation_timeout(), events);
        let log = DecisionLog::new(config.decision_log_capacity);
        let max_active = config.max_active_modems;

        DataSwitcher {
            config,
            directory,
            dispatcher,
            validation,
            requests: PriorityRequestSet::new(),
            modems: vec![ModemState::default(); num_modems],
            modem_subs: vec![None; num_modems],
            primary_sub: None,
            opportunistic_sub: None,
            in_call_modem: None,
            preference: Preference::default(),
            hal_mode: HalCommandMode::Unknown,
            seen_hal_mode: HalCommandMode::Unknown,
            max_active,
            seen_max_active: max_active,
            emergency: false,
            path_watch: false,
            observers: ObserverSet::new(),
            timers: TimerQueue::new(),
            log,
        }
    }

    // ─── Event dispatch ─────────────────────────────────────────────────

    /// Applies one serialized stimulus.
    pub fn handle(&mut self, event: SwitcherEvent) {
        debug!(event = event.kind(), "handling event");
        match event {
            SwitcherEvent::SubscriptionsChanged => {
                self.evaluate(REQUESTS_UNCHANGED, "subscriptions changed");
            }
            SwitcherEvent::PrimaryDataSubChanged => {
                if self.evaluate(REQUESTS_UNCHANGED, "primary data sub changed") {
                    self.arm_path_watch();
                }
            }
            SwitcherEvent::RequestNetwork(request) => self.on_request_network(request),
            SwitcherEvent::ReleaseNetwork(request) => self.on_release_network(&request),
            SwitcherEvent::EmergencyToggle(active) => {
                self.emergency = active;
                self.log.push(format!(
                    "emergency {}",
                    if active { "entered" } else { "cleared" }
                ));
                self.evaluate(REQUESTS_CHANGED, "emergency toggle");
            }
            SwitcherEvent::RadioCapabilityChanged { modem } => {
                if modem < self.modems.len() {
                    // Modem may have restarted; re-assert its current state.
                    self.send_commands(modem);
                } else {
                    warn!(modem, "radio capability change for unknown modem");
                }
            }
            SwitcherEvent::RadioAvailable => {
                self.update_hal_mode();
                self.evaluate(REQUESTS_UNCHANGED, "radio available");
            }
            SwitcherEvent::VoiceCallChanged { modem } => self.on_voice_call_changed(modem),
            SwitcherEvent::DataEnabledChanged => {
                if self.evaluate(REQUESTS_UNCHANGED, "data enabled changed") {
                    self.arm_path_watch();
                }
            }
            SwitcherEvent::SetOpportunisticSub {
                target,
                need_validation,
                reply,
            } => match target {
                Some(sub) => self.on_request_switch(sub, need_validation, reply),
                None => self.on_request_unset(reply),
            },
            SwitcherEvent::ValidationDone { sub, passed } => {
                self.log
                    .push(format!("validation of sub {sub}: {}", if passed { "passed" } else { "failed" }));
                let action = self.validation.on_validation_result(sub, passed);
                self.apply_switch_action(action);
            }
            SwitcherEvent::ModemCommandDone { modem, result } => {
                self.on_command_done(modem, result);
            }
            SwitcherEvent::MaxActiveChanged(count) => self.on_max_active_changed(count),
            SwitcherEvent::DefaultPathAvailable => self.clear_path_watch("default path available"),
            SwitcherEvent::RegisterObserver { id, callback } => {
                let snapshot = self.snapshot();
                self.observers.register(id, callback, &snapshot);
            }
            SwitcherEvent::UnregisterObserver(id) => {
                self.observers.unregister(id);
            }
            // Handled by the runtime loop; harmless if they reach us.
            SwitcherEvent::Dump(_) | SwitcherEvent::Shutdown => {}
        }
    }

    // ─── Evaluation ─────────────────────────────────────────────────────

    /// Re-evaluates the active-modem set. Does nothing when nothing changed.
    ///
    /// Walks requests in priority order, adding each request's modem until
    /// the active limit is reached, then appends the preferred modem if
    /// room remains. Modems outside the set are deactivated before the set
    /// is activated. Returns whether any externally visible delta was
    /// detected.
    pub fn evaluate(&mut self, requests_changed: bool, reason: &str) -> bool {
        if self.emergency {
            debug!(reason, "evaluation suppressed: emergency");
            self.log.push(format!("evaluate skipped ({reason}): emergency"));
            return false;
        }

        let mut detail = String::from(reason);

        // Simple request churn only matters when every active flag is a
        // real command; with the preferred-data command all modems stay
        // attached and the single preferred index is what counts.
        let mut diff =
            self.hal_mode != HalCommandMode::PreferredDataModem && requests_changed;

        if self.hal_mode != self.seen_hal_mode {
            let _ = write!(detail, " hal {}->{}", self.seen_hal_mode, self.hal_mode);
            self.seen_hal_mode = self.hal_mode;
            diff = true;
        }

        if self.max_active != self.seen_max_active {
            let _ = write!(
                detail,
                " max-active {}->{}",
                self.seen_max_active, self.max_active
            );
            self.seen_max_active = self.max_active;
            diff = true;
        }

        // Primary-sub churn is tracked but is not a delta by itself; it
        // only matters through the preference it produces.
        let primary = self.directory.default_data_sub();
        if primary != self.primary_sub {
            let _ = write!(detail, " primary {:?}->{:?}", self.primary_sub, primary);
            self.primary_sub = primary;
        }

        for modem in 0..self.modems.len() {
            let sub = self.directory.sub_for_modem(modem);
            if sub != self.modem_subs[modem] {
                let _ = write!(detail, " modem[{modem}] {:?}->{:?}", self.modem_subs[modem], sub);
                self.modem_subs[modem] = sub;
                diff = true;
            }
        }

        let resolved = preference::resolve(&PreferenceInputs {
            modem_subs: &self.modem_subs,
            primary: self.primary_sub,
            opportunistic: self.opportunistic_sub,
            in_call_modem: self.in_call_modem,
            directory: self.directory.as_ref(),
        });
        if resolved.modem != self.preference.modem {
            let _ = write!(
                detail,
                " preferred {:?}->{:?}",
                self.preference.modem, resolved.modem
            );
            diff = true;
        }
        self.preference = resolved;

        if !diff {
            return false;
        }

        info!(detail = %detail, "re-evaluating active modems");
        self.log.push(format!("evaluate: {detail}"));

        if self.hal_mode == HalCommandMode::PreferredDataModem {
            // All modems may stay attached; the command names the one
            // carrying default data.
            for state in &mut self.modems {
                state.active = true;
            }
            if let Some(preferred) = self.preference.modem {
                self.send_commands(preferred);
            }
        } else {
            let desired = self.desired_active_set();
            for modem in 0..self.modems.len() {
                if !desired.contains(&modem) {
                    self.switch_modem(modem, false);
                }
            }
            for &modem in &desired {
                self.switch_modem(modem, true);
            }
        }

        self.notify_observers();
        true
    }

    /// Greedy priority-order fill of the active set (legacy command mode).
    fn desired_active_set(&self) -> Vec<usize> {
        let total = self.modems.len();
        if self.max_active >= total {
            return (0..total).collect();
        }

        let mut active = Vec::new();
        for request in self.requests.iter() {
            let Some(modem) = self.modem_for_request(request) else {
                continue;
            };
            if active.contains(&modem) {
                continue;
            }
            active.push(modem);
            if active.len() >= self.max_active {
                break;
            }
        }

        if active.len() < self.max_active {
            if let Some(preferred) = self.preference.modem {
                if !active.contains(&preferred) {
                    active.push(preferred);
                }
            }
        }
        active
    }

    /// Resolves which modem should serve a request, if any.
    ///
    /// Multi-path internet is disallowed: an internet request naming a
    /// subscription other than the preferred one (or the one currently
    /// under validation) is left unroutable until conditions change.
    pub fn modem_for_request(&self, request: &DataRequest) -> Option<usize> {
        let sub = match request.specifier {
            SubSpecifier::Preferred => return self.preference.modem,
            SubSpecifier::Invalid => return None,
            SubSpecifier::Exact(sub) => sub,
        };

        let preferred_sub = self
            .preference
            .modem
            .and_then(|modem| self.modem_subs.get(modem).copied().flatten());
        if request.capability == Capability::Internet
            && Some(sub) != preferred_sub
            && Some(sub) != self.validation.sub_in_validation()
        {
            return None;
        }

        self.modem_subs.iter().position(|bound| *bound == Some(sub))
    }

    /// Whether `modem` should serve `request` right now: it must be active
    /// and be the modem the request resolves to.
    pub fn should_apply_request(&self, request: &DataRequest, modem: usize) -> bool {
        self.is_modem_active(modem) && self.modem_for_request(request) == Some(modem)
    }

    // ─── Modem state transitions ────────────────────────────────────────

    fn switch_modem(&mut self, modem: usize, active: bool) {
        if self.modems[modem].active == active {
            return;
        }
        self.modems[modem].active = active;
        info!(modem, active, "modem data state changed");
        self.log.push(format!(
            "{} modem {modem}",
            if active { "activate" } else { "deactivate" }
        ));
        self.send_commands(modem);
    }

    /// Issues the hardware command reflecting `modem`'s current state.
    fn send_commands(&mut self, modem: usize) {
        if modem >= self.modems.len() {
            warn!(modem, "not sending command to out-of-range modem");
            return;
        }
        let ctx = CommandContext {
            mode: self.hal_mode,
            active: self.modems[modem].active,
            preferred: self.preference.modem,
        };
        if self.dispatcher.send(modem, ctx) {
            self.modems[modem].last_command = Some(Instant::now());
        }
    }

    fn on_command_done(&mut self, modem: usize, result: Result<(), CommandError>) {
        if modem >= self.modems.len() {
            warn!(modem, "command completion for unknown modem");
            return;
        }
        match result {
            Ok(()) => {
                // A success supersedes any pending retry for this modem.
                self.timers.cancel(TimerKey::CommandRetry(modem));
            }
            Err(err) => {
                warn!(modem, error = %err, "modem command failed, scheduling retry");
                self.log.push(format!("command failed on modem {modem}: {err}"));
                self.timers.schedule(
                    TimerKey::CommandRetry(modem),
                    Instant::now() + self.config.command_retry_period(),
                );
            }
        }
    }

    fn update_hal_mode(&mut self) {
        if self.hal_mode != HalCommandMode::Unknown {
            return;
        }
        self.hal_mode = if self.dispatcher.supports_preferred_data() {
            HalCommandMode::PreferredDataModem
        } else {
            HalCommandMode::LegacyAllowData
        };
        info!(mode = %self.hal_mode, "hal command mode discovered");
        self.log.push(format!("hal command mode: {}", self.hal_mode));
    }

    // ─── Requests ───────────────────────────────────────────────────────

    fn on_request_network(&mut self, request: DataRequest) {
        if self.requests.add(request) {
            self.evaluate(REQUESTS_CHANGED, "network requested");
        }
    }

    fn on_release_network(&mut self, request: &DataRequest) {
        if self.requests.remove(request) {
            self.evaluate(REQUESTS_CHANGED, "network released");
        }
    }

    // ─── Voice calls ────────────────────────────────────────────────────

    fn on_voice_call_changed(&mut self, modem: Option<usize>) {
        if let Some(m) = modem {
            if m >= self.modems.len() {
                warn!(modem = m, "voice call on unknown modem ignored");
                return;
            }
        }
        if self.in_call_modem == modem {
            return;
        }
        self.log
            .push(format!("in-call modem {:?} -> {:?}", self.in_call_modem, modem));
        self.in_call_modem = modem;
        if self.evaluate(REQUESTS_UNCHANGED, "voice call changed") {
            self.arm_path_watch();
        }
    }

    // ─── Opportunistic switching ────────────────────────────────────────

    fn on_request_switch(
        &mut self,
        sub: SubId,
        need_validation: bool,
        reply: Option<validation::ReplyFn>,
    ) {
        self.log.push(format!(
            "opportunistic switch to sub {sub} requested ({} validation)",
            if need_validation { "with" } else { "without" }
        ));
        let action = self.validation.request_switch(
            sub,
            need_validation,
            self.opportunistic_sub,
            self.directory.as_ref(),
            reply,
        );
        self.apply_switch_action(action);
    }

    fn on_request_unset(&mut self, reply: Option<validation::ReplyFn>) {
        self.log.push("opportunistic sub unset requested".to_string());
        let action = self.validation.request_unset(reply);
        self.apply_switch_action(action);
    }

    fn apply_switch_action(&mut self, action: SwitchAction) {
        match action {
            SwitchAction::Handled => {}
            SwitchAction::Commit { target, reply } => {
                self.set_opportunistic(target);
                validation::send_reply(reply, SwitchResult::Success);
            }
        }
    }

    /// Commits the opportunistic subscription. Idempotent; a real change
    /// triggers a re-evaluation and arms the path watch on a data switch.
    fn set_opportunistic(&mut self, target: Option<SubId>) {
        if self.opportunistic_sub == target {
            return;
        }
        self.opportunistic_sub = target;
        self.log
            .push(format!("opportunistic sub committed: {target:?}"));
        if self.evaluate(REQUESTS_UNCHANGED, "opportunistic sub changed") {
            self.arm_path_watch();
        }
    }

    // ─── Capability ─────────────────────────────────────────────────────

    fn on_max_active_changed(&mut self, count: usize) {
        if count == 0 {
            warn!("ignoring max-active-modems change to zero");
            return;
        }
        if self.max_active == count {
            return;
        }
        self.max_active = count;
        info!(max_active = count, "max active modems changed");
        self.log.push(format!("max active modems: {count}"));
        self.evaluate(REQUESTS_UNCHANGED, "max active modems changed");
    }

    // ─── Path watch ─────────────────────────────────────────────────────

    fn arm_path_watch(&mut self) {
        self.path_watch = true;
        self.timers.schedule(
            TimerKey::PathWatchExpiry,
            Instant::now() + self.config.path_watch_timeout(),
        );
        debug!("path watch armed");
    }

    fn clear_path_watch(&mut self, why: &str) {
        if !self.path_watch {
            return;
        }
        self.path_watch = false;
        self.timers.cancel(TimerKey::PathWatchExpiry);
        self.log.push(format!("path watch cleared: {why}"));
    }

    // ─── Timers ─────────────────────────────────────────────────────────

    /// Earliest pending timer deadline, for the loop's wait timeout.
    pub fn next_timer_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Fires every timer due at `now`.
    pub fn fire_due_timers(&mut self, now: Instant) {
        for key in self.timers.fire_due(now) {
            match key {
                TimerKey::CommandRetry(modem) => {
                    info!(modem, "retrying modem command");
                    self.log.push(format!("retry modem command on {modem}"));
                    self.send_commands(modem);
                }
                TimerKey::PathWatchExpiry => self.clear_path_watch("watch timeout"),
            }
        }
    }

    // ─── Observability ──────────────────────────────────────────────────

    fn notify_observers(&mut self) {
        info!(
            preferred_modem = ?self.preference.modem,
            preferred_sub = ?self.preference.sub,
            "notifying active modem observers"
        );
        let snapshot = self.snapshot();
        self.observers.notify(&snapshot);
    }

    pub fn preferred_modem(&self) -> Option<usize> {
        self.preference.modem
    }

    pub fn preferred_sub(&self) -> Option<SubId> {
        self.preference.sub
    }

    pub fn opportunistic_sub(&self) -> Option<SubId> {
        self.opportunistic_sub
    }

    pub fn is_modem_active(&self, modem: usize) -> bool {
        self.modems.get(modem).is_some_and(|m| m.active)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            modems: self
                .modems
                .iter()
                .enumerate()
                .map(|(idx, state)| ModemSnapshot {
                    active: state.active,
                    sub: self.modem_subs[idx],
                    last_command_secs_ago: state
                        .last_command
                        .map(|at| at.elapsed().as_secs_f64()),
                })
                .collect(),
            preferred_modem: self.preference.modem,
            preferred_sub: self.preference.sub,
            opportunistic_sub: self.opportunistic_sub,
            hal_mode: self.hal_mode,
            max_active_modems: self.max_active,
        }
    }

    /// Human-readable diagnostics report.
    pub fn dump(&self) -> String {
        let mut out = String::from("DataSwitcher:\n");
        for (idx, state) in self.modems.iter().enumerate() {
            let last = match state.last_command {
                Some(at) => format!("{:.1}s ago", at.elapsed().as_secs_f64()),
                None => "never".to_string(),
            };
            let _ = writeln!(
                out,
                "  modem {idx}: active={} sub={:?} last_command={last}",
                state.active, self.modem_subs[idx]
            );
        }
        let _ = writeln!(
            out,
            "  preferred={:?} opportunistic={:?} hal_mode={} max_active={}",
            self.preference.modem, self.opportunistic_sub, self.hal_mode, self.max_active
        );
        out.push_str("  recent decisions:\n");
        for line in self.log.iter() {
            let _ = writeln!(out, "    {line}");
        }
        out
    }

    /// Diagnostics snapshot as pretty JSON.
    pub fn dump_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }
}
