//! Threaded runtime around [`DataSwitcher`].
//!
//! Owns the bounded event channel and the worker thread that applies events
//! in arrival order. All public methods are cheap posts; the switcher state
//! itself is only ever touched by the worker. A shared snapshot mirror is
//! refreshed after every applied event so callers can inspect state without
//! a round trip.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use quanta::Instant;
use tracing::{debug, info, warn};

use crate::config::SwitcherConfig;
use crate::diag::Snapshot;
use crate::event::{EventSink, SwitcherEvent};
use crate::hal::{CommandError, ModemHal};
use crate::observer::{ObserverFn, ObserverId};
use crate::request::DataRequest;
use crate::subscription::{SubId, SubscriptionDirectory};
use crate::switcher::{DataSwitcher, REQUESTS_UNCHANGED};
use crate::validation::{ReplyFn, ValidationProbe};

const DUMP_REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Handle to a running switcher worker.
pub struct SwitcherRuntime {
    events: Sender<SwitcherEvent>,
    shutdown: Arc<AtomicBool>,
    snapshot: Arc<Mutex<Snapshot>>,
    next_observer_id: AtomicU64,
    handle: Option<JoinHandle<()>>,
}

impl SwitcherRuntime {
    /// Validates the config and starts the worker thread.
    pub fn start(
        config: SwitcherConfig,
        directory: Arc<dyn SubscriptionDirectory>,
        hal: Arc<dyn ModemHal>,
        probe: Box<dyn ValidationProbe>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let (tx, rx) = bounded::<SwitcherEvent>(config.event_queue_capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let snapshot = Arc::new(Mutex::new(Snapshot::default()));

        // Completions arrive on the worker thread itself, so the loop-back
        // sink must never block on a full queue.
        let sink: EventSink = {
            let tx = tx.clone();
            Arc::new(move |event| {
                if let Err(err) = tx.try_send(event) {
                    warn!(error = %err, "event queue full, dropping loop-back event");
                }
            })
        };

        let worker_snapshot = snapshot.clone();
        let handle = std::thread::Builder::new()
            .name("switchyard-worker".into())
            .spawn(move || {
                let mut switcher = DataSwitcher::new(config, directory, hal, probe, sink);
                switcher.evaluate(REQUESTS_UNCHANGED, "startup");
                Self::store_snapshot(&worker_snapshot, &switcher);

                loop {
                    switcher.fire_due_timers(Instant::now());

                    let received = match switcher.next_timer_deadline() {
                        Some(deadline) => {
                            // quanta saturates to zero for past deadlines.
                            rx.recv_timeout(deadline.duration_since(Instant::now()))
                        }
                        None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };

                    match received {
                        Ok(SwitcherEvent::Shutdown) => break,
                        Ok(SwitcherEvent::Dump(reply)) => {
                            let _ = reply.send(switcher.dump());
                        }
                        Ok(event) => switcher.handle(event),
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }

                    Self::store_snapshot(&worker_snapshot, &switcher);
                }
                debug!("switcher worker stopped");
            })
            .context("spawning switcher worker")?;

        info!("switcher runtime started");
        Ok(SwitcherRuntime {
            events: tx,
            shutdown,
            snapshot,
            next_observer_id: AtomicU64::new(1),
            handle: Some(handle),
        })
    }

    fn store_snapshot(shared: &Mutex<Snapshot>, switcher: &DataSwitcher) {
        let mut guard = shared.lock().unwrap_or_else(|e| e.into_inner());
        *guard = switcher.snapshot();
    }

    fn post(&self, event: SwitcherEvent) {
        if self.shutdown.load(Ordering::Acquire) {
            warn!(event = event.kind(), "dropping event after shutdown");
            return;
        }
        if self.events.send(event).is_err() {
            warn!("switcher worker gone, event dropped");
        }
    }

    // ─── Network requests ───────────────────────────────────────────────

    pub fn request_network(&self, request: DataRequest) {
        self.post(SwitcherEvent::RequestNetwork(request));
    }

    pub fn release_network(&self, request: DataRequest) {
        self.post(SwitcherEvent::ReleaseNetwork(request));
    }

    // ─── Environment notifications ──────────────────────────────────────

    pub fn notify_subscriptions_changed(&self) {
        self.post(SwitcherEvent::SubscriptionsChanged);
    }

    pub fn notify_primary_data_sub_changed(&self) {
        self.post(SwitcherEvent::PrimaryDataSubChanged);
    }

    pub fn notify_data_enabled_changed(&self) {
        self.post(SwitcherEvent::DataEnabledChanged);
    }

    /// `None` means no active or alerting voice call anywhere.
    pub fn notify_voice_call_changed(&self, modem: Option<usize>) {
        self.post(SwitcherEvent::VoiceCallChanged { modem });
    }

    pub fn notify_radio_available(&self) {
        self.post(SwitcherEvent::RadioAvailable);
    }

    pub fn notify_radio_capability_changed(&self, modem: usize) {
        self.post(SwitcherEvent::RadioCapabilityChanged { modem });
    }

    pub fn notify_emergency(&self, active: bool) {
        self.post(SwitcherEvent::EmergencyToggle(active));
    }

    pub fn notify_max_active_changed(&self, count: usize) {
        self.post(SwitcherEvent::MaxActiveChanged(count));
    }

    pub fn notify_default_path_available(&self) {
        self.post(SwitcherEvent::DefaultPathAvailable);
    }

    /// For platforms whose validation results arrive out-of-band rather
    /// than through the probe callback.
    pub fn notify_validation_done(&self, sub: SubId, passed: bool) {
        self.post(SwitcherEvent::ValidationDone { sub, passed });
    }

    /// For platforms reporting modem command results as standalone events.
    pub fn notify_modem_command_done(&self, modem: usize, result: Result<(), CommandError>) {
        self.post(SwitcherEvent::ModemCommandDone { modem, result });
    }

    // ─── Opportunistic switching ────────────────────────────────────────

    pub fn set_opportunistic_sub(
        &self,
        sub: SubId,
        need_validation: bool,
        reply: Option<ReplyFn>,
    ) {
        self.post(SwitcherEvent::SetOpportunisticSub {
            target: Some(sub),
            need_validation,
            reply,
        });
    }

    pub fn unset_opportunistic_sub(&self, reply: Option<ReplyFn>) {
        self.post(SwitcherEvent::SetOpportunisticSub {
            target: None,
            need_validation: false,
            reply,
        });
    }

    // ─── Observability ──────────────────────────────────────────────────

    /// Registers an active-modem-change observer. It fires once with the
    /// current state as soon as the worker picks up the registration.
    pub fn register_observer(&self, callback: ObserverFn) -> ObserverId {
        let id = ObserverId(self.next_observer_id.fetch_add(1, Ordering::Relaxed));
        self.post(SwitcherEvent::RegisterObserver { id, callback });
        id
    }

    pub fn unregister_observer(&self, id: ObserverId) {
        self.post(SwitcherEvent::UnregisterObserver(id));
    }

    /// Last snapshot stored by the worker. May lag posted events that the
    /// worker has not applied yet.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Renders the diagnostics dump on the worker thread.
    pub fn dump(&self) -> anyhow::Result<String> {
        let (tx, rx) = bounded(1);
        self.post(SwitcherEvent::Dump(tx));
        rx.recv_timeout(DUMP_REPLY_TIMEOUT)
            .context("switcher worker did not answer dump request")
    }

    /// Stops the worker and joins it. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        // Never called from the worker thread, so a blocking send is safe;
        // a full queue must not drop the shutdown event before the join.
        let _ = self.events.send(SwitcherEvent::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("switcher worker panicked");
            }
        }
        info!("switcher runtime stopped");
    }
}

impl Drop for SwitcherRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
