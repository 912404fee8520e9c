//! End-to-end scenarios through the threaded runtime and the simulated
//! platform: boot, request churn, opportunistic switching, hot-plug of
//! subscriptions, and emergency handling.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use switchyard_core::request::{Capability, DataRequest, RequestOrigin};
use switchyard_core::validation::SwitchResult;
use switchyard_core::{HalCommandMode, ReplyFn, SubId, SwitcherConfig, SwitcherRuntime};
use switchyard_sim::{HalCommand, SimDirectory, SimModemHal, SimProbe};

fn wait_until(mut predicate: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !predicate() {
        assert!(
            std::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        std::thread::sleep(Duration::from_millis(5));
    }
}

struct Device {
    runtime: SwitcherRuntime,
    hal: SimModemHal,
    directory: SimDirectory,
    probe: SimProbe,
}

/// Dual-SIM device, subscription 10 (primary) on modem 0 and 20 on modem 1,
/// booted far enough that the first evaluation has settled.
fn dual_sim_device(preferred_data: bool) -> Device {
    let hal = SimModemHal::new(preferred_data);
    let directory = SimDirectory::new();
    directory.set_default_sub(Some(SubId(10)));
    directory.bind(0, SubId(10));
    directory.bind(1, SubId(20));
    let probe = SimProbe::new(true);
    let runtime = SwitcherRuntime::start(
        SwitcherConfig::default(),
        Arc::new(directory.clone()),
        Arc::new(hal.clone()),
        Box::new(probe.clone()),
    )
    .unwrap();

    runtime.notify_radio_available();
    wait_until(|| {
        let snap = runtime.snapshot();
        snap.hal_mode != HalCommandMode::Unknown && snap.preferred_modem == Some(0)
    });
    Device {
        runtime,
        hal,
        directory,
        probe,
    }
}

fn capture_reply() -> (ReplyFn, Arc<Mutex<Option<SwitchResult>>>) {
    let slot = Arc::new(Mutex::new(None));
    let inner = slot.clone();
    (Box::new(move |r| *inner.lock().unwrap() = Some(r)), slot)
}

#[test]
fn boot_settles_on_primary_modem() {
    let dev = dual_sim_device(false);
    let snap = dev.runtime.snapshot();

    assert_eq!(snap.hal_mode, HalCommandMode::LegacyAllowData);
    assert_eq!(snap.preferred_sub, Some(SubId(10)));
    assert!(snap.modems[0].active);
    assert!(!snap.modems[1].active);
    assert!(dev.hal.commands().contains(&HalCommand::SetDataAllowed {
        modem: 0,
        allowed: true
    }));
}

#[test]
fn request_churn_moves_the_active_modem() {
    let dev = dual_sim_device(false);
    let mms = DataRequest::for_sub(Capability::Mms, SubId(20), RequestOrigin::Privileged);

    dev.runtime.request_network(mms);
    wait_until(|| dev.runtime.snapshot().modems[1].active);
    assert!(!dev.runtime.snapshot().modems[0].active);

    dev.runtime.release_network(mms);
    wait_until(|| dev.runtime.snapshot().modems[0].active);
    assert!(!dev.runtime.snapshot().modems[1].active);
}

#[test]
fn validated_opportunistic_switch_and_revert() {
    let dev = dual_sim_device(false);

    let (reply, result) = capture_reply();
    dev.runtime
        .set_opportunistic_sub(SubId(20), true, Some(reply));
    wait_until(|| dev.probe.validations() == vec![SubId(20)]);
    assert!(
        result.lock().unwrap().is_none(),
        "no reply until validation resolves"
    );

    dev.probe.complete(true);
    wait_until(|| dev.runtime.snapshot().preferred_modem == Some(1));
    assert_eq!(*result.lock().unwrap(), Some(SwitchResult::Success));
    assert_eq!(dev.runtime.snapshot().opportunistic_sub, Some(SubId(20)));
    dev.runtime.notify_default_path_available();

    let (reply, result) = capture_reply();
    dev.runtime.unset_opportunistic_sub(Some(reply));
    wait_until(|| dev.runtime.snapshot().preferred_modem == Some(0));
    assert_eq!(*result.lock().unwrap(), Some(SwitchResult::Success));
    assert_eq!(dev.runtime.snapshot().opportunistic_sub, None);
}

#[test]
fn switch_to_inactive_sub_is_rejected() {
    let dev = dual_sim_device(false);

    let (reply, result) = capture_reply();
    dev.runtime
        .set_opportunistic_sub(SubId(99), true, Some(reply));
    wait_until(|| result.lock().unwrap().is_some());
    assert_eq!(
        *result.lock().unwrap(),
        Some(SwitchResult::InactiveSubscription)
    );
    assert!(dev.probe.validations().is_empty());
}

#[test]
fn subscription_hot_swap_follows_primary() {
    let dev = dual_sim_device(false);

    // Primary moves to the subscription on modem 1.
    dev.directory.set_default_sub(Some(SubId(20)));
    dev.runtime.notify_primary_data_sub_changed();
    wait_until(|| dev.runtime.snapshot().preferred_modem == Some(1));
    assert!(dev.runtime.snapshot().modems[1].active);

    // The SIM on modem 1 is removed; no preference remains.
    dev.directory.unbind(1);
    dev.runtime.notify_subscriptions_changed();
    wait_until(|| dev.runtime.snapshot().preferred_modem.is_none());
}

#[test]
fn emergency_defers_request_handling() {
    let dev = dual_sim_device(false);
    dev.runtime.notify_emergency(true);
    let mms = DataRequest::for_sub(Capability::Mms, SubId(20), RequestOrigin::Privileged);
    dev.runtime.request_network(mms);

    // Give the worker time to apply both events; state must not move.
    std::thread::sleep(Duration::from_millis(100));
    assert!(dev.runtime.snapshot().modems[0].active);
    assert!(!dev.runtime.snapshot().modems[1].active);

    dev.runtime.notify_emergency(false);
    wait_until(|| dev.runtime.snapshot().modems[1].active);
}

#[test]
fn preferred_data_mode_keeps_all_modems_attached() {
    let dev = dual_sim_device(true);
    let snap = dev.runtime.snapshot();

    assert_eq!(snap.hal_mode, HalCommandMode::PreferredDataModem);
    assert!(snap.modems.iter().all(|m| m.active));
    assert!(dev
        .hal
        .commands()
        .contains(&HalCommand::SetPreferredDataModem { modem: 0 }));

    // An opportunistic switch moves the single preferred-data command.
    dev.runtime.set_opportunistic_sub(SubId(20), false, None);
    wait_until(|| dev.runtime.snapshot().preferred_modem == Some(1));
    assert!(dev
        .hal
        .commands()
        .contains(&HalCommand::SetPreferredDataModem { modem: 1 }));
}

#[test]
fn failed_command_is_retried_until_it_sticks() {
    let hal = SimModemHal::new(false);
    let directory = SimDirectory::new();
    directory.set_default_sub(Some(SubId(10)));
    directory.bind(0, SubId(10));
    directory.bind(1, SubId(20));
    hal.fail_next(0, 1);

    let config = SwitcherConfig {
        command_retry_period_ms: 50,
        ..SwitcherConfig::default()
    };
    let runtime = SwitcherRuntime::start(
        config,
        Arc::new(directory.clone()),
        Arc::new(hal.clone()),
        Box::new(SimProbe::new(true)),
    )
    .unwrap();
    runtime.notify_radio_available();

    // The first allow-data fails; the retry fires on the worker's timer and
    // succeeds without further stimulus.
    wait_until(|| {
        hal.commands()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    HalCommand::SetDataAllowed {
                        modem: 0,
                        allowed: true
                    }
                )
            })
            .count()
            >= 2
    });
    assert!(runtime.snapshot().modems[0].active);
}

#[test]
fn max_active_capability_change_reevaluates() {
    let dev = dual_sim_device(false);
    assert!(!dev.runtime.snapshot().modems[1].active);

    dev.runtime.notify_max_active_changed(2);
    wait_until(|| dev.runtime.snapshot().modems[1].active);
    assert!(dev.runtime.snapshot().modems[0].active);

    dev.runtime.notify_max_active_changed(1);
    wait_until(|| !dev.runtime.snapshot().modems[1].active);
    assert!(dev.runtime.snapshot().modems[0].active);
}

#[test]
fn voice_call_pins_data_to_the_call_modem() {
    let dev = dual_sim_device(false);
    dev.directory.set_data_enabled(SubId(20), true);

    dev.runtime.notify_voice_call_changed(Some(1));
    wait_until(|| dev.runtime.snapshot().preferred_modem == Some(1));

    dev.runtime.notify_voice_call_changed(None);
    wait_until(|| dev.runtime.snapshot().preferred_modem == Some(0));
}
