//! # switchyardd — Scripted Scheduler Demo
//!
//! Runs the data-subscription scheduler against the in-memory simulated
//! platform: a dual-SIM device with subscriptions 10 (primary, modem 0)
//! and 20 (modem 1). A short scripted timeline exercises network requests
//! and an opportunistic switch, then the daemon idles until Ctrl-C,
//! logging a diagnostics dump periodically.
//!
//! ## Usage
//!
//! ```bash
//! # Legacy allow-data command mode
//! switchyardd
//!
//! # Preferred-data command mode, custom config
//! switchyardd --preferred-data --config switchyard.toml
//!
//! # Exit on its own after 30 seconds
//! switchyardd --duration 30
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use switchyard_core::request::{Capability, DataRequest, RequestOrigin};
use switchyard_core::subscription::SubId;
use switchyard_core::{SwitcherConfig, SwitcherRuntime};
use switchyard_sim::{SimDirectory, SimModemHal, SimProbe};

fn main() -> anyhow::Result<()> {
    // ── Logging ─────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();

    // ── Parse CLI ───────────────────────────────────────────────
    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => SwitcherConfig::load(path)?,
        None => SwitcherConfig::default(),
    };

    tracing::info!(
        num_modems = config.num_modems,
        max_active = config.max_active_modems,
        preferred_data = args.preferred_data,
        "switchyardd starting"
    );

    // ── Simulated platform ──────────────────────────────────────
    let hal = SimModemHal::new(args.preferred_data);
    let directory = SimDirectory::new();
    directory.set_default_sub(Some(SubId(10)));
    directory.bind(0, SubId(10));
    directory.bind(1, SubId(20));
    directory.set_data_enabled(SubId(10), true);
    let probe = SimProbe::new(true);

    let mut runtime = SwitcherRuntime::start(
        config,
        Arc::new(directory.clone()),
        Arc::new(hal.clone()),
        Box::new(probe.clone()),
    )?;

    runtime.register_observer(Box::new(|snap| {
        tracing::info!(
            preferred_modem = ?snap.preferred_modem,
            preferred_sub = ?snap.preferred_sub,
            "active modems changed"
        );
    }));

    runtime.notify_radio_available();

    // ── Graceful shutdown ───────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            tracing::info!("shutting down...");
            running.store(false, Ordering::Relaxed);
        })?;
    }

    // ── Scripted timeline ───────────────────────────────────────
    std::thread::sleep(Duration::from_secs(1));
    let mms = DataRequest::for_sub(Capability::Mms, SubId(20), RequestOrigin::Privileged);
    tracing::info!("script: requesting MMS on sub 20");
    runtime.request_network(mms);

    std::thread::sleep(Duration::from_secs(2));
    tracing::info!("script: releasing MMS request");
    runtime.release_network(mms);

    std::thread::sleep(Duration::from_secs(1));
    tracing::info!("script: opportunistic switch to sub 20 with validation");
    runtime.set_opportunistic_sub(
        SubId(20),
        true,
        Some(Box::new(|result| {
            tracing::info!(?result, "opportunistic switch finished");
        })),
    );
    std::thread::sleep(Duration::from_millis(500));
    probe.complete(true);
    runtime.notify_default_path_available();

    std::thread::sleep(Duration::from_secs(1));
    tracing::info!("script: voice call starts on modem 0");
    runtime.notify_voice_call_changed(Some(0));
    std::thread::sleep(Duration::from_secs(2));
    tracing::info!("script: voice call ends");
    runtime.notify_voice_call_changed(None);

    // ── Idle loop ───────────────────────────────────────────────
    let started = std::time::Instant::now();
    let mut last_dump = std::time::Instant::now();
    while running.load(Ordering::Relaxed) {
        if let Some(secs) = args.duration_secs {
            if started.elapsed() >= Duration::from_secs(secs) {
                break;
            }
        }
        if last_dump.elapsed() >= Duration::from_secs(5) {
            match runtime.dump() {
                Ok(dump) => tracing::info!("\n{dump}"),
                Err(e) => tracing::warn!(error = %e, "dump failed"),
            }
            last_dump = std::time::Instant::now();
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    // ── Cleanup ─────────────────────────────────────────────────
    let final_state = serde_json::to_string_pretty(&runtime.snapshot())?;
    tracing::info!("final state:\n{final_state}");
    let commands = hal.commands().len();
    runtime.shutdown();
    tracing::info!(commands, "switchyardd stopped");

    Ok(())
}

// ─── CLI Parsing ────────────────────────────────────────────────────────────

struct Args {
    config: Option<PathBuf>,
    preferred_data: bool,
    duration_secs: Option<u64>,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = None;
    let mut preferred_data = false;
    let mut duration_secs = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                config = Some(PathBuf::from(
                    args.get(i)
                        .ok_or_else(|| anyhow::anyhow!("--config requires a value"))?,
                ));
            }
            "--preferred-data" | "-p" => {
                preferred_data = true;
            }
            "--duration" | "-d" => {
                i += 1;
                let val = args
                    .get(i)
                    .ok_or_else(|| anyhow::anyhow!("--duration requires a value"))?;
                duration_secs = Some(
                    val.parse()
                        .map_err(|e| anyhow::anyhow!("invalid duration '{}': {}", val, e))?,
                );
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                anyhow::bail!("unknown argument '{}' (try --help)", other);
            }
        }
        i += 1;
    }

    Ok(Args {
        config,
        preferred_data,
        duration_secs,
    })
}

fn print_usage() {
    println!(
        "switchyardd - scripted data-subscription scheduler demo\n\
         \n\
         USAGE:\n\
         \tswitchyardd [OPTIONS]\n\
         \n\
         OPTIONS:\n\
         \t-c, --config <FILE>    TOML config file\n\
         \t-p, --preferred-data   simulate a HAL with the preferred-data command\n\
         \t-d, --duration <SECS>  exit after this many seconds\n\
         \t-h, --help             show this help"
    );
}
