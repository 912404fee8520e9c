//! In-memory platform backends for switchyard testing.
//!
//! Implements the hardware and platform traits against shared mutable
//! state, so tests can script subscription layouts, inject command
//! failures, and resolve validation probes deterministically. The
//! `switchyardd` binary drives a scripted dual-SIM scenario on top of
//! these backends.

pub mod directory;
pub mod hal;
pub mod probe;

pub use directory::SimDirectory;
pub use hal::{HalCommand, SimModemHal};
pub use probe::SimProbe;
