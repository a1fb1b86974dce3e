//! blepresence library — portable proximity detection engine.
//!
//! Detects a tracked BLE wearable from passively observed advertisements,
//! even while it rotates its address, smooths the RSSI and hands the result
//! to a telemetry transport. Contains all matching, filtering, scheduling
//! and liveness logic with no platform dependencies, testable on any host
//! with `cargo test`. The ESP-IDF firmware in `firmware-std/` is a thin
//! consumer that provides the radio, the network, a timer and a restart.
//!
//! Pipeline, leaf to root:
//! - `filter` — cascaded low-pass RSSI smoothing
//! - `matcher` — fingerprint + address-learning device classification
//! - `watchdog` — dead-man switch that forces a restart
//! - `scheduler` — deferred publish queue out of callback context
//! - `telemetry` — publish with local recovery on transport failure
//! - `dispatcher` — per radio event orchestration
//!
//! `no_std`, no allocator. `config`, `defaults` and `board` hold the
//! compiled-in and runtime inputs.

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod config;
pub mod defaults;
pub mod dispatcher;
pub mod filter;
pub mod matcher;
pub mod scanner;
pub mod scheduler;
pub mod telemetry;
pub mod watchdog;

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
