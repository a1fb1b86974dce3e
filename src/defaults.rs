/// Compiled-in identities and tuning constants.
///
/// The wearable is recognised by an Apple Continuity proximity-pairing
/// marker in its manufacturer data; the beacon advertises from a fixed
/// public address.

use crate::matcher::{Fingerprint, IdentityRule, TrackedIdentity};
use crate::scanner::Address;

/// Telemetry id for the fingerprint-tracked wearable
pub const WEARABLE_ID: &str = "apple_watch_rssi";

/// Telemetry id for the fixed-address beacon
pub const BEACON_ID: &str = "sticknfind_rssi";

/// Byte offset of the proximity-pairing marker in the raw payload
/// (hex characters 16..28).
pub const WEARABLE_MARKER_OFFSET: usize = 8;

/// Apple company id (0x004C, little-endian), Continuity type 0x10,
/// length 0x05, then the two status bytes seen on the tracked watch.
pub const WEARABLE_MARKER: [u8; 6] = [0x4C, 0x00, 0x10, 0x05, 0x01, 0x98];

/// Address of the fixed beacon (`d9d799bff3d1`)
pub const BEACON_ADDR: Address = [0xD9, 0xD7, 0x99, 0xBF, 0xF3, 0xD1];

/// Seed for every RSSI filter stage (dBm)
pub const RSSI_SEED: i32 = -70;

/// Window lengths of the wearable's filter stages, lightest first
pub const WEARABLE_FILTER_WINDOWS: &[u16] = &[2, 3];

/// Watchdog timeout in milliseconds
pub const WATCHDOG_TIMEOUT_MS: u64 = 30_000;

/// How often the firmware checks the watchdog deadline
pub const WATCHDOG_CHECK_MS: u64 = 1_000;

/// Scan interval: the controller starts a new scan window every 1.28 s
pub const SCAN_INTERVAL_MS: u16 = 1280;

/// Scan window: listen for 0.5 s of each interval
pub const SCAN_WINDOW_MS: u16 = 500;

/// Length of one scan round before the stack reports scan-done
pub const SCAN_ROUND_MS: i32 = 60_000;

/// Capacity of the deferred publish queue
pub const PUBLISH_QUEUE_LEN: usize = 16;

/// Sleep between drains of the publish queue
pub const DRAIN_PERIOD_MS: u64 = 20;

/// How often the publish loop logs its delivery counters
pub const STATS_LOG_PERIOD_MS: u64 = 60_000;

/// The compiled-in identity registry, in match priority order.
pub fn identities() -> [TrackedIdentity; 2] {
    [
        TrackedIdentity::new(
            WEARABLE_ID,
            IdentityRule::Fingerprint(Fingerprint {
                offset: WEARABLE_MARKER_OFFSET,
                pattern: &WEARABLE_MARKER,
            }),
        ),
        TrackedIdentity::new(BEACON_ID, IdentityRule::FixedAddress(BEACON_ADDR)),
    ]
}

/// Filter windows for the identity with telemetry id `id`.
///
/// Identities without smoothing publish their raw RSSI.
pub fn filter_windows(id: &str) -> &'static [u16] {
    if id == WEARABLE_ID {
        WEARABLE_FILTER_WINDOWS
    } else {
        &[]
    }
}
