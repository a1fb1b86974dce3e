//! blepresence — ESP-IDF std firmware
//!
//! Passively scans BLE advertisements with NimBLE (esp32-nimble), tracks the
//! configured wearable and beacon, and publishes smoothed RSSI over MQTT
//! (esp-idf-svc). Detection runs in the scan callback; publishing runs on
//! the main thread, which does nothing but drain the publish queue.
//!
//! Recovery is by restart only: the watchdog resets the CPU when no
//! advertisement has been seen for 30 s, and any error escaping setup or the
//! scan loop does the same.
//!
//! The radio watchdog is a software deadline polled from the esp_timer task,
//! not a hardware one-shot. A blocked esp_timer task is not detected by it;
//! a spinning one starves the idle tasks and trips the ESP-IDF task
//! watchdog, which panics and resets (see `sdkconfig.defaults`).

mod mqtt;

use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::reset;
use esp_idf_svc::hal::task::block_on;
use esp_idf_svc::timer::EspTaskTimerService;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition};

use esp32_nimble::{BLEDevice, BLEScan};

use blepresence::config::StationConfig;
use blepresence::defaults::{
    DRAIN_PERIOD_MS, PUBLISH_QUEUE_LEN, SCAN_INTERVAL_MS, SCAN_ROUND_MS, SCAN_WINDOW_MS,
    STATS_LOG_PERIOD_MS, WATCHDOG_CHECK_MS, WATCHDOG_TIMEOUT_MS,
};
use blepresence::dispatcher::ScanEventDispatcher;
use blepresence::scanner::{Advertisement, ScanEvent};
use blepresence::scheduler::PublishScheduler;
use blepresence::telemetry::TelemetryPublisher;
use blepresence::watchdog::{Restart, SharedWatchdog, WatchdogStatus};
use blepresence::{board, VERSION};

use mqtt::MqttTransport;

/// Station configuration, baked in at build time
static CONFIG_JSON: &[u8] = include_bytes!("../config.json");

// ── Shared state ─────────────────────────────────────────────────────

/// Samples waiting to be published. Filled by the scan callback, drained
/// by the main thread.
static PUBLISH_QUEUE: PublishScheduler<PUBLISH_QUEUE_LEN> = PublishScheduler::new();

/// Radio liveness guard. Reassured by the scan callback, checked by the
/// timer service.
static WATCHDOG: SharedWatchdog<CpuReset> = SharedWatchdog::new(WATCHDOG_TIMEOUT_MS, CpuReset);

/// Boot time, set once in `run`. Read lock-free from the callbacks.
static BOOT_INSTANT: OnceLock<Instant> = OnceLock::new();

fn uptime_millis() -> u64 {
    BOOT_INSTANT
        .get()
        .map(|boot| boot.elapsed().as_millis() as u64)
        .unwrap_or(0)
}

/// Full CPU reset
struct CpuReset;

impl Restart for CpuReset {
    fn restart(&self) {
        log::error!("Watchdog expired, restarting CPU...");
        reset::restart();
    }
}

fn main() {
    esp_idf_svc::sys::link_patches();
    // Bind the ESP-IDF logger to the `log` facade
    esp_idf_svc::log::EspLogger::initialize_default();

    if let Err(e) = run() {
        log::error!("Fatal: {:?}, restarting CPU...", e);
        reset::restart();
    }
}

fn run() -> anyhow::Result<()> {
    BOOT_INSTANT.get_or_init(Instant::now);

    log::info!(
        "blepresence v{} starting on {} ({} MHz)",
        VERSION,
        board::BOARD_NAME,
        board::CPU_FREQ_MHZ
    );

    // ── Watchdog ─────────────────────────────────────────────────────
    // Armed before networking so a hung WiFi/MQTT bring-up also resets.

    WATCHDOG.arm(uptime_millis());
    let timer_service = EspTaskTimerService::new()?;
    let watchdog_timer = timer_service.timer(|| {
        if let WatchdogStatus::Armed { remaining_ms } = WATCHDOG.check(uptime_millis()) {
            log::trace!("Watchdog: {} ms left", remaining_ms);
        }
    })?;
    watchdog_timer.every(Duration::from_millis(WATCHDOG_CHECK_MS))?;
    log::info!("Watchdog armed ({} ms)", WATCHDOG_TIMEOUT_MS);

    let config = StationConfig::from_json(CONFIG_JSON).map_err(|e| anyhow!("config.json: {}", e))?;
    log::info!("Station '{}'", config.station_id);

    // ── WiFi ─────────────────────────────────────────────────────────

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs))?,
        sys_loop,
    )?;
    connect_wifi(&mut wifi, &config)?;

    // ── MQTT ─────────────────────────────────────────────────────────

    let transport = MqttTransport::connect(&config)?;
    let mut publisher = TelemetryPublisher::new(config.station_id, transport);

    // ── BLE scan thread ──────────────────────────────────────────────

    thread::Builder::new()
        .name("blescan".into())
        .stack_size(8192)
        .spawn(|| {
            if let Err(e) = ble_scan_thread() {
                log::error!("BLE scan failed: {:?}, restarting CPU...", e);
                reset::restart();
            }
        })?;
    log::info!("BLE scan thread spawned");

    // ── Publish loop ─────────────────────────────────────────────────

    let mut last_stats_ms = uptime_millis();
    loop {
        PUBLISH_QUEUE.drain(&mut publisher);

        let now = uptime_millis();
        if now.saturating_sub(last_stats_ms) >= STATS_LOG_PERIOD_MS {
            log::info!("Telemetry: {}", publisher.stats());
            last_stats_ms = now;
        }

        thread::sleep(Duration::from_millis(DRAIN_PERIOD_MS));
    }
}

fn connect_wifi(
    wifi: &mut BlockingWifi<EspWifi<'static>>,
    config: &StationConfig<'_>,
) -> anyhow::Result<()> {
    let auth_method = if config.wifi.password.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: config
            .wifi
            .ssid
            .try_into()
            .map_err(|_| anyhow!("WiFi SSID too long"))?,
        password: config
            .wifi
            .password
            .try_into()
            .map_err(|_| anyhow!("WiFi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    log::info!("Connecting to WiFi '{}'...", config.wifi.ssid);
    wifi.start()?;
    wifi.connect()?;
    wifi.wait_netif_up()?;

    let ip_info = wifi.wifi().sta_netif().get_ip_info()?;
    log::info!("WiFi connected, IP {}", ip_info.ip);
    Ok(())
}

// ── BLE scan thread ──────────────────────────────────────────────────

/// Scan continuously in rounds, running the dispatcher on every report.
/// Only returns on a BLE stack error.
fn ble_scan_thread() -> anyhow::Result<()> {
    log::info!("BLE scan thread started");

    let ble_device = BLEDevice::take();
    let mut scan = BLEScan::new();
    scan.active_scan(false)
        .interval(SCAN_INTERVAL_MS)
        .window(SCAN_WINDOW_MS);

    let mut dispatcher = ScanEventDispatcher::with_defaults(&WATCHDOG, &PUBLISH_QUEUE);
    log::info!(
        "Tracking {} devices (scan {} ms / {} ms)",
        dispatcher.matcher().len(),
        SCAN_WINDOW_MS,
        SCAN_INTERVAL_MS
    );

    loop {
        block_on(scan.start(ble_device, SCAN_ROUND_MS, |device, data| {
            let adv = Advertisement {
                addr_type: device.addr().addr_type() as u8,
                addr: device.addr().as_be_bytes(),
                adv_type: device.adv_type() as u8,
                rssi: device.rssi(),
                data: data.payload(),
            };
            dispatcher.on_event(ScanEvent::ScanResult(adv), uptime_millis());
            None::<()> // Continue scanning
        }))
        .map_err(|e| anyhow!("BLE scan error: {:?}", e))?;

        // Rounds end on a timer; start the next one straight away
        dispatcher.on_event(ScanEvent::ScanDone, uptime_millis());
    }
}
