//! WiFiGuard — ESP-IDF std firmware
//!
//! Runs the monitor/classifier/alerter pipeline as FreeRTOS-backed std
//! threads, each subscribed to the ESP-IDF task watchdog. Any stage that
//! misses its deadline panics the chip and the system restarts.
//!
//! Station credentials come from `WIFIGUARD_SSID` / `WIFIGUARD_PASS` at build
//! time. Without them the firmware runs the demo rotation instead of reading
//! the associated access point.

use std::fmt;
use std::io;
use std::ptr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::task::thread::ThreadSpawnConfiguration;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sys::{
    esp, esp_restart, esp_task_wdt_add, esp_task_wdt_config_t, esp_task_wdt_init,
    esp_task_wdt_reconfigure, esp_task_wdt_reset, esp_wifi_sta_get_ap_info, wifi_ap_record_t,
    EspError, ESP_ERR_WIFI_NOT_CONNECT, ESP_OK,
};
use esp_idf_svc::wifi::{BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use wifiguard::alert::{LogSink, VERSION};
use wifiguard::allowlist::AllowList;
use wifiguard::board;
use wifiguard::config::PipelineConfig;
use wifiguard::observation::Ssid;
use wifiguard::pipeline::Pipeline;
use wifiguard::source::{NetworkSource, RotatingSource, ScanError};
use wifiguard::stats::PipelineStats;
use wifiguard::watchdog::{StageId, WatchdogBinding, WatchdogError};

const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// FreeRTOS priority of the lowest pipeline stage. Stage priorities stack
/// on top of it, keeping the monitor above the classifier above the
/// alerter and all of them above the idle and status tasks.
const STAGE_PRIORITY_BASE: u8 = 4;

// ── Task watchdog ────────────────────────────────────────────────────

/// Subscribes each stage thread to the ESP-IDF task watchdog.
///
/// `esp_task_wdt_add(NULL)` subscribes the *calling* task, so `register`
/// must run on the stage's own thread. The pipeline guarantees that.
struct TaskWatchdog;

fn driver_error(e: EspError) -> WatchdogError {
    WatchdogError::Driver(e.code())
}

impl WatchdogBinding for TaskWatchdog {
    fn register(&self, _stage: StageId) -> Result<(), WatchdogError> {
        esp!(unsafe { esp_task_wdt_add(ptr::null_mut()) }).map_err(driver_error)
    }

    fn pulse(&self, _stage: StageId) -> Result<(), WatchdogError> {
        esp!(unsafe { esp_task_wdt_reset() }).map_err(driver_error)
    }
}

/// Apply timeout, panic-on-trigger and idle-core subscription. The IDF
/// usually starts the TWDT itself; if it did not, initialize it here.
fn configure_task_watchdog(timeout: Duration) -> Result<(), EspError> {
    let cfg = esp_task_wdt_config_t {
        timeout_ms: timeout.as_millis() as u32,
        idle_core_mask: (1u32 << board::CORE_COUNT) - 1,
        trigger_panic: true,
    };
    esp!(unsafe { esp_task_wdt_reconfigure(&cfg) })
        .or_else(|_| esp!(unsafe { esp_task_wdt_init(&cfg) }))
}

// ── Stage threads ────────────────────────────────────────────────────

/// Configure the next `std::thread` spawn for `stage`.
fn stage_thread_config(stage: StageId) -> io::Result<()> {
    ThreadSpawnConfiguration {
        stack_size: board::STAGE_STACK_SIZE,
        priority: STAGE_PRIORITY_BASE + stage.priority(),
        ..Default::default()
    }
    .set()
    .map_err(io::Error::other)
}

// ── Network source ───────────────────────────────────────────────────

/// Reads the SSID of the access point the station is associated with.
struct AssociatedAp;

impl NetworkSource for AssociatedAp {
    fn scan(&mut self) -> Result<Ssid, ScanError> {
        let mut record = wifi_ap_record_t::default();
        let err = unsafe { esp_wifi_sta_get_ap_info(&mut record) };
        if err == ESP_ERR_WIFI_NOT_CONNECT as i32 {
            return Err(ScanError::NotConnected);
        }
        if err != ESP_OK as i32 {
            return Err(ScanError::Unavailable);
        }
        let len = record
            .ssid
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(record.ssid.len());
        let name = std::str::from_utf8(&record.ssid[..len]).map_err(|_| ScanError::Unavailable)?;
        Ok(Ssid::new(name)?)
    }
}

// ── Status ───────────────────────────────────────────────────────────

fn status_thread(stats: Arc<PipelineStats>) {
    loop {
        thread::sleep(STATUS_INTERVAL);
        let report = stats.snapshot();
        log::info!(
            "status: up {}s, {} observed, {} safe, {} alerts, dropped {:?}, starved {:?}, heap {}",
            report.uptime_secs,
            report.observed,
            report.safe,
            report.alerts,
            report.dropped,
            report.starved,
            unsafe { esp_idf_svc::sys::esp_get_free_heap_size() },
        );
    }
}

fn restart(reason: &dyn fmt::Display) -> ! {
    log::error!("{reason}, restarting");
    unsafe { esp_restart() }
}

fn main() {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    // Startup errors and a dead stage both end in a full restart, same as a
    // watchdog expiry.
    if let Err(e) = run() {
        restart(&format_args!("{e:#}"));
    }
}

fn run() -> anyhow::Result<()> {
    let config = PipelineConfig::default();
    let allow = AllowList::default();

    log::info!("WiFiGuard v{} starting on {} (std)", VERSION, board::BOARD_NAME);
    log::info!(
        "Allow-list loaded: {} networks, watchdog timeout {}ms",
        allow.len(),
        config.watchdog_timeout.as_millis()
    );

    configure_task_watchdog(config.watchdog_timeout)?;

    // ── Station ──────────────────────────────────────────────────────

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs))?,
        sys_loop,
    )?;

    let credentials = option_env!("WIFIGUARD_SSID").zip(option_env!("WIFIGUARD_PASS"));
    let client = match credentials {
        Some((ssid, password)) => ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| anyhow!("WIFIGUARD_SSID too long"))?,
            password: password
                .try_into()
                .map_err(|_| anyhow!("WIFIGUARD_PASS too long"))?,
            ..Default::default()
        },
        None => ClientConfiguration::default(),
    };
    wifi.set_configuration(&Configuration::Client(client))?;
    wifi.start()?;

    let sink = LogSink;
    let watchdog = Arc::new(TaskWatchdog);
    let pipeline = match credentials {
        Some((ssid, _)) => {
            // Association failures are not fatal: the monitor reports the
            // unknown network until the station comes up.
            if let Err(e) = wifi.connect() {
                log::warn!("connect to {ssid} failed: {e}");
            }
            Pipeline::spawn_with(config, AssociatedAp, allow, sink, watchdog, stage_thread_config)
        }
        None => {
            log::warn!("no station credentials, running demo rotation");
            let demo = RotatingSource::demo();
            Pipeline::spawn_with(config, demo, allow, sink, watchdog, stage_thread_config)
        }
    }?;

    ThreadSpawnConfiguration::default().set()?;
    let stats = Arc::clone(pipeline.stats());
    thread::Builder::new()
        .name("status".into())
        .stack_size(4096)
        .spawn(move || status_thread(stats))?;

    // Keep the station alive for as long as the pipeline runs.
    let _wifi = wifi;
    Err(pipeline.wait().into())
}
