//! WiFiGuard — host daemon
//!
//! Runs the monitor/classifier/alerter pipeline against a simulated
//! network source under the software supervisor. Verdicts and periodic
//! status go to stdout as NDJSON; diagnostics go through `env_logger`.
//!
//! Environment:
//! - `WIFIGUARD_ALLOW`: comma-separated trusted SSIDs (replaces the defaults)
//! - `WIFIGUARD_STATUS_SECS`: status line interval, 0 disables (default 30)
//! - `RUST_LOG`: log filter (default `info`)

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;

use wifiguard::alert::{encode_message, Alert, AlertSink, EventMessage, LogSink, VERSION};
use wifiguard::allowlist::AllowList;
use wifiguard::board;
use wifiguard::config::PipelineConfig;
use wifiguard::pipeline::Pipeline;
use wifiguard::source::RotatingSource;
use wifiguard::stats::PipelineStats;
use wifiguard::supervisor::{Supervisor, RESTART_EXIT_CODE};

const DEFAULT_STATUS_SECS: u64 = 30;

/// Logs every alert and writes it to stdout as an NDJSON verdict line.
struct DaemonSink {
    log: LogSink,
    started: Instant,
}

impl AlertSink for DaemonSink {
    fn emit(&mut self, alert: &Alert) {
        self.log.emit(alert);
        let ts = (self.started.elapsed().as_millis() & 0xFFFF_FFFF) as u32;
        if let Some(line) = encode_message(&EventMessage::verdict(alert, ts)) {
            write_stdout(&line);
        }
    }
}

fn write_stdout(line: &[u8]) {
    let mut out = std::io::stdout().lock();
    if out.write_all(line).and_then(|()| out.flush()).is_err() {
        log::warn!("stdout closed, event line lost");
    }
}

fn allow_list_from_env() -> anyhow::Result<AllowList> {
    match std::env::var("WIFIGUARD_ALLOW") {
        Ok(raw) => {
            let names = raw.split(',').map(str::trim).filter(|s| !s.is_empty());
            AllowList::new(names).context("WIFIGUARD_ALLOW")
        }
        Err(_) => Ok(AllowList::default()),
    }
}

fn status_interval_from_env() -> anyhow::Result<Option<Duration>> {
    let secs = match std::env::var("WIFIGUARD_STATUS_SECS") {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("WIFIGUARD_STATUS_SECS={raw:?}"))?,
        Err(_) => DEFAULT_STATUS_SECS,
    };
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

fn status_thread(stats: Arc<PipelineStats>, interval: Duration) {
    loop {
        thread::sleep(interval);
        let report = stats.snapshot();
        log::info!(
            "status: up {}s, {} observed, {} safe, {} alerts, dropped {:?}, starved {:?}",
            report.uptime_secs,
            report.observed,
            report.safe,
            report.alerts,
            report.dropped,
            report.starved,
        );
        if let Some(line) = encode_message(&report.to_message()) {
            write_stdout(&line);
        }
    }
}

/// Exit status for a run that ended. Startup failures and a dead stage
/// restart the daemon just like a missed watchdog deadline.
fn exit_status(outcome: anyhow::Result<()>) -> i32 {
    match outcome {
        Ok(()) => 0,
        Err(e) => {
            log::error!("{e:#}, exiting for restart");
            RESTART_EXIT_CODE
        }
    }
}

fn run(
    config: PipelineConfig,
    allow: AllowList,
    status_interval: Option<Duration>,
) -> anyhow::Result<()> {
    let supervisor = Arc::new(Supervisor::new(config.watchdog_timeout));
    supervisor
        .spawn_checker(config.watchdog_check_period, |_stage| {
            std::process::exit(RESTART_EXIT_CODE);
        })
        .context("spawning watchdog checker")?;

    let sink = DaemonSink {
        log: LogSink,
        started: Instant::now(),
    };
    let pipeline = Pipeline::spawn(config, RotatingSource::demo(), allow, sink, supervisor)
        .context("starting pipeline")?;

    if let Some(interval) = status_interval {
        let stats = Arc::clone(pipeline.stats());
        thread::Builder::new()
            .name("status".into())
            .spawn(move || status_thread(stats, interval))
            .context("spawning status thread")?;
    }

    Err(pipeline.wait()).context("pipeline stopped")
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // A bad environment exits with status 1; restarting would not fix it.
    let config = PipelineConfig::default();
    let allow = allow_list_from_env()?;
    let status_interval = status_interval_from_env()?;

    log::info!("WiFiGuard v{} starting on {}", VERSION, board::BOARD_NAME);
    log::info!(
        "Allow-list loaded: {} networks, watchdog timeout {}ms",
        allow.len(),
        config.watchdog_timeout.as_millis()
    );

    std::process::exit(exit_status(run(config, allow, status_interval)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_failure_requests_restart() {
        let config = PipelineConfig {
            monitor_period: Duration::ZERO,
            ..PipelineConfig::new()
        };
        let outcome = run(config, AllowList::default(), None);
        assert!(outcome.is_err());
        assert_eq!(exit_status(outcome), RESTART_EXIT_CODE);
    }

    #[test]
    fn clean_exit_is_zero() {
        assert_eq!(exit_status(Ok(())), 0);
    }
}
