//! Pipeline counters.
//!
//! Stages bump these lock-free on every event; the daemon and firmware read
//! a [`StatusReport`] snapshot for their periodic status line.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::alert::{EventMessage, VERSION};
use crate::board;
use crate::link::LinkId;

#[derive(Debug)]
pub struct PipelineStats {
    started: Instant,
    observed: AtomicU32,
    dropped: [AtomicU32; 2],
    starved: [AtomicU32; 2],
    safe: AtomicU32,
    alerts: AtomicU32,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            observed: AtomicU32::new(0),
            dropped: [AtomicU32::new(0), AtomicU32::new(0)],
            starved: [AtomicU32::new(0), AtomicU32::new(0)],
            safe: AtomicU32::new(0),
            alerts: AtomicU32::new(0),
        }
    }

    pub fn record_observed(&self) {
        self.observed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, link: LinkId) {
        self.dropped[link.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_starved(&self, link: LinkId) {
        self.starved[link.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_verdict(&self, safe: bool) {
        if safe {
            self.safe.fetch_add(1, Ordering::Relaxed);
        } else {
            self.alerts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> StatusReport {
        let load = |a: &AtomicU32| a.load(Ordering::Relaxed);
        StatusReport {
            uptime_secs: self.uptime().as_secs() as u32,
            observed: load(&self.observed),
            dropped: [load(&self.dropped[0]), load(&self.dropped[1])],
            starved: [load(&self.starved[0]), load(&self.starved[1])],
            safe: load(&self.safe),
            alerts: load(&self.alerts),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub uptime_secs: u32,
    pub observed: u32,
    pub dropped: [u32; 2],
    pub starved: [u32; 2],
    pub safe: u32,
    pub alerts: u32,
}

impl StatusReport {
    pub fn dropped_on(&self, link: LinkId) -> u32 {
        self.dropped[link.index()]
    }

    pub fn starved_on(&self, link: LinkId) -> u32 {
        self.starved[link.index()]
    }

    pub fn verdicts(&self) -> u32 {
        self.safe + self.alerts
    }

    pub fn to_message(&self) -> EventMessage<'static> {
        EventMessage::Status {
            uptime: self.uptime_secs,
            observed: self.observed,
            dropped: self.dropped,
            starved: self.starved,
            safe: self.safe,
            alerts: self.alerts,
            board: board::BOARD_NAME,
            version: VERSION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::encode_message;

    #[test]
    fn counters_start_at_zero() {
        let report = PipelineStats::new().snapshot();
        assert_eq!(report.observed, 0);
        assert_eq!(report.verdicts(), 0);
        assert_eq!(report.dropped, [0, 0]);
        assert_eq!(report.starved, [0, 0]);
    }

    #[test]
    fn counters_are_per_link() {
        let stats = PipelineStats::new();
        stats.record_dropped(LinkId::Observations);
        stats.record_dropped(LinkId::Observations);
        stats.record_starved(LinkId::Verdicts);
        let report = stats.snapshot();
        assert_eq!(report.dropped_on(LinkId::Observations), 2);
        assert_eq!(report.dropped_on(LinkId::Verdicts), 0);
        assert_eq!(report.starved_on(LinkId::Observations), 0);
        assert_eq!(report.starved_on(LinkId::Verdicts), 1);
    }

    #[test]
    fn verdicts_split_safe_and_alerts() {
        let stats = PipelineStats::new();
        stats.record_verdict(true);
        stats.record_verdict(false);
        stats.record_verdict(false);
        let report = stats.snapshot();
        assert_eq!(report.safe, 1);
        assert_eq!(report.alerts, 2);
        assert_eq!(report.verdicts(), 3);
    }

    #[test]
    fn status_message_carries_counters() {
        let stats = PipelineStats::new();
        stats.record_observed();
        stats.record_dropped(LinkId::Verdicts);
        let line = encode_message(&stats.snapshot().to_message()).unwrap();
        let json = std::str::from_utf8(&line).unwrap();
        assert!(json.contains(r#""observed":1"#));
        assert!(json.contains(r#""dropped":[0,1]"#));
        assert!(json.contains(r#""board":"host""#));
        let version = format!(r#""version":"{}""#, env!("CARGO_PKG_VERSION"));
        assert!(json.contains(&version), "{json}");
    }
}
