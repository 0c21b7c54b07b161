//! The three pipeline stages.
//!
//! Each stage is a plain struct owning its link ends. [`Stage::cycle`] runs
//! one loop iteration up to (not including) the watchdog pulse and the
//! end-of-cycle sleep; [`run_forever`] adds those and never returns.
//!
//! ```text
//! Idle ──► WaitingOnSignal ──► Draining ──► Processing ──► Forwarding/Emitting ──► Idle
//!               │ timeout          │ starved
//!               └──────► Idle ◄────┘ (link reset)
//! ```
//! The monitor has no inbound link: its cycle is scan → forward. The scan
//! itself runs on a worker thread and is bounded by the scan budget.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::alert::{Alert, AlertSink};
use crate::allowlist::AllowList;
use crate::board;
use crate::classifier::classify;
use crate::config::PipelineConfig;
use crate::link::{LinkRx, LinkTx};
use crate::observation::{NetworkObservation, Ssid};
use crate::source::{NetworkSource, ScanError};
use crate::stats::PipelineStats;
use crate::watchdog::{StageId, WatchdogBinding};

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No wake within the bound.
    Idle,
    /// Item handed to the next stage.
    Forwarded,
    /// Downstream slot stayed full; item discarded.
    Dropped,
    /// Woken, but no item arrived; inbound link was reset.
    Starved,
    /// Terminal verdict emitted.
    Emitted(Alert),
}

/// One supervised pipeline stage.
pub trait Stage {
    fn id(&self) -> StageId;

    /// One loop iteration, excluding pulse and sleep.
    fn cycle(&mut self) -> CycleOutcome;

    /// Sleep between iterations.
    fn period(&self) -> Duration;
}

/// Drive a registered stage forever: cycle, pulse, sleep.
pub fn run_forever<S, W>(stage: &mut S, watchdog: &W) -> !
where
    S: Stage + ?Sized,
    W: WatchdogBinding + ?Sized,
{
    let id = stage.id();
    log::info!(target: id.as_str(), "{} stage running", id);
    loop {
        stage.cycle();
        if let Err(e) = watchdog.pulse(id) {
            log::error!(target: id.as_str(), "watchdog pulse failed: {}", e);
        }
        thread::sleep(stage.period());
    }
}

// ── Stage A: Monitor ─────────────────────────────────────────────────

/// Runs the network source on its own thread, so a stalled driver costs
/// the monitor at most one scan budget per cycle.
#[derive(Debug)]
struct ScanWorker {
    requests: Sender<()>,
    replies: Receiver<Result<Ssid, ScanError>>,
    /// A request was sent and its reply has not been taken yet.
    in_flight: bool,
}

impl ScanWorker {
    fn spawn<S>(mut source: S) -> io::Result<Self>
    where
        S: NetworkSource + Send + 'static,
    {
        let (requests, pending) = bounded::<()>(1);
        let (done, replies) = bounded(1);
        thread::Builder::new()
            .name("scan".into())
            .stack_size(board::STAGE_STACK_SIZE)
            .spawn(move || {
                while pending.recv().is_ok() {
                    if done.send(source.scan()).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self {
            requests,
            replies,
            in_flight: false,
        })
    }

    /// Scan, waiting at most `budget` for the answer.
    ///
    /// After an overrun the stuck scan stays in flight and the next call
    /// waits on it again instead of queueing another request. A reply that
    /// arrived late, between calls, is discarded.
    fn scan_within(&mut self, budget: Duration) -> Result<Ssid, ScanError> {
        if self.in_flight {
            match self.replies.try_recv() {
                Ok(_stale) => self.in_flight = false,
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => return Err(ScanError::Unavailable),
            }
        }
        if !self.in_flight {
            self.requests
                .try_send(())
                .map_err(|_| ScanError::Unavailable)?;
            self.in_flight = true;
        }
        match self.replies.recv_timeout(budget) {
            Ok(result) => {
                self.in_flight = false;
                result
            }
            Err(RecvTimeoutError::Timeout) => Err(ScanError::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(ScanError::Unavailable),
        }
    }
}

/// Polls the network source and feeds observations to the classifier.
#[derive(Debug)]
pub struct Monitor {
    scanner: ScanWorker,
    tx: LinkTx<NetworkObservation>,
    config: PipelineConfig,
    stats: Arc<PipelineStats>,
}

impl Monitor {
    /// Starts the scan worker thread for `source`.
    pub fn new<S>(
        source: S,
        tx: LinkTx<NetworkObservation>,
        config: PipelineConfig,
        stats: Arc<PipelineStats>,
    ) -> io::Result<Self>
    where
        S: NetworkSource + Send + 'static,
    {
        Ok(Self {
            scanner: ScanWorker::spawn(source)?,
            tx,
            config,
            stats,
        })
    }

    /// Current SSID, or the unknown sentinel if the source failed or did
    /// not answer within the scan budget.
    fn current_network(&mut self) -> Ssid {
        match self.scanner.scan_within(self.config.scan_budget) {
            Ok(ssid) => ssid,
            Err(ScanError::TimedOut) => {
                log::warn!(
                    target: "monitor",
                    "scan exceeded {}ms budget, using placeholder",
                    self.config.scan_budget.as_millis()
                );
                Ssid::unknown()
            }
            Err(e) => {
                log::warn!(target: "monitor", "scan failed: {}, using placeholder", e);
                Ssid::unknown()
            }
        }
    }
}

impl Stage for Monitor {
    fn id(&self) -> StageId {
        StageId::Monitor
    }

    fn cycle(&mut self) -> CycleOutcome {
        let ssid = self.current_network();
        log::info!(target: "monitor", "current network: {}", ssid);
        self.stats.record_observed();

        match self
            .tx
            .hand_off(NetworkObservation::new(ssid), self.config.monitor_send_wait)
        {
            Ok(()) => CycleOutcome::Forwarded,
            Err(rejected) => {
                log::warn!(
                    target: "monitor",
                    "{} full, observation {} dropped",
                    self.tx.id(),
                    rejected.0.ssid
                );
                self.stats.record_dropped(self.tx.id());
                CycleOutcome::Dropped
            }
        }
    }

    fn period(&self) -> Duration {
        self.config.monitor_period
    }
}

// ── Stage B: Classifier ──────────────────────────────────────────────

/// Applies the allow-list and forwards verdicts to the alerter.
pub struct Classifier {
    rx: LinkRx<NetworkObservation>,
    tx: LinkTx<NetworkObservation>,
    allow: AllowList,
    config: PipelineConfig,
    stats: Arc<PipelineStats>,
}

impl Classifier {
    pub fn new(
        rx: LinkRx<NetworkObservation>,
        tx: LinkTx<NetworkObservation>,
        allow: AllowList,
        config: PipelineConfig,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            rx,
            tx,
            allow,
            config,
            stats,
        }
    }
}

impl Stage for Classifier {
    fn id(&self) -> StageId {
        StageId::Classifier
    }

    fn cycle(&mut self) -> CycleOutcome {
        if !self.rx.wait_wake(self.config.classifier_wake_wait) {
            return CycleOutcome::Idle;
        }

        let Some(mut obs) = self.rx.recv_within(self.config.classifier_recv_wait) else {
            log::error!(
                target: "classifier",
                "woken but {} is empty, resetting link",
                self.rx.id()
            );
            self.rx.reset();
            self.stats.record_starved(self.rx.id());
            return CycleOutcome::Starved;
        };

        log::info!(target: "classifier", "checking network: {}", obs.ssid);
        classify(&mut obs, &self.allow);
        log::debug!(target: "classifier", "{} is {}", obs.ssid, obs.safety.as_str());

        match self.tx.hand_off(obs, self.config.classifier_send_wait) {
            Ok(()) => CycleOutcome::Forwarded,
            Err(rejected) => {
                log::warn!(
                    target: "classifier",
                    "{} full, verdict for {} dropped",
                    self.tx.id(),
                    rejected.0.ssid
                );
                self.stats.record_dropped(self.tx.id());
                CycleOutcome::Dropped
            }
        }
    }

    fn period(&self) -> Duration {
        self.config.classifier_period
    }
}

// ── Stage C: Alerter ─────────────────────────────────────────────────

/// Turns verdicts into alerts or confirmations.
pub struct Alerter<K> {
    rx: LinkRx<NetworkObservation>,
    sink: K,
    config: PipelineConfig,
    stats: Arc<PipelineStats>,
}

impl<K: AlertSink> Alerter<K> {
    pub fn new(
        rx: LinkRx<NetworkObservation>,
        sink: K,
        config: PipelineConfig,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            rx,
            sink,
            config,
            stats,
        }
    }
}

impl<K: AlertSink> Stage for Alerter<K> {
    fn id(&self) -> StageId {
        StageId::Alerter
    }

    fn cycle(&mut self) -> CycleOutcome {
        if !self.rx.wait_wake(self.config.alerter_wake_wait) {
            return CycleOutcome::Idle;
        }

        let Some(obs) = self.rx.recv_within(self.config.alerter_recv_wait) else {
            log::error!(
                target: "alerter",
                "woken but {} is empty, resetting link",
                self.rx.id()
            );
            self.rx.reset();
            self.stats.record_starved(self.rx.id());
            return CycleOutcome::Starved;
        };

        let alert = Alert::from_observation(&obs);
        self.sink.emit(&alert);
        self.stats.record_verdict(alert.is_safe());
        CycleOutcome::Emitted(alert)
    }

    fn period(&self) -> Duration {
        self.config.alerter_period
    }
}
