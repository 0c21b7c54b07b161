//! Software watchdog for hosted builds.
//!
//! Tracks the last pulse of every registered stage. A checker thread
//! compares them against one global timeout; the first stage found overdue
//! trips the supervisor and the expiry action runs exactly once. The
//! daemon's expiry action exits the process so the service manager restarts
//! the whole pipeline.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::watchdog::{StageId, WatchdogBinding, WatchdogError};

/// Exit status used when the supervisor forces a restart.
pub const RESTART_EXIT_CODE: i32 = 75;

#[derive(Debug, Clone, Copy, Default)]
struct Registration {
    last_pulse: Option<Instant>,
    max_gap: Duration,
    pulses: u64,
}

#[derive(Debug)]
pub struct Supervisor {
    timeout: Duration,
    stages: Mutex<[Registration; 3]>,
    tripped: AtomicBool,
}

impl Supervisor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            stages: Mutex::new([Registration::default(); 3]),
            tripped: AtomicBool::new(false),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn stages(&self) -> MutexGuard<'_, [Registration; 3]> {
        self.stages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// First registered stage whose last pulse is older than the timeout at
    /// `now`. Trips the supervisor when one is found.
    pub fn check(&self, now: Instant) -> Option<StageId> {
        let stages = self.stages();
        let overdue = StageId::ALL.into_iter().find(|stage| {
            stages[stage.index()]
                .last_pulse
                .is_some_and(|last| now.saturating_duration_since(last) > self.timeout)
        });
        if overdue.is_some() {
            self.tripped.store(true, Ordering::SeqCst);
        }
        overdue
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    pub fn is_registered(&self, stage: StageId) -> bool {
        self.stages()[stage.index()].last_pulse.is_some()
    }

    /// Longest observed interval between two consecutive liveness points
    /// (registration counts as the first one).
    pub fn max_pulse_gap(&self, stage: StageId) -> Option<Duration> {
        let reg = self.stages()[stage.index()];
        reg.last_pulse.map(|_| reg.max_gap)
    }

    pub fn pulse_count(&self, stage: StageId) -> u64 {
        self.stages()[stage.index()].pulses
    }

    /// Start the checker thread. `on_expire` runs once, on the checker
    /// thread, with the first overdue stage; the thread then exits.
    pub fn spawn_checker<F>(
        self: &Arc<Self>,
        period: Duration,
        on_expire: F,
    ) -> io::Result<JoinHandle<()>>
    where
        F: FnOnce(StageId) + Send + 'static,
    {
        let supervisor = Arc::clone(self);
        thread::Builder::new()
            .name("watchdog".into())
            .spawn(move || loop {
                thread::sleep(period);
                if let Some(stage) = supervisor.check(Instant::now()) {
                    log::error!(
                        target: "watchdog",
                        "{} missed its {}ms deadline, forcing restart",
                        stage,
                        supervisor.timeout.as_millis()
                    );
                    on_expire(stage);
                    return;
                }
            })
    }
}

impl WatchdogBinding for Supervisor {
    fn register(&self, stage: StageId) -> Result<(), WatchdogError> {
        let mut stages = self.stages();
        let reg = &mut stages[stage.index()];
        if reg.last_pulse.is_some() {
            return Err(WatchdogError::AlreadyRegistered(stage));
        }
        reg.last_pulse = Some(Instant::now());
        log::info!(target: "watchdog", "{} registered", stage);
        Ok(())
    }

    fn pulse(&self, stage: StageId) -> Result<(), WatchdogError> {
        if self.is_tripped() {
            return Err(WatchdogError::Expired(stage));
        }
        let mut stages = self.stages();
        let reg = &mut stages[stage.index()];
        let Some(last) = reg.last_pulse else {
            return Err(WatchdogError::NotRegistered(stage));
        };
        let now = Instant::now();
        reg.max_gap = reg.max_gap.max(now.saturating_duration_since(last));
        reg.last_pulse = Some(now);
        reg.pulses += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn register_once_per_stage() {
        let sup = Supervisor::new(TIMEOUT);
        assert_eq!(sup.register(StageId::Monitor), Ok(()));
        assert_eq!(
            sup.register(StageId::Monitor),
            Err(WatchdogError::AlreadyRegistered(StageId::Monitor))
        );
        assert!(sup.is_registered(StageId::Monitor));
        assert!(!sup.is_registered(StageId::Alerter));
    }

    #[test]
    fn pulse_requires_registration() {
        let sup = Supervisor::new(TIMEOUT);
        assert_eq!(
            sup.pulse(StageId::Classifier),
            Err(WatchdogError::NotRegistered(StageId::Classifier))
        );
        sup.register(StageId::Classifier).unwrap();
        assert_eq!(sup.pulse(StageId::Classifier), Ok(()));
        assert_eq!(sup.pulse_count(StageId::Classifier), 1);
    }

    #[test]
    fn unregistered_stages_never_expire() {
        let sup = Supervisor::new(TIMEOUT);
        assert_eq!(sup.check(Instant::now() + TIMEOUT * 10), None);
        assert!(!sup.is_tripped());
    }

    #[test]
    fn overdue_stage_trips() {
        let sup = Supervisor::new(TIMEOUT);
        sup.register(StageId::Monitor).unwrap();
        sup.register(StageId::Alerter).unwrap();
        sup.pulse(StageId::Monitor).unwrap();

        let now = Instant::now();
        assert_eq!(sup.check(now), None);
        assert_eq!(sup.check(now + TIMEOUT * 2), Some(StageId::Monitor));
        assert!(sup.is_tripped());
        assert_eq!(
            sup.pulse(StageId::Alerter),
            Err(WatchdogError::Expired(StageId::Alerter))
        );
    }

    #[test]
    fn pulsing_keeps_deadline_fresh() {
        let sup = Supervisor::new(TIMEOUT);
        sup.register(StageId::Alerter).unwrap();
        for _ in 0..5 {
            thread::sleep(TIMEOUT / 4);
            sup.pulse(StageId::Alerter).unwrap();
            assert_eq!(sup.check(Instant::now()), None);
        }
        let gap = sup.max_pulse_gap(StageId::Alerter).unwrap();
        assert!(gap >= TIMEOUT / 4 && gap < TIMEOUT, "gap {gap:?}");
    }

    #[test]
    fn checker_fires_once_for_stalled_stage() {
        let sup = Arc::new(Supervisor::new(Duration::from_millis(40)));
        sup.register(StageId::Classifier).unwrap();
        let (tx, rx) = mpsc::channel();
        let handle = sup
            .spawn_checker(Duration::from_millis(5), move |stage| {
                tx.send(stage).unwrap();
            })
            .unwrap();

        let fired = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(fired, StageId::Classifier);
        handle.join().unwrap();
        assert!(rx.try_recv().is_err());
    }
}
