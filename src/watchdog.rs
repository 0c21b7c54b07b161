//! Watchdog contract between the pipeline stages and the runtime.
//!
//! Every stage registers once at startup and pulses once per loop iteration.
//! A stage that misses the global deadline brings the whole process down;
//! recovery is a full restart, never a per-stage respawn.
//!
//! ```text
//! ┌────────────┐ register() ┌────────────┐  pulse()  ┌────────────┐
//! │ Unwatched  │───────────►│ Registered │◄─────────►│   Alive    │
//! └────────────┘            └────────────┘           └────────────┘
//!                                 │ no pulse within timeout │
//!                                 ▼                         ▼
//!                          ┌──────────────────────────────────────┐
//!                          │   Expired → process restart          │
//!                          └──────────────────────────────────────┘
//! ```

use core::fmt;

use serde::Serialize;

/// Identity of a pipeline stage, in descending scheduling priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageId {
    /// Stage A: polls the network source.
    Monitor,
    /// Stage B: applies the allow-list.
    Classifier,
    /// Stage C: emits the verdict.
    Alerter,
}

impl StageId {
    pub const ALL: [StageId; 3] = [StageId::Monitor, StageId::Classifier, StageId::Alerter];

    /// Log target and thread name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Monitor => "monitor",
            StageId::Classifier => "classifier",
            StageId::Alerter => "alerter",
        }
    }

    /// FreeRTOS-style priority (higher runs first). Applied per stage
    /// thread by the platform through `Pipeline::spawn_with`.
    pub fn priority(&self) -> u8 {
        match self {
            StageId::Monitor => 3,
            StageId::Classifier => 2,
            StageId::Alerter => 1,
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur when talking to the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogError {
    /// Stage registered twice.
    AlreadyRegistered(StageId),
    /// Pulse from a stage that never registered.
    NotRegistered(StageId),
    /// The watchdog already fired; the process is going down.
    Expired(StageId),
    /// Platform watchdog rejected the call (raw driver code).
    Driver(i32),
}

impl fmt::Display for WatchdogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered(s) => write!(f, "{s} already registered with watchdog"),
            Self::NotRegistered(s) => write!(f, "{s} is not registered with watchdog"),
            Self::Expired(s) => write!(f, "watchdog expired waiting on {s}"),
            Self::Driver(code) => write!(f, "watchdog driver error {code}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for WatchdogError {}

/// Liveness capability handed to each stage.
///
/// Implementations must be shareable across the three stage threads.
pub trait WatchdogBinding: Sync {
    /// Subscribe a stage. Called once, before the stage's first cycle.
    fn register(&self, stage: StageId) -> Result<(), WatchdogError>;

    /// Signal that `stage` completed another loop iteration.
    fn pulse(&self, stage: StageId) -> Result<(), WatchdogError>;
}

impl<W: WatchdogBinding + ?Sized> WatchdogBinding for &W {
    fn register(&self, stage: StageId) -> Result<(), WatchdogError> {
        (**self).register(stage)
    }

    fn pulse(&self, stage: StageId) -> Result<(), WatchdogError> {
        (**self).pulse(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_descend_along_the_pipeline() {
        assert!(StageId::Monitor.priority() > StageId::Classifier.priority());
        assert!(StageId::Classifier.priority() > StageId::Alerter.priority());
    }

    #[test]
    fn indices_are_dense() {
        for (i, stage) in StageId::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
        }
    }

    #[test]
    fn stage_names() {
        assert_eq!(StageId::Monitor.to_string(), "monitor");
        assert_eq!(StageId::Classifier.to_string(), "classifier");
        assert_eq!(StageId::Alerter.to_string(), "alerter");
    }

    #[test]
    fn error_display() {
        assert_eq!(
            WatchdogError::NotRegistered(StageId::Alerter).to_string(),
            "alerter is not registered with watchdog"
        );
        assert_eq!(
            WatchdogError::Expired(StageId::Classifier).to_string(),
            "watchdog expired waiting on classifier"
        );
        assert_eq!(WatchdogError::Driver(259).to_string(), "watchdog driver error 259");
    }
}
