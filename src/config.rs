/// Pipeline timing configuration.
///
/// Every wait in the pipeline is bounded; these are the bounds. Defaults
/// reproduce the firmware cadence: monitor every second, classifier and
/// alerter every half second, 6 s watchdog.
use core::fmt;
use core::time::Duration;

use crate::watchdog::StageId;

const fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Longest a scan may take before its result is replaced by the sentinel.
    pub scan_budget: Duration,
    /// Monitor: bounded wait for room on the monitor→classifier link.
    pub monitor_send_wait: Duration,
    /// Monitor: sleep at the end of each cycle.
    pub monitor_period: Duration,

    /// Classifier: bounded wait for its wake signal.
    pub classifier_wake_wait: Duration,
    /// Classifier: bounded wait for the item paired with a wake.
    pub classifier_recv_wait: Duration,
    /// Classifier: bounded wait for room on the classifier→alerter link.
    pub classifier_send_wait: Duration,
    /// Classifier: sleep at the end of each cycle.
    pub classifier_period: Duration,

    /// Alerter: bounded wait for its wake signal.
    pub alerter_wake_wait: Duration,
    /// Alerter: bounded wait for the item paired with a wake.
    pub alerter_recv_wait: Duration,
    /// Alerter: sleep at the end of each cycle.
    pub alerter_period: Duration,

    /// Global deadline between two pulses of any one stage.
    pub watchdog_timeout: Duration,
    /// How often the software supervisor checks deadlines.
    pub watchdog_check_period: Duration,
}

impl PipelineConfig {
    pub const fn new() -> Self {
        Self {
            scan_budget: ms(1000),
            monitor_send_wait: ms(500),
            monitor_period: ms(1000),
            classifier_wake_wait: ms(1000),
            classifier_recv_wait: ms(500),
            classifier_send_wait: ms(500),
            classifier_period: ms(500),
            alerter_wake_wait: ms(2000),
            alerter_recv_wait: ms(500),
            alerter_period: ms(500),
            watchdog_timeout: ms(6000),
            watchdog_check_period: ms(250),
        }
    }

    /// Same shape, every duration divided by `divisor`. Used to run the real
    /// pipeline at test speed.
    pub fn time_scaled(self, divisor: u32) -> Self {
        let d = divisor.max(1);
        Self {
            scan_budget: self.scan_budget / d,
            monitor_send_wait: self.monitor_send_wait / d,
            monitor_period: self.monitor_period / d,
            classifier_wake_wait: self.classifier_wake_wait / d,
            classifier_recv_wait: self.classifier_recv_wait / d,
            classifier_send_wait: self.classifier_send_wait / d,
            classifier_period: self.classifier_period / d,
            alerter_wake_wait: self.alerter_wake_wait / d,
            alerter_recv_wait: self.alerter_recv_wait / d,
            alerter_period: self.alerter_period / d,
            watchdog_timeout: self.watchdog_timeout / d,
            watchdog_check_period: self.watchdog_check_period / d,
        }
    }

    /// Longest possible time between two pulses of `stage` when every wait
    /// runs to its bound.
    pub fn worst_case_pulse_gap(&self, stage: StageId) -> Duration {
        match stage {
            StageId::Monitor => self.scan_budget + self.monitor_send_wait + self.monitor_period,
            StageId::Classifier => {
                self.classifier_wake_wait
                    + self.classifier_recv_wait
                    + self.classifier_send_wait
                    + self.classifier_period
            }
            StageId::Alerter => {
                self.alerter_wake_wait + self.alerter_recv_wait + self.alerter_period
            }
        }
    }

    /// Reject configurations that could block forever or trip the watchdog
    /// during normal operation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("scan_budget", self.scan_budget),
            ("monitor_send_wait", self.monitor_send_wait),
            ("monitor_period", self.monitor_period),
            ("classifier_wake_wait", self.classifier_wake_wait),
            ("classifier_recv_wait", self.classifier_recv_wait),
            ("classifier_send_wait", self.classifier_send_wait),
            ("classifier_period", self.classifier_period),
            ("alerter_wake_wait", self.alerter_wake_wait),
            ("alerter_recv_wait", self.alerter_recv_wait),
            ("alerter_period", self.alerter_period),
            ("watchdog_timeout", self.watchdog_timeout),
            ("watchdog_check_period", self.watchdog_check_period),
        ];
        for (name, value) in named {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
        }

        if self.watchdog_check_period >= self.watchdog_timeout {
            return Err(ConfigError::CheckPeriodTooLong);
        }

        for stage in StageId::ALL {
            let gap = self.worst_case_pulse_gap(stage);
            if gap >= self.watchdog_timeout {
                return Err(ConfigError::PulseGapTooLong {
                    stage,
                    gap_ms: gap.as_millis() as u64,
                    timeout_ms: self.watchdog_timeout.as_millis() as u64,
                });
            }
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A wait or period is zero.
    ZeroDuration(&'static str),
    /// The supervisor would check less often than the deadline it enforces.
    CheckPeriodTooLong,
    /// A stage could legitimately go longer than the watchdog timeout
    /// without pulsing.
    PulseGapTooLong {
        stage: StageId,
        gap_ms: u64,
        timeout_ms: u64,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroDuration(name) => write!(f, "{name} must be non-zero"),
            Self::CheckPeriodTooLong => {
                write!(f, "watchdog_check_period must be shorter than watchdog_timeout")
            }
            Self::PulseGapTooLong {
                stage,
                gap_ms,
                timeout_ms,
            } => write!(
                f,
                "{stage} may go {gap_ms}ms between pulses, watchdog timeout is {timeout_ms}ms"
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(PipelineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn default_pulse_gaps_stay_under_watchdog() {
        let cfg = PipelineConfig::new();
        assert_eq!(cfg.worst_case_pulse_gap(StageId::Monitor), ms(2500));
        assert_eq!(cfg.worst_case_pulse_gap(StageId::Classifier), ms(2500));
        assert_eq!(cfg.worst_case_pulse_gap(StageId::Alerter), ms(3000));
        for stage in StageId::ALL {
            assert!(cfg.worst_case_pulse_gap(stage) < cfg.watchdog_timeout);
        }
    }

    #[test]
    fn zero_wait_is_rejected() {
        let cfg = PipelineConfig {
            classifier_recv_wait: Duration::ZERO,
            ..PipelineConfig::new()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroDuration("classifier_recv_wait"))
        );
    }

    #[test]
    fn slow_stage_is_rejected() {
        let cfg = PipelineConfig {
            alerter_wake_wait: ms(5600),
            ..PipelineConfig::new()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::PulseGapTooLong {
                stage: StageId::Alerter,
                gap_ms: 6600,
                timeout_ms: 6000,
            })
        );
    }

    #[test]
    fn gap_equal_to_timeout_is_rejected() {
        let cfg = PipelineConfig {
            watchdog_timeout: ms(3000),
            ..PipelineConfig::new()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::PulseGapTooLong {
                stage: StageId::Alerter,
                ..
            })
        ));
    }

    #[test]
    fn check_period_must_be_below_timeout() {
        let cfg = PipelineConfig {
            watchdog_check_period: ms(6000),
            ..PipelineConfig::new()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::CheckPeriodTooLong));
    }

    #[test]
    fn scaled_config_keeps_ratios() {
        let cfg = PipelineConfig::new().time_scaled(50);
        assert_eq!(cfg.monitor_period, ms(20));
        assert_eq!(cfg.watchdog_timeout, ms(120));
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn scaling_by_zero_is_identity() {
        assert_eq!(PipelineConfig::new().time_scaled(0), PipelineConfig::new());
    }
}
