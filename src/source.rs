/// Connected-network sources.
///
/// The pipeline only needs "which SSID is the device associated with right
/// now". Platforms implement [`NetworkSource`] over their radio driver; the
/// host daemon and tests use [`RotatingSource`].
use core::fmt;

use crate::observation::{Ssid, SsidError};

/// Why a scan produced no identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanError {
    /// Radio or driver not reachable.
    Unavailable,
    /// Not associated with any network.
    NotConnected,
    /// Driver reported an SSID that does not fit.
    Invalid(SsidError),
    /// No answer within the scan budget.
    TimedOut,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "network source unavailable"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Invalid(e) => write!(f, "invalid SSID from source: {e}"),
            Self::TimedOut => write!(f, "scan timed out"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ScanError {}

impl From<SsidError> for ScanError {
    fn from(e: SsidError) -> Self {
        Self::Invalid(e)
    }
}

/// Polled source of the currently associated SSID.
///
/// May block. The monitor runs the source on a worker thread and replaces
/// scans that overrun its budget with the unknown sentinel.
pub trait NetworkSource {
    fn scan(&mut self) -> Result<Ssid, ScanError>;
}

impl<S: NetworkSource + ?Sized> NetworkSource for &mut S {
    fn scan(&mut self) -> Result<Ssid, ScanError> {
        (**self).scan()
    }
}

/// Simulated association history used by the demo firmware.
pub static DEMO_SEQUENCE: &[&str] = &[
    "Rede_Segura1",
    "Invasor",
    "Home_Leonardo",
    "Desconhecida",
];

/// Source that cycles through a fixed list of SSIDs, one per scan.
#[derive(Debug, Clone)]
pub struct RotatingSource<'a> {
    names: &'a [&'a str],
    idx: usize,
}

impl<'a> RotatingSource<'a> {
    pub const fn new(names: &'a [&'a str]) -> Self {
        Self { names, idx: 0 }
    }
}

impl RotatingSource<'static> {
    pub const fn demo() -> Self {
        Self::new(DEMO_SEQUENCE)
    }
}

impl NetworkSource for RotatingSource<'_> {
    fn scan(&mut self) -> Result<Ssid, ScanError> {
        if self.names.is_empty() {
            return Err(ScanError::NotConnected);
        }
        let name = self.names[self.idx];
        self.idx = (self.idx + 1) % self.names.len();
        Ok(Ssid::new(name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_sequence_rotates_and_wraps() {
        let mut src = RotatingSource::demo();
        let seen: std::vec::Vec<std::string::String> = (0..6)
            .map(|_| src.scan().unwrap().as_str().to_owned())
            .collect();
        assert_eq!(
            seen,
            [
                "Rede_Segura1",
                "Invasor",
                "Home_Leonardo",
                "Desconhecida",
                "Rede_Segura1",
                "Invasor"
            ]
        );
    }

    #[test]
    fn empty_rotation_reports_not_connected() {
        let mut src = RotatingSource::new(&[]);
        assert_eq!(src.scan(), Err(ScanError::NotConnected));
    }

    #[test]
    fn overlong_name_is_a_scan_error_not_a_panic() {
        static NAMES: &[&str] = &["this-network-name-is-far-too-long-for-802.11"];
        let mut src = RotatingSource::new(NAMES);
        assert!(matches!(src.scan(), Err(ScanError::Invalid(_))));
    }

    #[test]
    fn mutable_reference_is_a_source() {
        fn take<S: NetworkSource>(mut s: S) -> Ssid {
            s.scan().unwrap()
        }
        let mut src = RotatingSource::demo();
        assert_eq!(take(&mut src).as_str(), "Rede_Segura1");
        assert_eq!(src.scan().unwrap().as_str(), "Invasor");
    }
}
