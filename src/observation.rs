/// Network observation record passed between the pipeline stages.
///
/// An observation is a plain value: each stage receives its own copy through
/// a link and owns it from then on. Only the classifier writes `safety`.
use core::fmt;

use heapless::String;
use serde::Serialize;

/// Maximum SSID length in bytes (802.11 limit).
pub const MAX_SSID_LEN: usize = 32;

/// Identifier reported when the network source cannot be read.
pub const UNKNOWN_SSID: &str = "Desconhecida";

/// Error building a bounded SSID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsidError {
    /// Input exceeds [`MAX_SSID_LEN`] bytes. Carries the rejected length.
    TooLong { len: usize },
}

impl fmt::Display for SsidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong { len } => {
                write!(f, "SSID is {len} bytes, limit is {MAX_SSID_LEN}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SsidError {}

/// A network identifier of at most [`MAX_SSID_LEN`] bytes.
///
/// Construction fails instead of clipping, so two different long names can
/// never collapse into the same allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Ssid(String<MAX_SSID_LEN>);

impl Ssid {
    pub fn new(name: &str) -> Result<Self, SsidError> {
        if name.len() > MAX_SSID_LEN {
            return Err(SsidError::TooLong { len: name.len() });
        }
        let mut s = String::new();
        s.push_str(name)
            .map_err(|_| SsidError::TooLong { len: name.len() })?;
        Ok(Self(s))
    }

    /// The sentinel used when the source is unreachable.
    pub fn unknown() -> Self {
        let mut s = String::new();
        // UNKNOWN_SSID is a 12-byte literal
        let _ = s.push_str(UNKNOWN_SSID);
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_unknown(&self) -> bool {
        self.as_str() == UNKNOWN_SSID
    }
}

impl TryFrom<&str> for Ssid {
    type Error = SsidError;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

impl fmt::Display for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification state of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyFlag {
    /// Not yet classified. Alerting treats this the same as `Unsafe`.
    #[default]
    Unknown,
    Safe,
    Unsafe,
}

impl SafetyFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyFlag::Unknown => "unknown",
            SafetyFlag::Safe => "safe",
            SafetyFlag::Unsafe => "unsafe",
        }
    }
}

/// One sample of the connected network, moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkObservation {
    pub ssid: Ssid,
    pub safety: SafetyFlag,
}

impl NetworkObservation {
    /// Fresh observation as produced by the monitor: not yet classified.
    pub fn new(ssid: Ssid) -> Self {
        Self {
            ssid,
            safety: SafetyFlag::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssid_at_limit_is_accepted() {
        let name = "A".repeat(MAX_SSID_LEN);
        let ssid = Ssid::new(&name).unwrap();
        assert_eq!(ssid.as_str(), name);
    }

    #[test]
    fn ssid_one_over_limit_is_rejected() {
        let name = "A".repeat(MAX_SSID_LEN + 1);
        assert_eq!(
            Ssid::new(&name),
            Err(SsidError::TooLong {
                len: MAX_SSID_LEN + 1
            })
        );
    }

    #[test]
    fn ssid_limit_counts_bytes_not_chars() {
        // 11 × 3-byte chars = 33 bytes
        let name = "€".repeat(11);
        assert!(Ssid::new(&name).is_err());
        assert!(Ssid::new(&"€".repeat(10)).is_ok());
    }

    #[test]
    fn empty_ssid_is_valid() {
        assert_eq!(Ssid::new("").unwrap().as_str(), "");
    }

    #[test]
    fn unknown_sentinel() {
        let ssid = Ssid::unknown();
        assert_eq!(ssid.as_str(), "Desconhecida");
        assert!(ssid.is_unknown());
        assert!(!Ssid::new("Invasor").unwrap().is_unknown());
    }

    #[test]
    fn new_observation_is_unclassified() {
        let obs = NetworkObservation::new(Ssid::new("Invasor").unwrap());
        assert_eq!(obs.safety, SafetyFlag::Unknown);
    }

    #[test]
    fn observation_copy_is_independent() {
        let original = NetworkObservation::new(Ssid::new("Rede_Segura1").unwrap());
        let mut copy = original.clone();
        copy.safety = SafetyFlag::Safe;
        assert_eq!(original.safety, SafetyFlag::Unknown);
    }

    #[test]
    fn error_display_mentions_limit() {
        let msg = std::format!("{}", SsidError::TooLong { len: 40 });
        assert!(msg.contains("40"));
        assert!(msg.contains("32"));
    }

    #[test]
    fn serialize_observation() {
        let obs = NetworkObservation {
            ssid: Ssid::new("Home_Leonardo").unwrap(),
            safety: SafetyFlag::Safe,
        };
        let mut buf = [0u8; 128];
        let len = serde_json_core::to_slice(&obs, &mut buf).unwrap();
        let json = core::str::from_utf8(&buf[..len]).unwrap();
        assert_eq!(json, r#"{"ssid":"Home_Leonardo","safety":"safe"}"#);
    }
}
