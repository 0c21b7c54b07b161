/// Allow-list of trusted networks.
///
/// Built once at startup (compiled-in defaults or an operator-supplied list)
/// and never mutated afterwards: there is no insert or remove after
/// construction.
use core::fmt;

use heapless::Vec;

use crate::observation::{Ssid, SsidError};

/// Maximum number of trusted networks.
pub const MAX_ALLOWED: usize = 16;

/// Networks trusted out of the box.
pub static DEFAULT_SAFE_NETWORKS: &[&str] = &[
    "Home_Leonardo",
    "Rede_Segura1",
    "Rede_Segura2",
    "Rede_Segura3",
    "Rede_Segura4",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowListError {
    /// More than [`MAX_ALLOWED`] entries.
    TooMany,
    /// An entry appears twice.
    Duplicate(Ssid),
    /// An entry is not a valid SSID.
    Invalid(SsidError),
}

impl fmt::Display for AllowListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooMany => write!(f, "allow-list holds at most {MAX_ALLOWED} networks"),
            Self::Duplicate(ssid) => write!(f, "duplicate allow-list entry: {ssid}"),
            Self::Invalid(e) => write!(f, "invalid allow-list entry: {e}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AllowListError {}

impl From<SsidError> for AllowListError {
    fn from(e: SsidError) -> Self {
        Self::Invalid(e)
    }
}

/// Immutable set of trusted SSIDs.
#[derive(Debug, Clone)]
pub struct AllowList {
    entries: Vec<Ssid, MAX_ALLOWED>,
}

impl AllowList {
    /// Build from a list of names. Rejects duplicates so membership is a
    /// plain set, and rejects names longer than an SSID can be.
    pub fn new<'a, I>(names: I) -> Result<Self, AllowListError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut entries = Vec::new();
        for name in names {
            let ssid = Ssid::new(name)?;
            if entries.contains(&ssid) {
                return Err(AllowListError::Duplicate(ssid));
            }
            entries.push(ssid).map_err(|_| AllowListError::TooMany)?;
        }
        Ok(Self { entries })
    }

    /// Exact, case-sensitive membership test.
    pub fn contains(&self, ssid: &Ssid) -> bool {
        self.entries.iter().any(|entry| entry == ssid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ssid> {
        self.entries.iter()
    }
}

impl Default for AllowList {
    fn default() -> Self {
        let mut entries = Vec::new();
        for &name in DEFAULT_SAFE_NETWORKS {
            if let Ok(ssid) = Ssid::new(name) {
                let _ = entries.push(ssid);
            }
        }
        Self { entries }
    }
}
