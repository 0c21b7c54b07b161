/// Safety classification of observed networks.
///
/// The one business rule of the pipeline: a network is safe iff its SSID is
/// on the allow-list. Everything else, including the unknown sentinel, is
/// unsafe.
use crate::allowlist::AllowList;
use crate::observation::{NetworkObservation, SafetyFlag};

/// Verdict for a single observation.
pub fn verdict(obs: &NetworkObservation, allow: &AllowList) -> SafetyFlag {
    if allow.contains(&obs.ssid) {
        SafetyFlag::Safe
    } else {
        SafetyFlag::Unsafe
    }
}

/// Classify in place. Overwrites whatever flag the observation carried.
pub fn classify(obs: &mut NetworkObservation, allow: &AllowList) {
    obs.safety = verdict(obs, allow);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{Ssid, MAX_SSID_LEN, UNKNOWN_SSID};

    fn classified(name: &str) -> SafetyFlag {
        let mut obs = NetworkObservation::new(Ssid::new(name).unwrap());
        classify(&mut obs, &AllowList::default());
        obs.safety
    }

    #[test]
    fn allow_listed_networks_are_safe() {
        for &name in crate::allowlist::DEFAULT_SAFE_NETWORKS {
            assert_eq!(classified(name), SafetyFlag::Safe, "{name}");
        }
    }

    #[test]
    fn unlisted_network_is_unsafe() {
        assert_eq!(classified("Invasor"), SafetyFlag::Unsafe);
    }

    #[test]
    fn unknown_sentinel_is_unsafe() {
        assert_eq!(classified(UNKNOWN_SSID), SafetyFlag::Unsafe);
    }

    #[test]
    fn near_misses_are_unsafe() {
        assert_eq!(classified("home_leonardo"), SafetyFlag::Unsafe);
        assert_eq!(classified("Home_Leonardo "), SafetyFlag::Unsafe);
        assert_eq!(classified(""), SafetyFlag::Unsafe);
    }

    #[test]
    fn max_length_entry_matches() {
        let name = "N".repeat(MAX_SSID_LEN);
        let allow = AllowList::new([name.as_str()]).unwrap();
        let mut obs = NetworkObservation::new(Ssid::new(&name).unwrap());
        classify(&mut obs, &allow);
        assert_eq!(obs.safety, SafetyFlag::Safe);
    }

    #[test]
    fn reclassification_overwrites_stale_flag() {
        let mut obs = NetworkObservation {
            ssid: Ssid::new("Invasor").unwrap(),
            safety: SafetyFlag::Safe,
        };
        classify(&mut obs, &AllowList::default());
        assert_eq!(obs.safety, SafetyFlag::Unsafe);
    }

    #[test]
    fn classify_leaves_ssid_untouched() {
        let mut obs = NetworkObservation::new(Ssid::new("Rede_Segura3").unwrap());
        classify(&mut obs, &AllowList::default());
        assert_eq!(obs.ssid.as_str(), "Rede_Segura3");
    }
}
