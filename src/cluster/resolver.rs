//! Split-Brain Resolution
//!
//! Policy-driven tie-break that decides which member of the pair demotes
//! itself when both believe they are ACTIVE. Each node evaluates only its
//! local view; the protocol relies on both sides applying the same strict
//! comparison, so with distinct keys exactly one side loses.

use std::sync::Arc;

use crate::cluster::state::{ClusterState, ElectionPolicy, Role};
use crate::datapath::{DatapathDriver, UptimeProbe};

/// Outcome of a resolution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// This node demoted itself to STANDBY
    Demoted,
    /// This node stays ACTIVE, waiting for the peer to demote
    RemainedActive,
}

/// Automatic split-brain resolver
pub struct SplitBrainResolver {
    uptime: Arc<dyn UptimeProbe>,
}

impl SplitBrainResolver {
    /// Create a resolver backed by the given uptime probe
    pub fn new(uptime: Arc<dyn UptimeProbe>) -> Self {
        Self { uptime }
    }

    /// Apply the configured tie-break to the current state.
    ///
    /// Called with the state guard held, only when both roles are observed
    /// ACTIVE. Comparisons are strict: equal serials or equal uptimes leave
    /// both sides ACTIVE and the pair stays split.
    pub fn resolve(&self, state: &mut ClusterState, datapath: &dyn DatapathDriver) -> Resolution {
        tracing::info!(
            "Auto-resolving split-brain using policy: {}",
            state.election_policy
        );

        let should_demote = match state.election_policy {
            ElectionPolicy::Serial => state.local_serial.as_str() > state.peer_serial.as_str(),
            ElectionPolicy::Uptime => {
                let local = self.uptime.local_uptime_secs();
                match self.uptime.peer_uptime_secs() {
                    Some(peer) => local < peer,
                    None => {
                        tracing::warn!("Peer uptime unknown, cannot tie-break; staying ACTIVE");
                        false
                    }
                }
            }
        };

        if should_demote {
            tracing::warn!(
                "Auto-demoting local node to STANDBY (local serial: {}, peer: {})",
                state.local_serial,
                state.peer_serial
            );
            state.local_role = Role::Standby;
            if let Err(e) = datapath.release_virtual_ips() {
                tracing::warn!("VIP release failed: {}", e);
            }
            if let Err(e) = datapath.flush_mac_tables() {
                tracing::warn!("MAC-table flush failed: {}", e);
            }
            state.split_brain_detected = false;
            Resolution::Demoted
        } else {
            tracing::info!(
                "Local node remains ACTIVE (local serial: {}, peer: {}), waiting for peer to demote",
                state.local_serial,
                state.peer_serial
            );
            Resolution::RemainedActive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datapath::{RecordingDatapath, StaticUptimeProbe};

    fn split_state(policy: ElectionPolicy, local_serial: &str, peer_serial: &str) -> ClusterState {
        ClusterState {
            cluster_id: 7,
            local_role: Role::Active,
            peer_role: Role::Active,
            heartbeat_up: true,
            last_heartbeat_rx: 0,
            last_heartbeat_tx: 0,
            local_serial: local_serial.to_string(),
            peer_serial: peer_serial.to_string(),
            split_brain_detected: true,
            auto_recovery_enabled: true,
            election_policy: policy,
        }
    }

    #[test]
    fn test_serial_policy_higher_serial_demotes() {
        let datapath = RecordingDatapath::new();
        let resolver = SplitBrainResolver::new(StaticUptimeProbe::new(0, None));
        let mut state = split_state(ElectionPolicy::Serial, "B200", "A100");

        let outcome = resolver.resolve(&mut state, datapath.as_ref());

        assert_eq!(outcome, Resolution::Demoted);
        assert_eq!(state.local_role, Role::Standby);
        assert!(!state.split_brain_detected);
        assert_eq!(datapath.counts(), (0, 1, 0, 1));
    }

    #[test]
    fn test_serial_policy_lower_serial_stays_active() {
        let datapath = RecordingDatapath::new();
        let resolver = SplitBrainResolver::new(StaticUptimeProbe::new(0, None));
        let mut state = split_state(ElectionPolicy::Serial, "A100", "B200");

        let outcome = resolver.resolve(&mut state, datapath.as_ref());

        assert_eq!(outcome, Resolution::RemainedActive);
        assert_eq!(state.local_role, Role::Active);
        assert!(state.split_brain_detected);
        assert_eq!(datapath.counts(), (0, 0, 0, 0));
    }

    #[test]
    fn test_serial_policy_equal_serials_neither_demotes() {
        // Strict comparison: equal keys have no resolution path and the
        // pair stays split. Known limitation of the policy.
        let datapath = RecordingDatapath::new();
        let resolver = SplitBrainResolver::new(StaticUptimeProbe::new(0, None));
        let mut state = split_state(ElectionPolicy::Serial, "A100", "A100");

        let outcome = resolver.resolve(&mut state, datapath.as_ref());

        assert_eq!(outcome, Resolution::RemainedActive);
        assert_eq!(state.local_role, Role::Active);
        assert!(state.split_brain_detected);
    }

    #[test]
    fn test_uptime_policy_lower_uptime_demotes() {
        let datapath = RecordingDatapath::new();
        let resolver = SplitBrainResolver::new(StaticUptimeProbe::new(120, Some(86_400)));
        let mut state = split_state(ElectionPolicy::Uptime, "A100", "B200");

        let outcome = resolver.resolve(&mut state, datapath.as_ref());

        assert_eq!(outcome, Resolution::Demoted);
        assert_eq!(state.local_role, Role::Standby);
        assert!(!state.split_brain_detected);
        assert_eq!(datapath.counts(), (0, 1, 0, 1));
    }

    #[test]
    fn test_uptime_policy_higher_uptime_stays_active() {
        let datapath = RecordingDatapath::new();
        let resolver = SplitBrainResolver::new(StaticUptimeProbe::new(86_400, Some(120)));
        let mut state = split_state(ElectionPolicy::Uptime, "A100", "B200");

        assert_eq!(
            resolver.resolve(&mut state, datapath.as_ref()),
            Resolution::RemainedActive
        );
        assert!(state.split_brain_detected);
    }

    #[test]
    fn test_uptime_policy_equal_uptimes_neither_demotes() {
        let datapath = RecordingDatapath::new();
        let resolver = SplitBrainResolver::new(StaticUptimeProbe::new(3600, Some(3600)));
        let mut state = split_state(ElectionPolicy::Uptime, "A100", "B200");

        assert_eq!(
            resolver.resolve(&mut state, datapath.as_ref()),
            Resolution::RemainedActive
        );
        assert_eq!(state.local_role, Role::Active);
        assert!(state.split_brain_detected);
    }

    #[test]
    fn test_uptime_policy_unknown_peer_uptime_stays_active() {
        let datapath = RecordingDatapath::new();
        let resolver = SplitBrainResolver::new(StaticUptimeProbe::new(120, None));
        let mut state = split_state(ElectionPolicy::Uptime, "A100", "B200");

        assert_eq!(
            resolver.resolve(&mut state, datapath.as_ref()),
            Resolution::RemainedActive
        );
        assert!(state.split_brain_detected);
        assert_eq!(datapath.counts(), (0, 0, 0, 0));
    }
}
