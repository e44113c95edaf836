//! Cluster State Store
//!
//! Owns the shared HA pair state record and its concurrency guard. The
//! periodic tick path, the heartbeat receive path, and operator commands
//! all serialize through this store; no caller can observe a partially
//! updated record.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::datapath::DatapathDriver;
use crate::error::{Error, Result};
use crate::heartbeat::HeartbeatMessage;

/// Maximum stored length of a chassis serial, in bytes
pub const MAX_SERIAL_LEN: usize = 31;

/// Role of a node in the HA pair.
///
/// Split-brain is not a role: it is tracked as a separate flag overlaying
/// ACTIVE, so no fourth role value can ever be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Not yet elected into the pair
    Init,
    /// Forwarding traffic, owns the virtual addresses
    Active,
    /// Hot spare, ready to take over
    Standby,
}

impl Role {
    /// Wire encoding of the role
    pub fn as_wire(self) -> u8 {
        match self {
            Role::Init => 0,
            Role::Active => 1,
            Role::Standby => 2,
        }
    }

    /// Decode a role from its wire byte
    pub fn from_wire(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Role::Init),
            1 => Ok(Role::Active),
            2 => Ok(Role::Standby),
            other => Err(Error::MalformedFrame(format!(
                "unknown role byte {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Init => write!(f, "INIT"),
            Role::Active => write!(f, "ACTIVE"),
            Role::Standby => write!(f, "STANDBY"),
        }
    }
}

/// Tie-break policy for automatic split-brain recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionPolicy {
    /// The higher chassis serial demotes itself
    Serial,
    /// The lower uptime demotes itself (newer boot is the likely recovered
    /// node)
    Uptime,
}

impl std::fmt::Display for ElectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElectionPolicy::Serial => write!(f, "serial-number"),
            ElectionPolicy::Uptime => write!(f, "uptime"),
        }
    }
}

/// The shared HA pair state record
#[derive(Debug, Clone)]
pub struct ClusterState {
    pub cluster_id: u32,
    pub local_role: Role,
    pub peer_role: Role,
    pub heartbeat_up: bool,
    /// Epoch milliseconds of the last received heartbeat, 0 if never
    pub last_heartbeat_rx: i64,
    /// Epoch milliseconds of the last transmitted heartbeat, 0 if never
    pub last_heartbeat_tx: i64,
    pub local_serial: String,
    pub peer_serial: String,
    pub split_brain_detected: bool,
    pub auto_recovery_enabled: bool,
    pub election_policy: ElectionPolicy,
}

/// Self-consistent snapshot of the externally visible state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub cluster_id: u32,
    pub local_role: Role,
    pub peer_role: Role,
    pub heartbeat_up: bool,
    pub split_brain: bool,
    pub last_heartbeat_rx: i64,
    pub last_heartbeat_tx: i64,
    pub local_serial: String,
    pub peer_serial: String,
    pub auto_recovery_enabled: bool,
    pub election_policy: ElectionPolicy,
}

/// Cluster state store: one record, one guard.
///
/// Created empty; every operation before `initialize` fails with
/// `NotInitialized`. The store is an explicit handle, so tests can run
/// multiple independent instances.
pub struct StateStore {
    state: Mutex<Option<ClusterState>>,
    datapath: Arc<dyn DatapathDriver>,
}

impl StateStore {
    /// Create an uninitialized store bound to a datapath driver
    pub fn new(datapath: Arc<dyn DatapathDriver>) -> Self {
        Self {
            state: Mutex::new(None),
            datapath,
        }
    }

    fn guard(&self) -> MutexGuard<'_, Option<ClusterState>> {
        // A poisoned guard means a panic mid-transition; the record can no
        // longer be trusted.
        self.state.lock().expect("cluster state guard poisoned")
    }

    /// Reset the state machine for the given pair membership.
    ///
    /// Both roles start at INIT, heartbeat is considered down, automatic
    /// recovery is off, and the election policy is serial-number. An empty
    /// serial is rejected; an overlong serial is truncated to the stored
    /// capacity of 31 bytes.
    pub fn initialize(&self, cluster_id: u32, local_serial: &str) -> Result<()> {
        if local_serial.is_empty() {
            return Err(Error::InvalidSerial("serial must not be empty".into()));
        }
        let local_serial = truncate_serial(local_serial);

        let mut guard = self.guard();
        *guard = Some(ClusterState {
            cluster_id,
            local_role: Role::Init,
            peer_role: Role::Init,
            heartbeat_up: false,
            last_heartbeat_rx: 0,
            last_heartbeat_tx: 0,
            local_serial: local_serial.clone(),
            peer_serial: String::new(),
            split_brain_detected: false,
            auto_recovery_enabled: false,
            election_policy: ElectionPolicy::Serial,
        });

        tracing::info!(
            "Cluster {} initialized, local serial: {}",
            cluster_id,
            local_serial
        );
        Ok(())
    }

    /// Get a self-consistent snapshot of all externally visible fields
    pub fn get_status(&self) -> Result<ClusterStatus> {
        let guard = self.guard();
        let state = guard.as_ref().ok_or(Error::NotInitialized)?;

        Ok(ClusterStatus {
            cluster_id: state.cluster_id,
            local_role: state.local_role,
            peer_role: state.peer_role,
            heartbeat_up: state.heartbeat_up,
            split_brain: state.split_brain_detected,
            last_heartbeat_rx: state.last_heartbeat_rx,
            last_heartbeat_tx: state.last_heartbeat_tx,
            local_serial: state.local_serial.clone(),
            peer_serial: state.peer_serial.clone(),
            auto_recovery_enabled: state.auto_recovery_enabled,
            election_policy: state.election_policy,
        })
    }

    /// Operator override of the local role.
    ///
    /// Only ACTIVE and STANDBY can be forced; INIT is rejected and the
    /// state is left untouched. The matching datapath side effects run
    /// before the role is recorded, and the split-brain flag is cleared
    /// unconditionally: the operator is trusted to have resolved any
    /// conflict.
    pub fn force_role(&self, role: Role) -> Result<()> {
        if role == Role::Init {
            return Err(Error::InvalidRole(role.to_string()));
        }

        let mut guard = self.guard();
        let state = guard.as_mut().ok_or(Error::NotInitialized)?;

        tracing::warn!("Forcing role to {} (operator command)", role);

        // Role transitions are never rolled back on datapath failure.
        if role == Role::Active {
            if let Err(e) = self.datapath.activate_virtual_ips() {
                tracing::warn!("VIP activation failed: {}", e);
            }
            if let Err(e) = self.datapath.activate_mac_tables() {
                tracing::warn!("MAC-table activation failed: {}", e);
            }
        } else {
            if let Err(e) = self.datapath.release_virtual_ips() {
                tracing::warn!("VIP release failed: {}", e);
            }
            if let Err(e) = self.datapath.flush_mac_tables() {
                tracing::warn!("MAC-table flush failed: {}", e);
            }
        }

        state.local_role = role;
        state.split_brain_detected = false;
        Ok(())
    }

    /// Receive-path update of the peer view.
    ///
    /// Heartbeats from a different cluster id are rejected before any
    /// mutation. This path never evaluates split-brain and never clears the
    /// split flag; that happens only in the tick path or via operator
    /// override.
    pub fn record_heartbeat(&self, msg: &HeartbeatMessage, now_ms: i64) -> Result<()> {
        let mut guard = self.guard();
        let state = guard.as_mut().ok_or(Error::NotInitialized)?;

        if msg.cluster_id != state.cluster_id {
            return Err(Error::ClusterMismatch {
                expected: state.cluster_id,
                got: msg.cluster_id,
            });
        }

        state.last_heartbeat_rx = now_ms;
        state.heartbeat_up = true;
        state.peer_role = msg.sender_role;
        state.peer_serial = truncate_serial(&msg.sender_serial);

        if state.split_brain_detected {
            tracing::info!(
                "Heartbeat restored during split-brain; manual or auto recovery can proceed"
            );
        }

        Ok(())
    }

    /// Toggle automatic split-brain recovery
    pub fn set_auto_recovery(&self, enabled: bool) -> Result<()> {
        let mut guard = self.guard();
        let state = guard.as_mut().ok_or(Error::NotInitialized)?;
        state.auto_recovery_enabled = enabled;
        tracing::info!(
            "Automatic split-brain recovery {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Select the tie-break policy for automatic recovery
    pub fn set_election_policy(&self, policy: ElectionPolicy) -> Result<()> {
        let mut guard = self.guard();
        let state = guard.as_mut().ok_or(Error::NotInitialized)?;
        state.election_policy = policy;
        tracing::info!("Election policy set to {}", policy);
        Ok(())
    }

    /// Run a closure against the state record under the guard.
    ///
    /// Used by the tick path so loss detection, promotion, split-brain
    /// evaluation, and heartbeat construction happen in one critical
    /// section, with the datapath driver available for transition side
    /// effects.
    pub(crate) fn with_state<T>(
        &self,
        f: impl FnOnce(&mut ClusterState, &dyn DatapathDriver) -> T,
    ) -> Result<T> {
        let mut guard = self.guard();
        let state = guard.as_mut().ok_or(Error::NotInitialized)?;
        Ok(f(state, self.datapath.as_ref()))
    }
}

/// Clamp a serial to the stored capacity without splitting a character
fn truncate_serial(serial: &str) -> String {
    if serial.len() <= MAX_SERIAL_LEN {
        return serial.to_string();
    }
    let mut end = MAX_SERIAL_LEN;
    while !serial.is_char_boundary(end) {
        end -= 1;
    }
    serial[..end].to_string()
}
