//! Heartbeat Monitor
//!
//! Periodic tick logic for the HA pair: detects heartbeat loss, promotes a
//! standby node when the active side goes quiet, latches split-brain
//! detection, and emits the outbound heartbeat.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::clock::Clock;
use crate::cluster::resolver::SplitBrainResolver;
use crate::cluster::state::{Role, StateStore};
use crate::error::Result;
use crate::heartbeat::HeartbeatMessage;

/// Default heartbeat interval in milliseconds
pub const HEARTBEAT_INTERVAL_MS: u64 = 1000;

/// Default heartbeat loss timeout in milliseconds (three missed intervals)
pub const HEARTBEAT_TIMEOUT_MS: u64 = 3000;

/// Delay before declaring split-brain, in milliseconds. Reserved: detection
/// is immediate upon observing both roles ACTIVE and does not consult this.
pub const SPLIT_BRAIN_DELAY_MS: u64 = 5000;

/// Periodic heartbeat evaluation driven by the daemon's tick loop
pub struct HeartbeatMonitor {
    store: Arc<StateStore>,
    clock: Arc<dyn Clock>,
    resolver: SplitBrainResolver,
    outbound: mpsc::Sender<HeartbeatMessage>,
    timeout_ms: i64,
}

impl HeartbeatMonitor {
    /// Create a monitor over the given store
    pub fn new(
        store: Arc<StateStore>,
        clock: Arc<dyn Clock>,
        resolver: SplitBrainResolver,
        outbound: mpsc::Sender<HeartbeatMessage>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            store,
            clock,
            resolver,
            outbound,
            timeout_ms: timeout_ms as i64,
        }
    }

    /// Process one heartbeat interval.
    ///
    /// Loss detection, standby promotion, and split-brain evaluation run
    /// under a single guard acquisition, then the outbound heartbeat is
    /// enqueued. The heartbeat goes out regardless of what the evaluation
    /// concluded, so a node with a failing receive path still signals
    /// liveness.
    pub fn tick(&self) -> Result<()> {
        let now = self.clock.now_ms();
        let timeout_ms = self.timeout_ms;
        let resolver = &self.resolver;

        let msg = self.store.with_state(|state, datapath| {
            let elapsed_ms = now - state.last_heartbeat_rx;

            // Loss detection fires on the up->down edge only; promotion
            // happens at most once per loss episode.
            if state.heartbeat_up && elapsed_ms > timeout_ms {
                tracing::warn!("Heartbeat lost (last rx: {} ms ago)", elapsed_ms);
                state.heartbeat_up = false;

                // A dead peer and a dead heartbeat link look identical
                // here; the link-failure case surfaces later as
                // split-brain.
                if state.local_role == Role::Standby {
                    tracing::warn!(
                        "Standby node lost heartbeat, assuming active node failed; promoting to ACTIVE"
                    );
                    state.local_role = Role::Active;
                    if let Err(e) = datapath.activate_virtual_ips() {
                        tracing::warn!("VIP activation failed: {}", e);
                    }
                    if let Err(e) = datapath.activate_mac_tables() {
                        tracing::warn!("MAC-table activation failed: {}", e);
                    }
                }
            }

            // Split-brain: both sides claim ACTIVE. Latched so the resolver
            // runs once per detection episode, not once per tick.
            if state.local_role == Role::Active
                && state.peer_role == Role::Active
                && !state.split_brain_detected
            {
                tracing::error!(
                    "SPLIT-BRAIN detected: both nodes active, cluster id {}",
                    state.cluster_id
                );
                state.split_brain_detected = true;

                if state.auto_recovery_enabled {
                    resolver.resolve(state, datapath);
                }
            }

            let msg = HeartbeatMessage {
                cluster_id: state.cluster_id,
                sender_role: state.local_role,
                sender_serial: state.local_serial.clone(),
                timestamp: now / 1000,
            };
            state.last_heartbeat_tx = now;
            msg
        })?;

        if let Err(e) = self.outbound.try_send(msg) {
            tracing::warn!("Outbound heartbeat queue full, dropping: {}", e);
        }

        Ok(())
    }
}
