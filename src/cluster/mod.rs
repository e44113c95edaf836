//! Cluster State Machine
//!
//! Role election, heartbeat-loss detection, and split-brain handling for
//! the two-node HA pair.

pub mod monitor;
pub mod resolver;
pub mod state;

pub use monitor::HeartbeatMonitor;
pub use resolver::{Resolution, SplitBrainResolver};
pub use state::{ClusterState, ClusterStatus, ElectionPolicy, Role, StateStore};
