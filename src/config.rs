//! Haplane Configuration
//!
//! Configuration structures for the HA pair daemon: node identity,
//! cluster timing, datapath hooks, API, and logging.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cluster::state::{ElectionPolicy, Role};

/// Main haplane configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaplaneConfig {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// Cluster pair configuration
    pub cluster: ClusterConfig,

    /// Datapath hook configuration
    #[serde(default)]
    pub datapath: DatapathConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Chassis serial, also the election tie-break key (31 bytes kept)
    pub serial: String,

    /// Address to bind for heartbeat exchange
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Cluster pair configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Identifier shared by both members of the pair
    pub id: u32,

    /// Peer heartbeat address (host:port)
    pub peer_address: String,

    /// Peer HTTP API address, consulted by the uptime election policy
    #[serde(default)]
    pub peer_api_address: Option<String>,

    /// Role to assume at startup; leaving it unset keeps the node in INIT
    /// until an operator forces a role
    #[serde(default)]
    pub initial_role: Option<Role>,

    /// Enable automatic split-brain recovery
    #[serde(default)]
    pub auto_recovery: bool,

    /// Tie-break policy for automatic recovery
    #[serde(default = "default_election_policy")]
    pub election_policy: ElectionPolicy,

    /// Heartbeat interval in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Heartbeat loss timeout in milliseconds
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// Delay before declaring split-brain, in milliseconds. Reserved:
    /// detection is currently immediate and does not consult this value.
    #[serde(default = "default_split_brain_delay_ms")]
    pub split_brain_delay_ms: u64,
}

/// Datapath hook configuration
///
/// Each hook is a shell command fired on the matching role transition.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatapathConfig {
    /// Run when claiming the virtual IPs
    #[serde(default)]
    pub vip_up: Option<String>,

    /// Run when releasing the virtual IPs
    #[serde(default)]
    pub vip_down: Option<String>,

    /// Run when installing MAC-table entries
    #[serde(default)]
    pub mac_activate: Option<String>,

    /// Run when flushing MAC-table entries
    #[serde(default)]
    pub mac_flush: Option<String>,
}

impl DatapathConfig {
    /// True if any hook command is configured
    pub fn has_hooks(&self) -> bool {
        self.vip_up.is_some()
            || self.vip_down.is_some()
            || self.mac_activate.is_some()
            || self.mac_flush.is_some()
    }
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log to file path (optional)
    pub file: Option<PathBuf>,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:7788".to_string()
}

fn default_election_policy() -> ElectionPolicy {
    ElectionPolicy::Serial
}

fn default_heartbeat_interval_ms() -> u64 {
    crate::cluster::monitor::HEARTBEAT_INTERVAL_MS
}

fn default_heartbeat_timeout_ms() -> u64 {
    crate::cluster::monitor::HEARTBEAT_TIMEOUT_MS
}

fn default_split_brain_delay_ms() -> u64 {
    crate::cluster::monitor::SPLIT_BRAIN_DELAY_MS
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:9601".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
            cors_enabled: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl HaplaneConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: HaplaneConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.serial.is_empty() {
            return Err(crate::Error::Config("node.serial cannot be empty".into()));
        }

        if self.node.bind_address.is_empty() {
            return Err(crate::Error::Config(
                "node.bind_address cannot be empty".into(),
            ));
        }

        if self.cluster.peer_address.is_empty() {
            return Err(crate::Error::Config(
                "cluster.peer_address cannot be empty".into(),
            ));
        }

        if self.cluster.initial_role == Some(Role::Init) {
            return Err(crate::Error::Config(
                "cluster.initial_role must be \"active\" or \"standby\"".into(),
            ));
        }

        if self.cluster.heartbeat_timeout_ms < self.cluster.heartbeat_interval_ms {
            return Err(crate::Error::Config(
                "cluster.heartbeat_timeout_ms cannot be below the heartbeat interval".into(),
            ));
        }

        Ok(())
    }

    /// Get heartbeat interval as Duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.cluster.heartbeat_interval_ms)
    }

    /// Get heartbeat loss timeout as Duration
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.cluster.heartbeat_timeout_ms)
    }

    /// Get the reserved split-brain declaration delay as Duration
    pub fn split_brain_delay(&self) -> Duration {
        Duration::from_millis(self.cluster.split_brain_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[node]
serial = "FX4720A100"
bind_address = "0.0.0.0:7788"

[cluster]
id = 7
peer_address = "198.51.100.2:7788"
auto_recovery = true
election_policy = "serial"

[datapath]
vip_up = "/usr/lib/haplane/hooks/vip-up"
"#;

        let config = HaplaneConfig::from_str(toml).unwrap();
        assert_eq!(config.node.serial, "FX4720A100");
        assert_eq!(config.cluster.id, 7);
        assert!(config.cluster.auto_recovery);
        assert_eq!(config.cluster.election_policy, ElectionPolicy::Serial);
        assert!(config.datapath.has_hooks());

        // Timing defaults
        assert_eq!(config.cluster.heartbeat_interval_ms, 1000);
        assert_eq!(config.cluster.heartbeat_timeout_ms, 3000);
        assert_eq!(config.cluster.split_brain_delay_ms, 5000);
        assert_eq!(config.heartbeat_timeout(), Duration::from_millis(3000));
    }

    #[test]
    fn test_parse_initial_role() {
        let toml = r#"
[node]
serial = "A100"

[cluster]
id = 1
peer_address = "peer:7788"
initial_role = "standby"
"#;
        let config = HaplaneConfig::from_str(toml).unwrap();
        assert_eq!(config.cluster.initial_role, Some(Role::Standby));
    }

    #[test]
    fn test_reject_init_as_initial_role() {
        let toml = r#"
[node]
serial = "A100"

[cluster]
id = 1
peer_address = "peer:7788"
initial_role = "init"
"#;
        assert!(HaplaneConfig::from_str(toml).is_err());
    }

    #[test]
    fn test_reject_timeout_below_interval() {
        let toml = r#"
[node]
serial = "A100"

[cluster]
id = 1
peer_address = "peer:7788"
heartbeat_interval_ms = 1000
heartbeat_timeout_ms = 500
"#;
        assert!(HaplaneConfig::from_str(toml).is_err());
    }

    #[test]
    fn test_reject_empty_serial() {
        let toml = r#"
[node]
serial = ""

[cluster]
id = 1
peer_address = "peer:7788"
"#;
        assert!(HaplaneConfig::from_str(toml).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("haplane.toml");
        std::fs::write(
            &path,
            "[node]\nserial = \"A100\"\n\n[cluster]\nid = 3\npeer_address = \"peer:7788\"\n",
        )
        .unwrap();

        let config = HaplaneConfig::from_file(&path).unwrap();
        assert_eq!(config.cluster.id, 3);
        assert!(config.api.enabled);
    }
}
