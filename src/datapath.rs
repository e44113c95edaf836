//! Datapath Driver
//!
//! Side effects of a role change: claiming or releasing the pair's virtual
//! addresses and switch MAC tables. Drivers are invoked while the cluster
//! state guard is held and must not block.

use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::DatapathConfig;
use crate::error::{Error, Result};

/// Datapath side effects of role transitions.
///
/// Implementations must return quickly. Failures are surfaced to the caller
/// but never roll back the role transition that triggered them.
pub trait DatapathDriver: Send + Sync {
    /// Claim the pair's virtual IP addresses
    fn activate_virtual_ips(&self) -> Result<()>;

    /// Release the pair's virtual IP addresses
    fn release_virtual_ips(&self) -> Result<()>;

    /// Install MAC-table entries and announce ownership
    fn activate_mac_tables(&self) -> Result<()>;

    /// Flush MAC-table entries learned while active
    fn flush_mac_tables(&self) -> Result<()>;
}

/// Driver that performs no datapath changes (dry-run mode)
#[derive(Debug, Default)]
pub struct NullDatapath;

impl DatapathDriver for NullDatapath {
    fn activate_virtual_ips(&self) -> Result<()> {
        tracing::debug!("Datapath: VIP activate (dry run)");
        Ok(())
    }

    fn release_virtual_ips(&self) -> Result<()> {
        tracing::debug!("Datapath: VIP release (dry run)");
        Ok(())
    }

    fn activate_mac_tables(&self) -> Result<()> {
        tracing::debug!("Datapath: MAC-table activate (dry run)");
        Ok(())
    }

    fn flush_mac_tables(&self) -> Result<()> {
        tracing::debug!("Datapath: MAC-table flush (dry run)");
        Ok(())
    }
}

/// Driver that fires operator-configured hook commands.
///
/// Hooks run through `sh -c` and are spawned without waiting; the tick
/// path never blocks on them. A reaper thread collects each exit status.
pub struct HookDatapath {
    config: DatapathConfig,
}

impl HookDatapath {
    /// Create a driver from the configured hooks
    pub fn new(config: DatapathConfig) -> Self {
        Self { config }
    }

    fn run_hook(&self, name: &str, command: &Option<String>) -> Result<()> {
        let Some(command) = command else {
            tracing::debug!("Datapath: no {} hook configured", name);
            return Ok(());
        };

        tracing::info!("Datapath: running {} hook: {}", name, command);
        match Command::new("sh").arg("-c").arg(command).spawn() {
            Ok(mut child) => {
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
                Ok(())
            }
            Err(e) => Err(Error::Datapath(format!(
                "{} hook failed to spawn: {}",
                name, e
            ))),
        }
    }
}

impl DatapathDriver for HookDatapath {
    fn activate_virtual_ips(&self) -> Result<()> {
        self.run_hook("vip_up", &self.config.vip_up)
    }

    fn release_virtual_ips(&self) -> Result<()> {
        self.run_hook("vip_down", &self.config.vip_down)
    }

    fn activate_mac_tables(&self) -> Result<()> {
        self.run_hook("mac_activate", &self.config.mac_activate)
    }

    fn flush_mac_tables(&self) -> Result<()> {
        self.run_hook("mac_flush", &self.config.mac_flush)
    }
}

/// Uptime queries consumed by the uptime election policy
pub trait UptimeProbe: Send + Sync {
    /// Seconds since the local system booted
    fn local_uptime_secs(&self) -> u64;

    /// Seconds since the peer booted, if the peer has reported it
    fn peer_uptime_secs(&self) -> Option<u64>;
}

/// Probe backed by the local system and a peer-reported cache.
///
/// The peer value is fed by the status poller; 0 means the peer has not
/// reported yet.
pub struct SystemUptime {
    peer_uptime: AtomicU64,
}

impl SystemUptime {
    /// Create a probe with no peer uptime recorded yet
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            peer_uptime: AtomicU64::new(0),
        })
    }

    /// Record the peer's reported uptime
    pub fn set_peer_uptime(&self, secs: u64) {
        self.peer_uptime.store(secs, Ordering::Relaxed);
    }
}

impl UptimeProbe for SystemUptime {
    fn local_uptime_secs(&self) -> u64 {
        sysinfo::System::uptime()
    }

    fn peer_uptime_secs(&self) -> Option<u64> {
        match self.peer_uptime.load(Ordering::Relaxed) {
            0 => None,
            secs => Some(secs),
        }
    }
}

/// Driver that counts invocations, for assertions in tests
#[cfg(test)]
pub struct RecordingDatapath {
    vip_activations: std::sync::atomic::AtomicUsize,
    vip_releases: std::sync::atomic::AtomicUsize,
    mac_activations: std::sync::atomic::AtomicUsize,
    mac_flushes: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl RecordingDatapath {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            vip_activations: std::sync::atomic::AtomicUsize::new(0),
            vip_releases: std::sync::atomic::AtomicUsize::new(0),
            mac_activations: std::sync::atomic::AtomicUsize::new(0),
            mac_flushes: std::sync::atomic::AtomicUsize::new(0),
        })
    }

    /// (vip activations, vip releases, mac activations, mac flushes)
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        (
            self.vip_activations.load(Ordering::SeqCst),
            self.vip_releases.load(Ordering::SeqCst),
            self.mac_activations.load(Ordering::SeqCst),
            self.mac_flushes.load(Ordering::SeqCst),
        )
    }
}

#[cfg(test)]
impl DatapathDriver for RecordingDatapath {
    fn activate_virtual_ips(&self) -> Result<()> {
        self.vip_activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release_virtual_ips(&self) -> Result<()> {
        self.vip_releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn activate_mac_tables(&self) -> Result<()> {
        self.mac_activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn flush_mac_tables(&self) -> Result<()> {
        self.mac_flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Probe returning fixed uptimes, for tests; counts local queries so tests
/// can assert how often the resolver consulted it
#[cfg(test)]
pub struct StaticUptimeProbe {
    pub local: u64,
    pub peer: Option<u64>,
    queries: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl StaticUptimeProbe {
    pub fn new(local: u64, peer: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            local,
            peer,
            queries: std::sync::atomic::AtomicUsize::new(0),
        })
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
impl UptimeProbe for StaticUptimeProbe {
    fn local_uptime_secs(&self) -> u64 {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.local
    }

    fn peer_uptime_secs(&self) -> Option<u64> {
        self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_datapath_is_infallible() {
        let driver = NullDatapath;
        assert!(driver.activate_virtual_ips().is_ok());
        assert!(driver.release_virtual_ips().is_ok());
        assert!(driver.activate_mac_tables().is_ok());
        assert!(driver.flush_mac_tables().is_ok());
    }

    #[test]
    fn test_hook_datapath_skips_unconfigured_hooks() {
        let driver = HookDatapath::new(DatapathConfig::default());
        assert!(driver.activate_virtual_ips().is_ok());
        assert!(driver.flush_mac_tables().is_ok());
    }

    #[test]
    fn test_hook_datapath_spawns_configured_hook() {
        let driver = HookDatapath::new(DatapathConfig {
            vip_up: Some("true".to_string()),
            ..Default::default()
        });
        assert!(driver.activate_virtual_ips().is_ok());
    }

    #[test]
    fn test_system_uptime_peer_cache() {
        let probe = SystemUptime::new();
        assert_eq!(probe.peer_uptime_secs(), None);

        probe.set_peer_uptime(86400);
        assert_eq!(probe.peer_uptime_secs(), Some(86400));
    }
}
