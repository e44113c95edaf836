//! Haplane - Two-Node HA Control Plane
//!
//! Daemon entry point: loads configuration, wires the cluster state store,
//! heartbeat transport, periodic monitor, and HTTP API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use haplane::api::HttpServer;
use haplane::clock::{Clock, SystemClock};
use haplane::cluster::{ElectionPolicy, HeartbeatMonitor, SplitBrainResolver, StateStore};
use haplane::config::HaplaneConfig;
use haplane::datapath::{DatapathDriver, HookDatapath, NullDatapath, SystemUptime};
use haplane::error::Result;
use haplane::heartbeat::{HeartbeatLink, HeartbeatMessage, UdpLink};

/// Haplane - HA role election daemon for two-node appliance pairs
#[derive(Parser)]
#[command(name = "haplane")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "haplane.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HA daemon
    Start,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "haplane.toml")]
        output: PathBuf,

        /// Chassis serial of this node
        #[arg(long, default_value = "A100")]
        serial: String,
    },

    /// Validate configuration file
    Validate,

    /// Show node information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Start => run_start(cli.config).await,
        Commands::Init { output, serial } => run_init(output, serial),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Start the HA daemon
async fn run_start(config_path: PathBuf) -> Result<()> {
    tracing::info!("Starting haplane node...");

    // Load configuration
    let config = match HaplaneConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            return Err(e);
        }
    };
    tracing::info!(
        "Loaded configuration: cluster {}, serial {}",
        config.cluster.id,
        config.node.serial
    );

    // Datapath driver: hooks need root (or CAP_NET_ADMIN) to be useful
    let datapath: Arc<dyn DatapathDriver> = if config.datapath.has_hooks() {
        if !nix::unistd::Uid::effective().is_root() {
            tracing::warn!("Datapath hooks configured but not running as root");
        }
        Arc::new(HookDatapath::new(config.datapath.clone()))
    } else {
        tracing::info!("No datapath hooks configured, running dry");
        Arc::new(NullDatapath)
    };

    // Initialize cluster state
    let store = Arc::new(StateStore::new(Arc::clone(&datapath)));
    store.initialize(config.cluster.id, &config.node.serial)?;
    store.set_election_policy(config.cluster.election_policy)?;
    store.set_auto_recovery(config.cluster.auto_recovery)?;

    if let Some(role) = config.cluster.initial_role {
        tracing::info!("Applying configured initial role: {}", role);
        store.force_role(role)?;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let uptime = SystemUptime::new();

    // Heartbeat link to the peer
    let link = Arc::new(
        UdpLink::bind(&config.node.bind_address, &config.cluster.peer_address).await?,
    );

    // Outbound heartbeats: enqueued by the tick path, drained here
    let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::channel::<HeartbeatMessage>(64);

    let monitor = HeartbeatMonitor::new(
        Arc::clone(&store),
        Arc::clone(&clock),
        SplitBrainResolver::new(uptime.clone()),
        outbound_tx,
        config.cluster.heartbeat_timeout_ms,
    );

    // Outbound delivery loop
    let send_link = Arc::clone(&link);
    tokio::spawn(async move {
        tracing::info!("Outbound heartbeat loop started");
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_link.send(&msg).await {
                tracing::warn!("Failed to send heartbeat: {}", e);
            }
        }
        tracing::info!("Outbound heartbeat loop stopped");
    });

    // Inbound receive loop
    let recv_link = Arc::clone(&link);
    let recv_store = Arc::clone(&store);
    let recv_clock = Arc::clone(&clock);
    tokio::spawn(async move {
        tracing::info!("Inbound heartbeat loop started");
        loop {
            match recv_link.recv().await {
                Ok(msg) => {
                    if let Err(e) = recv_store.record_heartbeat(&msg, recv_clock.now_ms()) {
                        tracing::warn!("Rejected heartbeat: {}", e);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to receive heartbeat: {}", e);
                }
            }
        }
    });

    // Peer uptime poller, only meaningful for the uptime election policy
    if config.cluster.election_policy == ElectionPolicy::Uptime {
        if let Some(peer_api) = config.cluster.peer_api_address.clone() {
            let poll_uptime = Arc::clone(&uptime);
            let poll_interval = config.heartbeat_interval() * 5;
            tokio::spawn(async move {
                tracing::info!("Peer uptime poller started against {}", peer_api);
                let client = reqwest::Client::new();
                let url = format!("http://{}/v1/status", peer_api);
                let mut ticker = tokio::time::interval(poll_interval);
                loop {
                    ticker.tick().await;
                    match client.get(&url).send().await {
                        Ok(response) => match response.json::<serde_json::Value>().await {
                            Ok(body) => {
                                if let Some(secs) =
                                    body.get("uptime_secs").and_then(|v| v.as_u64())
                                {
                                    poll_uptime.set_peer_uptime(secs);
                                }
                            }
                            Err(e) => tracing::debug!("Peer status parse failed: {}", e),
                        },
                        Err(e) => tracing::debug!("Peer status poll failed: {}", e),
                    }
                }
            });
        } else {
            tracing::warn!(
                "Uptime election policy configured without cluster.peer_api_address; \
                 peer uptime will stay unknown"
            );
        }
    }

    // Tick loop driving the monitor
    let tick_interval = config.heartbeat_interval();
    let tick_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = monitor.tick() {
                tracing::error!("Heartbeat tick failed: {}", e);
                break;
            }
        }
    });

    // HTTP API
    let http_server = HttpServer::new(config.api.clone(), Arc::clone(&store), uptime.clone());

    tokio::select! {
        result = http_server.start() => {
            if let Err(e) = result {
                tracing::error!("HTTP server error: {}", e);
            }
        }
        result = tick_task => {
            if let Err(e) = result {
                tracing::error!("Tick loop failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    tracing::info!("haplane shutdown complete");
    Ok(())
}

/// Initialize configuration file
fn run_init(output: PathBuf, serial: String) -> Result<()> {
    let config_content = format!(
        r#"# Haplane Configuration
# Generated configuration file

[node]
serial = "{serial}"
bind_address = "0.0.0.0:7788"

[cluster]
id = 1
peer_address = "peer.example.com:7788"
# peer_api_address = "peer.example.com:9601"
# initial_role = "standby"
auto_recovery = false
election_policy = "serial"
heartbeat_interval_ms = 1000
heartbeat_timeout_ms = 3000
split_brain_delay_ms = 5000

[datapath]
# vip_up = "/usr/lib/haplane/hooks/vip-up"
# vip_down = "/usr/lib/haplane/hooks/vip-down"
# mac_activate = "/usr/lib/haplane/hooks/mac-activate"
# mac_flush = "/usr/lib/haplane/hooks/mac-flush"

[api]
enabled = true
bind_address = "0.0.0.0:9601"
cors_enabled = false

[logging]
level = "info"
format = "pretty"
# file = "/var/log/haplane/haplane.log"
"#
    );

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to configure your peer and datapath hooks.");
    println!("Then start with: haplane start --config {}", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match HaplaneConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Serial:        {}", config.node.serial);
            println!("  Bind Address:  {}", config.node.bind_address);
            println!("  Cluster ID:    {}", config.cluster.id);
            println!("  Peer:          {}", config.cluster.peer_address);
            println!("  Policy:        {}", config.cluster.election_policy);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show node information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = HaplaneConfig::from_file(&config_path)?;

    println!("Haplane Node Information");
    println!("========================");
    println!();
    println!("Serial:           {}", config.node.serial);
    println!("Bind Address:     {}", config.node.bind_address);
    println!();
    println!("Cluster Configuration:");
    println!("  Cluster ID:     {}", config.cluster.id);
    println!("  Peer:           {}", config.cluster.peer_address);
    println!(
        "  Initial Role:   {}",
        config
            .cluster
            .initial_role
            .map(|r| r.to_string())
            .unwrap_or_else(|| "(init)".to_string())
    );
    println!("  Auto-Recovery:  {}", config.cluster.auto_recovery);
    println!("  Policy:         {}", config.cluster.election_policy);
    println!(
        "  Heartbeat:      {} ms (timeout {} ms)",
        config.cluster.heartbeat_interval_ms, config.cluster.heartbeat_timeout_ms
    );
    println!(
        "  Split Delay:    {} ms (reserved)",
        config.cluster.split_brain_delay_ms
    );
    println!();
    println!("Datapath Hooks:   {}", if config.datapath.has_hooks() { "configured" } else { "none (dry run)" });
    println!("API:              {} on {}", if config.api.enabled { "enabled" } else { "disabled" }, config.api.bind_address);

    Ok(())
}
