//! hactl - Haplane Operator CLI
//!
//! Talks to the daemon's HTTP API: status, forced role override, and the
//! automatic-recovery toggle.

use clap::{Parser, Subcommand};

/// Operator CLI for the haplane daemon
#[derive(Parser)]
#[command(name = "hactl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Daemon API address
    #[arg(short, long, default_value = "localhost:9601")]
    address: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cluster status
    Status,

    /// Show cluster status as raw JSON
    Json,

    /// Force the local node's role
    ForceRole {
        /// Target role (active or standby)
        role: String,
    },

    /// Enable or disable automatic split-brain recovery
    Recovery {
        /// on or off
        setting: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Status => run_status(&cli.address).await,
        Commands::Json => run_json(&cli.address).await,
        Commands::ForceRole { role } => run_force_role(&cli.address, &role).await,
        Commands::Recovery { setting } => run_recovery(&cli.address, &setting).await,
    }
}

async fn fetch_status(address: &str) -> anyhow::Result<serde_json::Value> {
    let url = format!("http://{}/v1/status", address);
    let response = reqwest::get(&url).await?;
    if !response.status().is_success() {
        anyhow::bail!("daemon returned {}", response.status());
    }
    Ok(response.json().await?)
}

async fn run_status(address: &str) -> anyhow::Result<()> {
    let status = fetch_status(address).await?;

    println!("Haplane Cluster Status");
    println!("======================");
    println!("Cluster ID:     {}", status["cluster_id"]);
    println!("Local Role:     {}", upper(&status["local_role"]));
    println!("Peer Role:      {}", upper(&status["peer_role"]));
    println!(
        "Heartbeat:      {}",
        if status["heartbeat_up"].as_bool().unwrap_or(false) {
            "UP"
        } else {
            "DOWN"
        }
    );
    println!(
        "Split-Brain:    {}",
        if status["split_brain"].as_bool().unwrap_or(false) {
            "DETECTED"
        } else {
            "no"
        }
    );
    println!("Local Serial:   {}", upper(&status["local_serial"]));
    println!("Peer Serial:    {}", upper(&status["peer_serial"]));
    println!(
        "Auto-Recovery:  {}",
        if status["auto_recovery_enabled"].as_bool().unwrap_or(false) {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("Policy:         {}", upper(&status["election_policy"]));
    println!("Uptime:         {}s", status["uptime_secs"]);

    Ok(())
}

async fn run_json(address: &str) -> anyhow::Result<()> {
    let status = fetch_status(address).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn run_force_role(address: &str, role: &str) -> anyhow::Result<()> {
    let role = role.to_lowercase();
    if role != "active" && role != "standby" {
        anyhow::bail!("role must be 'active' or 'standby'");
    }

    let url = format!("http://{}/v1/role", address);
    let client = reqwest::Client::new();
    let response = client
        .post(&url)
        .json(&serde_json::json!({ "role": role }))
        .send()
        .await?;

    if response.status().is_success() {
        println!("✓ Role forced to {}", role.to_uppercase());
        Ok(())
    } else {
        let body: serde_json::Value = response.json().await?;
        anyhow::bail!("daemon rejected: {}", body["error"])
    }
}

async fn run_recovery(address: &str, setting: &str) -> anyhow::Result<()> {
    let enabled = match setting.to_lowercase().as_str() {
        "on" => true,
        "off" => false,
        _ => anyhow::bail!("setting must be 'on' or 'off'"),
    };

    let url = format!("http://{}/v1/recovery", address);
    let client = reqwest::Client::new();
    let response = client
        .post(&url)
        .json(&serde_json::json!({ "enabled": enabled }))
        .send()
        .await?;

    if response.status().is_success() {
        println!(
            "✓ Automatic recovery {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    } else {
        let body: serde_json::Value = response.json().await?;
        anyhow::bail!("daemon rejected: {}", body["error"])
    }
}

fn upper(value: &serde_json::Value) -> String {
    match value.as_str() {
        Some(s) if s.is_empty() => "(none)".to_string(),
        Some(s) => s.to_uppercase(),
        None => value.to_string(),
    }
}
