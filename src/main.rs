mod collector;
mod config;
mod dynamic_labels;
mod http;
mod ifname;
mod metrics;
mod secret;
mod ssh;
mod textfsm;
mod version;

use anyhow::{bail, Context};
use clap::Parser;
use collector::{Exporter, SshConnector};
use config::{Config, FeatureOverrides};
use secret::SecretString;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

fn init_logger(debug: bool) {
    // LOG_LEVEL wins over RUST_LOG; --debug only changes the default
    let default = if debug { "debug" } else { "info" };
    let filter = env::var("LOG_LEVEL")
        .or_else(|_| env::var("RUST_LOG"))
        .unwrap_or_else(|_| default.to_string());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&filter))
        .with_target(false)
        .init();
}

#[derive(Parser, Debug)]
#[command(name = "cisco-exporter")]
#[command(about = "Prometheus exporter for Cisco IOS, IOS-XE and NX-OS devices", long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "CISCO_EXPORTER_CONFIG")]
    config_file: Option<PathBuf>,

    /// Comma separated `host[:port]` targets; defaults to the hosts in the config file
    #[arg(long, env = "SSH_TARGETS", value_delimiter = ',')]
    ssh_targets: Vec<String>,

    #[arg(long, env = "SSH_USER")]
    ssh_user: Option<String>,

    #[arg(long, env = "SSH_PASSWORD", hide_env_values = true)]
    ssh_password: Option<String>,

    /// Private key for public key authentication
    #[arg(long, env = "SSH_KEYFILE")]
    ssh_keyfile: Option<PathBuf>,

    /// Timeout in seconds for connecting and for each command
    #[arg(long, env = "SSH_TIMEOUT")]
    ssh_timeout: Option<u64>,

    /// Initial output buffer size per command
    #[arg(long, env = "SSH_BATCH_SIZE")]
    ssh_batch_size: Option<usize>,

    /// Also offer CBC ciphers and SHA-1 key exchange
    #[arg(long, env = "LEGACY_CIPHERS", default_value_t = false)]
    legacy_ciphers: bool,

    /// Regex with named groups turning interface descriptions into labels
    #[arg(long, env = "DESCRIPTION_REGEX")]
    description_regex: Option<String>,

    #[arg(long, env = "LISTEN_ADDRESS", default_value = "0.0.0.0:9362")]
    listen_address: String,

    #[arg(long, env = "TELEMETRY_PATH", default_value = "/metrics")]
    telemetry_path: String,

    /// Verbose logging, including every command sent to devices
    #[arg(long, env = "DEBUG", default_value_t = false)]
    debug: bool,

    #[arg(long, env = "INTERFACES_ENABLED")]
    interfaces_enabled: Option<bool>,

    #[arg(long, env = "INVENTORY_ENABLED")]
    inventory_enabled: Option<bool>,

    #[arg(long, env = "NAT64_ENABLED")]
    nat64_enabled: Option<bool>,

    #[arg(long, env = "NEIGHBORS_ENABLED")]
    neighbors_enabled: Option<bool>,
}

/// Flags take precedence over the global section of the config file.
/// Device entries still override both.
fn apply_args(config: &mut Config, args: &Args) -> anyhow::Result<()> {
    if args.debug {
        config.debug = true;
    }
    if args.legacy_ciphers {
        config.legacy_ciphers = true;
    }
    if let Some(user) = &args.ssh_user {
        config.username = user.clone();
    }
    if let Some(password) = &args.ssh_password {
        config.password = Some(SecretString::new(password.clone()));
    }
    if let Some(key_file) = &args.ssh_keyfile {
        config.key_file = Some(key_file.clone());
    }
    if let Some(timeout) = args.ssh_timeout {
        config.timeout = Duration::from_secs(timeout);
    }
    if let Some(batch_size) = args.ssh_batch_size {
        config.batch_size = batch_size;
    }
    if let Some(pattern) = &args.description_regex {
        config
            .set_description_regex(pattern)
            .context("invalid --description-regex")?;
    }
    config.features = config.features.with(&FeatureOverrides {
        interfaces: args.interfaces_enabled,
        inventory: args.inventory_enabled,
        nat64: args.nat64_enabled,
        neighbors: args.neighbors_enabled,
    });
    Ok(())
}

fn resolve_targets(args: &Args, config: &Config) -> Vec<String> {
    let from_args: Vec<String> = args
        .ssh_targets
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if from_args.is_empty() {
        config.hosts()
    } else {
        from_args
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger(args.debug);
    version::log_startup();

    let mut config = match &args.config_file {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    apply_args(&mut config, &args)?;

    let targets = resolve_targets(&args, &config);
    if targets.is_empty() {
        bail!("no targets configured: pass --ssh-targets or list devices in the config file");
    }

    let exporter = Exporter::new(&config, &targets, Arc::new(SshConnector)).context("invalid target")?;
    tracing::info!("Scraping {} targets", targets.len());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("Shutdown signal received, initiating graceful shutdown...");
        let _ = shutdown_tx.send(true);
    });

    let listener = http::Server::bind(&args.listen_address).await?;
    Arc::new(http::Server::new(Arc::new(exporter), &args.telemetry_path))
        .serve(listener, shutdown_rx)
        .await?;

    tracing::info!("Exporter stopped");
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Unix) or Ctrl+C (other platforms)
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
        let mut sigint =
            signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to register Ctrl+C handler");
        tracing::info!("Received Ctrl+C");
    }
}
