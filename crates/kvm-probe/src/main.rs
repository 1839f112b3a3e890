//! kvm-probe: entry point.
//!
//! # Usage
//!
//! ```text
//! kvm-probe [OPTIONS] listen [--bind ADDR]
//! kvm-probe [OPTIONS] connect ADDR [--message TEXT] [--count N]
//! kvm-probe [OPTIONS] write-config
//!
//! Options:
//!   --config <PATH>      Config file [default: platform config dir/probe.toml]
//!   --secret <TEXT>      Shared secret (env KVM_PROBE_SECRET)
//!   --log-level <LEVEL>  Fallback log level when RUST_LOG is unset [default: info]
//! ```
//!
//! `connect` exits with a non-zero status if an echo does not match, does not
//! arrive in time, or the link drops.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use kvm_probe::infrastructure::config::{config_file_path, load_config, save_config, ProbeConfig};
use kvm_probe::infrastructure::network::{listen, run_pings, serve_echo};
use kvm_stream::{Cipher, Role};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// KVM-Over-IP stream probe.
///
/// Exchanges encrypted, framed messages with another probe to verify
/// connectivity, key agreement and round-trip latency.
#[derive(Debug, Parser)]
#[command(name = "kvm-probe", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Shared secret both probes derive the record key from.
    #[arg(long, global = true, env = "KVM_PROBE_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Accept one connection and echo every message back.
    Listen {
        /// Address to bind, overriding `[network]` in the config.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Connect to a listening probe and time echoes.
    Connect {
        /// Address of the listening probe (`host:port`).
        addr: SocketAddr,
        /// Payload of each request.
        #[arg(long, default_value = "PING")]
        message: String,
        /// Number of requests to send.
        #[arg(long, default_value_t = 3)]
        count: u32,
    },
    /// Write the effective configuration, with every default filled in, back
    /// to the config file.
    WriteConfig,
}

impl Cli {
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("no config path available"),
        }
    }

    fn load_config(&self) -> anyhow::Result<ProbeConfig> {
        let path = self.config_path()?;
        let config = load_config(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    fn cipher(&self, config: &ProbeConfig, role: Role) -> anyhow::Result<Cipher> {
        let secret = self
            .secret
            .as_deref()
            .or(config.security.secret.as_deref())
            .context("no shared secret: pass --secret, set KVM_PROBE_SECRET, or add [security] secret")?;
        Cipher::from_secret(secret, role).context("unusable shared secret")
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Chains, dispatchers and sessions are single-threaded, so the probe runs on
/// a current-thread runtime.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = cli.load_config()?;

    match &cli.command {
        Command::Listen { bind } => {
            let cipher = cli.cipher(&config, Role::Responder)?;
            let bind = bind
                .clone()
                .unwrap_or_else(|| config.network.listen_address());
            let listener = listen(&bind).await?;
            let echoed = serve_echo(listener, &config.stream, cipher).await?;
            info!(echoed, "session finished");
        }
        Command::Connect {
            addr,
            message,
            count,
        } => {
            let cipher = cli.cipher(&config, Role::Initiator)?;
            let report = run_pings(
                *addr,
                message.as_bytes(),
                *count,
                &config.stream,
                cipher,
                config.network.connect_timeout(),
                config.network.reply_timeout(),
            )
            .await?;
            if let Some(mean) = report.mean_rtt() {
                info!(replies = report.replies.len(), mean_rtt = ?mean, "round trips complete");
            }
            if report.mismatches() > 0 {
                bail!("{} of {} echoes did not match", report.mismatches(), count);
            }
        }
        Command::WriteConfig => {
            let path = cli.config_path()?;
            save_config(&path, &config)
                .with_context(|| format!("failed to write config to {}", path.display()))?;
            info!(path = %path.display(), "configuration written");
        }
    }

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
