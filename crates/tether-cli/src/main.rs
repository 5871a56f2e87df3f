//! Tether CLI - Command-line client for resilient WebSocket feeds
//!
//! Connect to a feed, subscribe to topics and schedule sends from the
//! terminal, or take apart a captured payload file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tether_client::ClientConfig;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod files;
mod session;

/// Tether - resilient multiplexing WebSocket client
#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Client configuration file (TOML)
    #[arg(short, long, global = true, env = "TETHER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a feed and print everything it sends
    Connect {
        /// WebSocket URL (ws:// or wss://)
        url: String,

        /// Topic to subscribe to (repeatable)
        #[arg(short, long = "topic")]
        topics: Vec<String>,

        /// Scheduled send as "<interval ms>:<message>" (repeatable)
        #[arg(short, long)]
        every: Vec<String>,

        /// Message to send once connected (repeatable)
        #[arg(short, long)]
        send: Vec<String>,

        /// Decoder for binary frames (auto, typed, utf8, json, hex, binary)
        #[arg(short, long)]
        decoder: Option<String>,

        /// Treat binary frames as compressed
        #[arg(long)]
        compressed: bool,

        /// Reconnect attempts before giving up
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Delay between reconnect attempts in milliseconds
        #[arg(long)]
        reconnect_delay: Option<u64>,

        /// Heartbeat interval in milliseconds, 0 disables
        #[arg(long)]
        heartbeat: Option<u64>,
    },

    /// Explain the contents of a payload file
    Inspect {
        /// File with the raw payload bytes
        file: PathBuf,
    },

    /// Decode a payload file the way the client would
    Decode {
        /// File with the raw payload bytes
        file: PathBuf,

        /// Decoder name (auto, typed, utf8, json, hex, binary)
        #[arg(short, long, default_value = "auto")]
        decoder: String,

        /// Inflate before decoding
        #[arg(long)]
        compressed: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.log_level, cli.json_logs)?;

    // Handle Ctrl+C
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                let _ = shutdown_tx.send(()).await;
            }
            Err(e) => warn!("Failed to listen for ctrl+c: {}", e),
        }
    });

    match cli.command {
        Commands::Connect {
            url,
            topics,
            every,
            send,
            decoder,
            compressed,
            max_attempts,
            reconnect_delay,
            heartbeat,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            config.url = url;
            if let Some(decoder) = decoder {
                config.decoder = decoder.into();
            }
            if compressed {
                config.binary_mode = tether_client::BinaryMode::Compressed;
            }
            if let Some(attempts) = max_attempts {
                config.max_reconnect_attempts = attempts;
            }
            if let Some(delay) = reconnect_delay {
                config.reconnect_delay_ms = delay;
            }
            if let Some(interval) = heartbeat {
                config.heartbeat_interval_ms = Some(interval);
            }

            let options = session::Options {
                topics,
                every,
                send,
            };
            session::run(config, options, &mut shutdown_rx).await?;
        }

        Commands::Inspect { file } => {
            files::inspect_file(&file)?;
        }

        Commands::Decode {
            file,
            decoder,
            compressed,
        } => {
            files::decode_file(&file, &decoder, compressed)?;
        }
    }

    Ok(())
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}

/// Client settings from the config file, or defaults when there is none
fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let Some(path) = path else {
        return Ok(ClientConfig::default());
    };

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: ClientConfig = toml::from_str(&text)
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    debug!("Loaded config from {}", path.display());

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_connect() {
        let cli = Cli::parse_from([
            "tether",
            "connect",
            "ws://localhost:9000",
            "-t",
            "quotes",
            "-t",
            "news",
            "--every",
            "5000:ping",
            "--heartbeat",
            "0",
        ]);

        match cli.command {
            Commands::Connect {
                url,
                topics,
                every,
                heartbeat,
                ..
            } => {
                assert_eq!(url, "ws://localhost:9000");
                assert_eq!(topics, vec!["quotes", "news"]);
                assert_eq!(every, vec!["5000:ping"]);
                assert_eq!(heartbeat, Some(0));
            }
            _ => panic!("expected connect"),
        }
    }

    #[test]
    fn test_load_config_defaults_without_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config(Some(Path::new("/nonexistent/tether.toml")));
        assert!(result.is_err());
    }
}
