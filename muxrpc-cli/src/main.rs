//! muxrpc-cli - Command-line interface for muxrpc
//!
//! Provides a REPL, one-shot calls, and a watch mode for unsolicited messages.

mod commands;
mod config;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::CliConfig;
use muxrpc_client::Client;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "muxrpc-cli")]
#[command(about = "Command-line interface for muxrpc nodes")]
#[command(version)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server address (overrides config)
    #[arg(short, long)]
    server: Option<SocketAddr>,

    /// Per-call timeout in milliseconds (overrides config)
    #[arg(long)]
    timeout_ms: Option<u64>,

    // ===== TLS Options =====
    /// Enable TLS connection
    #[arg(long)]
    tls: bool,

    /// Path to CA certificate for server verification
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// Path to client certificate (for mTLS)
    #[arg(long, env = "MUXRPC_CLIENT_CERT")]
    client_cert: Option<PathBuf>,

    /// Path to client private key (for mTLS)
    #[arg(long, env = "MUXRPC_CLIENT_KEY")]
    client_key: Option<PathBuf>,

    /// Skip server certificate verification (INSECURE)
    #[arg(long, short = 'k')]
    insecure: bool,

    /// Server name for TLS SNI (defaults to the server IP)
    #[arg(long)]
    server_name: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start interactive REPL
    Repl,

    /// Call a remote method once and print the result
    Call {
        /// Method name, e.g. LitRPC.Balance
        method: String,

        /// Arguments JSON (or @file.json to read from file)
        args: Option<String>,
    },

    /// Print unsolicited messages from the node until Ctrl+C
    Watch {
        /// Only show messages whose first byte matches this hex kind (e.g. c3)
        #[arg(long)]
        kind: Option<String>,
    },

    /// Print the effective configuration as YAML
    ShowConfig,
}

impl Cli {
    /// Applies command-line flags on top of the loaded configuration.
    fn apply_to(&self, config: &mut CliConfig) {
        if let Some(server) = self.server {
            config.server = server;
        }
        if let Some(ms) = self.timeout_ms {
            config.call_timeout_ms = ms;
        }
        if self.tls || self.ca_cert.is_some() || self.client_cert.is_some() || self.insecure {
            config.tls.enabled = true;
        }
        if let Some(ref path) = self.ca_cert {
            config.tls.ca_cert = Some(path.clone());
        }
        if let Some(ref path) = self.client_cert {
            config.tls.client_cert = Some(path.clone());
        }
        if let Some(ref path) = self.client_key {
            config.tls.client_key = Some(path.clone());
        }
        if self.insecure {
            config.tls.insecure = true;
        }
        if let Some(ref name) = self.server_name {
            config.tls.server_name = Some(name.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = CliConfig::load(cli.config.as_deref()).map_err(|e| {
        eprintln!("{}: {}", "Config error".red(), e);
        e
    })?;
    cli.apply_to(&mut config);
    if let Err(e) = config.validate() {
        eprintln!("{}: {}", "Config error".red(), e);
        std::process::exit(1);
    }

    // Printing the configuration needs no connection
    if let Some(Commands::ShowConfig) = cli.command {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    tracing::debug!("Connecting to {}", config.server);
    let client = Client::connect(config.connection_config())
        .await
        .map_err(|e| {
            eprintln!("{}: {}", "Connection failed".red(), e);
            e
        })?;

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(client, config.server).await?;
        }
        Some(Commands::ShowConfig) => unreachable!(), // Already handled above
        Some(Commands::Watch { kind }) => {
            let filter = kind
                .as_deref()
                .map(commands::parse_kind)
                .transpose()
                .map_err(|e| {
                    eprintln!("{}: {}", "Error".red(), e);
                    e
                })?;
            let mut message_rx = client.subscribe_messages();
            let conn = client.connection();

            eprintln!("{} {}", "Watching".green(), config.server.to_string().cyan());
            eprintln!("{}", "Press Ctrl+C to stop...".dimmed());

            loop {
                tokio::select! {
                    message = message_rx.recv() => {
                        match message {
                            Ok(m) => {
                                if filter.map_or(true, |k| m.kind == k) {
                                    println!("{}", commands::format_message(&m));
                                }
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                                eprintln!("{}: lagged {} messages", "Warning".yellow(), n);
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                                eprintln!("{}", "Connection closed".red());
                                break;
                            }
                        }
                    }
                    _ = conn.closed() => {
                        eprintln!("{}", "Connection closed".red());
                        break;
                    }
                    _ = tokio::signal::ctrl_c() => {
                        eprintln!("\n{}", "Stopping watch...".dimmed());
                        break;
                    }
                }
            }

            client.close().await?;
        }
        Some(cmd) => {
            let result = commands::execute(&client, cmd).await;

            match result {
                Ok(output) => {
                    println!("{}", output);
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }

            client.close().await?;
        }
    }

    Ok(())
}
