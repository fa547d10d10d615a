//! Tether CLI
//!
//! Command-line interface for managing remote worker sessions.

#![warn(clippy::all)]
#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use tether_client::SessionManager;
use tether_core::SessionConfig;

/// Tether - remote worker session administration
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Manage remote worker sessions over SSH", long_about = None)]
struct Args {
    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long, env = "TETHER_CONFIG")]
    config: Option<PathBuf>,

    /// Session name from the config file
    #[arg(short, long)]
    session: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
enum Command {
    /// Connect and bring the worker server up
    Connect,
    /// Show connection state and worker server status
    Status,
    /// Run a command on the remote host
    Run {
        /// The command line to run
        command: String,
    },
    /// List live kernels on the worker server
    Kernels,
    /// Stop the worker server and close the session
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => SessionConfig::default_path().context("no user config directory")?,
    };
    let config = SessionConfig::load(&config_path)?;
    let options = config.get(&args.session)?.clone();
    let manager = SessionManager::new(&args.session, options);

    match args.command {
        Command::Connect => {
            manager.ensure_connected_and_serving().await?;
            println!("{}: {}", manager.name(), manager.state());
            println!("server at {}", manager.server_url().await?);
        }
        Command::Status => {
            manager.ensure_connected_and_serving().await?;
            let status = manager.api().await?.status().await?;
            println!("{}: {}", manager.name(), manager.state());
            println!(
                "server {} up {}s, {} kernel(s)",
                status.version, status.uptime_secs, status.kernel_count
            );
        }
        Command::Run { command } => {
            manager.connect().await?;
            let output = manager.run_command(&command).await?;
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            if !output.success() {
                bail!("remote command exited with {:?}", output.exit_status);
            }
        }
        Command::Kernels => {
            manager.ensure_connected_and_serving().await?;
            let kernels = manager.api().await?.list_kernels().await?;
            if kernels.is_empty() {
                println!("no live kernels");
            }
            for kernel in kernels {
                println!("{}\t{}", kernel.id, kernel.state);
            }
        }
        Command::Shutdown => {
            // Bring the session fully up first: adopting the running server
            // is what populates the forward and token the polite API
            // shutdown needs.
            manager.ensure_connected_and_serving().await?;
            manager.close().await?;
            println!("{}: {}", manager.name(), manager.state());
        }
    }

    Ok(())
}
