//! SubTerm CLI - backend server for the SubTerm browser IDE.
//!
//! # Usage
//!
//! ```bash
//! # Run the server with defaults (127.0.0.1:3334, ~/.subterm/workspace)
//! subterm serve
//!
//! # Run against a specific workspace
//! subterm serve --workspace-root ./playground --port 4000
//!
//! # Write and inspect configuration
//! subterm config init
//! subterm config show
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use subterm_core::Config;

#[derive(Parser)]
#[command(name = "subterm")]
#[command(about = "SubTerm - workspace file store and terminal bridge", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/WebSocket server
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config)
        #[arg(long)]
        port: Option<u16>,

        /// Workspace root directory (overrides config)
        #[arg(long)]
        workspace_root: Option<PathBuf>,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration as TOML
    Show {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Serve {
            host,
            port,
            workspace_root,
            config,
        } => {
            let mut config = Config::load(config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(root) = workspace_root {
                config.workspace.root = root;
            }
            subterm_server::api::server::start_server(config).await?;
        }

        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Init { force } => {
                let path = Config::default_path();
                if path.exists() && !force {
                    anyhow::bail!(
                        "{} already exists (use --force to overwrite)",
                        path.display()
                    );
                }
                Config::default().save(&path)?;
                println!("Wrote default configuration to {}", path.display());
            }
            ConfigCommands::Show { config } => {
                let config = Config::load(config.as_deref())?;
                print!("{}", config.to_toml()?);
            }
        },
    }

    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("subterm_server=debug,subterm_workspace=debug,subterm_term=debug,subterm_core=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("subterm_server=info,subterm_workspace=info,subterm_term=info,warn")
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
