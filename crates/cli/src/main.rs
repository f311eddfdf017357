//! Traffic steering CLI
//!
//! A command-line tool for inspecting the dependency graph, the replica
//! catalog and the traffic-split plans computed by the steering controller.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{history, plan, profile, status, topology};

/// Traffic steering CLI
#[derive(Parser)]
#[command(name = "steerctl")]
#[command(author, version, about = "CLI for the mesh traffic steering controller", long_about = None)]
pub struct Cli {
    /// Controller URL (can also be set via STEER_API_URL env var or the profile)
    #[arg(long, env = "STEER_API_URL")]
    pub api_url: Option<String>,

    /// Namespace to inspect (defaults to the profile, then the controller's default)
    #[arg(long, short, global = true)]
    pub namespace: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the component dependency graph
    Graph {
        /// Observation window in seconds
        #[arg(long, short)]
        window: Option<u64>,
    },

    /// Show replicas with their load and capacity signals
    Replicas {
        /// Restrict to a single component
        #[arg(long, short)]
        component: Option<String>,

        /// Observation window in seconds
        #[arg(long, short)]
        window: Option<u64>,

        /// Field naming for JSON output (replica, pod)
        #[arg(long)]
        naming: Option<String>,
    },

    /// Compute a traffic-split plan
    Plan {
        /// Allocation strategy (even, capacity-aware)
        #[arg(long, short)]
        strategy: Option<String>,

        /// Observation window in seconds
        #[arg(long, short)]
        window: Option<u64>,

        /// Only show routes leaving this component
        #[arg(long)]
        source: Option<String>,
    },

    /// Show recorded telemetry history for a replica
    History {
        /// Replica name
        replica: String,

        /// Number of most recent snapshots
        #[arg(long, short)]
        last: Option<usize>,
    },

    /// Show controller and backend health
    Status,

    /// Manage the local CLI profile
    #[command(subcommand)]
    Profile(ProfileCommands),
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Show the stored profile
    Show,

    /// Store defaults for later invocations
    Set {
        /// Controller URL to store
        #[arg(long)]
        api_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Profile commands work without a reachable controller
    if let Commands::Profile(profile_cmd) = cli.command {
        return match profile_cmd {
            ProfileCommands::Show => profile::show_profile(cli.format),
            ProfileCommands::Set { api_url } => profile::set_profile(api_url, cli.namespace),
        };
    }

    let profile = config::Config::load()?;
    let client = client::ApiClient::new(&profile.resolve_api_url(cli.api_url.as_deref()))?;
    let namespace = profile.resolve_namespace(cli.namespace);

    match cli.command {
        Commands::Graph { window } => {
            topology::show_graph(&client, namespace, window, cli.format).await?;
        }
        Commands::Replicas {
            component,
            window,
            naming,
        } => {
            topology::show_replicas(&client, namespace, component, window, naming, cli.format)
                .await?;
        }
        Commands::Plan {
            strategy,
            window,
            source,
        } => {
            plan::show_plan(&client, namespace, strategy, window, source, cli.format).await?;
        }
        Commands::History { replica, last } => {
            history::show_history(&client, &replica, last, cli.format).await?;
        }
        Commands::Status => {
            status::show_status(&client, cli.format).await?;
        }
        // Handled before connecting
        Commands::Profile(_) => {}
    }

    Ok(())
}
