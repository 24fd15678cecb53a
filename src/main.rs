//! Trellis CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{LinkKind, QueryArgs};

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Type dependency graphs and the subgraphs worth looking at", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to trellis.toml next to the workspace model)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the graph for a workspace model and print its statistics
    Index {
        /// Workspace model file
        model: PathBuf,
    },
    /// Print the hierarchy around one type
    Query {
        /// Workspace model file
        model: PathBuf,

        /// Type key to start from
        #[arg(value_name = "TYPE")]
        type_name: String,

        /// Follow links all the way instead of one hop
        #[arg(short, long)]
        transitive: bool,

        /// Walk towards dependents instead of dependencies
        #[arg(short, long)]
        dependents: bool,

        /// Only follow links of this kind
        #[arg(short, long, value_enum)]
        kind: Option<LinkKind>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep the graph current while the workspace model changes
    Watch {
        /// Workspace model file
        model: PathBuf,

        /// Types to pin at start-up
        #[arg(short, long)]
        pin: Vec<String>,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "trellis={log_level},trellis_core={log_level},trellis_orchestrator={log_level}"
        )))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Trellis v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Index { model } => {
            let config = commands::load_config(cli.config.as_deref(), &model)?;
            commands::index(&model, &config)
        }
        Commands::Query {
            model,
            type_name,
            transitive,
            dependents,
            kind,
            json,
        } => {
            let config = commands::load_config(cli.config.as_deref(), &model)?;
            let args = QueryArgs {
                type_name,
                transitive,
                dependents,
                kind,
                json,
            };
            commands::query(&model, &config, &args)
        }
        Commands::Watch { model, pin } => {
            let config = commands::load_config(cli.config.as_deref(), &model)?;
            commands::watch(model, config, pin).await
        }
        Commands::Version => {
            println!("Trellis v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
