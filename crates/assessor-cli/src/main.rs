//! assessor CLI — evaluate questionnaire assessments from fixture files.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "assessor",
    version,
    about = "Questionnaire assessment evaluation engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score and interpret the assessments in a fixture
    Evaluate {
        /// Path to a fixture .toml file or directory
        #[arg(long)]
        fixture: PathBuf,

        /// Assessment ids to evaluate (comma-separated, default: all)
        #[arg(long)]
        ids: Option<String>,

        /// Max assessments evaluated at once (overrides config)
        #[arg(long)]
        parallelism: Option<usize>,

        /// Move failed assessments back to submitted before evaluating
        #[arg(long)]
        retry_failed: bool,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate fixture files and answer sheets
    Validate {
        /// Path to a fixture .toml file or directory
        #[arg(long)]
        fixture: PathBuf,
    },

    /// List registered scoring and interpretation strategies
    Strategies,

    /// Create starter config and example fixture
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("assessor=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Evaluate {
            fixture,
            ids,
            parallelism,
            retry_failed,
            format,
            config,
        } => {
            commands::evaluate::execute(fixture, ids, parallelism, retry_failed, format, config)
                .await
        }
        Commands::Validate { fixture } => commands::validate::execute(fixture),
        Commands::Strategies => commands::strategies::execute(),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
