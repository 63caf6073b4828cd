//! # convo-topics CLI (`ctopics`)
//!
//! ## Usage
//!
//! ```bash
//! ctopics --config ./config/topics.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ctopics run` | Aggregate messages, discover topics, write the labeled dataset and model |
//! | `ctopics aggregate` | Aggregate only; write one row per document without topics |
//! | `ctopics inspect <model>` | Print the topic catalog of a saved model |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `convo_topics=info,convo_topics_core=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use convo_topics::config;
use convo_topics::progress::ProgressMode;
use convo_topics::report;
use convo_topics::run::{self, Overrides};

/// Topic modeling for chat transcripts.
///
/// All commands except `inspect` read a TOML configuration file given by
/// `--config`. See `config/topics.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ctopics",
    about = "Group chat messages into documents and discover their topics",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/topics.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline.
    ///
    /// Reads the input table, aggregates messages per
    /// (sessionid, group, period), discovers topics, and writes the labeled
    /// dataset (and the model artifact when configured). Prints a run
    /// summary and the topic catalog to stdout.
    Run {
        /// Input table; overrides `input.path`.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Labeled dataset path; overrides `output.dataset`.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Model artifact path; overrides `output.model`.
        #[arg(long)]
        model: Option<PathBuf>,

        /// Progress on stderr. Defaults to `human` on a TTY, otherwise `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Aggregate messages into documents without topic discovery.
    Aggregate {
        /// Input table; overrides `input.path`.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Documents CSV path; overrides `output.dataset`.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the topic catalog of a saved model.
    Inspect {
        /// Model artifact written by `ctopics run`.
        model: PathBuf,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("convo_topics=info,convo_topics_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            output,
            model,
            progress,
        } => {
            let mut cfg = config::load_config(&cli.config)?;
            Overrides {
                input,
                output,
                model,
            }
            .apply(&mut cfg);

            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let result = run::run_topics(&cfg, mode.reporter().as_ref()).await?;

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            report::write_summary(&mut out, &result.summary)?;
            report::write_table(&mut out, &result.model)?;
        }
        Commands::Aggregate { input, output } => {
            let mut cfg = config::load_config(&cli.config)?;
            Overrides {
                input,
                output,
                model: None,
            }
            .apply(&mut cfg);

            let mode = ProgressMode::default_for_tty();
            let aggregation = run::run_aggregate(&cfg, mode.reporter().as_ref())?;
            println!(
                "aggregate: {} documents from {} groups ({} blank dropped) -> {}",
                aggregation.documents.len(),
                aggregation.groups,
                aggregation.dropped_blank,
                cfg.output.dataset.display()
            );
        }
        Commands::Inspect { model, json } => {
            run::run_inspect(&model, json)?;
        }
    }

    Ok(())
}
