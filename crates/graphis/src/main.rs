//! Graphis CLI - Handwriting writer identification from the command line.
//!
//! Graphis embeds handwriting scans with a twin network and ranks candidate
//! writers by cosine similarity. Models are trained from a labeled corpus
//! directory and stored in a versioned registry.
//!
//! # Usage
//!
//! ```bash
//! # Train a model from a corpus (one subdirectory per writer)
//! graphis train ./corpus/
//!
//! # Identify the writer of a scan
//! graphis match query.png ./corpus/
//!
//! # Embed a single scan
//! graphis embed scan.png
//!
//! # Inspect trained model versions
//! graphis models list
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Graphis - Handwriting writer identification via twin-network embeddings.
#[derive(Parser, Debug)]
#[command(name = "graphis")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a new model version from a labeled corpus directory
    Train(cli::train::TrainArgs),

    /// Evaluate the current model on a labeled corpus
    Evaluate(cli::evaluate::EvaluateArgs),

    /// Embed a handwriting scan with the current model
    Embed(cli::embed::EmbedArgs),

    /// Rank candidate writers for a query scan
    Match(cli::matching::MatchArgs),

    /// Inspect trained model versions
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging from config, with CLI verbose override.
    // Note: logging isn't initialized yet, so use eprintln for config warnings.
    let config = match graphis_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `graphis config path`."
            );
            graphis_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Graphis v{}", graphis_core::VERSION);

    // Dispatch to the appropriate command handler
    match cli.command {
        Commands::Train(args) => cli::train::execute(args).await,
        Commands::Evaluate(args) => cli::evaluate::execute(args).await,
        Commands::Embed(args) => cli::embed::execute(args).await,
        Commands::Match(args) => cli::matching::execute(args).await,
        Commands::Models(args) => cli::models::execute(args).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
