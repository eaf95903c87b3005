//! The `graphis models` command for inspecting trained model versions.

use clap::{Args, Subcommand};
use graphis_core::{Config, ModelRegistry};

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Subcommands for model management.
#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// List trained model versions
    List,

    /// Show the current model version's metadata
    Current,

    /// Show model directory path
    Path,
}

/// Execute the models command.
pub async fn execute(args: ModelsArgs) -> anyhow::Result<()> {
    let config = Config::load()?;

    match args.command {
        ModelsCommand::List => {
            let registry = ModelRegistry::open(config.model_dir())?;
            let versions = registry.list();

            if versions.is_empty() {
                println!("No models trained yet.");
                println!("Run `graphis train <corpus>` to train one.");
                return Ok(());
            }

            let current = registry.current().map(|a| a.version).unwrap_or(0);
            println!("Trained models:");
            println!("  Directory: {}\n", registry.model_dir().display());
            for info in versions {
                let marker = if info.version == current {
                    "  (current)"
                } else {
                    ""
                };
                println!("  v{:<4} {}{}", info.version, info.timestamp, marker);
            }
        }

        ModelsCommand::Current => {
            let registry = ModelRegistry::open(config.model_dir())?;
            let artifact = registry.current()?;
            println!("{}", serde_json::to_string_pretty(&artifact)?);
        }

        ModelsCommand::Path => {
            println!("{}", config.model_dir().display());
        }
    }

    Ok(())
}
