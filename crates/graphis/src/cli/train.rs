//! The `graphis train` command for training a new model version.

use clap::Args;
use graphis_core::{load_corpus, Config, Graphis, JobState, TrainingParams};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Corpus directory: one subdirectory per writer
    #[arg(required = true)]
    pub corpus: PathBuf,

    /// Maximum number of epochs
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Minibatch size
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Adam learning rate
    #[arg(long)]
    pub learning_rate: Option<f32>,

    /// Negative pairs drawn per positive pair
    #[arg(long)]
    pub negative_ratio: Option<f64>,

    /// Grid-search the learning rate before the full run
    #[arg(long)]
    pub tune: bool,

    /// Seed for sampling, weight init, and augmentation
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Execute the train command.
pub async fn execute(args: TrainArgs) -> anyhow::Result<()> {
    let config = Config::load()?;
    let graphis = Graphis::new(config)?;

    let corpus = load_corpus(&args.corpus)?;
    if corpus.is_empty() {
        anyhow::bail!(
            "No samples found under {}. Expected one subdirectory per writer.",
            args.corpus.display()
        );
    }
    let writers: BTreeSet<&str> = corpus.iter().map(|s| s.writer_id.as_str()).collect();
    println!(
        "Loaded {} samples from {} writers",
        corpus.len(),
        writers.len()
    );

    let mut params = TrainingParams::from_config(&graphis.config().training);
    if let Some(epochs) = args.epochs {
        params.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        params.batch_size = batch_size;
    }
    if let Some(learning_rate) = args.learning_rate {
        params.learning_rate = learning_rate;
    }
    if let Some(negative_ratio) = args.negative_ratio {
        params.negative_ratio = negative_ratio;
    }
    if let Some(seed) = args.seed {
        params.seed = seed;
    }
    if args.tune {
        params.tune_hyperparams = true;
    }

    graphis.submit_training(corpus, params)?;

    let spinner = create_spinner();
    loop {
        let status = graphis.training_status();
        match status.state {
            JobState::Completed => {
                spinner.finish_and_clear();
                let result = status
                    .result
                    .ok_or_else(|| anyhow::anyhow!("completed job has no result"))?;
                println!(
                    "Training complete: version {} ({})",
                    result.version, result.timestamp
                );
                return Ok(());
            }
            JobState::Failed => {
                spinner.finish_and_clear();
                anyhow::bail!(
                    "Training failed: {}",
                    status.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            JobState::Idle | JobState::Running => {
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }
    }
}

/// Create a spinner for the training wait loop.
fn create_spinner() -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.set_message("training...");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
