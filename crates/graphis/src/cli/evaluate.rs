//! The `graphis evaluate` command for scoring the current model.

use clap::Args;
use graphis_core::evaluate::evaluate;
use graphis_core::{load_corpus, Config, Graphis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

/// Arguments for the `evaluate` command.
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Held-out labeled corpus directory
    #[arg(required = true)]
    pub corpus: PathBuf,

    /// Negative pairs drawn per positive pair
    #[arg(long, default_value = "1.0")]
    pub negative_ratio: f64,

    /// Seed for pair sampling
    #[arg(long, default_value = "42")]
    pub seed: u64,
}

/// Execute the evaluate command.
pub async fn execute(args: EvaluateArgs) -> anyhow::Result<()> {
    let config = Config::load()?;
    let graphis = Graphis::new(config)?;

    let corpus = load_corpus(&args.corpus)?;
    let network = graphis.registry().current_model()?;
    let normalizer = graphis.normalizer();

    let mut rng = StdRng::seed_from_u64(args.seed);
    let evaluation = evaluate(&network, &normalizer, &corpus, args.negative_ratio, &mut rng)?;

    println!("{}", serde_json::to_string_pretty(&evaluation)?);
    Ok(())
}
