//! The `graphis match` command for ranking candidate writers.

use clap::Args;
use graphis_core::{load_corpus, Config, Graphis, MatchResult};
use serde::Serialize;
use std::path::PathBuf;

/// Arguments for the `match` command.
#[derive(Args, Debug)]
pub struct MatchArgs {
    /// Query scan to identify
    #[arg(required = true)]
    pub query: PathBuf,

    /// Candidate corpus directory: one subdirectory per writer
    #[arg(required = true)]
    pub corpus: PathBuf,

    /// Show only the top N matches
    #[arg(short, long, default_value = "5")]
    pub top: usize,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Serialize)]
struct MatchReport<'a> {
    query: &'a str,
    model_version: u32,
    matches: Vec<MatchResult>,
}

/// Execute the match command.
///
/// Every corpus sample is a separate candidate; the report keeps the best
/// score per writer, so a writer with many samples isn't over-represented.
pub async fn execute(args: MatchArgs) -> anyhow::Result<()> {
    let config = Config::load()?;
    let graphis = Graphis::new(config)?;

    let corpus = load_corpus(&args.corpus)?;
    if corpus.is_empty() {
        anyhow::bail!("No candidate samples found under {}", args.corpus.display());
    }

    let query = graphis.embed_file(&args.query)?;

    let mut candidates = Vec::with_capacity(corpus.len());
    for sample in &corpus {
        match graphis.embed_file(&sample.image_path) {
            Ok(embedding) => candidates.push((sample.writer_id.clone(), embedding)),
            Err(e) => tracing::warn!(
                path = %sample.image_path.display(),
                error = %e,
                "Skipping candidate sample"
            ),
        }
    }
    if candidates.is_empty() {
        anyhow::bail!("No candidate sample could be embedded");
    }

    let ranked = graphis.rank(&query, &candidates)?;

    // Ranked output is already best-first; keep each writer's first entry.
    let mut seen = std::collections::HashSet::new();
    let matches: Vec<MatchResult> = ranked
        .into_iter()
        .filter(|m| seen.insert(m.writer_id.clone()))
        .take(args.top)
        .collect();

    let report = MatchReport {
        query: &args.query.to_string_lossy(),
        model_version: graphis.registry().current()?.version,
        matches,
    };
    let json = serde_json::to_string_pretty(&report)?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, json)?;
            tracing::info!("Match report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
