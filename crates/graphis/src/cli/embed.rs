//! The `graphis embed` command for embedding a single scan.

use clap::Args;
use graphis_core::{Config, Graphis};
use serde::Serialize;
use std::path::PathBuf;

/// Arguments for the `embed` command.
#[derive(Args, Debug)]
pub struct EmbedArgs {
    /// Image file to embed
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Serialize)]
struct EmbedRecord<'a> {
    path: &'a str,
    model_version: u32,
    dim: usize,
    values: &'a [f32],
}

/// Execute the embed command.
pub async fn execute(args: EmbedArgs) -> anyhow::Result<()> {
    let config = Config::load()?;
    let graphis = Graphis::new(config)?;

    let embedding = graphis.embed_file(&args.input)?;
    let version = graphis.registry().current()?.version;

    let record = EmbedRecord {
        path: &args.input.to_string_lossy(),
        model_version: version,
        dim: embedding.dim(),
        values: embedding.as_slice(),
    };
    let json = serde_json::to_string_pretty(&record)?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, json)?;
            tracing::info!("Embedding written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
