//! Graphis Core - Handwriting writer-identification library.
//!
//! Graphis turns handwriting scans into fixed-size embeddings with a twin
//! network, compares them by cosine similarity, and manages training as a
//! single-slot background job over a versioned model registry.
//!
//! # Architecture
//!
//! ```text
//! Scan → Normalize (grayscale 128x128) → Embed (twin network) → Rank by cosine
//!                 ↑                            ↑
//!         augmentation (training)     versioned registry (train → save)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use graphis_core::{Config, Graphis};
//!
//! #[tokio::main]
//! async fn main() -> graphis_core::Result<()> {
//!     let config = Config::load()?;
//!     let graphis = Graphis::new(config)?;
//!
//!     let query = graphis.embed_file("./scan.png".as_ref())?;
//!     let ranked = graphis.rank(&query, &candidates)?;
//!     println!("Best match: {}", ranked[0].writer_id);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod corpus;
pub mod error;
pub mod evaluate;
pub mod jobs;
pub mod model;
pub mod preprocess;
pub mod sampler;
pub mod similarity;
pub mod trainer;
pub mod types;

// Re-exports for convenient access
pub use config::Config;
pub use corpus::load_corpus;
pub use error::{
    ConfigError, GraphisError, JobError, ModelError, PreprocessError, Result, SimilarityError,
    TrainingError,
};
pub use evaluate::Evaluation;
pub use jobs::{JobController, JobResult, JobState, TrainingJob};
pub use model::{Architecture, ModelArtifact, ModelRegistry, TwinNetwork, EMBEDDING_DIM};
pub use preprocess::Normalizer;
pub use sampler::sample_pairs;
pub use similarity::{rank, similarity};
pub use trainer::{Trainer, TrainingParams};
pub use types::{Embedding, LabeledSample, MatchResult, TrainingHistory, TrainingPair};

use std::path::Path;
use std::sync::Arc;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Graphis engine - the main entry point for identification and training.
///
/// Owns the model registry and the single training slot. Inference methods
/// read the current committed model; a running training job never affects
/// them until its artifact commits.
pub struct Graphis {
    config: Config,
    registry: Arc<ModelRegistry>,
    jobs: JobController,
}

impl Graphis {
    /// Create a new Graphis instance with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        tracing::debug!("Initializing Graphis v{}", VERSION);
        let registry = Arc::new(ModelRegistry::open(config.model_dir())?);
        Ok(Self {
            config,
            registry,
            jobs: JobController::new(),
        })
    }

    /// Create a new Graphis instance with default configuration.
    pub fn with_defaults() -> Result<Self> {
        let config = Config::load()?;
        Self::new(config)
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a reference to the model registry.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The deterministic normalizer used for inference (no augmentation).
    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.config.model.input_size, self.config.preprocess.clone())
    }

    /// Embed raw image bytes with the current model.
    pub fn embed_bytes(&self, bytes: &[u8]) -> Result<Embedding> {
        let tensor = self.normalizer().normalize(bytes)?;
        let model = self.registry.current_model()?;
        Ok(model.embed(&tensor)?)
    }

    /// Embed an image file with the current model.
    pub fn embed_file(&self, path: &Path) -> Result<Embedding> {
        let bytes = std::fs::read(path)?;
        self.embed_bytes(&bytes)
    }

    /// Rank candidate embeddings against a query, best match first.
    pub fn rank(
        &self,
        query: &Embedding,
        candidates: &[(String, Embedding)],
    ) -> Result<Vec<MatchResult>> {
        Ok(similarity::rank(query, candidates)?)
    }

    /// Submit a background training job over the given corpus.
    ///
    /// Returns immediately; fails with `JobError::Busy` if a job is already
    /// running. Progress is observable through [`Graphis::training_status`].
    pub fn submit_training(
        &self,
        corpus: Vec<LabeledSample>,
        params: TrainingParams,
    ) -> Result<()> {
        let trainer = Trainer::new(self.config.clone(), Arc::clone(&self.registry));
        self.jobs.submit(move || {
            let (history, artifact) = trainer.train(&corpus, &params)?;
            tracing::info!(
                version = artifact.version,
                epochs = history.epochs_run,
                "Training run finished"
            );
            Ok(JobResult {
                version: artifact.version,
                timestamp: artifact.timestamp,
            })
        })?;
        Ok(())
    }

    /// Snapshot of the training slot.
    pub fn training_status(&self) -> TrainingJob {
        self.jobs.status()
    }
}
