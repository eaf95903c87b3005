//! Error types for the Graphis identification pipeline.
//!
//! Errors are organized by stage so callers can tell apart caller-fixable
//! input problems (a corrupt scan), configuration mistakes (a tensor fed to
//! the wrong model), and operational states (training already running).

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Graphis operations.
#[derive(Error, Debug)]
pub enum GraphisError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Image preprocessing errors
    #[error("Preprocess error: {0}")]
    Preprocess(#[from] PreprocessError),

    /// Model and registry errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Training-run errors
    #[error("Training error: {0}")]
    Training(#[from] TrainingError),

    /// Similarity/ranking errors
    #[error("Similarity error: {0}")]
    Similarity(#[from] SimilarityError),

    /// Background job errors
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Image preprocessing errors.
#[derive(Error, Debug)]
pub enum PreprocessError {
    /// The input bytes are not a decodable image. Caller-fixable;
    /// retrying with the same bytes will fail again.
    #[error("Invalid image: {message}")]
    InvalidImage { message: String },
}

/// Model construction, inference, and registry errors.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A tensor with the wrong shape was fed to the model. This is a
    /// programming or configuration error; tensors are never reshaped
    /// silently.
    #[error("Shape mismatch: model expects {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
    },

    /// Registry lookup miss.
    #[error("Model not found: {requested}")]
    NotFound { requested: String },

    /// Failed to read or write an artifact file.
    #[error("Artifact IO error at {path}: {source}")]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize or deserialize weights/metadata.
    #[error("Artifact encoding error at {path}: {source}")]
    ArtifactEncoding {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Training-run errors.
#[derive(Error, Debug)]
pub enum TrainingError {
    /// Not enough labeled data to build a training set. Raised before any
    /// optimization work begins.
    #[error("Insufficient training data: {0}")]
    InsufficientData(String),

    /// A model error surfaced during training (persistence, shape).
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Similarity computation errors.
#[derive(Error, Debug)]
pub enum SimilarityError {
    /// One of the vectors has zero norm; cosine similarity is undefined.
    #[error("Degenerate embedding: zero-norm vector has no cosine similarity")]
    DegenerateEmbedding,

    /// The vectors come from models with different embedding dimensions.
    #[error("Embedding dimension mismatch: {a} vs {b}")]
    DimensionMismatch { a: usize, b: usize },
}

/// Training-job controller errors.
#[derive(Error, Debug)]
pub enum JobError {
    /// A training job is already running. Submissions are rejected, not
    /// queued.
    #[error("Training job already running")]
    Busy,
}

/// Convenience type alias for Graphis results.
pub type Result<T> = std::result::Result<T, GraphisError>;
