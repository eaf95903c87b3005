//! Core data types shared across the identification pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A handwriting sample attributed to a known writer.
///
/// Samples are supplied by the caller (typically loaded from a
/// `dataset/<writer_id>/<image>` tree); the image itself is read lazily
/// when a training run or match needs it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabeledSample {
    /// Identifier of the writer this sample is attributed to
    pub writer_id: String,

    /// Path to the scanned image on disk
    pub image_path: PathBuf,
}

impl LabeledSample {
    pub fn new(writer_id: impl Into<String>, image_path: impl Into<PathBuf>) -> Self {
        Self {
            writer_id: writer_id.into(),
            image_path: image_path.into(),
        }
    }
}

/// A labeled image pair for twin-network training.
///
/// Generated by the pair sampler, consumed once per training run, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingPair {
    /// First image of the pair
    pub a: PathBuf,
    /// Second image of the pair
    pub b: PathBuf,
    /// True when both images are attributed to the same writer
    pub same_writer: bool,
}

impl TrainingPair {
    /// Binary classification target: 1.0 for same writer, 0.0 otherwise.
    pub fn target(&self) -> f32 {
        if self.same_writer {
            1.0
        } else {
            0.0
        }
    }
}

/// A fixed-length feature vector produced by the embedding model.
///
/// Immutable once produced. Two embeddings are comparable only if they
/// were produced by the same model version; comparing across versions is
/// undefined.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Embedding dimension.
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// One ranked match: a candidate writer and its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    /// Identifier of the candidate writer
    pub writer_id: String,

    /// Cosine similarity to the query embedding
    pub score: f32,
}

/// Per-epoch metrics recorded over a training run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Training loss per epoch
    pub loss: Vec<f32>,

    /// Training accuracy per epoch
    pub accuracy: Vec<f32>,

    /// Validation loss per epoch (empty when no validation split)
    pub val_loss: Vec<f32>,

    /// Validation accuracy per epoch (empty when no validation split)
    pub val_accuracy: Vec<f32>,

    /// Learning rate the run settled on (after tuning, before plateau decay)
    pub learning_rate: f32,

    /// Number of epochs actually executed (early stopping may cut the run short)
    pub epochs_run: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_target() {
        let pos = TrainingPair {
            a: PathBuf::from("a.png"),
            b: PathBuf::from("b.png"),
            same_writer: true,
        };
        let neg = TrainingPair {
            same_writer: false,
            ..pos.clone()
        };
        assert_eq!(pos.target(), 1.0);
        assert_eq!(neg.target(), 0.0);
    }

    #[test]
    fn test_embedding_dim() {
        let e = Embedding::new(vec![0.0; 128]);
        assert_eq!(e.dim(), 128);
    }

    #[test]
    fn test_match_result_serde() {
        let m = MatchResult {
            writer_id: "w-17".to_string(),
            score: 0.83,
        };
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"writer_id\":\"w-17\""));
        let parsed: MatchResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.writer_id, "w-17");
    }
}
