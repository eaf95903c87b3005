//! Pair-classification evaluation of a trained network.
//!
//! Builds a labeled pair set from a held-out corpus (no augmentation),
//! scores each pair with the verification head, and reports classification
//! metrics at the 0.5 decision threshold plus a threshold-free AUC.

use rand::rngs::StdRng;
use serde::Serialize;

use crate::error::{Result, TrainingError};
use crate::model::TwinNetwork;
use crate::preprocess::Normalizer;
use crate::sampler::sample_pairs;
use crate::types::LabeledSample;

/// Classification metrics over a labeled pair set.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub pairs_evaluated: usize,
    pub accuracy: f32,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    /// Area under the ROC curve (Mann-Whitney rank statistic).
    pub auc: f32,
    /// Rows are actual (negative, positive); columns predicted.
    pub confusion_matrix: [[usize; 2]; 2],
}

/// Score same/different pairs drawn from `corpus` and summarize.
///
/// Pairs whose images cannot be read or decoded are skipped with a warning,
/// mirroring the trainer. Fails with `InsufficientData` when no pair
/// survives.
pub fn evaluate(
    network: &TwinNetwork,
    normalizer: &Normalizer,
    corpus: &[LabeledSample],
    negative_ratio: f64,
    rng: &mut StdRng,
) -> Result<Evaluation> {
    let pairs = sample_pairs(corpus, negative_ratio, rng)?;

    let mut scores = Vec::with_capacity(pairs.len());
    let mut labels = Vec::with_capacity(pairs.len());
    for pair in &pairs {
        match score_pair(network, normalizer, pair) {
            Ok(score) => {
                scores.push(score);
                labels.push(pair.same_writer);
            }
            Err(e) => tracing::warn!(
                a = %pair.a.display(),
                b = %pair.b.display(),
                error = %e,
                "Skipping evaluation pair"
            ),
        }
    }
    if scores.is_empty() {
        return Err(TrainingError::InsufficientData(
            "no evaluable pairs could be built from the corpus".to_string(),
        )
        .into());
    }

    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut tn = 0usize;
    let mut fn_ = 0usize;
    for (&score, &positive) in scores.iter().zip(&labels) {
        match (positive, score >= 0.5) {
            (true, true) => tp += 1,
            (true, false) => fn_ += 1,
            (false, true) => fp += 1,
            (false, false) => tn += 1,
        }
    }

    let total = scores.len() as f32;
    let accuracy = (tp + tn) as f32 / total;
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    Ok(Evaluation {
        pairs_evaluated: scores.len(),
        accuracy,
        precision,
        recall,
        f1,
        auc: auc(&scores, &labels),
        confusion_matrix: [[tn, fp], [fn_, tp]],
    })
}

fn score_pair(
    network: &TwinNetwork,
    normalizer: &Normalizer,
    pair: &crate::types::TrainingPair,
) -> Result<f32> {
    let ta = normalizer.normalize(&std::fs::read(&pair.a)?)?;
    let tb = normalizer.normalize(&std::fs::read(&pair.b)?)?;
    Ok(network.predict_pair(&ta, &tb)?)
}

fn ratio(num: usize, den: usize) -> f32 {
    if den == 0 {
        0.0
    } else {
        num as f32 / den as f32
    }
}

/// Probability that a random positive outscores a random negative, with
/// ties counting half. Returns 0.5 when one class is absent.
fn auc(scores: &[f32], labels: &[bool]) -> f32 {
    let mut wins = 0.0f64;
    let mut comparisons = 0u64;
    for (&pos_score, &pos) in scores.iter().zip(labels) {
        if !pos {
            continue;
        }
        for (&neg_score, &neg_label) in scores.iter().zip(labels) {
            if neg_label {
                continue;
            }
            comparisons += 1;
            if pos_score > neg_score {
                wins += 1.0;
            } else if pos_score == neg_score {
                wins += 0.5;
            }
        }
    }
    if comparisons == 0 {
        0.5
    } else {
        (wins / comparisons as f64) as f32
    }
}
