//! Training-pair construction from a labeled sample corpus.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::TrainingError;
use crate::types::{LabeledSample, TrainingPair};

/// Build labeled same/different pairs from a labeled corpus.
///
/// Positive pairs are exhaustive: every unordered pair of samples within a
/// writer group of size ≥ 2. This is O(n²) per group, which is fine because
/// per-writer sample counts are small. The negative target is
/// `round(positives * negative_ratio)`; each negative draws two distinct
/// writers uniformly, then one sample uniformly from each.
///
/// Duplicate negative pairs are permitted (no dedup). This is a documented
/// property of the sampler, not a bug: deduplicating would change the
/// training-set statistics that existing models were produced under.
///
/// A writer with a single sample contributes no positive pairs. Requesting
/// negatives from a corpus with fewer than two writers fails with
/// `InsufficientData`.
pub fn sample_pairs(
    corpus: &[LabeledSample],
    negative_ratio: f64,
    rng: &mut StdRng,
) -> Result<Vec<TrainingPair>, TrainingError> {
    // BTreeMap keeps writer iteration order deterministic.
    let mut groups: BTreeMap<&str, Vec<&LabeledSample>> = BTreeMap::new();
    for sample in corpus {
        groups.entry(&sample.writer_id).or_default().push(sample);
    }

    let mut pairs = Vec::new();
    for samples in groups.values() {
        if samples.len() < 2 {
            continue;
        }
        for i in 0..samples.len() {
            for j in (i + 1)..samples.len() {
                pairs.push(TrainingPair {
                    a: samples[i].image_path.clone(),
                    b: samples[j].image_path.clone(),
                    same_writer: true,
                });
            }
        }
    }

    let negative_target = (pairs.len() as f64 * negative_ratio).round() as usize;
    if negative_target == 0 {
        return Ok(pairs);
    }

    let writers: Vec<&Vec<&LabeledSample>> = groups.values().collect();
    if writers.len() < 2 {
        return Err(TrainingError::InsufficientData(format!(
            "{} negative pairs requested but corpus has {} writer(s); need at least 2",
            negative_target,
            writers.len()
        )));
    }

    for _ in 0..negative_target {
        // Two distinct writers, uniform without replacement within the draw.
        let first = rng.gen_range(0..writers.len());
        let mut second = rng.gen_range(0..writers.len() - 1);
        if second >= first {
            second += 1;
        }
        let sample_a = writers[first][rng.gen_range(0..writers[first].len())];
        let sample_b = writers[second][rng.gen_range(0..writers[second].len())];
        pairs.push(TrainingPair {
            a: sample_a.image_path.clone(),
            b: sample_b.image_path.clone(),
            same_writer: false,
        });
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn corpus(spec: &[(&str, usize)]) -> Vec<LabeledSample> {
        let mut samples = Vec::new();
        for (writer, count) in spec {
            for i in 0..*count {
                samples.push(LabeledSample::new(
                    *writer,
                    format!("/data/{writer}/s{i}.png"),
                ));
            }
        }
        samples
    }

    #[test]
    fn test_pair_counts() {
        // X: 3 samples → C(3,2)=3 positives; Y: 1 → 0; Z: 2 → 1.
        let corpus = corpus(&[("x", 3), ("y", 1), ("z", 2)]);
        let mut rng = StdRng::seed_from_u64(0);
        let pairs = sample_pairs(&corpus, 1.0, &mut rng).unwrap();

        let positives = pairs.iter().filter(|p| p.same_writer).count();
        let negatives = pairs.iter().filter(|p| !p.same_writer).count();
        assert_eq!(positives, 4);
        assert_eq!(negatives, 4);
    }

    #[test]
    fn test_negative_ratio_rounding() {
        let corpus = corpus(&[("x", 3), ("z", 2)]);
        let mut rng = StdRng::seed_from_u64(0);
        // 4 positives * 0.6 = 2.4 → rounds to 2.
        let pairs = sample_pairs(&corpus, 0.6, &mut rng).unwrap();
        assert_eq!(pairs.iter().filter(|p| !p.same_writer).count(), 2);
    }

    #[test]
    fn test_single_sample_writer_contributes_nothing() {
        let corpus = corpus(&[("x", 1), ("y", 1)]);
        let mut rng = StdRng::seed_from_u64(0);
        let pairs = sample_pairs(&corpus, 1.0, &mut rng).unwrap();
        // No positives means a zero negative target; empty set, not an error.
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_negatives_with_one_writer_fail() {
        let corpus = corpus(&[("x", 3)]);
        let mut rng = StdRng::seed_from_u64(0);
        let err = sample_pairs(&corpus, 1.0, &mut rng).unwrap_err();
        assert!(matches!(err, TrainingError::InsufficientData(_)));
    }

    #[test]
    fn test_zero_ratio_skips_writer_check() {
        // With ratio 0 no negatives are requested, so a single multi-sample
        // writer is fine.
        let corpus = corpus(&[("x", 3)]);
        let mut rng = StdRng::seed_from_u64(0);
        let pairs = sample_pairs(&corpus, 0.0, &mut rng).unwrap();
        assert_eq!(pairs.len(), 3);
        assert!(pairs.iter().all(|p| p.same_writer));
    }

    #[test]
    fn test_negative_pairs_cross_writers() {
        let corpus = corpus(&[("x", 2), ("y", 2), ("z", 2)]);
        let mut rng = StdRng::seed_from_u64(1);
        let pairs = sample_pairs(&corpus, 2.0, &mut rng).unwrap();
        for pair in pairs.iter().filter(|p| !p.same_writer) {
            let writer_of = |p: &std::path::Path| {
                p.parent().unwrap().file_name().unwrap().to_os_string()
            };
            assert_ne!(writer_of(&pair.a), writer_of(&pair.b));
        }
    }

    #[test]
    fn test_sampling_reproducible_with_seed() {
        let corpus = corpus(&[("x", 3), ("y", 2), ("z", 2)]);
        let mut rng_a = StdRng::seed_from_u64(9);
        let mut rng_b = StdRng::seed_from_u64(9);
        assert_eq!(
            sample_pairs(&corpus, 1.5, &mut rng_a).unwrap(),
            sample_pairs(&corpus, 1.5, &mut rng_b).unwrap()
        );
    }
}
