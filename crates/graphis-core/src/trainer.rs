//! Supervised training of the twin network over sampled pairs.
//!
//! The trainer builds labeled pairs, preprocesses both sides (with
//! independent stochastic augmentation), fits the twin network with Adam,
//! and publishes the result as a new versioned artifact. It works on its
//! own network instance throughout: serving callers keep reading the
//! previous "current" model until `ModelRegistry::save` commits, so a
//! partially-trained network is never visible to inference.
//!
//! Per-pair load failures (missing or corrupt files) are skipped with a
//! warning; the run only fails when nothing trainable remains.

use std::sync::Arc;

use ndarray::{Array1, Array2, Array3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::{Config, TrainingConfig};
use crate::error::{GraphisError, Result, TrainingError};
use crate::model::network::Adam;
use crate::model::{ModelArtifact, ModelRegistry, TwinNetwork};
use crate::preprocess::Normalizer;
use crate::sampler::sample_pairs;
use crate::types::{LabeledSample, TrainingHistory, TrainingPair};

/// Learning-rate candidates for the grid search, in preference order.
/// Ties keep the earlier candidate.
const TUNING_GRID: [f32; 3] = [1e-3, 5e-4, 1e-4];

/// Pair cap for each grid-search candidate's short fit.
const TUNING_PAIR_CAP: usize = 100;

/// Epochs per grid-search candidate.
const TUNING_EPOCHS: usize = 5;

/// Epochs without validation-loss improvement before stopping.
const EARLY_STOP_PATIENCE: usize = 10;

/// Epochs without validation-loss improvement before halving the rate.
const LR_PLATEAU_PATIENCE: usize = 5;

const LR_PLATEAU_FACTOR: f32 = 0.5;

/// Per-run training parameters (config defaults, overridable per job).
#[derive(Debug, Clone)]
pub struct TrainingParams {
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f32,
    pub learning_rate: f32,
    pub negative_ratio: f64,
    pub tune_hyperparams: bool,
    pub seed: u64,
}

impl TrainingParams {
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            epochs: config.epochs,
            batch_size: config.batch_size,
            validation_split: config.validation_split,
            learning_rate: config.learning_rate,
            negative_ratio: config.negative_ratio,
            tune_hyperparams: config.tune_hyperparams,
            seed: config.seed,
        }
    }
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self::from_config(&TrainingConfig::default())
    }
}

/// A preprocessed pair ready for the network: flattened tensors + target.
struct LoadedPair {
    xa: Array1<f32>,
    xb: Array1<f32>,
    target: f32,
}

/// Orchestrates training runs and artifact publication.
pub struct Trainer {
    config: Config,
    registry: Arc<ModelRegistry>,
}

impl Trainer {
    pub fn new(config: Config, registry: Arc<ModelRegistry>) -> Self {
        Self { config, registry }
    }

    /// Run a full training pass and commit the result to the registry.
    pub fn train(
        &self,
        corpus: &[LabeledSample],
        params: &TrainingParams,
    ) -> Result<(TrainingHistory, ModelArtifact)> {
        let mut rng = StdRng::seed_from_u64(params.seed);
        let normalizer = Normalizer::new(
            self.config.model.input_size,
            self.config.preprocess.clone(),
        );

        let mut learning_rate = params.learning_rate;
        if params.tune_hyperparams {
            if let Some(best) = self.tune_learning_rate(corpus, params, &normalizer, &mut rng)? {
                tracing::info!(learning_rate = best, "Grid search selected learning rate");
                learning_rate = best;
            }
        }

        let pairs = sample_pairs(corpus, params.negative_ratio, &mut rng)?;
        let mut loaded = self.load_pairs(&pairs, &normalizer, true, &mut rng);
        if loaded.is_empty() {
            return Err(TrainingError::InsufficientData(
                "no trainable pairs could be built from the corpus".to_string(),
            )
            .into());
        }
        tracing::info!(
            pairs = loaded.len(),
            skipped = pairs.len() - loaded.len(),
            "Training set prepared"
        );

        loaded.shuffle(&mut rng);
        let n_val = ((loaded.len() as f32 * params.validation_split).round() as usize)
            .min(loaded.len() - 1);
        let (train_set, val_set) = loaded.split_at(loaded.len() - n_val);

        let mut network = TwinNetwork::new(
            self.config.model.architecture,
            normalizer.target_shape(),
            &mut rng,
        );
        let mut adam = Adam::new(&network, learning_rate);

        let mut history = TrainingHistory {
            learning_rate,
            ..TrainingHistory::default()
        };
        let mut best_monitor_loss = f32::INFINITY;
        let mut best_monitor_acc = f32::NEG_INFINITY;
        let mut best_weights: Option<TwinNetwork> = None;
        let mut stop_wait = 0usize;
        let mut plateau_wait = 0usize;

        for epoch in 0..params.epochs {
            let (train_loss, train_acc) =
                run_epoch(&mut network, &mut adam, train_set, params.batch_size);
            history.loss.push(train_loss);
            history.accuracy.push(train_acc);
            history.epochs_run = epoch + 1;

            // With no validation split the training metrics drive the
            // plateau logic instead.
            let (monitor_loss, monitor_acc) = if val_set.is_empty() {
                (train_loss, train_acc)
            } else {
                let (val_loss, val_acc) = evaluate_set(&network, val_set, params.batch_size);
                history.val_loss.push(val_loss);
                history.val_accuracy.push(val_acc);
                (val_loss, val_acc)
            };
            tracing::debug!(
                epoch,
                train_loss,
                train_acc,
                monitor_loss,
                monitor_acc,
                "Epoch complete"
            );

            if monitor_acc > best_monitor_acc {
                best_monitor_acc = monitor_acc;
                best_weights = Some(network.clone());
            }

            if monitor_loss < best_monitor_loss {
                best_monitor_loss = monitor_loss;
                stop_wait = 0;
                plateau_wait = 0;
            } else {
                stop_wait += 1;
                plateau_wait += 1;
                if plateau_wait >= LR_PLATEAU_PATIENCE {
                    let halved = adam.learning_rate() * LR_PLATEAU_FACTOR;
                    tracing::debug!(learning_rate = halved, "Plateau: halving learning rate");
                    adam.set_learning_rate(halved);
                    plateau_wait = 0;
                }
                if stop_wait >= EARLY_STOP_PATIENCE {
                    tracing::info!(epoch, "Early stopping on loss plateau");
                    break;
                }
            }
        }

        // Publish the best checkpoint, not necessarily the last epoch.
        if let Some(best) = best_weights {
            network = best;
        }
        let artifact = self.registry.save(&network)?;
        Ok((history, artifact))
    }

    /// Small grid search over learning rates on a capped pair subset.
    ///
    /// Candidates whose subset fails to preprocess entirely are skipped.
    /// Returns `None` when every candidate was skipped.
    fn tune_learning_rate(
        &self,
        corpus: &[LabeledSample],
        params: &TrainingParams,
        normalizer: &Normalizer,
        rng: &mut StdRng,
    ) -> Result<Option<f32>> {
        let mut best: Option<(f32, f32)> = None;
        for &candidate in &TUNING_GRID {
            let pairs = sample_pairs(corpus, params.negative_ratio, rng)?;
            let subset = &pairs[..pairs.len().min(TUNING_PAIR_CAP)];
            let loaded = self.load_pairs(subset, normalizer, false, rng);
            if loaded.is_empty() {
                tracing::warn!(candidate, "Skipping candidate: no usable tuning pairs");
                continue;
            }

            let mut network = TwinNetwork::new(
                self.config.model.architecture,
                normalizer.target_shape(),
                rng,
            );
            let mut adam = Adam::new(&network, candidate);
            let mut accuracy = 0.0;
            for _ in 0..TUNING_EPOCHS {
                let (_, acc) = run_epoch(&mut network, &mut adam, &loaded, params.batch_size);
                accuracy = acc;
            }
            tracing::debug!(candidate, accuracy, "Grid search candidate evaluated");

            // Strict comparison keeps the first candidate on ties.
            if best.map_or(true, |(_, best_acc)| accuracy > best_acc) {
                best = Some((candidate, accuracy));
            }
        }
        Ok(best.map(|(lr, _)| lr))
    }

    /// Preprocess pairs, skipping (with a warning) any whose files cannot
    /// be read or decoded. In training mode each side is augmented
    /// independently with probability 0.5.
    fn load_pairs(
        &self,
        pairs: &[TrainingPair],
        normalizer: &Normalizer,
        augment: bool,
        rng: &mut StdRng,
    ) -> Vec<LoadedPair> {
        let mut loaded = Vec::with_capacity(pairs.len());
        for pair in pairs {
            match load_one(pair, normalizer, augment, rng) {
                Ok(item) => loaded.push(item),
                Err(e) => tracing::warn!(
                    a = %pair.a.display(),
                    b = %pair.b.display(),
                    error = %e,
                    "Skipping pair"
                ),
            }
        }
        loaded
    }
}

fn load_one(
    pair: &TrainingPair,
    normalizer: &Normalizer,
    augment: bool,
    rng: &mut StdRng,
) -> Result<LoadedPair> {
    let bytes_a = std::fs::read(&pair.a)?;
    let bytes_b = std::fs::read(&pair.b)?;
    let ta = load_side(&bytes_a, normalizer, augment, rng)?;
    let tb = load_side(&bytes_b, normalizer, augment, rng)?;
    Ok(LoadedPair {
        xa: flatten(&ta),
        xb: flatten(&tb),
        target: pair.target(),
    })
}

fn load_side(
    bytes: &[u8],
    normalizer: &Normalizer,
    augment: bool,
    rng: &mut StdRng,
) -> std::result::Result<Array3<f32>, GraphisError> {
    if augment && rng.gen::<f32>() < 0.5 {
        Ok(normalizer.normalize_augmented(bytes, rng)?)
    } else {
        Ok(normalizer.normalize(bytes)?)
    }
}

fn flatten(tensor: &Array3<f32>) -> Array1<f32> {
    Array1::from_iter(tensor.iter().copied())
}

/// One pass over the set in minibatches; weighted-average loss/accuracy.
fn run_epoch(
    network: &mut TwinNetwork,
    adam: &mut Adam,
    set: &[LoadedPair],
    batch_size: usize,
) -> (f32, f32) {
    let mut total_loss = 0.0;
    let mut total_acc = 0.0;
    for chunk in set.chunks(batch_size.max(1)) {
        let (xa, xb, y) = stack(chunk, network.input_dim());
        let (loss, acc) = network.fit_batch(&xa, &xb, &y, adam);
        total_loss += loss * chunk.len() as f32;
        total_acc += acc * chunk.len() as f32;
    }
    let n = set.len() as f32;
    (total_loss / n, total_acc / n)
}

fn evaluate_set(network: &TwinNetwork, set: &[LoadedPair], batch_size: usize) -> (f32, f32) {
    let mut total_loss = 0.0;
    let mut total_acc = 0.0;
    for chunk in set.chunks(batch_size.max(1)) {
        let (xa, xb, y) = stack(chunk, network.input_dim());
        let (loss, acc) = network.evaluate_batch(&xa, &xb, &y);
        total_loss += loss * chunk.len() as f32;
        total_acc += acc * chunk.len() as f32;
    }
    let n = set.len() as f32;
    (total_loss / n, total_acc / n)
}

/// Stack loaded pairs into `(n, input_dim)` matrices plus targets.
fn stack(chunk: &[LoadedPair], input_dim: usize) -> (Array2<f32>, Array2<f32>, Array1<f32>) {
    let n = chunk.len();
    let mut xa = Array2::zeros((n, input_dim));
    let mut xb = Array2::zeros((n, input_dim));
    let mut y = Array1::zeros(n);
    for (i, pair) in chunk.iter().enumerate() {
        xa.row_mut(i).assign(&pair.xa);
        xb.row_mut(i).assign(&pair.xb);
        y[i] = pair.target;
    }
    (xa, xb, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Architecture;
    use image::{GrayImage, Luma};
    use std::path::Path;

    /// Config pointed at a temp model dir with a tiny input so tests stay fast.
    fn test_config(model_dir: &Path) -> Config {
        let mut config = Config::default();
        config.general.model_dir = model_dir.to_path_buf();
        config.model.architecture = Architecture::Simple;
        config.model.input_size = 8;
        config
    }

    fn write_sample(dir: &Path, writer: &str, index: usize, seed: u8) -> LabeledSample {
        let writer_dir = dir.join(writer);
        std::fs::create_dir_all(&writer_dir).unwrap();
        let path = writer_dir.join(format!("s{index}.png"));
        let img = GrayImage::from_fn(32, 32, |x, y| {
            Luma([((x * 7 + y * 13) as u8).wrapping_add(seed)])
        });
        img.save(&path).unwrap();
        LabeledSample::new(writer, path)
    }

    fn small_corpus(dir: &Path) -> Vec<LabeledSample> {
        vec![
            write_sample(dir, "alice", 0, 0),
            write_sample(dir, "alice", 1, 10),
            write_sample(dir, "bob", 0, 120),
            write_sample(dir, "bob", 1, 130),
        ]
    }

    fn small_params() -> TrainingParams {
        TrainingParams {
            epochs: 2,
            batch_size: 4,
            validation_split: 0.2,
            ..TrainingParams::default()
        }
    }

    #[test]
    fn test_train_commits_versioned_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir.path().join("models"));
        let registry = Arc::new(ModelRegistry::open(config.model_dir()).unwrap());
        let trainer = Trainer::new(config, Arc::clone(&registry));

        let corpus = small_corpus(dir.path());
        let (history, artifact) = trainer.train(&corpus, &small_params()).unwrap();

        assert_eq!(artifact.version, 1);
        assert_eq!(artifact.embedding_dim, 128);
        assert_eq!(artifact.input_shape, [8, 8, 1]);
        assert_eq!(history.epochs_run, 2);
        assert_eq!(history.loss.len(), 2);
        assert_eq!(registry.current().unwrap().version, 1);
    }

    #[test]
    fn test_single_sample_writers_fail_before_any_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir.path().join("models"));
        let registry = Arc::new(ModelRegistry::open(config.model_dir()).unwrap());
        let trainer = Trainer::new(config, Arc::clone(&registry));

        // Every writer has exactly one sample: no positives, so no pairs.
        let corpus = vec![
            write_sample(dir.path(), "alice", 0, 0),
            write_sample(dir.path(), "bob", 0, 100),
        ];
        let err = trainer.train(&corpus, &small_params()).unwrap_err();
        assert!(matches!(
            err,
            GraphisError::Training(TrainingError::InsufficientData(_))
        ));
        // Nothing was committed.
        assert!(registry.current().is_err());
    }

    #[test]
    fn test_corrupt_sample_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir.path().join("models"));
        let registry = Arc::new(ModelRegistry::open(config.model_dir()).unwrap());
        let trainer = Trainer::new(config, Arc::clone(&registry));

        let mut corpus = small_corpus(dir.path());
        let bad = dir.path().join("alice").join("bad.png");
        std::fs::write(&bad, b"not an image at all").unwrap();
        corpus.push(LabeledSample::new("alice", bad));

        let (_, artifact) = trainer.train(&corpus, &small_params()).unwrap();
        assert_eq!(artifact.version, 1);
    }

    #[test]
    fn test_tuned_run_completes() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir.path().join("models"));
        let registry = Arc::new(ModelRegistry::open(config.model_dir()).unwrap());
        let trainer = Trainer::new(config, registry);

        let corpus = small_corpus(dir.path());
        let params = TrainingParams {
            tune_hyperparams: true,
            ..small_params()
        };
        let (history, _) = trainer.train(&corpus, &params).unwrap();
        assert!(TUNING_GRID.contains(&history.learning_rate));
    }

    #[test]
    fn test_retrain_bumps_version() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir.path().join("models"));
        let registry = Arc::new(ModelRegistry::open(config.model_dir()).unwrap());
        let trainer = Trainer::new(config, Arc::clone(&registry));

        let corpus = small_corpus(dir.path());
        let (_, first) = trainer.train(&corpus, &small_params()).unwrap();
        let (_, second) = trainer.train(&corpus, &small_params()).unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(registry.current().unwrap().version, 2);
    }
}
