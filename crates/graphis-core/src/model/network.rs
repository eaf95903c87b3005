//! The twin-network embedding model.
//!
//! One shared-weight feature extractor maps a flattened grayscale tensor to
//! a 128-dimensional embedding. During training the extractor is applied to
//! both sides of a pair; the element-wise L1 distance between the two
//! embeddings feeds a sigmoid head that predicts same/different writer.
//! The head is training-only scaffolding: inference uses the extractor
//! alone.
//!
//! Forward and backward passes are implemented directly over `ndarray`
//! matrices with an Adam optimizer. The rest of the system only depends on
//! the `embed` contract and the declared input shape.

use ndarray::{Array, Array1, Array2, Array3, Axis, Dimension, Zip};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::types::Embedding;

/// Dimension of the embeddings the extractor produces.
pub const EMBEDDING_DIM: usize = 128;

/// Clamp for binary cross-entropy probabilities.
const BCE_EPSILON: f32 = 1e-7;

/// Feature extractor tier, selectable at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// Two dense layers (256 → 128)
    Simple,
    /// Three dense layers (512 → 256 → 128)
    Enhanced,
}

impl Architecture {
    /// Widths of the extractor layers, ending in the embedding dimension.
    fn layer_widths(self) -> &'static [usize] {
        match self {
            Architecture::Simple => &[256, EMBEDDING_DIM],
            Architecture::Enhanced => &[512, 256, EMBEDDING_DIM],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::Simple => "simple",
            Architecture::Enhanced => "enhanced",
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dense layer: `weights` is `(out, in)`, `bias` is `(out)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DenseLayer {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl DenseLayer {
    /// He-uniform initialization from the given rng.
    fn init(out_dim: usize, in_dim: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0f32 / in_dim as f32).sqrt();
        let weights = Array2::from_shape_fn((out_dim, in_dim), |_| rng.gen_range(-limit..limit));
        Self {
            weights,
            bias: Array1::zeros(out_dim),
        }
    }
}

/// Twin network: shared extractor plus a pairwise sigmoid head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwinNetwork {
    architecture: Architecture,
    input_shape: [usize; 3],
    layers: Vec<DenseLayer>,
    head: DenseLayer,
}

impl TwinNetwork {
    /// Build a fresh network with seeded weight initialization.
    pub fn new(architecture: Architecture, input_shape: [usize; 3], rng: &mut StdRng) -> Self {
        let input_dim = input_shape.iter().product();
        let mut layers = Vec::new();
        let mut in_dim = input_dim;
        for &out_dim in architecture.layer_widths() {
            layers.push(DenseLayer::init(out_dim, in_dim, rng));
            in_dim = out_dim;
        }
        let head = DenseLayer::init(1, EMBEDDING_DIM, rng);
        Self {
            architecture,
            input_shape,
            layers,
            head,
        }
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Declared input shape as `[H, W, C]`.
    pub fn input_shape(&self) -> [usize; 3] {
        self.input_shape
    }

    pub fn embedding_dim(&self) -> usize {
        EMBEDDING_DIM
    }

    pub(crate) fn input_dim(&self) -> usize {
        self.input_shape.iter().product()
    }

    /// Map a normalized tensor to its embedding.
    ///
    /// Pure function of the weights and the input. A tensor whose shape
    /// differs from the declared input shape is rejected, never reshaped.
    pub fn embed(&self, tensor: &Array3<f32>) -> Result<Embedding, ModelError> {
        let x = self.check_and_flatten(tensor)?;
        Ok(Embedding::new(self.extract(&x).to_vec()))
    }

    /// Same/different probability for a pair of normalized tensors.
    ///
    /// Used by evaluation; training goes through the batched path.
    pub fn predict_pair(&self, a: &Array3<f32>, b: &Array3<f32>) -> Result<f32, ModelError> {
        let ea = self.extract(&self.check_and_flatten(a)?);
        let eb = self.extract(&self.check_and_flatten(b)?);
        let dist = (&ea - &eb).mapv(f32::abs);
        let z = self.head.weights.dot(&dist)[0] + self.head.bias[0];
        Ok(sigmoid(z))
    }

    fn check_and_flatten(&self, tensor: &Array3<f32>) -> Result<Array1<f32>, ModelError> {
        let shape = tensor.shape();
        let actual = [shape[0], shape[1], shape[2]];
        if actual != self.input_shape {
            return Err(ModelError::ShapeMismatch {
                expected: self.input_shape,
                actual,
            });
        }
        Ok(Array1::from_iter(tensor.iter().copied()))
    }

    /// Extractor forward pass for a single flattened input.
    fn extract(&self, x: &Array1<f32>) -> Array1<f32> {
        let mut a = x.clone();
        for layer in &self.layers {
            a = (layer.weights.dot(&a) + &layer.bias).mapv(|v| v.max(0.0));
        }
        a
    }

    /// Forward the extractor over a batch, keeping every activation for
    /// backprop. `acts[0]` is the input; `acts.last()` the embeddings.
    fn extract_with_cache(&self, x: &Array2<f32>) -> Vec<Array2<f32>> {
        let mut acts = Vec::with_capacity(self.layers.len() + 1);
        acts.push(x.clone());
        for (l, layer) in self.layers.iter().enumerate() {
            let z = acts[l].dot(&layer.weights.t()) + &layer.bias;
            acts.push(z.mapv(|v| v.max(0.0)));
        }
        acts
    }

    /// One optimization step over a batch of flattened pairs.
    ///
    /// Returns `(mean loss, accuracy)` for the batch, computed before the
    /// weight update.
    pub(crate) fn fit_batch(
        &mut self,
        xa: &Array2<f32>,
        xb: &Array2<f32>,
        y: &Array1<f32>,
        adam: &mut Adam,
    ) -> (f32, f32) {
        let n = y.len();
        let acts_a = self.extract_with_cache(xa);
        let acts_b = self.extract_with_cache(xb);

        let diff = &acts_a[acts_a.len() - 1] - &acts_b[acts_b.len() - 1];
        let dist = diff.mapv(f32::abs);
        let sign = diff.mapv(f32::signum);

        // Head forward: z = dist · w^T + b, p = sigmoid(z).
        let z = dist.dot(&self.head.weights.t()) + &self.head.bias;
        let p = z.mapv(sigmoid);
        let p_col = p.column(0).to_owned();
        let (loss, acc) = bce_metrics(&p_col, y);

        // Backward. dL/dz averaged over the batch.
        let mut dz = p;
        for (i, v) in dz.column_mut(0).iter_mut().enumerate() {
            *v = (*v - y[i]) / n as f32;
        }
        let d_head_w = dz.t().dot(&dist);
        let d_head_b = dz.sum_axis(Axis(0));
        let d_dist = dz.dot(&self.head.weights);

        let d_ea = &d_dist * &sign;
        let d_eb = -&d_ea;

        let mut grads = Gradients::zeros_like(self);
        self.backprop_branch(&acts_a, &d_ea, &mut grads);
        self.backprop_branch(&acts_b, &d_eb, &mut grads);
        grads.head_w += &d_head_w;
        grads.head_b += &d_head_b;

        adam.step(self, &grads);
        (loss, acc)
    }

    /// Loss and accuracy over a batch without touching the weights.
    pub(crate) fn evaluate_batch(
        &self,
        xa: &Array2<f32>,
        xb: &Array2<f32>,
        y: &Array1<f32>,
    ) -> (f32, f32) {
        let acts_a = self.extract_with_cache(xa);
        let acts_b = self.extract_with_cache(xb);
        let dist = (&acts_a[acts_a.len() - 1] - &acts_b[acts_b.len() - 1]).mapv(f32::abs);
        let z = dist.dot(&self.head.weights.t()) + &self.head.bias;
        let p = z.mapv(sigmoid).column(0).to_owned();
        bce_metrics(&p, y)
    }

    /// Backprop one branch of the shared extractor, accumulating gradients.
    fn backprop_branch(&self, acts: &[Array2<f32>], d_embedding: &Array2<f32>, grads: &mut Gradients) {
        // Every layer output passed through relu, so mask by activation > 0.
        let mut delta = d_embedding * &acts[acts.len() - 1].mapv(relu_mask);
        for l in (0..self.layers.len()).rev() {
            grads.layers[l].0 += &delta.t().dot(&acts[l]);
            grads.layers[l].1 += &delta.sum_axis(Axis(0));
            if l > 0 {
                delta = delta.dot(&self.layers[l].weights) * acts[l].mapv(relu_mask);
            }
        }
    }
}

fn relu_mask(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else {
        0.0
    }
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

/// Mean binary cross-entropy and accuracy at a 0.5 threshold.
fn bce_metrics(p: &Array1<f32>, y: &Array1<f32>) -> (f32, f32) {
    let n = y.len() as f32;
    let mut loss = 0.0;
    let mut correct = 0usize;
    for (&pi, &yi) in p.iter().zip(y.iter()) {
        let pc = pi.clamp(BCE_EPSILON, 1.0 - BCE_EPSILON);
        loss -= yi * pc.ln() + (1.0 - yi) * (1.0 - pc).ln();
        if (pi > 0.5) == (yi > 0.5) {
            correct += 1;
        }
    }
    (loss / n, correct as f32 / n)
}

/// Accumulated parameter gradients for one optimization step.
pub(crate) struct Gradients {
    layers: Vec<(Array2<f32>, Array1<f32>)>,
    head_w: Array2<f32>,
    head_b: Array1<f32>,
}

impl Gradients {
    fn zeros_like(network: &TwinNetwork) -> Self {
        let layers = network
            .layers
            .iter()
            .map(|l| {
                (
                    Array2::zeros(l.weights.raw_dim()),
                    Array1::zeros(l.bias.raw_dim()),
                )
            })
            .collect();
        Self {
            layers,
            head_w: Array2::zeros(network.head.weights.raw_dim()),
            head_b: Array1::zeros(network.head.bias.raw_dim()),
        }
    }
}

/// First/second moment estimates for one parameter tensor pair.
type Moments = (Array2<f32>, Array1<f32>, Array2<f32>, Array1<f32>);

/// Adam optimizer over the twin network's parameters.
pub(crate) struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    step_count: i32,
    layers: Vec<Moments>,
    head: Moments,
}

impl Adam {
    pub(crate) fn new(network: &TwinNetwork, lr: f32) -> Self {
        let zeros = |l: &DenseLayer| -> Moments {
            (
                Array2::zeros(l.weights.raw_dim()),
                Array1::zeros(l.bias.raw_dim()),
                Array2::zeros(l.weights.raw_dim()),
                Array1::zeros(l.bias.raw_dim()),
            )
        };
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step_count: 0,
            layers: network.layers.iter().map(zeros).collect(),
            head: zeros(&network.head),
        }
    }

    pub(crate) fn learning_rate(&self) -> f32 {
        self.lr
    }

    pub(crate) fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn step(&mut self, network: &mut TwinNetwork, grads: &Gradients) {
        self.step_count += 1;
        let bias_correction1 = 1.0 - self.beta1.powi(self.step_count);
        let bias_correction2 = 1.0 - self.beta2.powi(self.step_count);
        let scale = self.lr * bias_correction2.sqrt() / bias_correction1;

        for (i, layer) in network.layers.iter_mut().enumerate() {
            let (mw, mb, vw, vb) = &mut self.layers[i];
            adam_update(
                &mut layer.weights,
                &grads.layers[i].0,
                mw,
                vw,
                self.beta1,
                self.beta2,
                scale,
                self.epsilon,
            );
            adam_update(
                &mut layer.bias,
                &grads.layers[i].1,
                mb,
                vb,
                self.beta1,
                self.beta2,
                scale,
                self.epsilon,
            );
        }
        let (mw, mb, vw, vb) = &mut self.head;
        adam_update(
            &mut network.head.weights,
            &grads.head_w,
            mw,
            vw,
            self.beta1,
            self.beta2,
            scale,
            self.epsilon,
        );
        adam_update(
            &mut network.head.bias,
            &grads.head_b,
            mb,
            vb,
            self.beta1,
            self.beta2,
            scale,
            self.epsilon,
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn adam_update<D: Dimension>(
    param: &mut Array<f32, D>,
    grad: &Array<f32, D>,
    m: &mut Array<f32, D>,
    v: &mut Array<f32, D>,
    beta1: f32,
    beta2: f32,
    scale: f32,
    epsilon: f32,
) {
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = beta1 * *m + (1.0 - beta1) * g;
            *v = beta2 * *v + (1.0 - beta2) * g * g;
            *p -= scale * *m / (v.sqrt() + epsilon);
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn tiny_network() -> TwinNetwork {
        let mut rng = StdRng::seed_from_u64(1);
        TwinNetwork::new(Architecture::Simple, [8, 8, 1], &mut rng)
    }

    #[test]
    fn test_embedding_dimension_fixed() {
        let net = tiny_network();
        let tensor = Array3::from_elem((8, 8, 1), 0.5);
        let embedding = net.embed(&tensor).unwrap();
        assert_eq!(embedding.dim(), EMBEDDING_DIM);
        assert_eq!(net.embedding_dim(), EMBEDDING_DIM);
    }

    #[test]
    fn test_embed_deterministic() {
        let net = tiny_network();
        let tensor = Array3::from_shape_fn((8, 8, 1), |(y, x, _)| (y * 8 + x) as f32 / 64.0);
        let a = net.embed(&tensor).unwrap();
        let b = net.embed(&tensor).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let net = tiny_network();
        let wrong = Array3::from_elem((16, 16, 1), 0.5);
        let err = net.embed(&wrong).unwrap_err();
        match err {
            ModelError::ShapeMismatch { expected, actual } => {
                assert_eq!(expected, [8, 8, 1]);
                assert_eq!(actual, [16, 16, 1]);
            }
            other => panic!("expected ShapeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_predict_pair_in_unit_interval() {
        let net = tiny_network();
        let a = Array3::from_elem((8, 8, 1), 0.2);
        let b = Array3::from_elem((8, 8, 1), 0.9);
        let p = net.predict_pair(&a, &b).unwrap();
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn test_identical_inputs_have_zero_distance() {
        // With zero L1 distance the head output is exactly sigmoid(bias).
        let net = tiny_network();
        let a = Array3::from_elem((8, 8, 1), 0.7);
        let p = net.predict_pair(&a, &a).unwrap();
        assert!((p - sigmoid(net.head.bias[0])).abs() < 1e-6);
    }

    #[test]
    fn test_fit_batch_reduces_loss_on_toy_pairs() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut net = TwinNetwork::new(Architecture::Simple, [4, 4, 1], &mut rng);
        let mut adam = Adam::new(&net, 0.01);

        // Two easy pairs: identical inputs labeled 1, disjoint inputs labeled 0.
        let xa = ndarray::arr2(&[[1.0f32; 16], [1.0; 16]]);
        let mut far = [0.0f32; 16];
        far[0] = 1.0;
        let xb = ndarray::stack![Axis(0), ndarray::arr1(&[1.0f32; 16]), ndarray::arr1(&far)];
        let y = ndarray::arr1(&[1.0f32, 0.0]);

        let (first_loss, _) = net.fit_batch(&xa, &xb, &y, &mut adam);
        let mut last_loss = first_loss;
        for _ in 0..200 {
            let (loss, _) = net.fit_batch(&xa, &xb, &y, &mut adam);
            last_loss = loss;
        }
        assert!(
            last_loss < first_loss,
            "loss should fall: {first_loss} -> {last_loss}"
        );
    }

    #[test]
    fn test_weights_roundtrip_through_json() {
        let net = tiny_network();
        let json = serde_json::to_string(&net).unwrap();
        let restored: TwinNetwork = serde_json::from_str(&json).unwrap();

        let tensor = Array3::from_shape_fn((8, 8, 1), |(y, x, _)| (y + x) as f32 / 16.0);
        assert_eq!(
            net.embed(&tensor).unwrap(),
            restored.embed(&tensor).unwrap()
        );
        assert_eq!(restored.architecture(), Architecture::Simple);
    }
}
