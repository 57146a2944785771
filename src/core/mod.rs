//! Network capability contract and the reference feed-forward implementation.
//!
//! This module provides:
//! - The [`SupervisedNetwork`] trait consumed by the epoch coordinator and
//!   the pattern-recognition driver
//! - [`MlpNetwork`], a reference multi-layer perceptron implementing it with
//!   squared-error loss and backpropagated gradient accumulation
//! - The crate error type
//!
//! ## Replica model
//!
//! A trainable network is replicated across worker threads via `Clone`.
//! Replicas accumulate gradients independently during an epoch; the
//! coordinator merges them back into the canonical instance with
//! [`SupervisedNetwork::merge_gradient`] and re-synchronizes parameters with
//! `clone_from` before the next epoch. Nothing here applies a weight step;
//! that is the caller's decision (see [`MlpNetwork::apply_accumulated`]).

use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use std::error::Error;
use std::fmt;

/// Error type for training operations.
///
/// All variants are construction-time or precondition failures; once worker
/// threads are running there is no recoverable error path.
#[derive(Debug, Clone)]
pub enum TrainError {
    /// Dataset or network dimensions do not line up
    ShapeMismatch(String),
    /// Invalid construction parameters
    InvalidConfig(String),
    /// A worker thread could not be created
    ThreadSpawn(String),
    /// Checkpoint serialization or I/O failure
    Checkpoint(String),
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainError::ShapeMismatch(msg) => write!(f, "Shape mismatch: {}", msg),
            TrainError::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
            TrainError::ThreadSpawn(msg) => write!(f, "Thread spawn failed: {}", msg),
            TrainError::Checkpoint(msg) => write!(f, "Checkpoint error: {}", msg),
        }
    }
}

impl Error for TrainError {}

pub type TrainResult<T> = Result<T, TrainError>;

/// Layer nonlinearity for [`MlpNetwork`].
///
/// An enum rather than a trait object so that networks stay `Clone` (replica
/// creation requires it). Both variants can compute their derivative from the
/// activation value alone, which is what backpropagation needs here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// f(x) = x
    Identity,
    /// f(x) = tanh(x), output range [-1, 1]
    Tanh,
}

impl Activation {
    /// Apply the activation function.
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Identity => x,
            Activation::Tanh => x.tanh(),
        }
    }

    /// Derivative expressed in terms of the activation value `y = f(x)`.
    ///
    /// For tanh this is `1 - y^2`, numerically stable and free of a second
    /// forward evaluation.
    #[inline]
    pub fn derivative_from_output(self, y: f32) -> f32 {
        match self {
            Activation::Identity => 1.0,
            Activation::Tanh => 1.0 - y * y,
        }
    }

    /// Name for checkpointing and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Activation::Identity => "identity",
            Activation::Tanh => "tanh",
        }
    }

    /// Reconstruct an activation from its checkpoint name.
    ///
    /// # Errors
    /// `InvalidConfig` if the name is unknown.
    pub fn from_name(name: &str) -> TrainResult<Self> {
        match name {
            "identity" => Ok(Activation::Identity),
            "tanh" => Ok(Activation::Tanh),
            other => Err(TrainError::InvalidConfig(format!(
                "Unknown activation function: {}",
                other
            ))),
        }
    }
}

/// Capability contract of a supervised trainable network.
///
/// Both the replicated coordinator and the pattern-recognition driver are
/// generic over this trait; the weight-update algorithm and topology behind
/// it are the implementor's concern.
///
/// `Clone` doubles as the replica constructor (`clone()`) and the pre-epoch
/// parameter sync (`clone_from()`).
pub trait SupervisedNetwork: Clone + Send {
    /// Width of the input layer.
    fn input_size(&self) -> usize;

    /// Width of the output layer.
    fn output_size(&self) -> usize;

    /// Run one sample through the network.
    ///
    /// Writes the network output into `output` (sized [`Self::output_size`])
    /// and returns the per-sample error. May cache forward-pass state on
    /// `self` for a following [`Self::accumulate_update`] call, so it must
    /// not run concurrently on one replica; the coordinator's replica
    /// mutexes enforce this.
    fn apply_supervised(
        &mut self,
        input: ArrayView1<'_, f32>,
        target: ArrayView1<'_, f32>,
        output: &mut Array1<f32>,
    ) -> f32;

    /// Accumulate (or directly apply) a weight-update step for the sample
    /// last seen by [`Self::apply_supervised`].
    ///
    /// `pattern` identifies the pattern class the sample belongs to, for
    /// implementations with per-class update policies; flat training passes 0.
    fn accumulate_update(
        &mut self,
        output: &Array1<f32>,
        target: ArrayView1<'_, f32>,
        pattern: usize,
    );

    /// Merge another replica's accumulated gradient into this one.
    ///
    /// Called only by the coordinator, between epochs, never concurrently
    /// with worker computation.
    fn merge_gradient(&mut self, other: &Self);
}

/// Reference feed-forward network: fully connected layers with a shared
/// activation, squared-error loss, and gradient accumulation via
/// backpropagation.
///
/// # Weight layout
///
/// `weights[l]` has shape `(dims[l+1], dims[l])` and maps layer `l` to layer
/// `l+1`; `biases[l]` has shape `(dims[l+1])`. Weights are initialized with
/// Xavier/Glorot uniform `U(-limit, limit)`, `limit = sqrt(6 / (fan_in +
/// fan_out))`; biases start at zero.
///
/// [`SupervisedNetwork::accumulate_update`] only accumulates into the
/// gradient buffers. Call [`MlpNetwork::apply_accumulated`] to take the step
/// and clear them.
#[derive(Debug, Clone)]
pub struct MlpNetwork {
    dims: Vec<usize>,
    weights: Vec<Array2<f32>>,
    biases: Vec<Array1<f32>>,
    grad_w: Vec<Array2<f32>>,
    grad_b: Vec<Array1<f32>>,
    /// Post-activation values from the last forward pass, layer_outputs[0]
    /// being the input itself.
    layer_outputs: Vec<Array1<f32>>,
    activation: Activation,
}

impl MlpNetwork {
    /// Create a network with the given layer dimensions.
    ///
    /// # Errors
    /// `InvalidConfig` if fewer than 2 layers or any zero-width layer.
    pub fn new(dims: Vec<usize>, activation: Activation) -> TrainResult<Self> {
        if dims.len() < 2 {
            return Err(TrainError::InvalidConfig(
                "Must have at least 2 layers (input and output)".to_string(),
            ));
        }
        if dims.iter().any(|&d| d == 0) {
            return Err(TrainError::InvalidConfig(
                "Layer dimensions must be non-zero".to_string(),
            ));
        }

        let mut weights = Vec::with_capacity(dims.len() - 1);
        let mut biases = Vec::with_capacity(dims.len() - 1);
        for l in 0..dims.len() - 1 {
            let fan_in = dims[l];
            let fan_out = dims[l + 1];
            let limit = (6.0f32 / (fan_in + fan_out) as f32).sqrt();
            weights.push(Array2::random((fan_out, fan_in), Uniform::new(-limit, limit)));
            biases.push(Array1::zeros(fan_out));
        }

        let grad_w = weights.iter().map(|w| Array2::zeros(w.dim())).collect();
        let grad_b = biases.iter().map(|b| Array1::zeros(b.len())).collect();
        let layer_outputs = dims.iter().map(|&d| Array1::zeros(d)).collect();

        Ok(Self {
            dims,
            weights,
            biases,
            grad_w,
            grad_b,
            layer_outputs,
            activation,
        })
    }

    /// Rebuild a network from checkpointed parts.
    ///
    /// # Errors
    /// `ShapeMismatch` if the weight or bias shapes disagree with `dims`.
    pub fn from_parts(
        dims: Vec<usize>,
        activation: Activation,
        weights: Vec<Array2<f32>>,
        biases: Vec<Array1<f32>>,
    ) -> TrainResult<Self> {
        if dims.len() < 2 || weights.len() != dims.len() - 1 || biases.len() != dims.len() - 1 {
            return Err(TrainError::ShapeMismatch(format!(
                "Expected {} weight layers, got {} weights and {} biases",
                dims.len().saturating_sub(1),
                weights.len(),
                biases.len()
            )));
        }
        for l in 0..weights.len() {
            if weights[l].dim() != (dims[l + 1], dims[l]) || biases[l].len() != dims[l + 1] {
                return Err(TrainError::ShapeMismatch(format!(
                    "Layer {} parameters do not match dimensions {}x{}",
                    l,
                    dims[l + 1],
                    dims[l]
                )));
            }
        }

        let grad_w = weights.iter().map(|w| Array2::zeros(w.dim())).collect();
        let grad_b = biases.iter().map(|b| Array1::zeros(b.len())).collect();
        let layer_outputs = dims.iter().map(|&d| Array1::zeros(d)).collect();

        Ok(Self {
            dims,
            weights,
            biases,
            grad_w,
            grad_b,
            layer_outputs,
            activation,
        })
    }

    /// Layer dimensions, input first.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// The shared layer activation.
    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Weight matrices, one per layer transition.
    pub fn weights(&self) -> &[Array2<f32>] {
        &self.weights
    }

    /// Bias vectors, one per non-input layer.
    pub fn biases(&self) -> &[Array1<f32>] {
        &self.biases
    }

    /// Accumulated weight gradients (diagnostic access).
    pub fn weight_gradients(&self) -> &[Array2<f32>] {
        &self.grad_w
    }

    /// Accumulated bias gradients (diagnostic access).
    pub fn bias_gradients(&self) -> &[Array1<f32>] {
        &self.grad_b
    }

    /// Take a gradient-descent step with the accumulated gradients, then
    /// clear them.
    pub fn apply_accumulated(&mut self, eta: f32) {
        for (w, g) in self.weights.iter_mut().zip(&self.grad_w) {
            w.scaled_add(-eta, g);
        }
        for (b, g) in self.biases.iter_mut().zip(&self.grad_b) {
            b.scaled_add(-eta, g);
        }
        self.reset_gradients();
    }

    /// Zero the gradient accumulators.
    pub fn reset_gradients(&mut self) {
        for g in &mut self.grad_w {
            g.fill(0.0);
        }
        for g in &mut self.grad_b {
            g.fill(0.0);
        }
    }
}

impl SupervisedNetwork for MlpNetwork {
    fn input_size(&self) -> usize {
        self.dims[0]
    }

    fn output_size(&self) -> usize {
        self.dims[self.dims.len() - 1]
    }

    fn apply_supervised(
        &mut self,
        input: ArrayView1<'_, f32>,
        target: ArrayView1<'_, f32>,
        output: &mut Array1<f32>,
    ) -> f32 {
        let act = self.activation;
        self.layer_outputs[0].assign(&input);
        for l in 0..self.weights.len() {
            let mut z = self.weights[l].dot(&self.layer_outputs[l]);
            z += &self.biases[l];
            z.mapv_inplace(|v| act.apply(v));
            self.layer_outputs[l + 1] = z;
        }

        let last = &self.layer_outputs[self.layer_outputs.len() - 1];
        output.assign(last);
        target
            .iter()
            .zip(last.iter())
            .map(|(t, o)| (t - o) * (t - o))
            .sum()
    }

    fn accumulate_update(
        &mut self,
        output: &Array1<f32>,
        target: ArrayView1<'_, f32>,
        _pattern: usize,
    ) {
        let act = self.activation;

        // Output-layer delta: d(error)/d(pre-activation) for squared error.
        let mut delta: Array1<f32> = output
            .iter()
            .zip(target.iter())
            .map(|(o, t)| 2.0 * (o - t) * act.derivative_from_output(*o))
            .collect();

        for l in (0..self.weights.len()).rev() {
            let below = &self.layer_outputs[l];
            let outer = delta
                .view()
                .insert_axis(Axis(1))
                .dot(&below.view().insert_axis(Axis(0)));
            self.grad_w[l] += &outer;
            self.grad_b[l] += &delta;

            if l > 0 {
                let back = self.weights[l].t().dot(&delta);
                delta = back
                    .iter()
                    .zip(below.iter())
                    .map(|(e, a)| e * act.derivative_from_output(*a))
                    .collect();
            }
        }
    }

    fn merge_gradient(&mut self, other: &Self) {
        for (g, o) in self.grad_w.iter_mut().zip(&other.grad_w) {
            *g += o;
        }
        for (g, o) in self.grad_b.iter_mut().zip(&other.grad_b) {
            *g += o;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    fn probe(net: &mut MlpNetwork, input: &Array1<f32>) -> Array1<f32> {
        let mut output = Array1::zeros(net.output_size());
        let target = Array1::zeros(net.output_size());
        net.apply_supervised(input.view(), target.view(), &mut output);
        output
    }

    #[test]
    fn test_rejects_degenerate_dims() {
        assert!(MlpNetwork::new(vec![3], Activation::Tanh).is_err());
        assert!(MlpNetwork::new(vec![3, 0, 1], Activation::Tanh).is_err());
    }

    #[test]
    fn test_identity_single_layer_is_affine() {
        let mut net = MlpNetwork::new(vec![2, 2], Activation::Identity).expect("valid dims");
        let input = arr1(&[1.0, -2.0]);
        let expected = net.weights()[0].dot(&input) + &net.biases()[0];
        let out = probe(&mut net, &input);
        for (o, e) in out.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(o, e, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_error_is_squared_distance() {
        let mut net = MlpNetwork::new(vec![2, 1], Activation::Tanh).expect("valid dims");
        let input = arr1(&[0.3, -0.7]);
        let target = arr1(&[1.0]);
        let mut output = Array1::zeros(1);
        let err = net.apply_supervised(input.view(), target.view(), &mut output);
        let diff = target[0] - output[0];
        assert_abs_diff_eq!(err, diff * diff, epsilon = 1e-6);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut net = MlpNetwork::new(vec![2, 3, 1], Activation::Tanh).expect("valid dims");
        let mut replica = net.clone();
        let input = arr1(&[0.5, 0.5]);
        let before = probe(&mut net, &input);

        let target = arr1(&[1.0]);
        let mut output = Array1::zeros(1);
        replica.apply_supervised(input.view(), target.view(), &mut output);
        replica.accumulate_update(&output, target.view(), 0);
        replica.apply_accumulated(0.1);

        // Updating the replica leaves the original's weights untouched.
        let after = probe(&mut net, &input);
        assert_abs_diff_eq!(before[0], after[0], epsilon = 1e-6);
    }

    #[test]
    fn test_gradient_step_reduces_error() {
        let mut net = MlpNetwork::new(vec![1, 4, 1], Activation::Tanh).expect("valid dims");
        let input = arr1(&[0.8]);
        let target = arr1(&[0.5]);
        let mut output = Array1::zeros(1);

        let before = net.apply_supervised(input.view(), target.view(), &mut output);
        for _ in 0..50 {
            net.apply_supervised(input.view(), target.view(), &mut output);
            net.accumulate_update(&output, target.view(), 0);
            net.apply_accumulated(0.05);
        }
        let after = net.apply_supervised(input.view(), target.view(), &mut output);
        assert!(
            after < before,
            "error did not decrease: {} -> {}",
            before,
            after
        );
    }

    #[test]
    fn test_merge_gradient_adds() {
        let mut a = MlpNetwork::new(vec![2, 1], Activation::Identity).expect("valid dims");
        let mut b = a.clone();

        let input = arr1(&[1.0, 2.0]);
        let target = arr1(&[0.0]);
        let mut output = Array1::zeros(1);

        a.apply_supervised(input.view(), target.view(), &mut output);
        a.accumulate_update(&output, target.view(), 0);
        b.apply_supervised(input.view(), target.view(), &mut output);
        b.accumulate_update(&output, target.view(), 0);

        let single = a.weight_gradients()[0].clone();
        a.merge_gradient(&b);
        for (m, s) in a.weight_gradients()[0].iter().zip(single.iter()) {
            assert_abs_diff_eq!(*m, 2.0 * s, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_activation_names_round_trip() {
        assert_eq!(Activation::from_name("tanh").unwrap(), Activation::Tanh);
        assert_eq!(
            Activation::from_name("identity").unwrap(),
            Activation::Identity
        );
        assert!(Activation::from_name("relu").is_err());
    }
}
