//! Checkpoint save/load for the reference network.
//!
//! Serializes an [`MlpNetwork`]'s dimensions, activation name, and
//! parameters to JSON, together with epoch and best-goal metadata so a
//! training run can resume its stopping criterion. Gradient accumulators
//! are deliberately not persisted; a loaded network starts an epoch clean.

use crate::core::{Activation, MlpNetwork, TrainError, TrainResult};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Serializable checkpoint payload.
///
/// Weight matrices are stored flat in row-major order; their shapes are
/// implied by `dims`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckpointData {
    /// Network layer dimensions, input first.
    pub dims: Vec<usize>,
    /// Name of the layer activation ("identity" or "tanh").
    pub activation_name: String,
    /// Flattened weight matrices, one per layer transition.
    pub weights: Vec<Vec<f32>>,
    /// Bias vectors, one per non-input layer.
    pub biases: Vec<Vec<f32>>,
    /// Epoch at which this checkpoint was saved.
    pub epoch: usize,
    /// Best goal value at checkpoint time (SP score or validation error).
    pub best_goal: f32,
}

fn checkpoint_err(context: &str, e: impl std::fmt::Display) -> TrainError {
    TrainError::Checkpoint(format!("{}: {}", context, e))
}

/// Save a network checkpoint to a JSON file, creating parent directories as
/// needed.
///
/// # Errors
/// `Checkpoint` if the file cannot be written or the data cannot be
/// serialized.
pub fn save_checkpoint(
    net: &MlpNetwork,
    path: &Path,
    epoch: usize,
    best_goal: f32,
) -> TrainResult<()> {
    let data = CheckpointData {
        dims: net.dims().to_vec(),
        activation_name: net.activation().name().to_string(),
        weights: net
            .weights()
            .iter()
            .map(|w| w.iter().copied().collect())
            .collect(),
        biases: net.biases().iter().map(|b| b.to_vec()).collect(),
        epoch,
        best_goal,
    };

    let json = serde_json::to_string_pretty(&data)
        .map_err(|e| checkpoint_err("Failed to serialize checkpoint", e))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| checkpoint_err("Failed to create checkpoint directory", e))?;
    }

    std::fs::write(path, json)
        .map_err(|e| checkpoint_err(&format!("Failed to write {}", path.display()), e))
}

/// Load a network checkpoint from a JSON file.
///
/// # Errors
/// `Checkpoint` if the file cannot be read or parsed; `ShapeMismatch` or
/// `InvalidConfig` if the stored parameters are inconsistent with `dims`.
pub fn load_checkpoint(path: &Path) -> TrainResult<(CheckpointData, MlpNetwork)> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| checkpoint_err(&format!("Failed to read {}", path.display()), e))?;
    let data: CheckpointData =
        serde_json::from_str(&json).map_err(|e| checkpoint_err("Failed to parse checkpoint", e))?;

    let activation = Activation::from_name(&data.activation_name)?;

    let mut weights = Vec::with_capacity(data.weights.len());
    for (l, flat) in data.weights.iter().enumerate() {
        if l + 1 >= data.dims.len() {
            return Err(TrainError::ShapeMismatch(
                "More weight layers than dimensions".to_string(),
            ));
        }
        let shape = (data.dims[l + 1], data.dims[l]);
        let w = Array2::from_shape_vec(shape, flat.clone())
            .map_err(|e| checkpoint_err(&format!("Bad weight shape for layer {}", l), e))?;
        weights.push(w);
    }
    let biases: Vec<Array1<f32>> = data.biases.iter().map(|b| Array1::from(b.clone())).collect();

    let net = MlpNetwork::from_parts(data.dims.clone(), activation, weights, biases)?;
    Ok((data, net))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn make_test_network() -> MlpNetwork {
        MlpNetwork::new(vec![4, 3, 2], Activation::Tanh).expect("valid dims")
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let net = make_test_network();
        let dir = std::env::temp_dir().join("stripetrain_checkpoint_test");
        let path = dir.join("round_trip.json");

        save_checkpoint(&net, &path, 7, 0.83).expect("save");
        let (data, loaded) = load_checkpoint(&path).expect("load");

        assert_eq!(data.epoch, 7);
        assert_abs_diff_eq!(data.best_goal, 0.83);
        assert_eq!(loaded.dims(), net.dims());
        assert_eq!(loaded.activation(), Activation::Tanh);
        for (original, restored) in net.weights().iter().zip(loaded.weights()) {
            assert_eq!(original.dim(), restored.dim());
            for (a, b) in original.iter().zip(restored.iter()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-6);
            }
        }
        for (original, restored) in net.biases().iter().zip(loaded.biases()) {
            for (a, b) in original.iter().zip(restored.iter()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-6);
            }
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_checkpoint_creates_parent_directories() {
        let dir = std::env::temp_dir()
            .join("stripetrain_checkpoint_nested")
            .join("deep");
        let path = dir.join("checkpoint.json");

        save_checkpoint(&make_test_network(), &path, 0, 0.0).expect("save");
        assert!(path.exists());

        let _ = std::fs::remove_dir_all(std::env::temp_dir().join("stripetrain_checkpoint_nested"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(load_checkpoint(Path::new("/nonexistent/checkpoint.json")).is_err());
    }

    #[test]
    fn test_load_rejects_unknown_activation() {
        let dir = std::env::temp_dir().join("stripetrain_checkpoint_badact");
        let path = dir.join("bad.json");
        save_checkpoint(&make_test_network(), &path, 0, 0.0).expect("save");

        let json = std::fs::read_to_string(&path)
            .expect("read")
            .replace("tanh", "softmax");
        std::fs::write(&path, json).expect("write");
        assert!(load_checkpoint(&path).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
