//! Per-class pattern buffers and the one-vs-rest target encoding.
//!
//! A [`PatternSet`] holds one training and one validation buffer per pattern
//! class, plus the generated target matrix. Targets are maximally sparse:
//! class `i` gets `-1` in every slot except slot `i`, which is `+1`. With
//! exactly two classes the encoding collapses to a single output, `+1` for
//! class 0 and `-1` for class 1.

use super::SampleSet;
use crate::core::{TrainError, TrainResult};
use log::debug;
use ndarray::{Array2, ArrayView1, ArrayView2};

/// Labeled multi-class dataset for pattern-recognition training.
#[derive(Debug, Clone)]
pub struct PatternSet {
    train: Vec<Array2<f32>>,
    val: Vec<Array2<f32>>,
    /// Row `i` is the target vector of class `i`.
    targets: Array2<f32>,
    input_size: usize,
    output_size: usize,
}

impl PatternSet {
    /// Build a pattern set from per-class training and validation buffers
    /// (sample-major, one row per event).
    ///
    /// # Errors
    /// `InvalidConfig` if the training and validation class counts differ,
    /// there are fewer than two classes, or any class buffer is empty;
    /// `ShapeMismatch` if input dimensionality differs between buffers.
    pub fn new(train: Vec<Array2<f32>>, val: Vec<Array2<f32>>) -> TrainResult<Self> {
        if train.len() != val.len() {
            return Err(TrainError::InvalidConfig(format!(
                "Number of training and validating patterns are not equal: {} vs {}",
                train.len(),
                val.len()
            )));
        }
        let num_patterns = train.len();
        if num_patterns < 2 {
            return Err(TrainError::InvalidConfig(
                "Pattern recognition needs at least two pattern classes".to_string(),
            ));
        }

        let input_size = train[0].ncols();
        for (i, (trn, val)) in train.iter().zip(val.iter()).enumerate() {
            if trn.ncols() != val.ncols() {
                return Err(TrainError::ShapeMismatch(format!(
                    "Training and validating event dimensions differ for pattern {}",
                    i
                )));
            }
            if trn.ncols() != input_size {
                return Err(TrainError::ShapeMismatch(format!(
                    "Event dimension of pattern {} does not match pattern 0",
                    i
                )));
            }
            if trn.nrows() == 0 || val.nrows() == 0 {
                return Err(TrainError::InvalidConfig(format!(
                    "Pattern {} has no events",
                    i
                )));
            }
            debug!(
                "pattern {}: {} training events, {} validating events",
                i,
                trn.nrows(),
                val.nrows()
            );
        }

        let output_size = if num_patterns == 2 { 1 } else { num_patterns };
        let mut targets = Array2::from_elem((num_patterns, output_size), -1.0f32);
        if num_patterns == 2 {
            // Single-output collapse: class 0 is +1, class 1 stays -1.
            targets[[0, 0]] = 1.0;
        } else {
            for i in 0..num_patterns {
                targets[[i, i]] = 1.0;
            }
        }
        debug!(
            "pattern set ready: {} classes, input dimension {}, output dimension {}",
            num_patterns, input_size, output_size
        );

        Ok(Self {
            train,
            val,
            targets,
            input_size,
            output_size,
        })
    }

    /// Number of pattern classes.
    pub fn num_patterns(&self) -> usize {
        self.train.len()
    }

    /// Feature vector width shared by all classes.
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Target vector width: 1 for two classes, `num_patterns` otherwise.
    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// Target vector of class `pat`.
    pub fn target(&self, pat: usize) -> ArrayView1<'_, f32> {
        self.targets.row(pat)
    }

    /// Number of training events in class `pat`.
    pub fn train_events(&self, pat: usize) -> usize {
        self.train[pat].nrows()
    }

    /// Number of validation events in class `pat`.
    pub fn val_events(&self, pat: usize) -> usize {
        self.val[pat].nrows()
    }

    /// Training buffer of class `pat`.
    pub fn train_pattern(&self, pat: usize) -> ArrayView2<'_, f32> {
        self.train[pat].view()
    }

    /// Validation buffer of class `pat`.
    pub fn val_pattern(&self, pat: usize) -> ArrayView2<'_, f32> {
        self.val[pat].view()
    }

    /// Flatten the training buffers into one contiguous [`SampleSet`]
    /// (pattern-major, each event paired with its class target).
    pub fn flatten_training(&self) -> SampleSet {
        self.flatten(&self.train)
    }

    /// Flatten the validation buffers into one contiguous [`SampleSet`].
    pub fn flatten_validation(&self) -> SampleSet {
        self.flatten(&self.val)
    }

    fn flatten(&self, buffers: &[Array2<f32>]) -> SampleSet {
        let total: usize = buffers.iter().map(|b| b.nrows()).sum();
        let mut inputs = Array2::zeros((total, self.input_size));
        let mut targets = Array2::zeros((total, self.output_size));
        let mut row = 0;
        for (pat, buf) in buffers.iter().enumerate() {
            let target = self.targets.row(pat);
            for sample in buf.outer_iter() {
                inputs.row_mut(row).assign(&sample);
                targets.row_mut(row).assign(&target);
                row += 1;
            }
        }
        // Construction invariants guarantee the buffers line up.
        SampleSet { inputs, targets }
    }
}
