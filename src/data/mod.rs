//! Owned sample buffers and the striped partitioning view.
//!
//! ## Submodules
//!
//! - [`patterns`] — Per-class pattern buffers with one-vs-rest target encoding
//!
//! Buffers are sample-major `Array2<f32>`: row `i` is sample `i`. Worker
//! threads never see raw offsets into these buffers; they iterate a
//! [`Stripe`], which owns the residue-class index arithmetic.

pub mod patterns;

pub use patterns::PatternSet;

use crate::core::{TrainError, TrainResult};
use ndarray::{Array2, ArrayView1};

/// An epoch-scoped dataset: paired input and target buffers.
///
/// Rows are samples. Inputs have shape `(events, input_size)`, targets
/// `(events, output_size)`. Construction validates that the row counts
/// match; all later access is by checked row index.
#[derive(Debug, Clone)]
pub struct SampleSet {
    inputs: Array2<f32>,
    targets: Array2<f32>,
}

impl SampleSet {
    /// Create a sample set from paired buffers.
    ///
    /// # Errors
    /// `ShapeMismatch` if the buffers disagree on the number of samples, and
    /// `InvalidConfig` for an empty or zero-width input buffer.
    pub fn new(inputs: Array2<f32>, targets: Array2<f32>) -> TrainResult<Self> {
        if inputs.nrows() != targets.nrows() {
            return Err(TrainError::ShapeMismatch(format!(
                "{} input samples but {} target samples",
                inputs.nrows(),
                targets.nrows()
            )));
        }
        if inputs.nrows() == 0 {
            return Err(TrainError::InvalidConfig(
                "Sample set must contain at least one event".to_string(),
            ));
        }
        if inputs.ncols() == 0 || targets.ncols() == 0 {
            return Err(TrainError::InvalidConfig(
                "Input and target vectors must be non-empty".to_string(),
            ));
        }
        Ok(Self { inputs, targets })
    }

    /// Total number of events.
    pub fn num_events(&self) -> usize {
        self.inputs.nrows()
    }

    /// Feature vector width.
    pub fn input_size(&self) -> usize {
        self.inputs.ncols()
    }

    /// Target vector width.
    pub fn output_size(&self) -> usize {
        self.targets.ncols()
    }

    /// Feature vector of event `i`.
    pub fn input(&self, i: usize) -> ArrayView1<'_, f32> {
        self.inputs.row(i)
    }

    /// Target vector of event `i`.
    pub fn target(&self, i: usize) -> ArrayView1<'_, f32> {
        self.targets.row(i)
    }
}

/// A residue-class partition of sample indices: `offset, offset + step,
/// offset + 2 * step, ...`.
///
/// Worker thread `i` of `t` uses `Stripe::of_thread(i, t)`; together the `t`
/// stripes visit every index exactly once, in strictly increasing order
/// within each stripe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stripe {
    /// First index of the stripe.
    pub offset: usize,
    /// Distance between consecutive indices. Must be non-zero.
    pub step: usize,
}

impl Stripe {
    /// The stripe assigned to worker `index` out of `count`.
    pub fn of_thread(index: usize, count: usize) -> Self {
        debug_assert!(index < count, "thread index out of range");
        Self {
            offset: index,
            step: count.max(1),
        }
    }

    /// Iterate the stripe's indices below `len`.
    pub fn indices(self, len: usize) -> impl Iterator<Item = usize> {
        (self.offset..len).step_by(self.step)
    }
}
