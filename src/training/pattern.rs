//! Pattern-recognition epoch driver.
//!
//! Iterates labeled multi-class patterns in pattern-major, sample-minor
//! order and produces one scalar per epoch. Each class is weighted by
//! `1 / (num_patterns * events_in_class)` so that classes contribute equally
//! to the epoch error regardless of how many events they hold.
//!
//! With the SP stopping criterion active, validation epochs capture every
//! sample's first output component per class and return the SP
//! signal/noise separation score instead of the weighted error.

use crate::core::{SupervisedNetwork, TrainError, TrainResult};
use crate::data::PatternSet;
use log::{debug, info, trace};
use ndarray::Array1;

/// Step of the SP decision-threshold scan.
const SP_RESOLUTION: f32 = 0.001;

/// Epoch driver over a [`PatternSet`], with optional SP validation.
///
/// The driver defines the single-replica semantics of "one training pass"
/// and "one validation pass"; it is what a replicated setup runs per
/// replica, and it owns the best-network bookkeeping for both stopping
/// criteria.
#[derive(Debug, Clone)]
pub struct PatternRecognition {
    patterns: PatternSet,
    use_sp: bool,
    /// Per-class validation outputs, rewritten every validation pass.
    /// Only allocated in SP mode, where the output layer is a single unit.
    epoch_val_outputs: Vec<Vec<f32>>,
    best_goal: f32,
}

impl PatternRecognition {
    /// Create a driver over `patterns`.
    ///
    /// `use_sp` selects the SP separation score as the validation result and
    /// stopping criterion; it requires exactly two pattern classes.
    ///
    /// # Errors
    /// `InvalidConfig` if SP mode is requested with more than two classes.
    pub fn new(patterns: PatternSet, use_sp: bool) -> TrainResult<Self> {
        if use_sp && patterns.num_patterns() != 2 {
            return Err(TrainError::InvalidConfig(format!(
                "SP validation requires exactly two pattern classes, got {}",
                patterns.num_patterns()
            )));
        }
        debug!(
            "pattern recognition driver: {} classes, SP criterion {}",
            patterns.num_patterns(),
            if use_sp { "on" } else { "off" }
        );

        let epoch_val_outputs = if use_sp {
            (0..patterns.num_patterns())
                .map(|pat| vec![0.0; patterns.val_events(pat)])
                .collect()
        } else {
            Vec::new()
        };
        let best_goal = if use_sp { 0.0 } else { f32::INFINITY };

        Ok(Self {
            patterns,
            use_sp,
            epoch_val_outputs,
            best_goal,
        })
    }

    /// The dataset this driver iterates.
    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Whether validation returns the SP score.
    pub fn uses_sp(&self) -> bool {
        self.use_sp
    }

    /// Best goal value seen so far by [`Self::is_best_network`].
    pub fn best_goal(&self) -> f32 {
        self.best_goal
    }

    /// Verify that the network's layer widths match the dataset.
    ///
    /// # Errors
    /// `ShapeMismatch`; this is the fatal precondition checked before any
    /// training begins.
    pub fn check_compatible<N: SupervisedNetwork>(&self, net: &N) -> TrainResult<()> {
        if net.input_size() != self.patterns.input_size() {
            return Err(TrainError::ShapeMismatch(format!(
                "Input events (size {}) do not match the network input layer size {}",
                self.patterns.input_size(),
                net.input_size()
            )));
        }
        if net.output_size() != self.patterns.output_size() {
            return Err(TrainError::ShapeMismatch(format!(
                "Target encoding (size {}) does not match the network output layer size {}",
                self.patterns.output_size(),
                net.output_size()
            )));
        }
        Ok(())
    }

    /// Run one training epoch: apply every training sample of every class,
    /// accumulate the class-weighted error, and drive the network's weight
    /// update per sample (with the pattern index, for per-class update
    /// policies). Returns the weighted error sum.
    pub fn train_epoch<N: SupervisedNetwork>(&self, net: &mut N) -> f32 {
        let mut output = Array1::zeros(self.patterns.output_size());
        let mut epoch_error = 0.0f32;

        for pat in 0..self.patterns.num_patterns() {
            let events = self.patterns.train_events(pat);
            let w_factor = 1.0 / (self.patterns.num_patterns() * events) as f32;
            let target = self.patterns.target(pat);
            trace!("training pattern {} with weighting factor {}", pat, w_factor);

            let inputs = self.patterns.train_pattern(pat);
            for input in inputs.outer_iter() {
                epoch_error += w_factor * net.apply_supervised(input, target, &mut output);
                net.accumulate_update(&output, target, pat);
            }
        }

        epoch_error
    }

    /// Run one validation epoch: same iteration and weighting as training,
    /// no weight updates. In SP mode the per-class outputs are captured and
    /// the SP score is returned instead of the weighted error.
    pub fn validate_epoch<N: SupervisedNetwork>(&mut self, net: &mut N) -> f32 {
        let mut output = Array1::zeros(self.patterns.output_size());
        let mut epoch_error = 0.0f32;

        for pat in 0..self.patterns.num_patterns() {
            let events = self.patterns.val_events(pat);
            let w_factor = 1.0 / (self.patterns.num_patterns() * events) as f32;
            let target = self.patterns.target(pat);
            trace!("validating pattern {} with weighting factor {}", pat, w_factor);

            let inputs = self.patterns.val_pattern(pat);
            for (i, input) in inputs.outer_iter().enumerate() {
                epoch_error += w_factor * net.apply_supervised(input, target, &mut output);
                if self.use_sp {
                    self.epoch_val_outputs[pat][i] = output[0];
                }
            }
        }

        if self.use_sp {
            self.separation()
        } else {
            epoch_error
        }
    }

    /// SP separation score over the captured validation outputs.
    ///
    /// The class with the greater first target component is the signal. A
    /// decision threshold scans from the noise target to the signal target;
    /// at each position the score is
    /// `((sig_eff + noise_eff) / 2) * sqrt(sig_eff * noise_eff)` and the
    /// maximum over the scan is returned. Always within [0, 1].
    fn separation(&self) -> f32 {
        // Exactly two classes, enforced at construction.
        let (sig, noise) = if self.patterns.target(0)[0] > self.patterns.target(1)[0] {
            (0, 1)
        } else {
            (1, 0)
        };
        let signal_outputs = &self.epoch_val_outputs[sig];
        let noise_outputs = &self.epoch_val_outputs[noise];
        let signal_target = self.patterns.target(sig)[0];
        let noise_target = self.patterns.target(noise)[0];

        let mut best = 0.0f32;
        let mut pos = noise_target;
        while pos < signal_target {
            let sig_eff = signal_outputs.iter().filter(|&&o| o >= pos).count() as f32
                / signal_outputs.len() as f32;
            let noise_eff = noise_outputs.iter().filter(|&&o| o < pos).count() as f32
                / noise_outputs.len() as f32;
            let score = ((sig_eff + noise_eff) / 2.0) * (sig_eff * noise_eff).sqrt();
            if score > best {
                best = score;
            }
            pos += SP_RESOLUTION;
        }
        best
    }

    /// Record `goal` if it beats the best seen so far and report whether it
    /// did. SP scores replace on strictly greater; plain errors replace on
    /// strictly lower.
    pub fn is_best_network(&mut self, goal: f32) -> bool {
        let improved = if self.use_sp {
            goal > self.best_goal
        } else {
            goal < self.best_goal
        };
        if improved {
            self.best_goal = goal;
        }
        improved
    }

    /// Log a summary of the dataset and the planned run.
    pub fn log_summary(&self, epochs: usize) {
        info!("Training data information (pattern recognition optimized network)");
        info!("Number of epochs                : {}", epochs);
        info!("Using SP stopping criterion     : {}", self.use_sp);
        for pat in 0..self.patterns.num_patterns() {
            info!("Information for pattern {}:", pat + 1);
            info!(
                "Total number of training events : {}",
                self.patterns.train_events(pat)
            );
            info!(
                "Total number of validating events: {}",
                self.patterns.val_events(pat)
            );
        }
    }

    /// Log one epoch's training and validation results.
    pub fn log_epoch(&self, epoch: usize, trn_error: f32, val_error: f32) {
        if self.use_sp {
            info!(
                "Epoch {:>5}: mse (train) = {:.6}, SP (val) = {:.6}",
                epoch, trn_error, val_error
            );
        } else {
            info!(
                "Epoch {:>5}: mse (train) = {:.6}, mse (val) = {:.6}",
                epoch, trn_error, val_error
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr2, Array2};

    fn sp_driver(signal_val: usize, noise_val: usize) -> PatternRecognition {
        let train = vec![arr2(&[[1.0f32]]), arr2(&[[-1.0f32]])];
        let val = vec![
            Array2::from_elem((signal_val, 1), 1.0f32),
            Array2::from_elem((noise_val, 1), -1.0f32),
        ];
        PatternRecognition::new(PatternSet::new(train, val).expect("valid"), true)
            .expect("two classes")
    }

    #[test]
    fn test_separation_perfect_outputs() {
        let mut driver = sp_driver(4, 4);
        driver.epoch_val_outputs[0] = vec![1.0; 4];
        driver.epoch_val_outputs[1] = vec![-1.0; 4];
        assert_abs_diff_eq!(driver.separation(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_separation_useless_outputs_bounded() {
        let mut driver = sp_driver(4, 4);
        // Identical output distributions for both classes.
        driver.epoch_val_outputs[0] = vec![0.1, -0.2, 0.3, -0.4];
        driver.epoch_val_outputs[1] = vec![0.1, -0.2, 0.3, -0.4];
        let score = driver.separation();
        assert!((0.0..=1.0).contains(&score), "score = {}", score);
        assert!(score < 1.0);
    }

    #[test]
    fn test_sp_requires_two_classes() {
        let buf = || arr2(&[[0.0f32, 0.0]]);
        let set =
            PatternSet::new(vec![buf(), buf(), buf()], vec![buf(), buf(), buf()]).expect("valid");
        assert!(PatternRecognition::new(set.clone(), true).is_err());
        assert!(PatternRecognition::new(set, false).is_ok());
    }

    #[test]
    fn test_best_tracking_sp_mode() {
        let mut driver = sp_driver(1, 1);
        assert!(driver.is_best_network(0.5));
        assert!(!driver.is_best_network(0.5));
        assert!(!driver.is_best_network(0.2));
        assert!(driver.is_best_network(0.9));
        assert_abs_diff_eq!(driver.best_goal(), 0.9);
    }

    #[test]
    fn test_best_tracking_error_mode() {
        let train = vec![arr2(&[[1.0f32]]), arr2(&[[-1.0f32]])];
        let val = vec![arr2(&[[1.0f32]]), arr2(&[[-1.0f32]])];
        let mut driver =
            PatternRecognition::new(PatternSet::new(train, val).expect("valid"), false)
                .expect("driver");
        assert!(driver.is_best_network(0.8));
        assert!(!driver.is_best_network(0.8));
        assert!(driver.is_best_network(0.3));
        assert!(!driver.is_best_network(0.9));
    }
}
