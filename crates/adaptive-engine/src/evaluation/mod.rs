//! Offline evaluation of knowledge-tracing models.
//!
//! Attempt history is split per user in time order. Each predictor warms up
//! on the train and validation parts, then forecasts the test part one
//! attempt at a time, learning from each outcome after scoring it.
//!
//! # Example
//!
//! ```
//! use adaptive_engine::evaluation::{auc, brier};
//!
//! let labels = [Some(false), Some(true)];
//! assert_eq!(auc(&labels, &[0.2, 0.9]), Some(1.0));
//! assert!(brier(&labels, &[0.2, 0.9]) < 0.05);
//! ```

mod harness;
mod metrics;
mod predictors;

pub use harness::{run_evaluation, time_aware_split, ModelScore, Scorecard, Split, SplitSizes};
pub use metrics::{auc, brier, ece, log_loss, Metrics};
pub use predictors::{BktOneSkill, IrtOnline, MovingAverage, Predictor};

/// Whether a success ratio counts as a success.
#[must_use]
pub fn binarize(success_ratio: f64, threshold: f64) -> bool {
    success_ratio >= threshold
}
