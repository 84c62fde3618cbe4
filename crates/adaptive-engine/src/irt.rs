//! Item Response Theory.
//!
//! Three-parameter logistic model: the probability of a correct answer is
//! `g + (1 - g) * sigmoid(a * (theta - b))`. Ability is updated online with a
//! single gradient step on the log posterior under a normal prior.

use serde::{Deserialize, Serialize};

use crate::model::{Difficulty, McqType};

const PROBABILITY_EPSILON: f64 = 1e-9;
const MIN_DISCRIMINATION: f64 = 0.1;
const MAX_DISCRIMINATION: f64 = 4.0;

/// Item parameters of the 3PL model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrtParams {
    /// Slope `a`.
    pub discrimination: f64,
    /// Location `b`.
    pub difficulty: f64,
    /// Lower asymptote `g`.
    pub guessing: f64,
}

/// Normal prior on ability plus the online step size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrtPrior {
    /// Prior mean of theta.
    pub mean: f64,
    /// Prior variance of theta. Must be positive.
    pub variance: f64,
    /// Gradient step size.
    pub learning_rate: f64,
}

impl Default for IrtPrior {
    fn default() -> Self {
        Self {
            mean: 0.0,
            variance: 4.0,
            learning_rate: 0.75,
        }
    }
}

/// Where a set of item parameters came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamsSource {
    /// Offline calibration, with the stored version label.
    Calibrated {
        /// Version label of the stored row.
        version: String,
    },
    /// Derived from item metadata at answer time.
    Heuristic,
}

impl std::fmt::Display for ParamsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Calibrated { version } => write!(f, "calibrated ({version})"),
            Self::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// Item metadata and answer context used by [`heuristic_params`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemContext {
    /// Answer format.
    pub mcq_type: McqType,
    /// Authored difficulty.
    pub difficulty: Difficulty,
    /// Discrimination baseline.
    pub baseline: Option<f64>,
    /// Expected answering time in seconds.
    pub estimated_time: Option<f64>,
    /// Seconds actually spent.
    pub time_spent: Option<f64>,
}

/// Derive item parameters from metadata when no calibration exists.
///
/// Authored difficulty maps to `b` of -1, 0 or 1. Guessing shrinks when the
/// learner spent at least 1.25x (0.25) or 2x (0.15) the estimated time, from
/// 0.35 otherwise. Discrimination is the baseline, scaled by 0.8 for `qcm`.
#[must_use]
pub fn heuristic_params(ctx: &ItemContext) -> IrtParams {
    let difficulty = match ctx.difficulty {
        Difficulty::Easy => -1.0,
        Difficulty::Medium => 0.0,
        Difficulty::Hard => 1.0,
    };

    let mut guessing = 0.35;
    if let (Some(estimated), Some(spent)) = (ctx.estimated_time, ctx.time_spent) {
        if estimated > 0.0 {
            let ratio = spent / estimated;
            if ratio >= 2.0 {
                guessing = 0.15;
            } else if ratio >= 1.25 {
                guessing = 0.25;
            }
        }
    }

    let baseline = ctx.baseline.filter(|b| b.is_finite()).unwrap_or(1.0);
    let discrimination = match ctx.mcq_type {
        McqType::Qcm => baseline * 0.8,
        McqType::Qcs | McqType::Qroc => baseline,
    };

    IrtParams {
        discrimination,
        difficulty,
        guessing,
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Replace non-finite values and clamp parameters into their valid ranges.
fn sanitize(params: &IrtParams) -> IrtParams {
    let finite_or = |value: f64, fallback: f64| if value.is_finite() { value } else { fallback };
    IrtParams {
        discrimination: finite_or(params.discrimination, 1.0)
            .clamp(MIN_DISCRIMINATION, MAX_DISCRIMINATION),
        difficulty: finite_or(params.difficulty, 0.0),
        guessing: finite_or(params.guessing, 0.2).clamp(0.0, 1.0),
    }
}

/// Probability of a correct answer at ability `theta`.
#[must_use]
pub fn probability_correct(theta: f64, params: &IrtParams) -> f64 {
    let p = sanitize(params);
    let theta = if theta.is_finite() { theta } else { 0.0 };
    p.guessing + (1.0 - p.guessing) * sigmoid(p.discrimination * (theta - p.difficulty))
}

/// One MAP gradient step on ability after observing an answer.
///
/// A non-finite result returns the input ability unchanged.
#[must_use]
pub fn update_ability(theta: f64, params: &IrtParams, correct: bool, prior: &IrtPrior) -> f64 {
    let theta = if theta.is_finite() { theta } else { 0.0 };
    let p = sanitize(params);

    let response = if correct { 1.0 } else { 0.0 };
    let logistic = sigmoid(p.discrimination * (theta - p.difficulty));
    let probability = (p.guessing + (1.0 - p.guessing) * logistic)
        .clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
    let d_p_d_theta = (1.0 - p.guessing) * p.discrimination * logistic * (1.0 - logistic);

    let grad_likelihood =
        (response - probability) * (d_p_d_theta / (probability * (1.0 - probability)));
    let grad_prior = -(theta - prior.mean) / prior.variance;
    let updated = theta + prior.learning_rate * (grad_likelihood + grad_prior);

    if updated.is_finite() {
        updated
    } else {
        theta
    }
}
