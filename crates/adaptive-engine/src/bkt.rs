//! Bayesian Knowledge Tracing.
//!
//! Mastery is the probability that a learner has acquired a skill. Each
//! graded observation conditions that probability on the answer and then
//! applies the chance of learning from the opportunity.

use serde::{Deserialize, Serialize};
use tracing::debug;

const EPSILON: f64 = 1e-12;

/// BKT parameters with optional components.
///
/// Missing components fall back to a wider scope: knowledge component, then
/// course, then configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BktParams {
    /// P(correct | not mastered).
    pub guessing: Option<f64>,
    /// P(incorrect | mastered).
    pub slipping: Option<f64>,
    /// P(mastered after the opportunity | not mastered before).
    pub learning_rate: Option<f64>,
}

impl BktParams {
    /// Fill missing components from `fallback`.
    #[must_use]
    pub fn or(self, fallback: &BktParams) -> Self {
        Self {
            guessing: self.guessing.or(fallback.guessing),
            slipping: self.slipping.or(fallback.slipping),
            learning_rate: self.learning_rate.or(fallback.learning_rate),
        }
    }

    /// Substitute `defaults` for missing components.
    ///
    /// Explicit zeros are kept.
    #[must_use]
    pub fn resolve(self, defaults: &ResolvedBkt) -> ResolvedBkt {
        ResolvedBkt {
            guessing: self.guessing.unwrap_or(defaults.guessing),
            slipping: self.slipping.unwrap_or(defaults.slipping),
            learning_rate: self.learning_rate.unwrap_or(defaults.learning_rate),
        }
    }
}

/// Fully specified BKT parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedBkt {
    /// P(correct | not mastered).
    pub guessing: f64,
    /// P(incorrect | mastered).
    pub slipping: f64,
    /// P(learn).
    pub learning_rate: f64,
}

impl Default for ResolvedBkt {
    fn default() -> Self {
        Self {
            guessing: 0.2,
            slipping: 0.1,
            learning_rate: 0.3,
        }
    }
}

/// Which update order to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BktVariant {
    /// Learning step first, then conditioning on the answer.
    #[default]
    Legacy,
    /// Conditioning on the answer first, then the learning step, with clamps.
    Corrected,
}

impl BktVariant {
    /// Pick the variant from the `corrected` feature flag.
    #[must_use]
    pub fn from_flag(corrected: bool) -> Self {
        if corrected {
            Self::Corrected
        } else {
            Self::Legacy
        }
    }
}

/// What the grader reported for one attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Binary verdict. `None` leaves mastery untouched.
    pub is_correct: Option<bool>,
    /// Graded accuracy in [0, 1], if any.
    pub accuracy: Option<f64>,
}

impl Observation {
    /// Observation with a verdict and an accuracy signal.
    #[must_use]
    pub fn new(is_correct: bool, accuracy: Option<f64>) -> Self {
        Self {
            is_correct: Some(is_correct),
            accuracy,
        }
    }
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Update a mastery estimate with one observation.
///
/// The result is always within [0, 1]. A missing verdict returns the prior.
#[must_use]
pub fn update_mastery(
    prior: f64,
    params: &ResolvedBkt,
    observation: &Observation,
    variant: BktVariant,
) -> f64 {
    let prior = if prior.is_finite() { clamp01(prior) } else { 0.0 };
    let Some(correct) = observation.is_correct else {
        debug!("BKT skip: missing correctness");
        return prior;
    };

    match variant {
        BktVariant::Legacy => legacy_update(prior, params, correct),
        BktVariant::Corrected => {
            if observation.accuracy.is_some_and(f64::is_nan) {
                debug!("BKT skip: NaN accuracy");
                return prior;
            }
            corrected_update(prior, params, correct)
        }
    }
}

fn legacy_update(mastery: f64, params: &ResolvedBkt, correct: bool) -> f64 {
    let ResolvedBkt {
        guessing,
        slipping,
        learning_rate,
    } = *params;
    let learned = mastery + (1.0 - mastery) * learning_rate;

    let (numerator, denominator) = if correct {
        let numerator = learned * (1.0 - slipping);
        (numerator, numerator + (1.0 - learned) * guessing)
    } else {
        let numerator = learned * slipping;
        (numerator, numerator + (1.0 - learned) * (1.0 - guessing))
    };

    if denominator > 0.0 && denominator.is_finite() {
        clamp01(numerator / denominator)
    } else {
        clamp01(learned)
    }
}

fn corrected_update(mastery: f64, params: &ResolvedBkt, correct: bool) -> f64 {
    let s = clamp01(params.slipping);
    let g = clamp01(params.guessing);
    let t = clamp01(params.learning_rate);

    let posterior = if correct {
        let p_correct = mastery * (1.0 - s) + (1.0 - mastery) * g;
        mastery * (1.0 - s) / p_correct.max(EPSILON)
    } else {
        let p_incorrect = mastery * s + (1.0 - mastery) * (1.0 - g);
        mastery * s / p_incorrect.max(EPSILON)
    };

    clamp01(posterior + (1.0 - posterior) * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn params(s: f64, g: f64, t: f64) -> ResolvedBkt {
        ResolvedBkt {
            guessing: g,
            slipping: s,
            learning_rate: t,
        }
    }

    #[test]
    fn test_corrected_correct_then_incorrect() {
        let p = params(0.1, 0.2, 0.3);
        let p0 = 0.3;
        let p1 = update_mastery(p0, &p, &Observation::new(true, Some(1.0)), BktVariant::Corrected);
        let p2 = update_mastery(p1, &p, &Observation::new(false, Some(0.0)), BktVariant::Corrected);
        assert!(p1 > p0);
        assert!(p2 <= p1);
        assert!(p2 >= 0.0);
    }

    #[test]
    fn test_corrected_known_value() {
        // pC = 0.3*0.9 + 0.7*0.2 = 0.41; post = 0.27/0.41; result = post + (1-post)*0.3
        let p = params(0.1, 0.2, 0.3);
        let out = update_mastery(0.3, &p, &Observation::new(true, None), BktVariant::Corrected);
        let post = 0.27 / 0.41;
        assert!((out - (post + (1.0 - post) * 0.3)).abs() < 1e-12);
    }

    #[test]
    fn test_legacy_known_value() {
        // learned = 0.2 + 0.8*0.3 = 0.44; correct: 0.44*0.9 / (0.396 + 0.56*0.2)
        let p = params(0.1, 0.2, 0.3);
        let out = update_mastery(0.2, &p, &Observation::new(true, Some(1.0)), BktVariant::Legacy);
        assert!((out - 0.396 / (0.396 + 0.112)).abs() < 1e-12);
    }

    #[test]
    fn test_outputs_stay_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let p = params(rng.gen(), rng.gen(), rng.gen());
            let obs = Observation::new(rng.gen_bool(0.5), Some(rng.gen()));
            for variant in [BktVariant::Legacy, BktVariant::Corrected] {
                let out = update_mastery(rng.gen(), &p, &obs, variant);
                assert!((0.0..=1.0).contains(&out), "{variant:?} produced {out}");
            }
        }
    }

    #[test]
    fn test_zero_slip_and_zero_guess_are_respected() {
        let prior = 0.4;
        let t = 0.2;
        let zero_slip = update_mastery(
            prior,
            &params(0.0, 0.2, t),
            &Observation::new(true, None),
            BktVariant::Corrected,
        );
        let zero_guess = update_mastery(
            prior,
            &params(0.2, 0.0, t),
            &Observation::new(false, None),
            BktVariant::Corrected,
        );
        assert!(zero_slip > prior);
        assert!(zero_guess <= prior + (1.0 - prior) * t);
    }

    #[test]
    fn test_zero_is_not_replaced_by_default() {
        let explicit = BktParams {
            guessing: Some(0.0),
            slipping: None,
            learning_rate: None,
        };
        let resolved = explicit.resolve(&ResolvedBkt::default());
        assert_eq!(resolved.guessing, 0.0);
        assert_eq!(resolved.slipping, 0.1);
    }

    #[test]
    fn test_missing_correctness_keeps_state() {
        let obs = Observation {
            is_correct: None,
            accuracy: Some(0.9),
        };
        let out = update_mastery(0.5, &ResolvedBkt::default(), &obs, BktVariant::Corrected);
        assert_eq!(out, 0.5);
    }

    #[test]
    fn test_nan_accuracy_skips_corrected_update() {
        let obs = Observation::new(true, Some(f64::NAN));
        let out = update_mastery(0.35, &ResolvedBkt::default(), &obs, BktVariant::Corrected);
        assert_eq!(out, 0.35);
    }

    #[test]
    fn test_component_params_win_over_course() {
        let course = BktParams {
            guessing: Some(0.25),
            slipping: Some(0.2),
            learning_rate: Some(0.3),
        };
        let component = BktParams {
            guessing: Some(0.2),
            slipping: Some(0.1),
            learning_rate: Some(0.25),
        };
        let defaults = ResolvedBkt::default();
        let obs = Observation::new(true, Some(1.0));

        let with_component = update_mastery(
            0.3,
            &component.or(&course).resolve(&defaults),
            &obs,
            BktVariant::Corrected,
        );
        let course_only = update_mastery(
            0.3,
            &BktParams::default().or(&course).resolve(&defaults),
            &obs,
            BktVariant::Corrected,
        );
        assert!((with_component - course_only).abs() > 1e-6);
    }

    #[test]
    fn test_partial_override_merges_fields() {
        let component = BktParams {
            guessing: None,
            slipping: Some(0.05),
            learning_rate: None,
        };
        let course = BktParams {
            guessing: Some(0.3),
            slipping: Some(0.2),
            learning_rate: None,
        };
        let merged = component.or(&course);
        assert_eq!(merged.guessing, Some(0.3));
        assert_eq!(merged.slipping, Some(0.05));
        assert_eq!(merged.learning_rate, None);
    }

    #[test]
    fn test_legacy_zero_denominator_falls_back_to_learned() {
        // Certain mastery with certain slip: the correct branch divides 0 by 0.
        let out = update_mastery(
            1.0,
            &params(1.0, 0.0, 0.0),
            &Observation::new(true, None),
            BktVariant::Legacy,
        );
        assert_eq!(out, 1.0);
    }

    #[test]
    fn test_variant_from_flag() {
        assert_eq!(BktVariant::from_flag(true), BktVariant::Corrected);
        assert_eq!(BktVariant::from_flag(false), BktVariant::Legacy);
    }
}
