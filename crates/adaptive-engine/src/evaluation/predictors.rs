//! Online predictors replayed over attempt history.

use std::collections::{HashMap, VecDeque};

use crate::bkt::{update_mastery, BktVariant, Observation, ResolvedBkt};
use crate::irt::{
    heuristic_params, probability_correct, update_ability, IrtParams, IrtPrior, ItemContext,
};
use crate::model::{Attempt, Item};

use super::binarize;

/// A model that forecasts the next answer and then learns from it.
pub trait Predictor {
    /// Name reported in the scorecard.
    fn name(&self) -> &str;

    /// Probability that `attempt` is a success, before seeing its outcome.
    fn predict(&self, attempt: &Attempt) -> f64;

    /// Learn from the graded `attempt`.
    fn update(&mut self, attempt: &Attempt);
}

/// Mean of the user's last `window` binarized outcomes.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: usize,
    threshold: f64,
    history: HashMap<String, VecDeque<bool>>,
}

impl MovingAverage {
    /// Forecast returned for a user with no history.
    pub const COLD_START: f64 = 0.5;

    /// Create a predictor over the last `window` outcomes (at least one).
    #[must_use]
    pub fn new(window: usize, threshold: f64) -> Self {
        Self {
            window: window.max(1),
            threshold,
            history: HashMap::new(),
        }
    }
}

impl Predictor for MovingAverage {
    fn name(&self) -> &str {
        "Baseline-MA"
    }

    fn predict(&self, attempt: &Attempt) -> f64 {
        match self.history.get(&attempt.user_id) {
            Some(outcomes) if !outcomes.is_empty() => {
                let hits = outcomes.iter().filter(|&&hit| hit).count();
                hits as f64 / outcomes.len() as f64
            }
            _ => Self::COLD_START,
        }
    }

    fn update(&mut self, attempt: &Attempt) {
        let Some(ratio) = attempt.success_ratio else {
            return;
        };
        let outcomes = self.history.entry(attempt.user_id.clone()).or_default();
        outcomes.push_back(binarize(ratio, self.threshold));
        while outcomes.len() > self.window {
            outcomes.pop_front();
        }
    }
}

/// Single-skill BKT per (user, course).
///
/// Predictions are the probability of a correct answer given the current
/// mastery, not the mastery itself.
#[derive(Debug, Clone)]
pub struct BktOneSkill {
    name: &'static str,
    variant: BktVariant,
    params: ResolvedBkt,
    initial: f64,
    threshold: f64,
    mastery: HashMap<(String, String), f64>,
}

impl BktOneSkill {
    /// Create a tracer with the given update order.
    #[must_use]
    pub fn new(variant: BktVariant, params: ResolvedBkt, initial: f64, threshold: f64) -> Self {
        let name = match variant {
            BktVariant::Legacy => "BKT-only",
            BktVariant::Corrected => "BKT-corrected",
        };
        Self {
            name,
            variant,
            params,
            initial,
            threshold,
            mastery: HashMap::new(),
        }
    }

    fn key(attempt: &Attempt) -> (String, String) {
        (attempt.user_id.clone(), attempt.course_id.clone())
    }
}

impl Predictor for BktOneSkill {
    fn name(&self) -> &str {
        self.name
    }

    /// P(correct) = m(1 - s) + (1 - m)g for the current mastery m.
    fn predict(&self, attempt: &Attempt) -> f64 {
        let mastery = self
            .mastery
            .get(&Self::key(attempt))
            .copied()
            .unwrap_or(self.initial);
        let p = mastery * (1.0 - self.params.slipping) + (1.0 - mastery) * self.params.guessing;
        p.clamp(0.0, 1.0)
    }

    fn update(&mut self, attempt: &Attempt) {
        let Some(ratio) = attempt.success_ratio else {
            return;
        };
        let observation = Observation::new(binarize(ratio, self.threshold), Some(ratio));
        let prior = self
            .mastery
            .get(&Self::key(attempt))
            .copied()
            .unwrap_or(self.initial);
        let next = update_mastery(prior, &self.params, &observation, self.variant);
        self.mastery.insert(Self::key(attempt), next);
    }
}

/// Online 3PL ability tracking per user.
///
/// Items use calibrated parameters when available, then metadata
/// heuristics, then a neutral item.
#[derive(Debug, Clone)]
pub struct IrtOnline {
    calibrated: HashMap<String, IrtParams>,
    items: HashMap<String, Item>,
    prior: IrtPrior,
    initial: f64,
    threshold: f64,
    ability: HashMap<String, f64>,
}

impl IrtOnline {
    /// Parameters of an item with neither calibration nor metadata.
    pub const NEUTRAL: IrtParams = IrtParams {
        discrimination: 1.0,
        difficulty: 0.0,
        guessing: 0.2,
    };

    /// Create a tracker over the given item tables.
    #[must_use]
    pub fn new(
        calibrated: HashMap<String, IrtParams>,
        items: &[Item],
        prior: IrtPrior,
        initial: f64,
        threshold: f64,
    ) -> Self {
        Self {
            calibrated,
            items: items.iter().map(|item| (item.id.clone(), item.clone())).collect(),
            prior,
            initial,
            threshold,
            ability: HashMap::new(),
        }
    }

    fn params(&self, attempt: &Attempt) -> IrtParams {
        if let Some(params) = self.calibrated.get(&attempt.item_id) {
            return *params;
        }
        match self.items.get(&attempt.item_id) {
            Some(item) => heuristic_params(&ItemContext {
                mcq_type: item.mcq_type,
                difficulty: item.difficulty,
                baseline: item.baseline,
                estimated_time: item.estimated_time,
                // Time spent is only known after answering.
                time_spent: None,
            }),
            None => Self::NEUTRAL,
        }
    }

    fn theta(&self, user_id: &str) -> f64 {
        self.ability.get(user_id).copied().unwrap_or(self.initial)
    }
}

impl Predictor for IrtOnline {
    fn name(&self) -> &str {
        "IRT-online"
    }

    fn predict(&self, attempt: &Attempt) -> f64 {
        probability_correct(self.theta(&attempt.user_id), &self.params(attempt))
    }

    fn update(&mut self, attempt: &Attempt) {
        let Some(ratio) = attempt.success_ratio else {
            return;
        };
        let params = self.params(attempt);
        let next = update_ability(
            self.theta(&attempt.user_id),
            &params,
            binarize(ratio, self.threshold),
            &self.prior,
        );
        self.ability.insert(attempt.user_id.clone(), next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, McqType};

    fn graded(user: &str, item: &str, ratio: f64) -> Attempt {
        Attempt::new(user, item, "course-1", Some(ratio))
    }

    #[test]
    fn test_moving_average_cold_start() {
        let model = MovingAverage::new(5, 0.7);
        assert_eq!(model.predict(&graded("u1", "i1", 1.0)), 0.5);
    }

    #[test]
    fn test_moving_average_window_drops_old_outcomes() {
        let mut model = MovingAverage::new(2, 0.7);
        model.update(&graded("u1", "i1", 0.0));
        model.update(&graded("u1", "i2", 0.9));
        model.update(&graded("u1", "i3", 0.8));
        assert_eq!(model.predict(&graded("u1", "i4", 0.0)), 1.0);
        // Other users are unaffected.
        assert_eq!(model.predict(&graded("u2", "i4", 0.0)), 0.5);
    }

    #[test]
    fn test_bkt_prediction_moves_with_outcomes() {
        let mut model = BktOneSkill::new(BktVariant::Legacy, ResolvedBkt::default(), 0.2, 0.7);
        let next = graded("u1", "i1", 1.0);
        let before = model.predict(&next);
        // P(correct) at mastery 0.2: 0.2 * 0.9 + 0.8 * 0.2
        assert!((before - 0.34).abs() < 1e-12);

        model.update(&graded("u1", "i1", 1.0));
        assert!(model.predict(&next) > before);
    }

    #[test]
    fn test_bkt_names_follow_variant() {
        let legacy = BktOneSkill::new(BktVariant::Legacy, ResolvedBkt::default(), 0.2, 0.7);
        let corrected = BktOneSkill::new(BktVariant::Corrected, ResolvedBkt::default(), 0.2, 0.7);
        assert_ne!(legacy.name(), corrected.name());
    }

    #[test]
    fn test_bkt_state_is_per_course() {
        let mut model = BktOneSkill::new(BktVariant::Corrected, ResolvedBkt::default(), 0.2, 0.7);
        model.update(&graded("u1", "i1", 1.0));
        let mut other_course = graded("u1", "i1", 1.0);
        other_course.course_id = "course-2".to_string();
        assert!((model.predict(&other_course) - 0.34).abs() < 1e-12);
    }

    #[test]
    fn test_irt_prefers_calibrated_params() {
        let item = Item {
            id: "i1".to_string(),
            course_id: "course-1".to_string(),
            mcq_type: McqType::Qcs,
            difficulty: Difficulty::Hard,
            baseline: None,
            estimated_time: None,
            knowledge_components: Vec::new(),
        };
        let mut calibrated = HashMap::new();
        calibrated.insert(
            "i1".to_string(),
            IrtParams {
                discrimination: 1.0,
                difficulty: -3.0,
                guessing: 0.0,
            },
        );
        let with_calibration =
            IrtOnline::new(calibrated, &[item.clone()], IrtPrior::default(), 0.0, 0.7);
        let heuristic = IrtOnline::new(HashMap::new(), &[item], IrtPrior::default(), 0.0, 0.7);

        let attempt = graded("u1", "i1", 1.0);
        assert!(with_calibration.predict(&attempt) > heuristic.predict(&attempt));
    }

    #[test]
    fn test_irt_unknown_item_is_neutral() {
        let model = IrtOnline::new(HashMap::new(), &[], IrtPrior::default(), 0.0, 0.7);
        let p = model.predict(&graded("u1", "missing", 1.0));
        assert!((p - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_irt_update_tracks_ability() {
        let mut model = IrtOnline::new(HashMap::new(), &[], IrtPrior::default(), 0.0, 0.7);
        let next = graded("u1", "i1", 1.0);
        let before = model.predict(&next);
        model.update(&graded("u1", "i1", 1.0));
        assert!(model.predict(&next) > before);
        model.update(&graded("u1", "i1", 0.0));
        model.update(&graded("u1", "i1", 0.0));
        assert!(model.predict(&next) < before);
    }
}
