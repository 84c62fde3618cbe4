//! Session parameters and item selection.
//!
//! Learner scores decide which question types, how many questions and how
//! much time a training session gets, and which item to offer next.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Config, PolicyConfig};
use crate::error::{Error, Result};
use crate::model::{Difficulty, Item, Learner};
use crate::storage::{AttemptFilter, Storage};

/// A session setting the engine can decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionField {
    /// Include multiple-answer items.
    Qcm,
    /// Include single-answer items.
    Qcs,
    /// Include open-answer items.
    Qroc,
    /// Seconds per question.
    TimeLimit,
    /// Session length.
    NumberOfQuestions,
    /// Starting difficulty.
    Difficulty,
    /// Shuffle question order.
    RandomizeQuestionsOrder,
    /// Shuffle option order.
    RandomizeOptionsOrder,
}

impl SessionField {
    /// Every field, in display order.
    pub const ALL: [SessionField; 8] = [
        Self::Qcm,
        Self::Qcs,
        Self::Qroc,
        Self::TimeLimit,
        Self::NumberOfQuestions,
        Self::Difficulty,
        Self::RandomizeQuestionsOrder,
        Self::RandomizeOptionsOrder,
    ];

    /// Stable snake_case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qcm => "qcm",
            Self::Qcs => "qcs",
            Self::Qroc => "qroc",
            Self::TimeLimit => "time_limit",
            Self::NumberOfQuestions => "number_of_questions",
            Self::Difficulty => "difficulty",
            Self::RandomizeQuestionsOrder => "randomize_questions_order",
            Self::RandomizeOptionsOrder => "randomize_options_order",
        }
    }
}

impl fmt::Display for SessionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| Error::invalid("session field", format!("unknown field '{s}'")))
    }
}

/// Session settings decided by the engine. Unrequested fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    /// Include multiple-answer items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qcm: Option<bool>,
    /// Include single-answer items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qcs: Option<bool>,
    /// Include open-answer items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qroc: Option<bool>,
    /// Seconds per question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u32>,
    /// Session length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_questions: Option<u32>,
    /// Starting difficulty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    /// Shuffle question order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub randomize_questions_order: Option<bool>,
    /// Shuffle option order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub randomize_options_order: Option<bool>,
}

/// Decide the requested session fields from a learner's scores.
///
/// Mastery drives type inclusion, session length and randomization; ability
/// drives the time limit and the starting difficulty.
#[must_use]
pub fn define_session_params(
    learner: &Learner,
    fields: &[SessionField],
    config: &PolicyConfig,
) -> SessionParams {
    let mastery = learner.mastery;
    let ability = learner.ability;
    let mut params = SessionParams::default();

    for field in fields {
        match field {
            SessionField::Qcm => params.qcm = Some(true),
            SessionField::Qcs => params.qcs = Some(mastery > config.qcs_mastery),
            SessionField::Qroc => params.qroc = Some(mastery > config.qroc_mastery),
            SessionField::TimeLimit => {
                let limit = (f64::from(config.base_time_limit_secs) * (1.0 - ability * 0.5)).round();
                params.time_limit = Some(to_count(limit).max(1));
            }
            SessionField::NumberOfQuestions => {
                let count = to_count((5.0 + mastery * 20.0).round());
                params.number_of_questions =
                    Some(count.clamp(config.min_questions, config.max_questions));
            }
            SessionField::Difficulty => {
                params.difficulty = Some(Difficulty::from_ability(
                    ability,
                    config.easy_below,
                    config.hard_from,
                ));
            }
            SessionField::RandomizeQuestionsOrder => {
                params.randomize_questions_order = Some(mastery > config.randomize_mastery);
            }
            SessionField::RandomizeOptionsOrder => {
                params.randomize_options_order = Some(mastery > config.randomize_mastery);
            }
        }
    }

    params
}

/// Saturating conversion of a rounded float to a count.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_count(value: f64) -> u32 {
    if value.is_nan() || value <= 0.0 {
        0
    } else if value >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        value as u32
    }
}

/// Pick a difficulty band for the next item.
///
/// The ability band is clamped into the configured bounds. With probability
/// `epsilon` a uniformly random band within the bounds is used instead.
pub fn choose_difficulty<R: Rng + ?Sized>(
    ability: f64,
    config: &PolicyConfig,
    rng: &mut R,
) -> Difficulty {
    let min = config.min_difficulty.index();
    let max = config.max_difficulty.index().max(min);
    let band = Difficulty::from_ability(ability, config.easy_below, config.hard_from);

    if config.epsilon > 0.0 && rng.gen_bool(config.epsilon.min(1.0)) {
        let explored = Difficulty::from_index(rng.gen_range(min..=max));
        debug!("Exploring difficulty {} instead of {}", explored, band);
        return explored;
    }

    Difficulty::from_index(band.index().clamp(min, max))
}

/// An item offered for selection with its last exposure.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Item identifier.
    pub item_id: String,
    /// Authored difficulty.
    pub difficulty: Difficulty,
    /// When the learner last answered it.
    pub last_seen: Option<DateTime<Utc>>,
}

/// Order candidates for presentation.
///
/// Candidates seen within the repeat window are dropped. The rest are
/// ordered target difficulty first, then least recently seen; never-seen
/// items count as oldest. Ties keep their input order.
#[must_use]
pub fn rank_candidates(
    candidates: Vec<Candidate>,
    target: Difficulty,
    now: DateTime<Utc>,
    config: &PolicyConfig,
) -> Vec<Candidate> {
    let avoid_after = now - Duration::minutes(i64::from(config.avoid_repeat_minutes));

    let mut ranked: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| c.last_seen.map_or(true, |seen| seen < avoid_after))
        .collect();
    ranked.sort_by_key(|c| (c.difficulty != target, c.last_seen));
    ranked
}

/// The item chosen for a learner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    /// The chosen item.
    pub item: Item,
    /// The difficulty band that was targeted.
    pub target: Difficulty,
    /// Whether the item is outside the target band or was seen recently.
    pub fallback: bool,
}

/// Picks the next item of a session.
#[derive(Debug)]
pub struct ItemSelector<'a> {
    storage: &'a Storage,
    config: &'a Config,
}

impl<'a> ItemSelector<'a> {
    /// Create a selector.
    #[must_use]
    pub fn new(storage: &'a Storage, config: &'a Config) -> Self {
        Self { storage, config }
    }

    /// Choose the next item for `user_id` in `course_id`.
    ///
    /// Items already attempted in `session_id` are excluded. The target band
    /// follows the learner's ability; when no fresh item of that band is
    /// left, any band is used, and when every remaining item was seen
    /// recently the least recently seen one is returned. Returns `None` once
    /// the course has nothing left to offer.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn next_item<R: Rng + ?Sized>(
        &self,
        user_id: &str,
        course_id: &str,
        session_id: Option<&str>,
        rng: &mut R,
    ) -> Result<Option<Selection>> {
        self.next_item_at(user_id, course_id, session_id, Utc::now(), rng)
    }

    fn next_item_at<R: Rng + ?Sized>(
        &self,
        user_id: &str,
        course_id: &str,
        session_id: Option<&str>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<Option<Selection>> {
        let answered: HashSet<String> = match session_id {
            Some(session) => self
                .storage
                .attempts(&AttemptFilter {
                    user_id: Some(user_id),
                    session_id: Some(session),
                    ..Default::default()
                })?
                .into_iter()
                .map(|attempt| attempt.item_id)
                .collect(),
            None => HashSet::new(),
        };

        let mut remaining: Vec<Item> = self
            .storage
            .items_by_course(course_id)?
            .into_iter()
            .filter(|item| !answered.contains(&item.id))
            .collect();
        if remaining.is_empty() {
            debug!("No items left for {} in {}", user_id, course_id);
            return Ok(None);
        }

        let ability = self
            .storage
            .find_learner(user_id, course_id)?
            .map_or(self.config.irt.initial_ability, |learner| learner.ability);
        let target = choose_difficulty(ability, &self.config.policy, rng);

        let last_seen = self.storage.last_seen(user_id, course_id)?;
        let candidates: Vec<Candidate> = remaining
            .iter()
            .map(|item| Candidate {
                item_id: item.id.clone(),
                difficulty: item.difficulty,
                last_seen: last_seen.get(&item.id).copied(),
            })
            .collect();

        let ranked = rank_candidates(candidates.clone(), target, now, &self.config.policy);
        let (chosen, fallback) = match ranked.first() {
            Some(best) => (best.item_id.clone(), best.difficulty != target),
            None => {
                let Some(oldest) = candidates.iter().min_by_key(|c| c.last_seen) else {
                    return Ok(None);
                };
                (oldest.item_id.clone(), true)
            }
        };

        let Some(position) = remaining.iter().position(|item| item.id == chosen) else {
            return Ok(None);
        };
        let item = remaining.swap_remove(position);
        debug!(
            "Selected {} ({}) for {} with target {}",
            item.id, item.difficulty, user_id, target
        );

        Ok(Some(Selection {
            item,
            target,
            fallback,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attempt, McqType};
    use chrono::TimeZone;
    use rand::{rngs::StdRng, SeedableRng};

    fn learner(mastery: f64, ability: f64) -> Learner {
        Learner {
            id: 1,
            user_id: "u1".to_string(),
            course_id: "c1".to_string(),
            mastery,
            ability,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn greedy() -> PolicyConfig {
        PolicyConfig {
            epsilon: 0.0,
            ..PolicyConfig::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap()
    }

    fn candidate(id: &str, difficulty: Difficulty, minutes_ago: Option<i64>) -> Candidate {
        Candidate {
            item_id: id.to_string(),
            difficulty,
            last_seen: minutes_ago.map(|m| now() - Duration::minutes(m)),
        }
    }

    fn item(id: &str, difficulty: Difficulty) -> Item {
        Item {
            id: id.to_string(),
            course_id: "c1".to_string(),
            mcq_type: McqType::Qcs,
            difficulty,
            baseline: None,
            estimated_time: None,
            knowledge_components: Vec::new(),
        }
    }

    #[test]
    fn test_define_all_fields() {
        let params = define_session_params(&learner(0.6, 0.4), &SessionField::ALL, &greedy());
        assert_eq!(params.qcm, Some(true));
        assert_eq!(params.qcs, Some(true));
        assert_eq!(params.qroc, Some(false));
        assert_eq!(params.time_limit, Some(48));
        assert_eq!(params.number_of_questions, Some(17));
        assert_eq!(params.difficulty, Some(Difficulty::Medium));
        assert_eq!(params.randomize_questions_order, Some(true));
        assert_eq!(params.randomize_options_order, Some(true));
    }

    #[test]
    fn test_define_only_requested_fields() {
        let params = define_session_params(
            &learner(0.9, 0.9),
            &[SessionField::Qroc, SessionField::Difficulty],
            &greedy(),
        );
        assert_eq!(params.qroc, Some(true));
        assert_eq!(params.difficulty, Some(Difficulty::Hard));
        assert!(params.qcm.is_none());
        assert!(params.time_limit.is_none());

        let json = serde_json::to_string(&params).unwrap();
        assert!(!json.contains("time_limit"));
    }

    #[test]
    fn test_thresholds_are_strict() {
        let params = define_session_params(&learner(0.4, 0.0), &SessionField::ALL, &greedy());
        assert_eq!(params.qcs, Some(false));
        assert_eq!(params.randomize_questions_order, Some(false));
        assert_eq!(params.time_limit, Some(60));
        assert_eq!(params.difficulty, Some(Difficulty::Easy));
    }

    #[test]
    fn test_question_count_is_clamped() {
        let config = greedy();
        let fields = [SessionField::NumberOfQuestions];
        assert_eq!(
            define_session_params(&learner(0.0, 0.0), &fields, &config).number_of_questions,
            Some(5)
        );
        assert_eq!(
            define_session_params(&learner(1.0, 0.0), &fields, &config).number_of_questions,
            Some(25)
        );
    }

    #[test]
    fn test_time_limit_stays_positive() {
        let params = define_session_params(&learner(0.5, 5.0), &[SessionField::TimeLimit], &greedy());
        assert_eq!(params.time_limit, Some(1));
        let slow = define_session_params(&learner(0.5, -1.0), &[SessionField::TimeLimit], &greedy());
        assert_eq!(slow.time_limit, Some(90));
    }

    #[test]
    fn test_session_field_parse() {
        assert_eq!("time_limit".parse::<SessionField>().unwrap(), SessionField::TimeLimit);
        assert!("colour".parse::<SessionField>().is_err());
        for field in SessionField::ALL {
            assert_eq!(field.to_string().parse::<SessionField>().unwrap(), field);
        }
    }

    #[test]
    fn test_choose_difficulty_greedy() {
        let mut rng = StdRng::seed_from_u64(1);
        let config = greedy();
        assert_eq!(choose_difficulty(0.1, &config, &mut rng), Difficulty::Easy);
        assert_eq!(choose_difficulty(0.5, &config, &mut rng), Difficulty::Medium);
        assert_eq!(choose_difficulty(1.5, &config, &mut rng), Difficulty::Hard);
    }

    #[test]
    fn test_choose_difficulty_respects_bounds() {
        let mut rng = StdRng::seed_from_u64(2);
        let config = PolicyConfig {
            min_difficulty: Difficulty::Medium,
            ..greedy()
        };
        assert_eq!(choose_difficulty(-2.0, &config, &mut rng), Difficulty::Medium);

        let capped = PolicyConfig {
            max_difficulty: Difficulty::Medium,
            ..greedy()
        };
        assert_eq!(choose_difficulty(3.0, &capped, &mut rng), Difficulty::Medium);
    }

    #[test]
    fn test_exploration_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = PolicyConfig {
            epsilon: 1.0,
            min_difficulty: Difficulty::Medium,
            ..PolicyConfig::default()
        };
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let band = choose_difficulty(0.0, &config, &mut rng);
            assert_ne!(band, Difficulty::Easy);
            seen.insert(band);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_rank_candidates() {
        let ranked = rank_candidates(
            vec![
                candidate("recent", Difficulty::Medium, Some(10)),
                candidate("other-old", Difficulty::Hard, Some(500)),
                candidate("target-new", Difficulty::Medium, Some(120)),
                candidate("target-never", Difficulty::Medium, None),
                candidate("target-old", Difficulty::Medium, Some(600)),
            ],
            Difficulty::Medium,
            now(),
            &greedy(),
        );
        let ids: Vec<&str> = ranked.iter().map(|c| c.item_id.as_str()).collect();
        assert_eq!(ids, vec!["target-never", "target-old", "target-new", "other-old"]);
    }

    #[test]
    fn test_rank_candidates_is_stable() {
        let ranked = rank_candidates(
            vec![
                candidate("b", Difficulty::Easy, None),
                candidate("a", Difficulty::Easy, None),
            ],
            Difficulty::Easy,
            now(),
            &greedy(),
        );
        assert_eq!(ranked[0].item_id, "b");
        assert_eq!(ranked[1].item_id, "a");
    }

    fn selector_fixture() -> (Storage, Config) {
        let storage = Storage::open_in_memory().unwrap();
        storage.upsert_item(&item("e1", Difficulty::Easy)).unwrap();
        storage.upsert_item(&item("e2", Difficulty::Easy)).unwrap();
        storage.upsert_item(&item("h1", Difficulty::Hard)).unwrap();
        let mut config = Config::default();
        config.policy.epsilon = 0.0;
        (storage, config)
    }

    fn answer(storage: &Storage, item_id: &str, session: &str, minutes_ago: i64) {
        let mut attempt = Attempt::new("u1", item_id, "c1", Some(1.0));
        attempt.session_id = Some(session.to_string());
        attempt.timestamp = now() - Duration::minutes(minutes_ago);
        storage.insert_attempt(&attempt.with_hash()).unwrap();
    }

    #[test]
    fn test_selector_prefers_target_and_skips_session_items() {
        let (storage, config) = selector_fixture();
        let selector = ItemSelector::new(&storage, &config);
        let mut rng = StdRng::seed_from_u64(4);

        let first = selector
            .next_item_at("u1", "c1", Some("s1"), now(), &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(first.target, Difficulty::Easy);
        assert_eq!(first.item.id, "e1");
        assert!(!first.fallback);

        answer(&storage, "e1", "s1", 1);
        let second = selector
            .next_item_at("u1", "c1", Some("s1"), now(), &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(second.item.id, "e2");
    }

    #[test]
    fn test_selector_falls_back_to_other_band() {
        let (storage, config) = selector_fixture();
        let selector = ItemSelector::new(&storage, &config);
        let mut rng = StdRng::seed_from_u64(5);
        answer(&storage, "e1", "s1", 2);
        answer(&storage, "e2", "s1", 1);

        let selection = selector
            .next_item_at("u1", "c1", Some("s1"), now(), &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(selection.item.id, "h1");
        assert!(selection.fallback);

        answer(&storage, "h1", "s1", 0);
        assert!(selector
            .next_item_at("u1", "c1", Some("s1"), now(), &mut rng)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_selector_reuses_oldest_when_all_recent() {
        let (storage, config) = selector_fixture();
        let selector = ItemSelector::new(&storage, &config);
        let mut rng = StdRng::seed_from_u64(6);
        answer(&storage, "e1", "s0", 5);
        answer(&storage, "e2", "s0", 20);
        answer(&storage, "h1", "s0", 10);

        let selection = selector
            .next_item_at("u1", "c1", Some("s1"), now(), &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(selection.item.id, "e2");
        assert!(selection.fallback);
    }

    #[test]
    fn test_selector_uses_learner_ability() {
        let (storage, config) = selector_fixture();
        let mut learner = storage.ensure_learner("u1", "c1", 0.5, 0.0).unwrap();
        learner.ability = 1.2;
        storage.save_learner(&learner).unwrap();

        let selector = ItemSelector::new(&storage, &config);
        let mut rng = StdRng::seed_from_u64(7);
        let selection = selector.next_item("u1", "c1", None, &mut rng).unwrap().unwrap();
        assert_eq!(selection.target, Difficulty::Hard);
        assert_eq!(selection.item.id, "h1");
    }
}
