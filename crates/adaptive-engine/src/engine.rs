//! The adaptive learner service.
//!
//! Records attempts and keeps each learner's course mastery, per-component
//! mastery and ability up to date.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::bkt::{self, BktParams, Observation};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::irt::{self, IrtParams, ItemContext, ParamsSource};
use crate::model::{Attempt, ComponentMastery, Item, Learner};
use crate::storage::Storage;

/// A graded (or ungraded) answer as submitted by a client.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttemptInput {
    /// Who answered.
    pub user_id: String,
    /// What was answered.
    pub item_id: String,
    /// Training session, if any. Only session attempts update learners.
    pub session_id: Option<String>,
    /// Graded accuracy in [0, 1].
    pub success_ratio: Option<f64>,
    /// Explicit verdict. Derived from the success ratio when absent.
    pub is_correct: Option<bool>,
    /// Seconds spent answering.
    pub time_spent: Option<f64>,
    /// When it was answered. Defaults to now.
    pub timestamp: Option<DateTime<Utc>>,
}

impl AttemptInput {
    /// Input for `user_id` answering `item_id`, with everything else unset.
    #[must_use]
    pub fn new(user_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            item_id: item_id.into(),
            ..Self::default()
        }
    }

    /// Check identifiers and numeric ranges.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for empty identifiers, a success ratio outside
    /// [0, 1] or a negative or non-finite time.
    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(Error::invalid("user_id", "must not be empty"));
        }
        if self.item_id.trim().is_empty() {
            return Err(Error::invalid("item_id", "must not be empty"));
        }
        if let Some(ratio) = self.success_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(Error::invalid(
                    "success_ratio",
                    format!("must be within [0, 1], got {ratio}"),
                ));
            }
        }
        if let Some(spent) = self.time_spent {
            if !spent.is_finite() || spent < 0.0 {
                return Err(Error::invalid(
                    "time_spent",
                    format!("must be a non-negative number of seconds, got {spent}"),
                ));
            }
        }
        Ok(())
    }
}

impl From<&Attempt> for AttemptInput {
    fn from(attempt: &Attempt) -> Self {
        Self {
            user_id: attempt.user_id.clone(),
            item_id: attempt.item_id.clone(),
            session_id: attempt.session_id.clone(),
            success_ratio: attempt.success_ratio,
            is_correct: attempt.is_correct,
            time_spent: attempt.time_spent,
            timestamp: Some(attempt.timestamp),
        }
    }
}

/// The grading signal of one answer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnswerObservation {
    /// Graded accuracy in [0, 1].
    pub success_ratio: Option<f64>,
    /// Explicit verdict.
    pub is_correct: Option<bool>,
    /// Seconds spent answering.
    pub time_spent: Option<f64>,
}

/// Mastery change of one knowledge component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentUpdate {
    /// Component identifier.
    pub component_id: String,
    /// Mastery before the answer.
    pub previous: f64,
    /// Mastery after the answer.
    pub mastery: f64,
}

/// Result of applying one answer to a learner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnerUpdate {
    /// The learner after the update.
    pub learner: Learner,
    /// Course mastery before the answer.
    pub previous_mastery: f64,
    /// Ability before the answer.
    pub previous_ability: f64,
    /// Per-component changes, in item order.
    pub components: Vec<ComponentUpdate>,
    /// Item parameters used for the ability step.
    pub params: IrtParams,
    /// Where those parameters came from.
    pub params_source: ParamsSource,
}

/// Result of [`AdaptiveEngine::record_attempt`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordOutcome {
    /// Row ID of the stored attempt, `None` for duplicates.
    pub attempt_id: Option<i64>,
    /// Whether an identical attempt was already stored.
    pub duplicate: bool,
    /// The learner update, when the attempt triggered one.
    pub update: Option<LearnerUpdate>,
}

/// Adaptive engine over a store and a configuration.
#[derive(Debug)]
pub struct AdaptiveEngine<'a> {
    storage: &'a Storage,
    config: &'a Config,
}

impl<'a> AdaptiveEngine<'a> {
    /// Create an engine.
    #[must_use]
    pub fn new(storage: &'a Storage, config: &'a Config) -> Self {
        Self { storage, config }
    }

    /// The underlying store.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        self.storage
    }

    /// Find the learner of a user in a course.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_learner(&self, user_id: &str, course_id: &str) -> Result<Option<Learner>> {
        self.storage.find_learner(user_id, course_id)
    }

    /// Get the learner of a user in a course, creating it with the
    /// configured initial mastery and ability.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_or_create_learner(&self, user_id: &str, course_id: &str) -> Result<Learner> {
        self.storage.ensure_learner(
            user_id,
            course_id,
            self.config.bkt.initial_mastery,
            self.config.irt.initial_ability,
        )
    }

    /// Component masteries of a learner.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn component_masteries(&self, learner: &Learner) -> Result<Vec<ComponentMastery>> {
        self.storage.component_masteries(learner.id)
    }

    /// Parameters to use for `item`: stored latest, then most recently
    /// updated stored row, then heuristics from the item's metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn resolve_item_params(
        &self,
        item: &Item,
        time_spent: Option<f64>,
    ) -> Result<(IrtParams, ParamsSource)> {
        if let Some(stored) = self.storage.latest_item_params(&item.id)? {
            return Ok((
                stored.params,
                ParamsSource::Calibrated {
                    version: stored.version,
                },
            ));
        }

        let params = irt::heuristic_params(&ItemContext {
            mcq_type: item.mcq_type,
            difficulty: item.difficulty,
            baseline: item.baseline,
            estimated_time: item.estimated_time,
            time_spent,
        });
        Ok((params, ParamsSource::Heuristic))
    }

    /// Apply one answer on `item` to the user's learner in the item's course.
    ///
    /// Course mastery, component masteries and ability are updated and saved
    /// in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn update_learner(
        &self,
        user_id: &str,
        item: &Item,
        answer: &AnswerObservation,
    ) -> Result<LearnerUpdate> {
        self.storage
            .transaction(|_| self.apply_update(user_id, item, answer))
    }

    /// Validate and store an attempt, updating the learner when the attempt
    /// is graded and part of a session.
    ///
    /// Storing and updating happen in one transaction. Duplicates are
    /// reported and leave the learner untouched.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for malformed input, `NotFound` for an unknown
    /// item, or a database error.
    pub fn record_attempt(&self, input: &AttemptInput) -> Result<RecordOutcome> {
        input.validate()?;
        let item = self
            .storage
            .get_item(&input.item_id)?
            .ok_or_else(|| Error::not_found("item", input.item_id.clone()))?;

        let attempt = Attempt {
            id: None,
            user_id: input.user_id.clone(),
            item_id: item.id.clone(),
            course_id: item.course_id.clone(),
            session_id: input.session_id.clone(),
            timestamp: input.timestamp.unwrap_or_else(Utc::now),
            success_ratio: input.success_ratio,
            is_correct: input.is_correct,
            time_spent: input.time_spent,
            knowledge_components: item.knowledge_components.clone(),
            content_hash: String::new(),
        }
        .with_hash();

        self.storage.transaction(|storage| {
            let Some(attempt_id) = storage.insert_attempt(&attempt)? else {
                return Ok(RecordOutcome {
                    attempt_id: None,
                    duplicate: true,
                    update: None,
                });
            };

            let update = if attempt.session_id.is_some() && attempt.is_graded() {
                let answer = AnswerObservation {
                    success_ratio: attempt.success_ratio,
                    is_correct: attempt.is_correct,
                    time_spent: attempt.time_spent,
                };
                Some(self.apply_update(&attempt.user_id, &item, &answer)?)
            } else {
                debug!("Attempt {} stored without learner update", attempt_id);
                None
            };

            Ok(RecordOutcome {
                attempt_id: Some(attempt_id),
                duplicate: false,
                update,
            })
        })
    }

    /// Validate and store a historical attempt without touching learners.
    ///
    /// The attempt must pass the same checks as [`Self::record_attempt`] and
    /// name a known item of the same course. An attempt listing no knowledge
    /// components is credited with the item's. Returns the new row id, or
    /// `None` for a duplicate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for malformed input or a course that differs
    /// from the item's, `NotFound` for an unknown item, or a database error.
    pub fn import_attempt(&self, attempt: &Attempt) -> Result<Option<i64>> {
        AttemptInput::from(attempt).validate()?;
        let item = self
            .storage
            .get_item(&attempt.item_id)?
            .ok_or_else(|| Error::not_found("item", attempt.item_id.clone()))?;
        if attempt.course_id != item.course_id {
            return Err(Error::invalid(
                "course_id",
                format!(
                    "item {} belongs to course {}, got {:?}",
                    item.id, item.course_id, attempt.course_id
                ),
            ));
        }

        if attempt.knowledge_components.is_empty() && !item.knowledge_components.is_empty() {
            let mut credited = attempt.clone();
            credited.knowledge_components = item.knowledge_components;
            return self.storage.insert_attempt(&credited);
        }
        self.storage.insert_attempt(attempt)
    }

    fn apply_update(
        &self,
        user_id: &str,
        item: &Item,
        answer: &AnswerObservation,
    ) -> Result<LearnerUpdate> {
        let mut learner = self.get_or_create_learner(user_id, &item.course_id)?;
        let previous_mastery = learner.mastery;
        let previous_ability = learner.ability;

        let correct = answer.is_correct.or_else(|| {
            answer
                .success_ratio
                .map(|ratio| ratio >= self.config.evaluation.success_threshold)
        });
        let observation = Observation {
            is_correct: correct,
            accuracy: answer.success_ratio,
        };
        let variant = self.config.bkt.variant();
        let defaults = self.config.bkt.defaults();

        let course_params = self
            .storage
            .get_course(&item.course_id)?
            .map(|course| course.bkt_params())
            .unwrap_or_default();
        learner.mastery = bkt::update_mastery(
            previous_mastery,
            &course_params.resolve(&defaults),
            &observation,
            variant,
        );

        let now = Utc::now();
        let components = self.update_components(
            &learner,
            item,
            &course_params,
            &observation,
            now,
        )?;

        let (params, params_source) = self.resolve_item_params(item, answer.time_spent)?;
        if let Some(correct) = correct {
            learner.ability =
                irt::update_ability(previous_ability, &params, correct, &self.config.irt.prior());
        }

        learner.updated_at = now;
        self.storage.save_learner(&learner)?;

        info!(
            "Updated learner {} in {}: mastery {:.3} -> {:.3}, ability {:.3} -> {:.3} ({})",
            user_id,
            item.course_id,
            previous_mastery,
            learner.mastery,
            previous_ability,
            learner.ability,
            params_source
        );

        Ok(LearnerUpdate {
            learner,
            previous_mastery,
            previous_ability,
            components,
            params,
            params_source,
        })
    }

    /// Update each distinct component of `item`. Components without a
    /// record start from the learner's course mastery after this answer.
    fn update_components(
        &self,
        learner: &Learner,
        item: &Item,
        course_params: &BktParams,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Result<Vec<ComponentUpdate>> {
        if item.knowledge_components.is_empty() {
            return Ok(Vec::new());
        }

        let existing: HashMap<String, f64> = self
            .storage
            .component_masteries(learner.id)?
            .into_iter()
            .map(|record| (record.component_id, record.mastery))
            .collect();
        let defaults = self.config.bkt.defaults();
        let variant = self.config.bkt.variant();

        let mut seen = HashSet::new();
        let mut updates = Vec::new();
        for component_id in &item.knowledge_components {
            if !seen.insert(component_id.as_str()) {
                continue;
            }

            let params = match self.storage.get_component(component_id)? {
                Some(component) => component.bkt_params().or(course_params),
                None => *course_params,
            };
            let previous = existing.get(component_id).copied().unwrap_or(learner.mastery);
            let mastery =
                bkt::update_mastery(previous, &params.resolve(&defaults), observation, variant);

            self.storage.save_component_mastery(&ComponentMastery {
                learner_id: learner.id,
                component_id: component_id.clone(),
                mastery,
                updated_at: now,
            })?;
            updates.push(ComponentUpdate {
                component_id: component_id.clone(),
                previous,
                mastery,
            });
        }

        Ok(updates)
    }
}
