//! Synthetic attempt history for development databases.
//!
//! Seeded attempts are history only: learner state is left untouched, so a
//! later `calibrate` or `evaluate` sees them but mastery does not move.

use chrono::{Duration, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::Attempt;
use crate::storage::Storage;

/// What to generate.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedOptions {
    /// User the attempts belong to.
    pub user_id: String,
    /// Course whose items are answered.
    pub course_id: String,
    /// Attempts generated per item.
    pub attempts_per_item: u32,
    /// Lowest generated success ratio.
    pub min_success_ratio: f64,
    /// Highest generated success ratio.
    pub max_success_ratio: f64,
}

impl SeedOptions {
    /// Options with the default ratio range of 0.4 to 0.9 and one attempt per item.
    #[must_use]
    pub fn new(user_id: impl Into<String>, course_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            course_id: course_id.into(),
            attempts_per_item: 1,
            min_success_ratio: 0.4,
            max_success_ratio: 0.9,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(Error::invalid("user_id", "must not be empty"));
        }
        if self.attempts_per_item == 0 {
            return Err(Error::invalid("attempts_per_item", "must be at least 1"));
        }
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        if !in_range(self.min_success_ratio)
            || !in_range(self.max_success_ratio)
            || self.min_success_ratio > self.max_success_ratio
        {
            return Err(Error::invalid(
                "success_ratio",
                format!(
                    "range {}..{} must lie within [0, 1] and be ordered",
                    self.min_success_ratio, self.max_success_ratio
                ),
            ));
        }
        Ok(())
    }
}

/// Outcome of a seeding run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    /// Items found in the course.
    pub items: usize,
    /// Attempts written.
    pub inserted: usize,
}

/// Write synthetic attempts for every item of a course.
///
/// Each repetition answers every item once with a success ratio drawn
/// uniformly from the configured range. When the item has an estimated time
/// the time spent is `max(5, round(estimate * U(0.6, 1.4)))` seconds.
///
/// # Errors
///
/// Returns an error if the options are invalid or the database fails.
pub fn seed_synthetic_attempts<R: Rng + ?Sized>(
    storage: &Storage,
    options: &SeedOptions,
    rng: &mut R,
) -> Result<SeedSummary> {
    options.validate()?;

    let items = storage.items_by_course(&options.course_id)?;
    if items.is_empty() {
        warn!(course_id = %options.course_id, "No items to seed");
        return Ok(SeedSummary {
            items: 0,
            inserted: 0,
        });
    }

    let total = items.len() * options.attempts_per_item as usize;
    let started = Utc::now() - Duration::seconds(i64::try_from(total).unwrap_or(i64::MAX));
    let session_id = format!("synthetic-{}", started.timestamp());

    let inserted = storage.transaction(|store| {
        let mut inserted = 0;
        let mut offset = 0_i64;
        for _ in 0..options.attempts_per_item {
            for item in &items {
                let ratio = rng.gen_range(options.min_success_ratio..=options.max_success_ratio);
                let mut attempt =
                    Attempt::new(&options.user_id, &item.id, &item.course_id, Some(ratio));
                attempt.session_id = Some(session_id.clone());
                // One second apart so replay order is stable.
                attempt.timestamp = started + Duration::seconds(offset);
                attempt.time_spent = item
                    .estimated_time
                    .map(|estimate| (estimate * rng.gen_range(0.6..=1.4)).round().max(5.0));
                attempt.knowledge_components = item.knowledge_components.clone();
                offset += 1;

                if store.insert_attempt(&attempt.with_hash())?.is_some() {
                    inserted += 1;
                }
            }
        }
        Ok(inserted)
    })?;

    info!(
        user_id = %options.user_id,
        course_id = %options.course_id,
        inserted,
        "Seeded synthetic attempts"
    );

    Ok(SeedSummary {
        items: items.len(),
        inserted,
    })
}
