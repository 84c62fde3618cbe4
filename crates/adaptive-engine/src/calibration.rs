//! Offline item calibration.
//!
//! Estimates 3PL parameters per item from the mean success ratio of its
//! graded attempts, using type-based guessing and baseline-based
//! discrimination priors, and stores them as a new parameter version.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CalibrationConfig;
use crate::error::Result;
use crate::irt::IrtParams;
use crate::model::{Attempt, Item, ItemCalibration, McqType};
use crate::storage::{AttemptFilter, Storage};

/// Graded attempt statistics of one item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemAggregate {
    /// Item identifier.
    pub item_id: String,
    /// Number of graded attempts.
    pub attempts: u32,
    /// Mean success ratio over those attempts.
    pub mean_success: f64,
}

/// Aggregate graded attempts per item, ordered by item ID.
///
/// Attempts without a success ratio are ignored. When `course_id` is set,
/// only attempts of that course count.
#[must_use]
pub fn aggregate_attempts(attempts: &[Attempt], course_id: Option<&str>) -> Vec<ItemAggregate> {
    let mut sums: BTreeMap<&str, (u32, f64)> = BTreeMap::new();
    for attempt in attempts {
        if course_id.is_some_and(|course| course != attempt.course_id) {
            continue;
        }
        let Some(ratio) = attempt.success_ratio else {
            continue;
        };
        let entry = sums.entry(attempt.item_id.as_str()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += ratio;
    }

    sums.into_iter()
        .map(|(item_id, (count, total))| ItemAggregate {
            item_id: item_id.to_string(),
            attempts: count,
            mean_success: total / f64::from(count),
        })
        .collect()
}

/// Lower asymptote implied by the answer format.
#[must_use]
pub fn guessing_prior(mcq_type: McqType) -> f64 {
    match mcq_type {
        McqType::Qcm => 0.25,
        McqType::Qcs => 0.2,
        McqType::Qroc => 0.1,
    }
}

/// Discrimination from the authored baseline.
///
/// Missing, zero and NaN baselines give 1; others are clamped to [0.4, 2.5].
#[must_use]
pub fn discrimination_prior(baseline: Option<f64>) -> f64 {
    match baseline {
        Some(b) if b != 0.0 && !b.is_nan() => b.clamp(0.4, 2.5),
        _ => 1.0,
    }
}

/// Clamp `value` into `[min, max]`; non-finite values give 0.5.
#[must_use]
pub fn bound_probability(value: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        0.5
    }
}

/// Estimate an item's parameters from its aggregate.
///
/// The bounded success rate is mapped through the inverse of the guessing
/// floor to a logistic probability, whose logit gives the difficulty.
#[must_use]
pub fn calibrate_item(aggregate: &ItemAggregate, item: &Item) -> IrtParams {
    let guessing = guessing_prior(item.mcq_type);
    let discrimination = discrimination_prior(item.baseline);

    let success = bound_probability(aggregate.mean_success, guessing + 0.05, 0.95);
    let logistic = bound_probability((success - guessing) / (1.0 - guessing), 0.05, 0.95);
    let difficulty = -(logistic / (1.0 - logistic)).ln() / discrimination;

    IrtParams {
        discrimination,
        difficulty,
        guessing,
    }
}

/// Version label for a calibration run started today.
#[must_use]
pub fn today_version() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Options of one calibration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationOptions {
    /// Minimum graded attempts for an item to be calibrated.
    pub min_attempts: u32,
    /// Version label of the stored rows.
    pub version: String,
    /// Source label of the stored rows.
    pub source: String,
    /// Restrict the run to one course.
    pub course_id: Option<String>,
}

impl CalibrationOptions {
    /// Options from configuration, versioned today.
    #[must_use]
    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self {
            min_attempts: config.min_attempts,
            version: today_version(),
            source: config.source.clone(),
            course_id: None,
        }
    }
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self::from_config(&CalibrationConfig::default())
    }
}

/// Outcome of a calibration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalibrationSummary {
    /// Items whose parameters were stored.
    pub calibrated: usize,
    /// Items skipped for having too few graded attempts.
    pub below_threshold: usize,
    /// Items skipped because their metadata is unknown.
    pub missing_metadata: usize,
    /// Version label of the stored rows.
    pub version: String,
}

/// Runs calibration against a store.
#[derive(Debug)]
pub struct Calibrator<'a> {
    storage: &'a Storage,
}

impl<'a> Calibrator<'a> {
    /// Create a calibrator over `storage`.
    #[must_use]
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Calibrate every eligible item and store the results as the latest version.
    ///
    /// An empty run is logged as a warning and returns a zero summary.
    ///
    /// # Errors
    ///
    /// Returns an error if reading attempts or storing parameters fails. No
    /// parameters are stored when any write fails.
    pub fn run(&self, options: &CalibrationOptions) -> Result<CalibrationSummary> {
        let attempts = self.storage.attempts(&AttemptFilter {
            course_id: options.course_id.as_deref(),
            graded_only: true,
            ..Default::default()
        })?;
        let aggregates = aggregate_attempts(&attempts, options.course_id.as_deref());

        let mut summary = CalibrationSummary {
            calibrated: 0,
            below_threshold: 0,
            missing_metadata: 0,
            version: options.version.clone(),
        };

        let (eligible, below): (Vec<_>, Vec<_>) = aggregates
            .into_iter()
            .partition(|aggregate| aggregate.attempts >= options.min_attempts);
        summary.below_threshold = below.len();

        if eligible.is_empty() {
            warn!(
                "No items met the minimum attempt threshold ({}). Nothing to calibrate.",
                options.min_attempts
            );
            return Ok(summary);
        }

        let now = Utc::now();
        let mut records = Vec::with_capacity(eligible.len());
        for aggregate in &eligible {
            let Some(item) = self.storage.get_item(&aggregate.item_id)? else {
                debug!("Skipping {}: no item metadata", aggregate.item_id);
                summary.missing_metadata += 1;
                continue;
            };
            records.push(ItemCalibration {
                item_id: item.id.clone(),
                params: calibrate_item(aggregate, &item),
                source: Some(options.source.clone()),
                version: options.version.clone(),
                is_latest: true,
                attempts: aggregate.attempts,
                created_at: now,
                updated_at: now,
            });
        }

        if records.is_empty() {
            warn!("No eligible items after filtering metadata. Nothing saved.");
            return Ok(summary);
        }

        self.storage.transaction(|storage| {
            for record in &records {
                storage.store_item_params(record)?;
            }
            Ok(())
        })?;
        summary.calibrated = records.len();

        info!(
            "Stored calibrated parameters for {} items (min_attempts={}, version={})",
            summary.calibrated, options.min_attempts, options.version
        );
        Ok(summary)
    }
}
