//! Train/validation/test replay and the resulting scorecard.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};
use comfy_table::{Cell, Table};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bkt::BktVariant;
use crate::config::Config;
use crate::error::Result;
use crate::irt::IrtParams;
use crate::model::{Attempt, Item};

use super::binarize;
use super::metrics::Metrics;
use super::predictors::{BktOneSkill, IrtOnline, MovingAverage, Predictor};

/// Attempts partitioned for evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Split {
    /// Earliest attempts of each user.
    pub train: Vec<Attempt>,
    /// Attempts following the training part.
    pub validation: Vec<Attempt>,
    /// Most recent attempts of each user.
    pub test: Vec<Attempt>,
}

impl Split {
    /// Size of each part.
    #[must_use]
    pub fn sizes(&self) -> SplitSizes {
        SplitSizes {
            train: self.train.len(),
            validation: self.validation.len(),
            test: self.test.len(),
        }
    }
}

/// Number of attempts in each part of a [`Split`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    /// Training attempts.
    #[serde(rename = "n_train")]
    pub train: usize,
    /// Validation attempts.
    #[serde(rename = "n_val")]
    pub validation: usize,
    /// Test attempts.
    #[serde(rename = "n_test")]
    pub test: usize,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn share(n: usize, ratio: f64) -> usize {
    ((n as f64 * ratio).floor() as usize).min(n)
}

/// Split each user's history in time order.
///
/// For a user with `n` attempts the first `floor(n * train)` go to training,
/// the next `floor(n * validation)` to validation and the rest to test.
/// Users are visited in ID order so the output is deterministic.
#[must_use]
pub fn time_aware_split(attempts: &[Attempt], train: f64, validation: f64) -> Split {
    let mut by_user: BTreeMap<&str, Vec<&Attempt>> = BTreeMap::new();
    for attempt in attempts {
        by_user.entry(attempt.user_id.as_str()).or_default().push(attempt);
    }

    let mut split = Split::default();
    for history in by_user.values_mut() {
        history.sort_by_key(|a| (a.timestamp, a.id));
        let n = history.len();
        let n_train = share(n, train);
        let n_val = share(n, validation).min(n - n_train);

        for (index, attempt) in history.iter().enumerate() {
            let part = if index < n_train {
                &mut split.train
            } else if index < n_train + n_val {
                &mut split.validation
            } else {
                &mut split.test
            };
            part.push((*attempt).clone());
        }
    }
    split
}

/// Test-split metrics of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    /// Model name.
    pub name: String,
    /// Scores on the test split.
    #[serde(flatten)]
    pub metrics: Metrics,
}

/// The output of one evaluation run, written as `metrics.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    /// When the run finished.
    pub generated_at: DateTime<Utc>,
    /// Split sizes.
    pub splits: SplitSizes,
    /// One entry per model, in evaluation order.
    pub models: Vec<ModelScore>,
}

impl Scorecard {
    /// Write the scorecard as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Wrote scorecard");
        Ok(())
    }

    /// Render the model scores as CSV, one row per model. Missing metrics
    /// are left empty.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let cell = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();

        let mut csv = String::from("Model,Log-loss,Brier,AUC,ECE,N\n");
        for model in &self.models {
            let metrics = &model.metrics;
            csv.push_str(&format!(
                "{},{},{},{},{},{}\n",
                model.name,
                cell(metrics.log_loss),
                cell(metrics.brier),
                cell(metrics.auc),
                cell(metrics.ece),
                metrics.count
            ));
        }
        csv
    }

    /// Write the CSV rendering of the scorecard.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_csv())?;
        info!(path = %path.display(), "Wrote scorecard CSV");
        Ok(())
    }

    /// Render the model scores as a table.
    #[must_use]
    pub fn to_table(&self) -> Table {
        let fmt = |value: Option<f64>| value.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"));

        let mut table = Table::new();
        table.set_header(vec!["Model", "N", "LogLoss", "Brier", "AUC", "ECE"]);
        for model in &self.models {
            table.add_row(vec![
                Cell::new(&model.name),
                Cell::new(model.metrics.count),
                Cell::new(fmt(model.metrics.log_loss)),
                Cell::new(fmt(model.metrics.brier)),
                Cell::new(fmt(model.metrics.auc)),
                Cell::new(fmt(model.metrics.ece)),
            ]);
        }
        table
    }
}

fn score(predictor: &mut dyn Predictor, split: &Split, threshold: f64, bins: usize) -> ModelScore {
    for attempt in split.train.iter().chain(&split.validation) {
        predictor.update(attempt);
    }

    let mut labels = Vec::with_capacity(split.test.len());
    let mut probabilities = Vec::with_capacity(split.test.len());
    for attempt in &split.test {
        probabilities.push(predictor.predict(attempt));
        labels.push(attempt.success_ratio.map(|ratio| binarize(ratio, threshold)));
        predictor.update(attempt);
    }

    let metrics = Metrics::compute(&labels, &probabilities, bins);
    debug!(model = predictor.name(), count = metrics.count, "Scored model");
    ModelScore {
        name: predictor.name().to_string(),
        metrics,
    }
}

/// Replay attempt history through every built-in model.
///
/// Ungraded attempts are dropped. `params` holds calibrated parameters by
/// item ID; items without them fall back to metadata heuristics.
#[must_use]
pub fn run_evaluation(
    attempts: &[Attempt],
    items: &[Item],
    params: HashMap<String, IrtParams>,
    config: &Config,
) -> Scorecard {
    let eval = &config.evaluation;
    let graded: Vec<Attempt> = attempts.iter().filter(|a| a.is_graded()).cloned().collect();
    if graded.is_empty() {
        warn!("No graded attempts to evaluate");
    }

    let split = time_aware_split(&graded, eval.train_ratio, eval.validation_ratio);
    let threshold = eval.success_threshold;
    let defaults = config.bkt.defaults();
    let initial_mastery = config.bkt.initial_mastery;

    let mut predictors: Vec<Box<dyn Predictor>> = vec![
        Box::new(MovingAverage::new(eval.moving_average_window, threshold)),
        Box::new(BktOneSkill::new(BktVariant::Legacy, defaults, initial_mastery, threshold)),
        Box::new(BktOneSkill::new(BktVariant::Corrected, defaults, initial_mastery, threshold)),
        Box::new(IrtOnline::new(
            params,
            items,
            config.irt.prior(),
            config.irt.initial_ability,
            threshold,
        )),
    ];

    let models = predictors
        .iter_mut()
        .map(|predictor| score(predictor.as_mut(), &split, threshold, eval.ece_bins))
        .collect();

    let splits = split.sizes();
    info!(
        train = splits.train,
        validation = splits.validation,
        test = splits.test,
        "Evaluation complete"
    );

    Scorecard {
        generated_at: Utc::now(),
        splits,
        models,
    }
}
