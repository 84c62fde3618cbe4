//! Probabilistic forecast metrics.
//!
//! All functions skip rows without a label and clamp probabilities into
//! [0, 1] before scoring.

use serde::{Deserialize, Serialize};

const LOG_EPSILON: f64 = 1e-12;

fn labeled<'a>(
    labels: &'a [Option<bool>],
    probabilities: &'a [f64],
) -> impl Iterator<Item = (bool, f64)> + 'a {
    labels
        .iter()
        .zip(probabilities)
        .filter_map(|(label, p)| label.map(|y| (y, p.clamp(0.0, 1.0))))
}

fn as_f64(label: bool) -> f64 {
    if label {
        1.0
    } else {
        0.0
    }
}

/// Mean negative log-likelihood. Empty input gives 0.
#[must_use]
pub fn log_loss(labels: &[Option<bool>], probabilities: &[f64]) -> f64 {
    let (sum, n) = labeled(labels, probabilities).fold((0.0, 0_usize), |(sum, n), (y, p)| {
        let p = p.clamp(LOG_EPSILON, 1.0 - LOG_EPSILON);
        let loss = if y { -p.ln() } else { -(1.0 - p).ln() };
        (sum + loss, n + 1)
    });
    sum / n.max(1) as f64
}

/// Mean squared error of the probabilities. Empty input gives 0.
#[must_use]
pub fn brier(labels: &[Option<bool>], probabilities: &[f64]) -> f64 {
    let (sum, n) = labeled(labels, probabilities).fold((0.0, 0_usize), |(sum, n), (y, p)| {
        (sum + (p - as_f64(y)).powi(2), n + 1)
    });
    sum / n.max(1) as f64
}

/// Area under the ROC curve from the rank-sum statistic.
///
/// Tied probabilities share their average rank. Returns `None` when either
/// class is absent.
#[must_use]
pub fn auc(labels: &[Option<bool>], probabilities: &[f64]) -> Option<f64> {
    let mut pairs: Vec<(f64, bool)> = labeled(labels, probabilities).map(|(y, p)| (p, y)).collect();
    let positives = pairs.iter().filter(|(_, y)| *y).count();
    let negatives = pairs.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut rank_sum = 0.0;
    let mut start = 0;
    while start < pairs.len() {
        let mut end = start;
        while end + 1 < pairs.len() && pairs[end + 1].0 == pairs[start].0 {
            end += 1;
        }
        // Ranks are 1-based; the tie group spans start+1..=end+1.
        let mean_rank = (start + end + 2) as f64 / 2.0;
        let group_positives = pairs[start..=end].iter().filter(|(_, y)| *y).count();
        rank_sum += mean_rank * group_positives as f64;
        start = end + 1;
    }

    let pos = positives as f64;
    let neg = negatives as f64;
    Some((rank_sum - pos * (pos + 1.0) / 2.0) / (pos * neg))
}

/// Expected calibration error over `bins` equal-width bins.
#[must_use]
pub fn ece(labels: &[Option<bool>], probabilities: &[f64], bins: usize) -> f64 {
    let bins = bins.max(1);
    let mut buckets = vec![(0_usize, 0.0, 0.0); bins];
    for (y, p) in labeled(labels, probabilities) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = ((p * bins as f64) as usize).min(bins - 1);
        let bucket = &mut buckets[index];
        bucket.0 += 1;
        bucket.1 += as_f64(y);
        bucket.2 += p;
    }

    let total: usize = buckets.iter().map(|b| b.0).sum();
    if total == 0 {
        return 0.0;
    }
    buckets
        .iter()
        .filter(|b| b.0 > 0)
        .map(|&(count, hits, confidence)| {
            let n = count as f64;
            n / total as f64 * (hits / n - confidence / n).abs()
        })
        .sum()
}

/// Metrics of one model on one set of predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Labeled predictions scored.
    pub count: usize,
    /// Mean log-loss.
    pub log_loss: Option<f64>,
    /// Brier score.
    pub brier: Option<f64>,
    /// Rank AUC.
    pub auc: Option<f64>,
    /// Expected calibration error.
    pub ece: Option<f64>,
}

impl Metrics {
    /// Score `probabilities` against `labels`. With no labeled rows every
    /// metric is `None`.
    #[must_use]
    pub fn compute(labels: &[Option<bool>], probabilities: &[f64], bins: usize) -> Self {
        let count = labeled(labels, probabilities).count();
        if count == 0 {
            return Self {
                count,
                log_loss: None,
                brier: None,
                auc: None,
                ece: None,
            };
        }
        Self {
            count,
            log_loss: Some(log_loss(labels, probabilities)),
            brier: Some(brier(labels, probabilities)),
            auc: auc(labels, probabilities),
            ece: Some(ece(labels, probabilities, bins)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(values: &[bool]) -> Vec<Option<bool>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_log_loss_known_value() {
        let loss = log_loss(&labels(&[true, false]), &[0.8, 0.4]);
        let expected = -(0.8_f64.ln() + 0.6_f64.ln()) / 2.0;
        assert!((loss - expected).abs() < 1e-12);
    }

    #[test]
    fn test_log_loss_is_finite_at_extremes() {
        let loss = log_loss(&labels(&[true, false]), &[0.0, 1.0]);
        assert!(loss.is_finite());
        assert!(loss > 20.0);
    }

    #[test]
    fn test_brier_known_value() {
        let score = brier(&labels(&[true, false, true]), &[1.0, 0.5, 0.5]);
        assert!((score - (0.0 + 0.25 + 0.25) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_unlabeled_rows_are_ignored() {
        let with_gap = vec![Some(true), None, Some(false)];
        assert_eq!(
            brier(&with_gap, &[0.9, 0.1, 0.2]),
            brier(&labels(&[true, false]), &[0.9, 0.2])
        );
    }

    #[test]
    fn test_auc_perfect_and_inverted() {
        let y = labels(&[false, false, true, true]);
        assert_eq!(auc(&y, &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(auc(&y, &[0.9, 0.8, 0.2, 0.1]), Some(0.0));
    }

    #[test]
    fn test_auc_ties_count_half() {
        let y = labels(&[false, true]);
        assert_eq!(auc(&y, &[0.5, 0.5]), Some(0.5));
    }

    #[test]
    fn test_auc_undefined_for_single_class() {
        assert_eq!(auc(&labels(&[true, true]), &[0.3, 0.7]), None);
        assert_eq!(auc(&[], &[]), None);
    }

    #[test]
    fn test_ece_perfectly_calibrated() {
        let y = labels(&[true, false, true, false]);
        assert!(ece(&y, &[0.5, 0.5, 0.5, 0.5], 10).abs() < 1e-12);
    }

    #[test]
    fn test_ece_overconfident() {
        let y = labels(&[false, false]);
        assert!((ece(&y, &[0.95, 1.0], 10) - 0.975).abs() < 1e-12);
    }

    #[test]
    fn test_metrics_compute_empty() {
        let metrics = Metrics::compute(&[None], &[0.4], 10);
        assert_eq!(metrics.count, 0);
        assert!(metrics.log_loss.is_none());
        assert!(metrics.auc.is_none());
    }
}
