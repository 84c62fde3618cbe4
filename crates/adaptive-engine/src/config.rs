//! Configuration management for the adaptive engine.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::bkt::{BktVariant, ResolvedBkt};
use crate::error::{Error, Result};
use crate::irt::IrtPrior;
use crate::model::Difficulty;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "adaptive-engine";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "adaptive.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `ADAPTIVE_`, sections separated by `__`)
/// 2. TOML config file at `~/.config/adaptive-engine/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Knowledge tracing configuration.
    pub bkt: BktConfig,
    /// Item response theory configuration.
    pub irt: IrtConfig,
    /// Session and selection policy.
    pub policy: PolicyConfig,
    /// Offline calibration defaults.
    pub calibration: CalibrationConfig,
    /// Evaluation harness defaults.
    pub evaluation: EvaluationConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/adaptive-engine/adaptive.db`
    pub database_path: Option<PathBuf>,
}

/// BKT defaults and the update-order flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BktConfig {
    /// Guessing probability when neither course nor component sets one.
    pub guessing_probability: f64,
    /// Slipping probability when neither course nor component sets one.
    pub slipping_probability: f64,
    /// Learning rate when neither course nor component sets one.
    pub learning_rate: f64,
    /// Mastery assigned to new learners.
    pub initial_mastery: f64,
    /// Use the corrected (condition-then-learn) update.
    pub corrected: bool,
}

/// IRT prior and step size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IrtConfig {
    /// Prior mean of ability.
    pub prior_mean: f64,
    /// Prior variance of ability.
    pub prior_variance: f64,
    /// Gradient step size.
    pub learning_rate: f64,
    /// Ability assigned to new learners.
    pub initial_ability: f64,
}

/// Session parameter and item selection policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Exploration probability when choosing a difficulty band.
    pub epsilon: f64,
    /// Abilities below this map to easy.
    pub easy_below: f64,
    /// Abilities at or above this map to hard.
    pub hard_from: f64,
    /// Lowest band the selector may choose.
    pub min_difficulty: Difficulty,
    /// Highest band the selector may choose.
    pub max_difficulty: Difficulty,
    /// Items seen within this many minutes are not offered again.
    pub avoid_repeat_minutes: u32,
    /// Per-question time limit before ability scaling, in seconds.
    pub base_time_limit_secs: u32,
    /// Smallest session size.
    pub min_questions: u32,
    /// Largest session size.
    pub max_questions: u32,
    /// Mastery above which single-answer items are included.
    pub qcs_mastery: f64,
    /// Mastery above which open-answer items are included.
    pub qroc_mastery: f64,
    /// Mastery above which question and option orders are randomized.
    pub randomize_mastery: f64,
}

/// Calibration defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Items with fewer graded attempts are skipped.
    pub min_attempts: u32,
    /// Source label stored with calibrated parameters.
    pub source: String,
}

/// Evaluation harness defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Success ratio at or above which an attempt counts as correct.
    pub success_threshold: f64,
    /// Window of the moving-average baseline.
    pub moving_average_window: usize,
    /// Share of each learner's history used for training.
    pub train_ratio: f64,
    /// Share of each learner's history used for validation.
    pub validation_ratio: f64,
    /// Number of calibration bins.
    pub ece_bins: usize,
}

impl Default for BktConfig {
    fn default() -> Self {
        let defaults = ResolvedBkt::default();
        Self {
            guessing_probability: defaults.guessing,
            slipping_probability: defaults.slipping,
            learning_rate: defaults.learning_rate,
            initial_mastery: 0.2,
            corrected: false,
        }
    }
}

impl Default for IrtConfig {
    fn default() -> Self {
        let prior = IrtPrior::default();
        Self {
            prior_mean: prior.mean,
            prior_variance: prior.variance,
            learning_rate: prior.learning_rate,
            initial_ability: 0.0,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.1,
            easy_below: 0.3,
            hard_from: 0.7,
            min_difficulty: Difficulty::Easy,
            max_difficulty: Difficulty::Hard,
            avoid_repeat_minutes: 60,
            base_time_limit_secs: 60,
            min_questions: 5,
            max_questions: 25,
            qcs_mastery: 0.4,
            qroc_mastery: 0.7,
            randomize_mastery: 0.5,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_attempts: 25,
            source: "offline-script".to_string(),
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            success_threshold: 0.7,
            moving_average_window: 5,
            train_ratio: 0.7,
            validation_ratio: 0.15,
            ece_bins: 10,
        }
    }
}

impl BktConfig {
    /// The configured fallback parameters.
    #[must_use]
    pub fn defaults(&self) -> ResolvedBkt {
        ResolvedBkt {
            guessing: self.guessing_probability,
            slipping: self.slipping_probability,
            learning_rate: self.learning_rate,
        }
    }

    /// The configured update order.
    #[must_use]
    pub fn variant(&self) -> BktVariant {
        BktVariant::from_flag(self.corrected)
    }
}

impl IrtConfig {
    /// The configured prior.
    #[must_use]
    pub fn prior(&self) -> IrtPrior {
        IrtPrior {
            mean: self.prior_mean,
            variance: self.prior_variance,
            learning_rate: self.learning_rate,
        }
    }
}

impl PolicyConfig {
    /// The repeat-avoidance window as a Duration.
    #[must_use]
    pub fn avoid_repeat(&self) -> Duration {
        Duration::from_secs(u64::from(self.avoid_repeat_minutes) * 60)
    }
}

fn check_probability(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::ConfigValidation {
            message: format!("{name} must be within [0, 1], got {value}"),
        })
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        // Field names contain underscores, so sections nest on `__`.
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("ADAPTIVE_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        check_probability("bkt.guessing_probability", self.bkt.guessing_probability)?;
        check_probability("bkt.slipping_probability", self.bkt.slipping_probability)?;
        check_probability("bkt.learning_rate", self.bkt.learning_rate)?;
        check_probability("bkt.initial_mastery", self.bkt.initial_mastery)?;

        if self.irt.prior_variance.is_nan() || self.irt.prior_variance <= 0.0 {
            return Err(Error::ConfigValidation {
                message: format!(
                    "irt.prior_variance must be positive, got {}",
                    self.irt.prior_variance
                ),
            });
        }
        if self.irt.learning_rate.is_nan() || self.irt.learning_rate <= 0.0 {
            return Err(Error::ConfigValidation {
                message: format!(
                    "irt.learning_rate must be positive, got {}",
                    self.irt.learning_rate
                ),
            });
        }

        check_probability("policy.epsilon", self.policy.epsilon)?;
        if self.policy.easy_below > self.policy.hard_from {
            return Err(Error::ConfigValidation {
                message: format!(
                    "policy.easy_below ({}) cannot be greater than policy.hard_from ({})",
                    self.policy.easy_below, self.policy.hard_from
                ),
            });
        }
        if self.policy.min_difficulty > self.policy.max_difficulty {
            return Err(Error::ConfigValidation {
                message: format!(
                    "policy.min_difficulty ({}) cannot be above policy.max_difficulty ({})",
                    self.policy.min_difficulty, self.policy.max_difficulty
                ),
            });
        }
        if self.policy.min_questions == 0 || self.policy.min_questions > self.policy.max_questions
        {
            return Err(Error::ConfigValidation {
                message: format!(
                    "policy.min_questions ({}) must be positive and not above policy.max_questions ({})",
                    self.policy.min_questions, self.policy.max_questions
                ),
            });
        }

        if self.calibration.min_attempts == 0 {
            return Err(Error::ConfigValidation {
                message: "calibration.min_attempts must be greater than 0".to_string(),
            });
        }

        check_probability("evaluation.success_threshold", self.evaluation.success_threshold)?;
        check_probability("evaluation.train_ratio", self.evaluation.train_ratio)?;
        check_probability("evaluation.validation_ratio", self.evaluation.validation_ratio)?;
        if self.evaluation.train_ratio + self.evaluation.validation_ratio > 1.0 {
            return Err(Error::ConfigValidation {
                message: "evaluation.train_ratio + evaluation.validation_ratio cannot exceed 1"
                    .to_string(),
            });
        }
        if self.evaluation.ece_bins == 0 || self.evaluation.moving_average_window == 0 {
            return Err(Error::ConfigValidation {
                message: "evaluation.ece_bins and evaluation.moving_average_window must be greater than 0"
                    .to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(!config.bkt.corrected);
        assert_eq!(config.bkt.initial_mastery, 0.2);
    }

    #[test]
    fn test_default_irt_prior() {
        let prior = IrtConfig::default().prior();
        assert_eq!(prior.mean, 0.0);
        assert_eq!(prior.variance, 4.0);
        assert_eq!(prior.learning_rate, 0.75);
    }

    #[test]
    fn test_bkt_variant_follows_flag() {
        let mut bkt = BktConfig::default();
        assert_eq!(bkt.variant(), BktVariant::Legacy);
        bkt.corrected = true;
        assert_eq!(bkt.variant(), BktVariant::Corrected);
    }

    #[test]
    fn test_validate_probability_range() {
        let mut config = Config::default();
        config.bkt.slipping_probability = 1.5;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("bkt.slipping_probability"));
    }

    #[test]
    fn test_validate_prior_variance() {
        let mut config = Config::default();
        config.irt.prior_variance = 0.0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("prior_variance"));

        config.irt.prior_variance = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_inverted_thresholds() {
        let mut config = Config::default();
        config.policy.easy_below = 0.8;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("easy_below"));
    }

    #[test]
    fn test_validate_difficulty_bounds() {
        let mut config = Config::default();
        config.policy.min_difficulty = Difficulty::Hard;
        config.policy.max_difficulty = Difficulty::Medium;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_split_ratios() {
        let mut config = Config::default();
        config.evaluation.train_ratio = 0.9;
        config.evaluation.validation_ratio = 0.2;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("cannot exceed 1"));
    }

    #[test]
    fn test_validate_zero_min_attempts() {
        let mut config = Config::default();
        config.calibration.min_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        assert!(config.database_path().to_string_lossy().contains("adaptive.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));
        assert_eq!(config.database_path(), PathBuf::from("/custom/path/db.sqlite"));
    }

    #[test]
    fn test_avoid_repeat_duration() {
        let policy = PolicyConfig::default();
        assert_eq!(policy.avoid_repeat(), Duration::from_secs(3600));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("adaptive-engine"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        // Jail keeps env overrides from other tests out.
        figment::Jail::expect_with(|_| {
            let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn test_env_selects_corrected_bkt() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("ADAPTIVE_BKT__CORRECTED", "true");
            let config = Config::load_from(Some(PathBuf::from("missing.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.bkt.variant(), BktVariant::Corrected);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_toml_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                "[bkt]\ncorrected = false\n\n[policy]\nepsilon = 0.3\n",
            )?;
            jail.set_env("ADAPTIVE_BKT__CORRECTED", "true");
            jail.set_env("ADAPTIVE_POLICY__AVOID_REPEAT_MINUTES", "5");

            let config = Config::load_from(Some(PathBuf::from("config.toml")))
                .map_err(|e| e.to_string())?;
            assert!(config.bkt.corrected);
            assert_eq!(config.policy.epsilon, 0.3);
            assert_eq!(config.policy.avoid_repeat(), Duration::from_secs(300));
            Ok(())
        });
    }

    #[test]
    fn test_env_value_is_validated() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("ADAPTIVE_EVALUATION__SUCCESS_THRESHOLD", "1.5");
            let err = Config::load_from(Some(PathBuf::from("missing.toml"))).unwrap_err();
            assert!(err.to_string().contains("evaluation.success_threshold"));
            Ok(())
        });
    }

    #[test]
    fn test_load_from_toml_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                "[bkt]\ncorrected = true\nlearning_rate = 0.25\n\n[policy]\nepsilon = 0.0\nmin_difficulty = \"medium\"\n",
            )?;

            let config = Config::load_from(Some(PathBuf::from("config.toml")))
                .map_err(|e| e.to_string())?;
            assert!(config.bkt.corrected);
            assert_eq!(config.bkt.learning_rate, 0.25);
            assert_eq!(config.policy.epsilon, 0.0);
            assert_eq!(config.policy.min_difficulty, Difficulty::Medium);
            assert_eq!(config.irt, IrtConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[policy]\nepsilon = 2.0\n")?;

            let err = Config::load_from(Some(PathBuf::from("config.toml"))).unwrap_err();
            assert!(matches!(err, Error::ConfigValidation { .. }));
            Ok(())
        });
    }

    #[test]
    fn test_config_serialize_roundtrip_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("prior_variance"));
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
