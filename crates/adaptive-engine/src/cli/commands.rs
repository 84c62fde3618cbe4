//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand, ValueEnum};

use crate::policy::SessionField;

/// Learner inspection commands.
#[derive(Debug, Subcommand)]
pub enum LearnerCommand {
    /// Show course mastery and ability
    Show {
        /// User identifier
        user: String,
        /// Course identifier; all courses of the user when omitted
        #[arg(long)]
        course: Option<String>,
    },

    /// Show per-component mastery
    Components {
        /// User identifier
        user: String,
        /// Course identifier
        #[arg(long)]
        course: String,
    },
}

/// Record command arguments.
#[derive(Debug, Args)]
pub struct RecordCommand {
    /// User identifier
    pub user: String,

    /// Item identifier
    pub item: String,

    /// Training session; only session attempts update the learner
    #[arg(short, long)]
    pub session: Option<String>,

    /// Graded accuracy in [0, 1]
    #[arg(short = 'r', long)]
    pub success_ratio: Option<f64>,

    /// Explicit verdict (true or false)
    #[arg(long)]
    pub correct: Option<bool>,

    /// Seconds spent answering
    #[arg(short, long)]
    pub time_spent: Option<f64>,

    /// When the answer was given (RFC 3339, defaults to now)
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
}

/// Import commands. Each file holds one JSON object per line; `-` reads stdin.
#[derive(Debug, Subcommand)]
pub enum ImportCommand {
    /// Import courses
    Courses {
        /// JSON lines file
        file: PathBuf,
    },

    /// Import knowledge components
    Components {
        /// JSON lines file
        file: PathBuf,
    },

    /// Import items
    Items {
        /// JSON lines file
        file: PathBuf,
    },

    /// Import attempt history without updating learners
    Attempts {
        /// JSON lines file
        file: PathBuf,
    },
}

/// Calibrate command arguments.
#[derive(Debug, Args)]
pub struct CalibrateCommand {
    /// Only calibrate items of this course
    #[arg(long)]
    pub course: Option<String>,

    /// Minimum graded attempts per item (defaults to configuration)
    #[arg(long)]
    pub min_attempts: Option<u32>,

    /// Version label for the stored parameters (defaults to today's date)
    #[arg(long, value_name = "VERSION")]
    pub label: Option<String>,

    /// Source label (defaults to configuration)
    #[arg(long)]
    pub source: Option<String>,
}

/// Item parameter commands.
#[derive(Debug, Subcommand)]
pub enum ParamsCommand {
    /// Show the parameters the engine would use for an item
    Show {
        /// Item identifier
        item: String,

        /// List every stored version instead
        #[arg(short, long)]
        all: bool,
    },
}

/// Session command arguments.
#[derive(Debug, Args)]
pub struct SessionCommand {
    /// User identifier
    pub user: String,

    /// Course identifier
    pub course: String,

    /// Fields to decide (all when omitted)
    #[arg(short, long = "field", value_enum, value_delimiter = ',')]
    pub fields: Vec<SessionFieldArg>,
}

/// Next-item command arguments.
#[derive(Debug, Args)]
pub struct NextCommand {
    /// User identifier
    pub user: String,

    /// Course identifier
    pub course: String,

    /// Current session; its items are not offered again
    #[arg(short, long)]
    pub session: Option<String>,

    /// Seed for the exploration step
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Evaluate command arguments.
#[derive(Debug, Args)]
pub struct EvaluateCommand {
    /// Only evaluate attempts of this course
    #[arg(long)]
    pub course: Option<String>,

    /// Write the scorecard to this file
    #[arg(short, long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Also write the scorecard as CSV to this file
    #[arg(long, value_name = "FILE")]
    pub csv: Option<PathBuf>,
}

/// Seed command arguments.
#[derive(Debug, Args)]
pub struct SeedCommand {
    /// User identifier
    pub user: String,

    /// Course identifier
    pub course: String,

    /// Attempts generated per item
    #[arg(short = 'n', long, default_value = "1")]
    pub attempts_per_item: u32,

    /// Lowest generated success ratio
    #[arg(long, default_value = "0.4")]
    pub min_ratio: f64,

    /// Highest generated success ratio
    #[arg(long, default_value = "0.9")]
    pub max_ratio: f64,

    /// Random seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Session field argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SessionFieldArg {
    /// Multiple-answer items
    Qcm,
    /// Single-answer items
    Qcs,
    /// Open-answer items
    Qroc,
    /// Seconds per question
    TimeLimit,
    /// Session length
    NumberOfQuestions,
    /// Starting difficulty
    Difficulty,
    /// Shuffle question order
    RandomizeQuestionsOrder,
    /// Shuffle option order
    RandomizeOptionsOrder,
}

impl From<SessionFieldArg> for SessionField {
    fn from(arg: SessionFieldArg) -> Self {
        match arg {
            SessionFieldArg::Qcm => Self::Qcm,
            SessionFieldArg::Qcs => Self::Qcs,
            SessionFieldArg::Qroc => Self::Qroc,
            SessionFieldArg::TimeLimit => Self::TimeLimit,
            SessionFieldArg::NumberOfQuestions => Self::NumberOfQuestions,
            SessionFieldArg::Difficulty => Self::Difficulty,
            SessionFieldArg::RandomizeQuestionsOrder => Self::RandomizeQuestionsOrder,
            SessionFieldArg::RandomizeOptionsOrder => Self::RandomizeOptionsOrder,
        }
    }
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}
