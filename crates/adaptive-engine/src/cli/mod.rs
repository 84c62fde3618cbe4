//! Command-line interface for the adaptive engine.
//!
//! This module provides the CLI structure for the `adaptctl` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    CalibrateCommand, ConfigCommand, EvaluateCommand, ImportCommand, LearnerCommand, NextCommand,
    OutputFormat, ParamsCommand, RecordCommand, SeedCommand, SessionCommand, SessionFieldArg,
};

/// adaptctl - Adaptive learning engine
///
/// Tracks learner mastery and ability from graded answers, calibrates item
/// parameters and picks what to practice next.
#[derive(Debug, Parser)]
#[command(name = "adaptctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, value_enum, global = true, default_value = "plain")]
    pub format: OutputFormat,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect learner state
    #[command(subcommand)]
    Learner(LearnerCommand),

    /// Record a graded answer
    Record(RecordCommand),

    /// Import courses, components, items or attempts
    #[command(subcommand)]
    Import(ImportCommand),

    /// Calibrate item parameters from attempt history
    Calibrate(CalibrateCommand),

    /// Inspect item parameters
    #[command(subcommand)]
    Params(ParamsCommand),

    /// Decide training session settings
    Session(SessionCommand),

    /// Pick the next item to practice
    Next(NextCommand),

    /// Evaluate knowledge-tracing models on attempt history
    Evaluate(EvaluateCommand),

    /// Generate synthetic attempt history
    Seed(SeedCommand),

    /// Show database status
    Status,

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
