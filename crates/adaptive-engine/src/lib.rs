//! `adaptive-engine` - Knowledge tracing and adaptive item selection
//!
//! This library tracks what learners know from their graded answers (BKT
//! mastery per course and knowledge component, IRT ability per course),
//! calibrates item parameters offline, decides training session settings and
//! picks the next item, and evaluates tracing models on recorded history.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod bkt;
pub mod calibration;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod irt;
pub mod logging;
pub mod model;
pub mod policy;
pub mod storage;
pub mod synthetic;

pub use config::Config;
pub use engine::{AdaptiveEngine, AttemptInput, RecordOutcome};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use model::{Attempt, Course, Item, KnowledgeComponent, Learner};
pub use storage::{Storage, StorageStats};
