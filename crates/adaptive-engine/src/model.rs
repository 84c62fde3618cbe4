//! Core domain types for the adaptive engine.
//!
//! Items (MCQs), courses, knowledge components, attempts and learners as the
//! engine sees them. Persistence lives in [`crate::storage`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bkt::BktParams;
use crate::error::Error;
use crate::irt::IrtParams;

/// The answer format of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McqType {
    /// Multiple correct answers may be selected.
    Qcm,
    /// Exactly one correct answer.
    Qcs,
    /// Short open answer.
    Qroc,
}

impl McqType {
    /// Stable lowercase name used in storage and output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qcm => "qcm",
            Self::Qcs => "qcs",
            Self::Qroc => "qroc",
        }
    }
}

impl fmt::Display for McqType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for McqType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qcm" => Ok(Self::Qcm),
            "qcs" => Ok(Self::Qcs),
            "qroc" => Ok(Self::Qroc),
            other => Err(Error::invalid("mcq_type", format!("unknown type '{other}'"))),
        }
    }
}

/// Authored difficulty of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Easy item.
    Easy,
    /// Medium item.
    Medium,
    /// Hard item.
    Hard,
}

impl Difficulty {
    /// All bands in ascending order.
    pub const ALL: [Difficulty; 3] = [Self::Easy, Self::Medium, Self::Hard];

    /// Map an ability estimate to a difficulty band.
    ///
    /// Abilities below `easy_below` are easy, below `hard_from` medium, and
    /// everything else hard.
    #[must_use]
    pub fn from_ability(ability: f64, easy_below: f64, hard_from: f64) -> Self {
        if ability < easy_below {
            Self::Easy
        } else if ability < hard_from {
            Self::Medium
        } else {
            Self::Hard
        }
    }

    /// Position of this band in [`Difficulty::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Easy => 0,
            Self::Medium => 1,
            Self::Hard => 2,
        }
    }

    /// Band at `index`, saturating at [`Difficulty::Hard`].
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    /// Stable lowercase name used in storage and output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(Error::invalid(
                "difficulty",
                format!("unknown difficulty '{other}'"),
            )),
        }
    }
}

/// A course and its knowledge tracing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    /// Course identifier.
    pub id: String,
    /// Probability of answering correctly without mastery.
    #[serde(default)]
    pub guessing_probability: Option<f64>,
    /// Probability of answering incorrectly despite mastery.
    #[serde(default)]
    pub slipping_probability: Option<f64>,
    /// Probability of acquiring mastery after one opportunity.
    #[serde(default)]
    pub learning_rate: Option<f64>,
}

impl Course {
    /// Create a course without parameter overrides.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            guessing_probability: None,
            slipping_probability: None,
            learning_rate: None,
        }
    }

    /// The course's BKT parameters.
    #[must_use]
    pub fn bkt_params(&self) -> BktParams {
        BktParams {
            guessing: self.guessing_probability,
            slipping: self.slipping_probability,
            learning_rate: self.learning_rate,
        }
    }
}

/// A skill tagged on items, optionally with its own BKT parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeComponent {
    /// Component identifier.
    pub id: String,
    /// Owning course, if scoped.
    #[serde(default)]
    pub course_id: Option<String>,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Guessing override.
    #[serde(default)]
    pub guessing_probability: Option<f64>,
    /// Slipping override.
    #[serde(default)]
    pub slipping_probability: Option<f64>,
    /// Learning rate override.
    #[serde(default)]
    pub learning_rate: Option<f64>,
}

impl KnowledgeComponent {
    /// The component's BKT parameter overrides.
    #[must_use]
    pub fn bkt_params(&self) -> BktParams {
        BktParams {
            guessing: self.guessing_probability,
            slipping: self.slipping_probability,
            learning_rate: self.learning_rate,
        }
    }
}

/// A question (MCQ) with the metadata the models need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Item identifier.
    pub id: String,
    /// Owning course.
    pub course_id: String,
    /// Answer format.
    #[serde(rename = "type")]
    pub mcq_type: McqType,
    /// Authored difficulty.
    pub difficulty: Difficulty,
    /// Discrimination baseline set by authors.
    #[serde(default)]
    pub baseline: Option<f64>,
    /// Expected answering time in seconds.
    #[serde(default)]
    pub estimated_time: Option<f64>,
    /// Knowledge components exercised by this item.
    #[serde(default)]
    pub knowledge_components: Vec<String>,
}

/// One answer submitted by a learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Row identifier (assigned by storage layer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Who answered.
    pub user_id: String,
    /// What was answered.
    pub item_id: String,
    /// Course the item belongs to.
    pub course_id: String,
    /// Training session the attempt was part of.
    #[serde(default)]
    pub session_id: Option<String>,
    /// When it was answered.
    pub timestamp: DateTime<Utc>,
    /// Graded accuracy in [0, 1]; `None` for ungraded or skipped answers.
    #[serde(default)]
    pub success_ratio: Option<f64>,
    /// Explicit correctness verdict, if the grader produced one.
    #[serde(default)]
    pub is_correct: Option<bool>,
    /// Seconds spent answering.
    #[serde(default)]
    pub time_spent: Option<f64>,
    /// Knowledge components credited by this attempt.
    #[serde(default)]
    pub knowledge_components: Vec<String>,
    /// BLAKE3 hash of the identifying fields, used for deduplication.
    #[serde(default)]
    pub content_hash: String,
}

impl Attempt {
    /// Create an attempt stamped now, with its hash computed.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        item_id: impl Into<String>,
        course_id: impl Into<String>,
        success_ratio: Option<f64>,
    ) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            item_id: item_id.into(),
            course_id: course_id.into(),
            session_id: None,
            timestamp: Utc::now(),
            success_ratio,
            is_correct: None,
            time_spent: None,
            knowledge_components: Vec::new(),
            content_hash: String::new(),
        }
        .with_hash()
    }

    /// Recompute `content_hash` from the identifying fields.
    #[must_use]
    pub fn with_hash(mut self) -> Self {
        self.content_hash = self.compute_hash();
        self
    }

    /// Compute the BLAKE3 hash of user, item, session and timestamp.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.user_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.item_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.session_id.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\0");
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Whether the answer counts as correct.
    ///
    /// Uses the explicit verdict when present, otherwise compares the
    /// success ratio against `threshold`.
    #[must_use]
    pub fn correctness(&self, threshold: f64) -> Option<bool> {
        self.is_correct
            .or_else(|| self.success_ratio.map(|ratio| ratio >= threshold))
    }

    /// Whether the attempt carries a grade.
    #[must_use]
    pub fn is_graded(&self) -> bool {
        self.success_ratio.is_some()
    }
}

/// Adaptive state of one user in one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Learner {
    /// Row identifier.
    pub id: i64,
    /// User identifier.
    pub user_id: String,
    /// Course identifier.
    pub course_id: String,
    /// BKT mastery in [0, 1].
    pub mastery: f64,
    /// IRT ability (theta).
    pub ability: f64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Mastery of one knowledge component for one learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentMastery {
    /// Owning learner.
    pub learner_id: i64,
    /// Knowledge component identifier.
    pub component_id: String,
    /// BKT mastery in [0, 1].
    pub mastery: f64,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// One stored version of an item's response parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCalibration {
    /// Item the parameters belong to.
    pub item_id: String,
    /// The 3PL parameters.
    pub params: IrtParams,
    /// Producer label, e.g. `offline-script`.
    pub source: Option<String>,
    /// Version label, unique per item.
    pub version: String,
    /// Whether this is the version the engine reads.
    pub is_latest: bool,
    /// Graded attempts the estimate was computed from.
    pub attempts: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}
