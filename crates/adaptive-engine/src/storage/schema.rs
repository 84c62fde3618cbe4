//! `SQLite` schema definitions for the adaptive engine.
//!
//! Statements are grouped by the migration that introduces them.

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// SQL statement to create the courses table.
pub const CREATE_COURSES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS courses (
    id TEXT PRIMARY KEY,
    guessing_probability REAL,
    slipping_probability REAL,
    learning_rate REAL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
)
";

/// SQL statement to create the items table.
pub const CREATE_ITEMS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    course_id TEXT NOT NULL,
    mcq_type TEXT NOT NULL,
    difficulty TEXT NOT NULL,
    baseline REAL,
    estimated_time REAL,
    knowledge_components TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
)
";

/// SQL statement to index items by course.
pub const CREATE_ITEMS_COURSE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_items_course ON items(course_id)
";

/// SQL statement to create the learners table (one row per user and course).
pub const CREATE_LEARNERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS learners (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    course_id TEXT NOT NULL,
    mastery REAL NOT NULL,
    ability REAL NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (user_id, course_id)
)
";

/// SQL statement to create the attempts table.
pub const CREATE_ATTEMPTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS attempts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    item_id TEXT NOT NULL,
    course_id TEXT NOT NULL,
    session_id TEXT,
    timestamp TEXT NOT NULL,
    success_ratio REAL,
    is_correct INTEGER,
    time_spent REAL,
    knowledge_components TEXT NOT NULL DEFAULT '[]',
    content_hash TEXT NOT NULL UNIQUE
)
";

/// SQL statement to index attempts by user and time.
pub const CREATE_ATTEMPTS_USER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_attempts_user ON attempts(user_id, timestamp)
";

/// SQL statement to index attempts by item for calibration.
pub const CREATE_ATTEMPTS_ITEM_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_attempts_item ON attempts(item_id)
";

/// SQL statement to index attempts by session for selection.
pub const CREATE_ATTEMPTS_SESSION_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_attempts_session ON attempts(user_id, session_id)
";

/// SQL statement to create the knowledge components table.
pub const CREATE_KNOWLEDGE_COMPONENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS knowledge_components (
    id TEXT PRIMARY KEY,
    course_id TEXT,
    name TEXT NOT NULL DEFAULT '',
    guessing_probability REAL,
    slipping_probability REAL,
    learning_rate REAL
)
";

/// SQL statement to create per-learner component mastery.
pub const CREATE_LEARNER_COMPONENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS learner_components (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    learner_id INTEGER NOT NULL REFERENCES learners(id) ON DELETE CASCADE,
    component_id TEXT NOT NULL,
    mastery REAL NOT NULL DEFAULT 0.2,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL,
    UNIQUE (learner_id, component_id)
)
";

/// SQL statement to index learner components by component.
pub const CREATE_LEARNER_COMPONENTS_COMPONENT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_learner_components_component ON learner_components(component_id)
";

/// SQL statement to create versioned item parameters.
pub const CREATE_ITEM_IRT_PARAMS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS item_irt_params (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    discrimination REAL NOT NULL,
    difficulty REAL NOT NULL,
    guessing REAL NOT NULL,
    source TEXT,
    version TEXT NOT NULL,
    is_latest INTEGER NOT NULL DEFAULT 1,
    attempts INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (item_id, version)
)
";

/// SQL statement guaranteeing at most one latest row per item.
pub const CREATE_ITEM_IRT_PARAMS_LATEST_INDEX: &str = r"
CREATE UNIQUE INDEX IF NOT EXISTS idx_item_irt_params_latest
ON item_irt_params(item_id) WHERE is_latest = 1
";

/// SQL statement to index item parameters by source.
pub const CREATE_ITEM_IRT_PARAMS_SOURCE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_item_irt_params_source ON item_irt_params(source)
";

/// SQL statement to index item parameters by version.
pub const CREATE_ITEM_IRT_PARAMS_VERSION_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_item_irt_params_version ON item_irt_params(version)
";

/// Statements created before any migration runs.
pub const BASE_STATEMENTS: &[&str] = &[CREATE_METADATA_TABLE];

/// Version 1: courses, items, learners and attempt history.
pub const V1_STATEMENTS: &[&str] = &[
    CREATE_COURSES_TABLE,
    CREATE_ITEMS_TABLE,
    CREATE_ITEMS_COURSE_INDEX,
    CREATE_LEARNERS_TABLE,
    CREATE_ATTEMPTS_TABLE,
    CREATE_ATTEMPTS_USER_INDEX,
    CREATE_ATTEMPTS_ITEM_INDEX,
    CREATE_ATTEMPTS_SESSION_INDEX,
];

/// Version 2: knowledge components and per-component mastery.
pub const V2_STATEMENTS: &[&str] = &[
    CREATE_KNOWLEDGE_COMPONENTS_TABLE,
    CREATE_LEARNER_COMPONENTS_TABLE,
    CREATE_LEARNER_COMPONENTS_COMPONENT_INDEX,
];

/// Version 3: versioned item response parameters.
pub const V3_STATEMENTS: &[&str] = &[
    CREATE_ITEM_IRT_PARAMS_TABLE,
    CREATE_ITEM_IRT_PARAMS_LATEST_INDEX,
    CREATE_ITEM_IRT_PARAMS_SOURCE_INDEX,
    CREATE_ITEM_IRT_PARAMS_VERSION_INDEX,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_statements_not_empty() {
        for group in [BASE_STATEMENTS, V1_STATEMENTS, V2_STATEMENTS, V3_STATEMENTS] {
            assert!(!group.is_empty());
            for stmt in group {
                assert!(!stmt.trim().is_empty());
            }
        }
    }

    #[test]
    fn test_learners_unique_per_course() {
        assert!(CREATE_LEARNERS_TABLE.contains("UNIQUE (user_id, course_id)"));
    }

    #[test]
    fn test_item_params_versioned() {
        assert!(CREATE_ITEM_IRT_PARAMS_TABLE.contains("UNIQUE (item_id, version)"));
        assert!(CREATE_ITEM_IRT_PARAMS_LATEST_INDEX.contains("WHERE is_latest = 1"));
    }
}
