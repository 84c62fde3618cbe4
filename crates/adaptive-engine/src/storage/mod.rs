//! Storage layer for the adaptive engine.
//!
//! This module provides `SQLite`-based persistent storage for courses, items,
//! attempt history, learner state and versioned item parameters.

pub mod migrations;
pub mod schema;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::irt::IrtParams;
use crate::model::{
    Attempt, ComponentMastery, Course, Item, ItemCalibration, KnowledgeComponent, Learner,
};

const ATTEMPT_COLUMNS: &str = "id, user_id, item_id, course_id, session_id, timestamp, \
     success_ratio, is_correct, time_spent, knowledge_components, content_hash";

const LEARNER_COLUMNS: &str = "id, user_id, course_id, mastery, ability, created_at, updated_at";

const CALIBRATION_COLUMNS: &str = "item_id, discrimination, difficulty, guessing, source, \
     version, is_latest, attempts, created_at, updated_at";

/// Filter for [`Storage::attempts`]. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptFilter<'a> {
    /// Only attempts in this course.
    pub course_id: Option<&'a str>,
    /// Only attempts by this user.
    pub user_id: Option<&'a str>,
    /// Only attempts in this session.
    pub session_id: Option<&'a str>,
    /// Only attempts with a success ratio.
    pub graded_only: bool,
}

/// Storage engine for the adaptive engine.
///
/// Provides persistent storage using `SQLite` with support for:
/// - Attempt insertion with deduplication
/// - Learner and per-component mastery state
/// - Versioned item parameters with a single latest row per item
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

/// Timestamps are stored with a fixed width so text ordering matches time ordering.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(index: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(index, e))
}

fn conversion_error(
    index: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn parse_component_list(index: usize, value: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(value).map_err(|e| conversion_error(index, e))
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist,
    /// then brings the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` inside a transaction, committing only if it succeeds.
    ///
    /// Transactions do not nest; calling this from inside `f` fails.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a database error from begin/commit.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    /// Insert or update a course.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert_course(&self, course: &Course) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO courses (id, guessing_probability, slipping_probability, learning_rate)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                guessing_probability = excluded.guessing_probability,
                slipping_probability = excluded.slipping_probability,
                learning_rate = excluded.learning_rate,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            ",
            params![
                course.id,
                course.guessing_probability,
                course.slipping_probability,
                course.learning_rate,
            ],
        )?;
        Ok(())
    }

    /// Get a course by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_course(&self, id: &str) -> Result<Option<Course>> {
        let course = self
            .conn
            .query_row(
                r"
                SELECT id, guessing_probability, slipping_probability, learning_rate
                FROM courses WHERE id = ?1
                ",
                [id],
                |row| {
                    Ok(Course {
                        id: row.get(0)?,
                        guessing_probability: row.get(1)?,
                        slipping_probability: row.get(2)?,
                        learning_rate: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(course)
    }

    /// Insert or update a knowledge component.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert_component(&self, component: &KnowledgeComponent) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO knowledge_components
                (id, course_id, name, guessing_probability, slipping_probability, learning_rate)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                name = excluded.name,
                guessing_probability = excluded.guessing_probability,
                slipping_probability = excluded.slipping_probability,
                learning_rate = excluded.learning_rate
            ",
            params![
                component.id,
                component.course_id,
                component.name,
                component.guessing_probability,
                component.slipping_probability,
                component.learning_rate,
            ],
        )?;
        Ok(())
    }

    /// Get a knowledge component by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_component(&self, id: &str) -> Result<Option<KnowledgeComponent>> {
        let component = self
            .conn
            .query_row(
                r"
                SELECT id, course_id, name, guessing_probability, slipping_probability, learning_rate
                FROM knowledge_components WHERE id = ?1
                ",
                [id],
                |row| {
                    Ok(KnowledgeComponent {
                        id: row.get(0)?,
                        course_id: row.get(1)?,
                        name: row.get(2)?,
                        guessing_probability: row.get(3)?,
                        slipping_probability: row.get(4)?,
                        learning_rate: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(component)
    }

    /// Insert or update an item.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert_item(&self, item: &Item) -> Result<()> {
        let components = serde_json::to_string(&item.knowledge_components)?;
        self.conn.execute(
            r"
            INSERT INTO items
                (id, course_id, mcq_type, difficulty, baseline, estimated_time, knowledge_components)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                mcq_type = excluded.mcq_type,
                difficulty = excluded.difficulty,
                baseline = excluded.baseline,
                estimated_time = excluded.estimated_time,
                knowledge_components = excluded.knowledge_components
            ",
            params![
                item.id,
                item.course_id,
                item.mcq_type.as_str(),
                item.difficulty.as_str(),
                item.baseline,
                item.estimated_time,
                components,
            ],
        )?;
        Ok(())
    }

    /// Get an item by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_item(&self, id: &str) -> Result<Option<Item>> {
        let item = self
            .conn
            .query_row(
                r"
                SELECT id, course_id, mcq_type, difficulty, baseline, estimated_time, knowledge_components
                FROM items WHERE id = ?1
                ",
                [id],
                Self::row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    /// Get all items of a course, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn items_by_course(&self, course_id: &str) -> Result<Vec<Item>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, course_id, mcq_type, difficulty, baseline, estimated_time, knowledge_components
            FROM items WHERE course_id = ?1 ORDER BY id
            ",
        )?;
        let items = stmt
            .query_map([course_id], Self::row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Get every item, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn all_items(&self) -> Result<Vec<Item>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, course_id, mcq_type, difficulty, baseline, estimated_time, knowledge_components
            FROM items ORDER BY id
            ",
        )?;
        let items = stmt
            .query_map([], Self::row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Insert an attempt.
    ///
    /// Returns the assigned ID, or `None` if an attempt with the same content
    /// hash already exists. An empty hash is computed before insertion.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_attempt(&self, attempt: &Attempt) -> Result<Option<i64>> {
        let hash = if attempt.content_hash.is_empty() {
            attempt.compute_hash()
        } else {
            attempt.content_hash.clone()
        };
        let components = serde_json::to_string(&attempt.knowledge_components)?;

        let affected = self.conn.execute(
            r"
            INSERT OR IGNORE INTO attempts
                (user_id, item_id, course_id, session_id, timestamp, success_ratio,
                 is_correct, time_spent, knowledge_components, content_hash)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
            params![
                attempt.user_id,
                attempt.item_id,
                attempt.course_id,
                attempt.session_id,
                format_timestamp(&attempt.timestamp),
                attempt.success_ratio,
                attempt.is_correct,
                attempt.time_spent,
                components,
                hash,
            ],
        )?;

        if affected == 0 {
            debug!(
                "Skipping duplicate attempt with hash {}",
                hash.get(..16).unwrap_or(&hash)
            );
            return Ok(None);
        }

        let id = self.conn.last_insert_rowid();
        debug!("Inserted attempt with id {}", id);
        Ok(Some(id))
    }

    /// Get attempts matching `filter`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn attempts(&self, filter: &AttemptFilter<'_>) -> Result<Vec<Attempt>> {
        let sql = format!(
            r"
            SELECT {ATTEMPT_COLUMNS} FROM attempts
            WHERE (?1 IS NULL OR course_id = ?1)
              AND (?2 IS NULL OR user_id = ?2)
              AND (?3 IS NULL OR session_id = ?3)
              AND (?4 = 0 OR success_ratio IS NOT NULL)
            ORDER BY timestamp ASC, id ASC
            "
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let attempts = stmt
            .query_map(
                params![
                    filter.course_id,
                    filter.user_id,
                    filter.session_id,
                    filter.graded_only,
                ],
                Self::row_to_attempt,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(attempts)
    }

    /// When the user last answered each item of a course.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn last_seen(&self, user_id: &str, course_id: &str) -> Result<HashMap<String, DateTime<Utc>>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT item_id, MAX(timestamp) FROM attempts
            WHERE user_id = ?1 AND course_id = ?2
            GROUP BY item_id
            ",
        )?;
        let rows = stmt
            .query_map([user_id, course_id], |row| {
                let item_id: String = row.get(0)?;
                let timestamp: String = row.get(1)?;
                Ok((item_id, parse_timestamp(1, &timestamp)?))
            })?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;
        Ok(rows)
    }

    /// Find the learner of a user in a course.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_learner(&self, user_id: &str, course_id: &str) -> Result<Option<Learner>> {
        let sql = format!("SELECT {LEARNER_COLUMNS} FROM learners WHERE user_id = ?1 AND course_id = ?2");
        let learner = self
            .conn
            .query_row(&sql, [user_id, course_id], Self::row_to_learner)
            .optional()?;
        Ok(learner)
    }

    /// All learners of a user, ordered by course.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn learners_for_user(&self, user_id: &str) -> Result<Vec<Learner>> {
        let sql = format!("SELECT {LEARNER_COLUMNS} FROM learners WHERE user_id = ?1 ORDER BY course_id");
        let mut stmt = self.conn.prepare(&sql)?;
        let learners = stmt
            .query_map([user_id], Self::row_to_learner)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(learners)
    }

    /// Get the learner of a user in a course, creating it with the given
    /// initial state if none exists.
    ///
    /// An existing learner is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn ensure_learner(
        &self,
        user_id: &str,
        course_id: &str,
        mastery: f64,
        ability: f64,
    ) -> Result<Learner> {
        let now = format_timestamp(&Utc::now());
        let inserted = self.conn.execute(
            r"
            INSERT INTO learners (user_id, course_id, mastery, ability, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(user_id, course_id) DO NOTHING
            ",
            params![user_id, course_id, mastery, ability, now],
        )?;
        if inserted > 0 {
            debug!("Created learner for user {} in course {}", user_id, course_id);
        }

        self.find_learner(user_id, course_id)?
            .ok_or_else(|| Error::not_found("learner", format!("{user_id}/{course_id}")))
    }

    /// Persist a learner's mastery, ability and update time.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the learner row does not exist, or a database error.
    pub fn save_learner(&self, learner: &Learner) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE learners SET mastery = ?1, ability = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                learner.mastery,
                learner.ability,
                format_timestamp(&learner.updated_at),
                learner.id,
            ],
        )?;
        if affected == 0 {
            return Err(Error::not_found("learner", learner.id.to_string()));
        }
        Ok(())
    }

    /// All component masteries of a learner, ordered by component.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn component_masteries(&self, learner_id: i64) -> Result<Vec<ComponentMastery>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT learner_id, component_id, mastery, updated_at
            FROM learner_components WHERE learner_id = ?1 ORDER BY component_id
            ",
        )?;
        let masteries = stmt
            .query_map([learner_id], |row| {
                let updated_at: String = row.get(3)?;
                Ok(ComponentMastery {
                    learner_id: row.get(0)?,
                    component_id: row.get(1)?,
                    mastery: row.get(2)?,
                    updated_at: parse_timestamp(3, &updated_at)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(masteries)
    }

    /// Insert or update one component mastery.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn save_component_mastery(&self, mastery: &ComponentMastery) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO learner_components (learner_id, component_id, mastery, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(learner_id, component_id) DO UPDATE SET
                mastery = excluded.mastery,
                updated_at = excluded.updated_at
            ",
            params![
                mastery.learner_id,
                mastery.component_id,
                mastery.mastery,
                format_timestamp(&mastery.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Store one version of an item's parameters.
    ///
    /// An existing row with the same item and version is overwritten. When
    /// the record is marked latest, every other version of the item is
    /// demoted first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails, including when the
    /// item does not exist.
    pub fn store_item_params(&self, record: &ItemCalibration) -> Result<()> {
        let updated_at = format_timestamp(&record.updated_at);

        if record.is_latest {
            let demoted = self.conn.execute(
                r"
                UPDATE item_irt_params SET is_latest = 0, updated_at = ?3
                WHERE item_id = ?1 AND version != ?2 AND is_latest = 1
                ",
                params![record.item_id, record.version, updated_at],
            )?;
            if demoted > 0 {
                debug!("Demoted {} previous parameter versions of {}", demoted, record.item_id);
            }
        }

        self.conn.execute(
            r"
            INSERT INTO item_irt_params
                (item_id, discrimination, difficulty, guessing, source, version,
                 is_latest, attempts, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(item_id, version) DO UPDATE SET
                discrimination = excluded.discrimination,
                difficulty = excluded.difficulty,
                guessing = excluded.guessing,
                source = excluded.source,
                is_latest = excluded.is_latest,
                attempts = excluded.attempts,
                updated_at = excluded.updated_at
            ",
            params![
                record.item_id,
                record.params.discrimination,
                record.params.difficulty,
                record.params.guessing,
                record.source,
                record.version,
                record.is_latest,
                record.attempts,
                format_timestamp(&record.created_at),
                updated_at,
            ],
        )?;
        Ok(())
    }

    /// The parameters the engine should use for an item.
    ///
    /// Prefers the row marked latest, then the most recently updated row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn latest_item_params(&self, item_id: &str) -> Result<Option<ItemCalibration>> {
        let sql = format!(
            r"
            SELECT {CALIBRATION_COLUMNS} FROM item_irt_params
            WHERE item_id = ?1
            ORDER BY is_latest DESC, updated_at DESC, id DESC
            LIMIT 1
            "
        );
        let record = self
            .conn
            .query_row(&sql, [item_id], Self::row_to_calibration)
            .optional()?;
        Ok(record)
    }

    /// Every stored version of an item's parameters, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn item_params_versions(&self, item_id: &str) -> Result<Vec<ItemCalibration>> {
        let sql = format!(
            "SELECT {CALIBRATION_COLUMNS} FROM item_irt_params WHERE item_id = ?1 \
             ORDER BY created_at DESC, id DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([item_id], Self::row_to_calibration)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Parameters of every calibrated item, keyed by item ID, chosen the
    /// same way as [`Storage::latest_item_params`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn latest_params_map(&self) -> Result<HashMap<String, IrtParams>> {
        // Ascending preference so the preferred row of each item is inserted last.
        let sql = format!(
            "SELECT {CALIBRATION_COLUMNS} FROM item_irt_params \
             ORDER BY item_id, is_latest ASC, updated_at ASC, id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([], Self::row_to_calibration)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records
            .into_iter()
            .map(|record| (record.item_id, record.params))
            .collect())
    }

    fn count(&self, sql: &str) -> Result<i64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let (oldest, newest) = self.conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM attempts",
            [],
            |row| {
                let oldest: Option<String> = row.get(0)?;
                let newest: Option<String> = row.get(1)?;
                Ok((
                    oldest.map(|v| parse_timestamp(0, &v)).transpose()?,
                    newest.map(|v| parse_timestamp(1, &v)).transpose()?,
                ))
            },
        )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            courses: self.count("SELECT COUNT(*) FROM courses")?,
            items: self.count("SELECT COUNT(*) FROM items")?,
            learners: self.count("SELECT COUNT(*) FROM learners")?,
            attempts: self.count("SELECT COUNT(*) FROM attempts")?,
            graded_attempts: self
                .count("SELECT COUNT(*) FROM attempts WHERE success_ratio IS NOT NULL")?,
            calibrated_items: self
                .count("SELECT COUNT(DISTINCT item_id) FROM item_irt_params")?,
            oldest_attempt: oldest,
            newest_attempt: newest,
            db_size_bytes,
        })
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<Item> {
        let mcq_type: String = row.get(2)?;
        let difficulty: String = row.get(3)?;
        let components: String = row.get(6)?;

        Ok(Item {
            id: row.get(0)?,
            course_id: row.get(1)?,
            mcq_type: mcq_type.parse().map_err(|e| conversion_error(2, e))?,
            difficulty: difficulty.parse().map_err(|e| conversion_error(3, e))?,
            baseline: row.get(4)?,
            estimated_time: row.get(5)?,
            knowledge_components: parse_component_list(6, &components)?,
        })
    }

    fn row_to_attempt(row: &rusqlite::Row) -> rusqlite::Result<Attempt> {
        let timestamp: String = row.get(5)?;
        let components: String = row.get(9)?;

        Ok(Attempt {
            id: Some(row.get(0)?),
            user_id: row.get(1)?,
            item_id: row.get(2)?,
            course_id: row.get(3)?,
            session_id: row.get(4)?,
            timestamp: parse_timestamp(5, &timestamp)?,
            success_ratio: row.get(6)?,
            is_correct: row.get(7)?,
            time_spent: row.get(8)?,
            knowledge_components: parse_component_list(9, &components)?,
            content_hash: row.get(10)?,
        })
    }

    fn row_to_learner(row: &rusqlite::Row) -> rusqlite::Result<Learner> {
        let created_at: String = row.get(5)?;
        let updated_at: String = row.get(6)?;

        Ok(Learner {
            id: row.get(0)?,
            user_id: row.get(1)?,
            course_id: row.get(2)?,
            mastery: row.get(3)?,
            ability: row.get(4)?,
            created_at: parse_timestamp(5, &created_at)?,
            updated_at: parse_timestamp(6, &updated_at)?,
        })
    }

    fn row_to_calibration(row: &rusqlite::Row) -> rusqlite::Result<ItemCalibration> {
        let created_at: String = row.get(8)?;
        let updated_at: String = row.get(9)?;

        Ok(ItemCalibration {
            item_id: row.get(0)?,
            params: IrtParams {
                discrimination: row.get(1)?,
                difficulty: row.get(2)?,
                guessing: row.get(3)?,
            },
            source: row.get(4)?,
            version: row.get(5)?,
            is_latest: row.get(6)?,
            attempts: row.get(7)?,
            created_at: parse_timestamp(8, &created_at)?,
            updated_at: parse_timestamp(9, &updated_at)?,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Number of courses.
    pub courses: i64,
    /// Number of items.
    pub items: i64,
    /// Number of learner rows (user and course pairs).
    pub learners: i64,
    /// Total number of attempts stored.
    pub attempts: i64,
    /// Attempts carrying a success ratio.
    pub graded_attempts: i64,
    /// Items with at least one stored parameter version.
    pub calibrated_items: i64,
    /// Timestamp of the oldest attempt.
    pub oldest_attempt: Option<DateTime<Utc>>,
    /// Timestamp of the newest attempt.
    pub newest_attempt: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
