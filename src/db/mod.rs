use crate::errors::{AppError, AppResult};
use crate::models::{ChallengeRecord, CheckInOutcome, DuplicateHitPolicy, Hit, WeekSummary};
use crate::streak::{apply_check_in, roll_over};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA_SQL: &str = include_str!("schema.sql");
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const LEGACY_STARTED_PLACEHOLDER: &str = "timestamp";
const SELECT_RECORD: &str = "SELECT id, started, days, hits, streak, long_streak, active FROM bros WHERE id = ?1";

/// SQLite-backed table of challenge records.
///
/// Holds only the file path. Each operation opens its own connection and
/// drops it before returning.
#[derive(Debug, Clone)]
pub struct Database {
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
            }
        }

        let db = Self {
            db_path: path.to_path_buf(),
        };
        let conn = db.connect()?;
        let journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        if !journal_mode.eq_ignore_ascii_case("wal") {
            tracing::warn!(journal_mode = %journal_mode, "database did not switch to WAL");
        }
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> AppResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    pub fn insert_user(&self, id: &str) -> AppResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO bros (id, started, days, hits, streak, long_streak, active)
             VALUES (?1, NULL, 0, '[]', 0, 0, 0)",
            [id],
        )?;
        Ok(())
    }

    /// Returns `true` when a new row was written.
    pub fn insert_user_if_absent(&self, id: &str) -> AppResult<bool> {
        let conn = self.connect()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO bros (id, started, days, hits, streak, long_streak, active)
             VALUES (?1, NULL, 0, '[]', 0, 0, 0)",
            [id],
        )?;
        Ok(inserted > 0)
    }

    /// Returns the number of removed rows; zero is not an error.
    pub fn delete_user(&self, id: &str) -> AppResult<usize> {
        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM bros WHERE id = ?1", [id])?;
        Ok(removed)
    }

    pub fn stop_user(&self, id: &str) -> AppResult<bool> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE bros SET started = NULL, hits = '[]', streak = 0, active = 0 WHERE id = ?1",
            [id],
        )?;
        Ok(updated > 0)
    }

    /// Sets the weekly target and activates the challenge. A period that is
    /// already running keeps its start time.
    pub fn update_user_days(&self, id: &str, days: u8, now: DateTime<Utc>) -> AppResult<bool> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE bros
             SET days = ?1,
                 active = 1,
                 started = CASE WHEN started IS NULL OR started = ?2 THEN ?3 ELSE started END
             WHERE id = ?4",
            params![i64::from(days), LEGACY_STARTED_PLACEHOLDER, now.to_rfc3339(), id],
        )?;
        Ok(updated > 0)
    }

    pub fn get_user(&self, id: &str) -> AppResult<Option<ChallengeRecord>> {
        let conn = self.connect()?;
        let record = conn.query_row(SELECT_RECORD, [id], parse_record_row).optional()?;
        Ok(record)
    }

    pub fn is_active(&self, id: &str) -> AppResult<Option<bool>> {
        let conn = self.connect()?;
        let active = conn
            .query_row("SELECT active FROM bros WHERE id = ?1", [id], |row| {
                Ok(read_integer(row, 0)? != 0)
            })
            .optional()?;
        Ok(active)
    }

    pub fn list_active_users(&self) -> AppResult<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id FROM bros WHERE active = 1 ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Read-modify-write of one row under an immediate transaction. Weeks
    /// that ended before `now` are closed first, so the hit always lands in
    /// the current week.
    pub fn record_hit(&self, id: &str, now: DateTime<Utc>, policy: DuplicateHitPolicy) -> AppResult<CheckInOutcome> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(mut record) = tx.query_row(SELECT_RECORD, [id], parse_record_row).optional()? else {
            return Ok(CheckInOutcome::NotFound);
        };

        let closed = roll_over(&mut record, now);
        if let Some(summary) = &closed {
            tracing::info!(
                user_id = %summary.user_id,
                hits = summary.hits,
                target = summary.target,
                met = summary.met,
                streak = summary.streak,
                weeks = summary.weeks_elapsed,
                "week closed before check-in"
            );
        }

        let outcome = apply_check_in(&mut record, now, policy);
        let hit_written = matches!(outcome, CheckInOutcome::Recorded { .. } | CheckInOutcome::Accumulated { .. });
        if closed.is_some() || hit_written {
            write_progress(&tx, &record)?;
        }
        tx.commit()?;

        Ok(outcome)
    }

    pub fn roll_over_week(&self, id: &str, now: DateTime<Utc>) -> AppResult<Option<WeekSummary>> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(mut record) = tx.query_row(SELECT_RECORD, [id], parse_record_row).optional()? else {
            return Ok(None);
        };

        let summary = roll_over(&mut record, now);
        if summary.is_some() {
            write_progress(&tx, &record)?;
        }
        tx.commit()?;

        Ok(summary)
    }
}

fn write_progress(conn: &Connection, record: &ChallengeRecord) -> AppResult<()> {
    conn.execute(
        "UPDATE bros SET started = ?1, hits = ?2, streak = ?3, long_streak = ?4 WHERE id = ?5",
        params![
            record.started.map(|at| at.to_rfc3339()),
            encode_hits(&record.hits)?,
            i64::from(record.streak),
            i64::from(record.long_streak),
            record.id,
        ],
    )?;
    Ok(())
}

pub fn encode_hits(hits: &[Hit]) -> AppResult<String> {
    Ok(serde_json::to_string(hits)?)
}

/// Older rows may hold `""`, `0` or NULL where no hits were recorded.
pub fn decode_hits(raw: &str) -> AppResult<Vec<Hit>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "0" {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(trimmed)?)
}

fn parse_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChallengeRecord> {
    let hits = match row.get::<_, Value>(3)? {
        Value::Null | Value::Integer(_) => Vec::new(),
        Value::Text(raw) => decode_hits(&raw).map_err(|error| conversion_error(3, error.to_string()))?,
        _ => return Err(conversion_error(3, "unsupported hits encoding".to_string())),
    };

    Ok(ChallengeRecord {
        id: row.get(0)?,
        started: row
            .get::<_, Option<String>>(1)?
            .filter(|raw| !raw.is_empty() && raw != LEGACY_STARTED_PLACEHOLDER)
            .map(|raw| parse_time(&raw))
            .transpose()?,
        days: u8::try_from(read_integer(row, 2)?.clamp(0, i64::from(u8::MAX))).unwrap_or(0),
        hits,
        streak: to_count(read_integer(row, 4)?),
        long_streak: to_count(read_integer(row, 5)?),
        active: read_integer(row, 6)? != 0,
    })
}

/// Numeric columns of older tables were declared TEXT, so integers may come
/// back as strings.
fn read_integer(row: &rusqlite::Row<'_>, column: usize) -> rusqlite::Result<i64> {
    match row.get::<_, Value>(column)? {
        Value::Null => Ok(0),
        Value::Integer(value) => Ok(value),
        Value::Real(value) => Ok(value as i64),
        Value::Text(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|error| conversion_error(column, error.to_string())),
        Value::Blob(_) => Err(conversion_error(column, "unexpected blob".to_string())),
    }
}

fn to_count(raw: i64) -> u32 {
    u32::try_from(raw.max(0)).unwrap_or(u32::MAX)
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| conversion_error(1, error.to_string()))
}
