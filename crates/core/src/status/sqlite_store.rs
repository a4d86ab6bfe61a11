//! SQLite-backed status store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{StatusError, StatusFilter, StatusStore, TranscodeRecord, TranscodeStatus, Transition};

const SELECT_COLUMNS: &str = "SELECT source_path, status, job_id, output_path, error_message, generation, created_at, updated_at, submitted_at FROM transcode_jobs";

fn db_err(e: rusqlite::Error) -> StatusError {
    StatusError::Database(e.to_string())
}

/// Fixed-width RFC 3339 so that text comparison orders chronologically.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// SQLite-backed status store.
pub struct SqliteStatusStore {
    conn: Mutex<Connection>,
}

impl SqliteStatusStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StatusError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StatusError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StatusError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS transcode_jobs (
                source_path TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                job_id TEXT,
                output_path TEXT,
                error_message TEXT,
                generation INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                submitted_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transcode_jobs_status_updated
                ON transcode_jobs(status, updated_at);
            "#,
        )
        .map_err(db_err)?;

        // Databases created before submitted_at existed (error ignored when present)
        let _ = conn.execute(
            "ALTER TABLE transcode_jobs ADD COLUMN submitted_at TEXT NOT NULL DEFAULT ''",
            [],
        );
        conn.execute(
            "UPDATE transcode_jobs SET submitted_at = updated_at WHERE submitted_at = ''",
            [],
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StatusError> {
        self.conn
            .lock()
            .map_err(|_| StatusError::Database("connection mutex poisoned".to_string()))
    }

    fn build_where_clause(filter: &StatusFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(before) = filter.updated_before {
            conditions.push("updated_at < ?");
            params.push(Box::new(timestamp(before)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<TranscodeRecord> {
        let status_str: String = row.get(1)?;
        let status = status_str.parse::<TranscodeStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;
        let generation: i64 = row.get(5)?;
        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;
        let submitted_at: String = row.get(8)?;

        Ok(TranscodeRecord {
            source_path: row.get(0)?,
            status,
            job_id: row.get(2)?,
            output_path: row.get(3)?,
            error_message: row.get(4)?,
            generation: generation.max(0) as u64,
            created_at: parse_timestamp(&created_at),
            submitted_at: parse_timestamp(&submitted_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }

    fn fetch(conn: &Connection, source_path: &str) -> Result<Option<TranscodeRecord>, StatusError> {
        conn.query_row(
            &format!("{} WHERE source_path = ?", SELECT_COLUMNS),
            params![source_path],
            Self::row_to_record,
        )
        .optional()
        .map_err(db_err)
    }

    /// Guarded terminal write shared by `mark_completed` and `mark_failed`.
    fn finish(
        &self,
        source_path: &str,
        generation: u64,
        status: TranscodeStatus,
        output_path: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<Transition, StatusError> {
        let conn = self.lock()?;

        let changed = conn
            .execute(
                "UPDATE transcode_jobs
                 SET status = ?, output_path = ?, error_message = ?, updated_at = ?
                 WHERE source_path = ? AND generation = ? AND status = 'processing'",
                params![
                    status.as_str(),
                    output_path,
                    error_message,
                    timestamp(Utc::now()),
                    source_path,
                    generation as i64,
                ],
            )
            .map_err(db_err)?;

        if changed == 1 {
            return Ok(Transition::Applied);
        }

        match Self::fetch(&conn, source_path)? {
            None => Err(StatusError::NotFound(source_path.to_string())),
            Some(record) if record.status.is_terminal() => Ok(Transition::AlreadyTerminal),
            Some(_) => Ok(Transition::Superseded),
        }
    }
}

impl StatusStore for SqliteStatusStore {
    fn get(&self, source_path: &str) -> Result<Option<TranscodeRecord>, StatusError> {
        let conn = self.lock()?;
        Self::fetch(&conn, source_path)
    }

    fn list(&self, filter: &StatusFilter) -> Result<Vec<TranscodeRecord>, StatusError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "{} {} ORDER BY updated_at ASC, source_path ASC LIMIT ? OFFSET ?",
            SELECT_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;

        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_record)
            .map_err(db_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn count(&self, filter: &StatusFilter) -> Result<i64, StatusError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM transcode_jobs {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(db_err)
    }

    fn mark_processing(
        &self,
        source_path: &str,
        job_id: &str,
    ) -> Result<TranscodeRecord, StatusError> {
        let conn = self.lock()?;
        let now = timestamp(Utc::now());

        conn.execute(
            "INSERT INTO transcode_jobs
                (source_path, status, job_id, output_path, error_message, generation, created_at, updated_at, submitted_at)
             VALUES (?1, 'processing', ?2, NULL, NULL, 1, ?3, ?3, ?3)
             ON CONFLICT(source_path) DO UPDATE SET
                generation = CASE
                    WHEN transcode_jobs.job_id IS excluded.job_id THEN transcode_jobs.generation
                    ELSE transcode_jobs.generation + 1
                END,
                submitted_at = CASE
                    WHEN transcode_jobs.job_id IS excluded.job_id THEN transcode_jobs.submitted_at
                    ELSE excluded.submitted_at
                END,
                job_id = excluded.job_id,
                status = 'processing',
                updated_at = excluded.updated_at
             WHERE transcode_jobs.status NOT IN ('completed', 'failed')",
            params![source_path, job_id, now],
        )
        .map_err(db_err)?;

        match Self::fetch(&conn, source_path)? {
            Some(record) if record.status.is_terminal() => {
                Err(StatusError::AlreadyTerminal(source_path.to_string()))
            }
            Some(record) => Ok(record),
            None => Err(StatusError::NotFound(source_path.to_string())),
        }
    }

    fn mark_completed(
        &self,
        source_path: &str,
        generation: u64,
        output_path: &str,
    ) -> Result<Transition, StatusError> {
        self.finish(
            source_path,
            generation,
            TranscodeStatus::Completed,
            Some(output_path),
            None,
        )
    }

    fn mark_failed(
        &self,
        source_path: &str,
        generation: u64,
        error_message: &str,
    ) -> Result<Transition, StatusError> {
        self.finish(
            source_path,
            generation,
            TranscodeStatus::Failed,
            None,
            Some(error_message),
        )
    }

    fn refresh_claim(&self, source_path: &str, generation: u64) -> Result<bool, StatusError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE transcode_jobs SET updated_at = ?
                 WHERE source_path = ? AND generation = ? AND status = 'processing'",
                params![timestamp(Utc::now()), source_path, generation as i64],
            )
            .map_err(db_err)?;
        Ok(changed == 1)
    }
}
