//! Mock status store for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::Utc;

use crate::status::{
    StatusError, StatusFilter, StatusStore, TranscodeRecord, TranscodeStatus, Transition,
};

use super::lock;

/// In-memory status store with the same transition rules as the SQLite one.
///
/// Errors can be injected for the next call of any operation, or for the
/// next call of a named operation (`"get"`, `"mark_failed"`, ...).
#[derive(Debug, Default)]
pub struct MockStatusStore {
    records: Mutex<HashMap<String, TranscodeRecord>>,
    next_error: Mutex<Option<StatusError>>,
    op_errors: Mutex<HashMap<&'static str, StatusError>>,
    calls: AtomicUsize,
}

impl MockStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record as is (e.g. an old `processing` row).
    pub fn insert_record(&self, record: TranscodeRecord) {
        lock(&self.records).insert(record.source_path.clone(), record);
    }

    pub fn record(&self, source_path: &str) -> Option<TranscodeRecord> {
        lock(&self.records).get(source_path).cloned()
    }

    pub fn records(&self) -> Vec<TranscodeRecord> {
        lock(&self.records).values().cloned().collect()
    }

    /// Total trait calls made against the store.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fail the next call, whatever the operation.
    pub fn set_next_error(&self, error: StatusError) {
        *lock(&self.next_error) = Some(error);
    }

    /// Fail the next call of `operation`.
    pub fn fail_next(&self, operation: &'static str, error: StatusError) {
        lock(&self.op_errors).insert(operation, error);
    }

    fn enter(&self, operation: &'static str) -> Result<(), StatusError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.next_error).take() {
            return Err(error);
        }
        if let Some(error) = lock(&self.op_errors).remove(operation) {
            return Err(error);
        }
        Ok(())
    }

    fn finish(
        &self,
        source_path: &str,
        generation: u64,
        status: TranscodeStatus,
        output_path: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<Transition, StatusError> {
        let mut records = lock(&self.records);
        let record = records
            .get_mut(source_path)
            .ok_or_else(|| StatusError::NotFound(source_path.to_string()))?;

        if record.status.is_terminal() {
            return Ok(Transition::AlreadyTerminal);
        }
        if record.generation != generation {
            return Ok(Transition::Superseded);
        }

        record.status = status;
        record.output_path = output_path.map(str::to_string);
        record.error_message = error_message.map(str::to_string);
        record.updated_at = Utc::now();
        Ok(Transition::Applied)
    }
}

impl StatusStore for MockStatusStore {
    fn get(&self, source_path: &str) -> Result<Option<TranscodeRecord>, StatusError> {
        self.enter("get")?;
        Ok(self.record(source_path))
    }

    fn list(&self, filter: &StatusFilter) -> Result<Vec<TranscodeRecord>, StatusError> {
        self.enter("list")?;
        let mut matching: Vec<_> = lock(&self.records)
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.source_path.cmp(&b.source_path))
        });
        Ok(matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    fn count(&self, filter: &StatusFilter) -> Result<i64, StatusError> {
        self.enter("count")?;
        Ok(lock(&self.records)
            .values()
            .filter(|r| filter.matches(r))
            .count() as i64)
    }

    fn mark_processing(
        &self,
        source_path: &str,
        job_id: &str,
    ) -> Result<TranscodeRecord, StatusError> {
        self.enter("mark_processing")?;
        let now = Utc::now();
        let mut records = lock(&self.records);

        let record = records
            .entry(source_path.to_string())
            .or_insert_with(|| TranscodeRecord {
                source_path: source_path.to_string(),
                status: TranscodeStatus::Processing,
                job_id: Some(job_id.to_string()),
                output_path: None,
                error_message: None,
                generation: 1,
                created_at: now,
                submitted_at: now,
                updated_at: now,
            });

        if record.status.is_terminal() {
            return Err(StatusError::AlreadyTerminal(source_path.to_string()));
        }
        if record.job_id.as_deref() != Some(job_id) {
            record.generation += 1;
            record.job_id = Some(job_id.to_string());
            record.submitted_at = now;
        }
        record.status = TranscodeStatus::Processing;
        record.updated_at = now;
        Ok(record.clone())
    }

    fn mark_completed(
        &self,
        source_path: &str,
        generation: u64,
        output_path: &str,
    ) -> Result<Transition, StatusError> {
        self.enter("mark_completed")?;
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
        self.enter("mark_failed")?;
        self.finish(
            source_path,
            generation,
            TranscodeStatus::Failed,
            None,
            Some(error_message),
        )
    }

    fn refresh_claim(&self, source_path: &str, generation: u64) -> Result<bool, StatusError> {
        self.enter("refresh_claim")?;
        let mut records = lock(&self.records);
        match records.get_mut(source_path) {
            Some(record)
                if record.generation == generation
                    && record.status == TranscodeStatus::Processing =>
            {
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
