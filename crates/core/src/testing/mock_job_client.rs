//! Mock transcode service client for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::job_client::{JobClient, JobClientError, JobHandle, JobStatus, SubmitJobRequest};

use super::lock;

/// Mock implementation of the JobClient trait.
///
/// Provides controllable behavior for testing:
/// - Record submissions for assertions
/// - Script poll results per job (an exhausted script reports `Running`)
/// - Serve result bytes by URL (unknown URLs fail to download)
/// - Simulate submission failures
#[derive(Debug, Default)]
pub struct MockJobClient {
    submissions: Mutex<Vec<SubmitJobRequest>>,
    next_job_id: Mutex<Option<String>>,
    next_submit_error: Mutex<Option<JobClientError>>,
    job_counter: Mutex<u32>,
    poll_scripts: Mutex<HashMap<String, VecDeque<Result<JobStatus, JobClientError>>>>,
    poll_counts: Mutex<HashMap<String, usize>>,
    results: Mutex<HashMap<String, Bytes>>,
    fetch_count: Mutex<usize>,
}

impl MockJobClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Job id returned by the next successful submission.
    pub fn set_next_job_id(&self, job_id: impl Into<String>) {
        *lock(&self.next_job_id) = Some(job_id.into());
    }

    /// Make the next submission fail.
    pub fn set_next_submit_error(&self, error: JobClientError) {
        *lock(&self.next_submit_error) = Some(error);
    }

    /// Append poll results for a job, returned in order.
    pub fn push_poll_results(
        &self,
        job_id: &str,
        results: Vec<Result<JobStatus, JobClientError>>,
    ) {
        lock(&self.poll_scripts)
            .entry(job_id.to_string())
            .or_default()
            .extend(results);
    }

    /// Serve `bytes` for downloads of `url`.
    pub fn set_result(&self, url: impl Into<String>, bytes: Bytes) {
        lock(&self.results).insert(url.into(), bytes);
    }

    /// All recorded submissions.
    pub fn recorded_submissions(&self) -> Vec<SubmitJobRequest> {
        lock(&self.submissions).clone()
    }

    /// Number of status requests made for a job.
    pub fn poll_count(&self, job_id: &str) -> usize {
        lock(&self.poll_counts).get(job_id).copied().unwrap_or(0)
    }

    /// Number of download attempts.
    pub fn fetch_count(&self) -> usize {
        *lock(&self.fetch_count)
    }
}

#[async_trait]
impl JobClient for MockJobClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, request: &SubmitJobRequest) -> Result<JobHandle, JobClientError> {
        if let Some(error) = lock(&self.next_submit_error).take() {
            return Err(error);
        }

        lock(&self.submissions).push(request.clone());

        let job_id = match lock(&self.next_job_id).take() {
            Some(id) => id,
            None => {
                let mut counter = lock(&self.job_counter);
                *counter += 1;
                format!("mock-job-{}", *counter)
            }
        };

        Ok(JobHandle { job_id })
    }

    async fn poll(&self, job_id: &str) -> Result<JobStatus, JobClientError> {
        *lock(&self.poll_counts).entry(job_id.to_string()).or_default() += 1;

        lock(&self.poll_scripts)
            .get_mut(job_id)
            .and_then(|script| script.pop_front())
            .unwrap_or(Ok(JobStatus::Running))
    }

    async fn fetch_result(&self, result_url: &str) -> Result<Bytes, JobClientError> {
        *lock(&self.fetch_count) += 1;

        lock(&self.results)
            .get(result_url)
            .cloned()
            .ok_or_else(|| JobClientError::DownloadFailed(format!("no result at {}", result_url)))
    }
}
