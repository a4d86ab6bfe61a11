//! HTTP transcode service client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::JobServiceConfig;

use super::{JobClient, JobClientError, JobHandle, JobStatus, SubmitJobRequest};

/// Input/output slot names referenced by the command template.
const INPUT_SLOT: &str = "in_1";
const OUTPUT_SLOT: &str = "out_1";

/// Max characters of an upstream body kept in error messages.
const BODY_SNIPPET_LEN: usize = 500;

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    input_files: HashMap<&'a str, &'a str>,
    output_files: HashMap<&'a str, &'a str>,
    ffmpeg_command: &'a str,
    max_command_run_seconds: u32,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    command_id: String,
}

#[derive(Debug, Deserialize)]
struct OutputFile {
    storage_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommandStatusResponse {
    status: String,
    #[serde(default)]
    output_files: HashMap<String, OutputFile>,
    #[serde(default)]
    error_message: Option<String>,
}

impl CommandStatusResponse {
    fn into_status(self) -> JobStatus {
        match self.status.to_ascii_uppercase().as_str() {
            "SUCCESS" => match self
                .output_files
                .get(OUTPUT_SLOT)
                .and_then(|f| f.storage_url.clone())
            {
                Some(result_url) => JobStatus::Succeeded { result_url },
                None => JobStatus::Failed {
                    message: "job reported success without an output file".to_string(),
                },
            },
            "ERROR" | "FAILED" => JobStatus::Failed {
                message: self
                    .error_message
                    .unwrap_or_else(|| "transcode service reported an error".to_string()),
            },
            _ => JobStatus::Running,
        }
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_LEN).collect()
}

/// Transcode service client speaking the JSON command API.
pub struct HttpJobClient {
    client: Client,
    config: JobServiceConfig,
}

impl HttpJobClient {
    /// Create a new client.
    pub fn new(config: JobServiceConfig) -> Result<Self, JobClientError> {
        if config.api_key.is_empty() {
            return Err(JobClientError::Config(
                "job service API key is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| JobClientError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }
}

#[async_trait]
impl JobClient for HttpJobClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(&self, request: &SubmitJobRequest) -> Result<JobHandle, JobClientError> {
        let url = format!("{}/v1/run-ffmpeg-command", self.base_url());
        let body = SubmitBody {
            input_files: HashMap::from([(INPUT_SLOT, request.source_url.as_str())]),
            output_files: HashMap::from([(OUTPUT_SLOT, request.output_filename.as_str())]),
            ffmpeg_command: &self.config.command,
            max_command_run_seconds: self.config.max_run_secs,
        };

        debug!("Submitting transcode job for {}", request.source_url);

        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(JobClientError::unreachable)?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(JobClientError::SubmissionFailed {
                status: Some(status.as_u16()),
                body: snippet(&text),
            });
        }

        let parsed: SubmitResponse =
            serde_json::from_str(&text).map_err(|e| JobClientError::SubmissionFailed {
                status: Some(status.as_u16()),
                body: format!("malformed response ({}): {}", e, snippet(&text)),
            })?;

        if parsed.command_id.is_empty() {
            return Err(JobClientError::SubmissionFailed {
                status: Some(status.as_u16()),
                body: "response did not contain a job id".to_string(),
            });
        }

        Ok(JobHandle {
            job_id: parsed.command_id,
        })
    }

    async fn poll(&self, job_id: &str) -> Result<JobStatus, JobClientError> {
        let url = format!(
            "{}/v1/commands/{}",
            self.base_url(),
            urlencoding::encode(job_id)
        );

        let response = self
            .client
            .get(&url)
            .header("X-API-KEY", &self.config.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    JobClientError::PollFailed("request timed out".to_string())
                } else {
                    JobClientError::PollFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Job {} status request returned HTTP {}", job_id, status);
            return Err(JobClientError::PollFailed(format!(
                "HTTP {}: {}",
                status,
                snippet(&body)
            )));
        }

        let parsed: CommandStatusResponse = response
            .json()
            .await
            .map_err(|e| JobClientError::PollFailed(format!("malformed response: {}", e)))?;

        Ok(parsed.into_status())
    }

    async fn fetch_result(&self, result_url: &str) -> Result<Bytes, JobClientError> {
        // Result URLs are pre-signed by the service; no API key is sent.
        let response = self
            .client
            .get(result_url)
            .timeout(Duration::from_secs(self.config.max_run_secs as u64))
            .send()
            .await
            .map_err(|e| JobClientError::DownloadFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(JobClientError::DownloadFailed(format!("HTTP {}", status)));
        }

        response
            .bytes()
            .await
            .map_err(|e| JobClientError::DownloadFailed(e.to_string()))
    }
}
