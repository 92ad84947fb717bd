//! REST client for the remote compute platform.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::{
    ComputePlatform, ExportKind, ExportRequest, JobId, JobRecord, JobState, PlatformFuture,
};

/// Errors raised by the compute platform client.
#[derive(Debug, Error)]
pub enum ComputeApiError {
    /// Transport-level failure.
    #[error("compute platform transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The platform rejected the request (quota, malformed parameters).
    #[error("compute platform rejected the request ({status}): {message}")]
    Rejected {
        /// HTTP status returned.
        status: StatusCode,
        /// Response body, as far as it could be read.
        message: String,
    },
    /// A job listing entry carried a state this client does not know.
    #[error("job {id} reported unknown state '{state}'")]
    UnknownState {
        /// Job identifier.
        id: String,
        /// Unrecognised wire state.
        state: String,
    },
}

#[derive(Serialize)]
struct ExportPayload<'a> {
    description: &'a str,
    region: &'a str,
    scale: u32,
    max_pixels: u64,
    cloud_optimized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_dimensions: Option<u32>,
    destination: &'static str,
}

impl<'a> ExportPayload<'a> {
    fn from_request(request: &'a ExportRequest) -> Self {
        Self {
            description: &request.description,
            region: &request.region_bounds,
            scale: request.scale_metres,
            max_pixels: request.max_pixels,
            cloud_optimized: request.cloud_optimized,
            file_dimensions: request.file_dimensions,
            destination: match request.kind {
                ExportKind::Storage => "storage",
                ExportKind::Archive => "archive",
            },
        }
    }
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Deserialize)]
struct JobEntry {
    id: String,
    state: String,
}

#[derive(Deserialize)]
struct JobListing {
    #[serde(default)]
    jobs: Vec<JobEntry>,
}

/// Compute platform reached over HTTP with bearer-token auth.
#[derive(Clone, Debug)]
pub struct HttpComputePlatform {
    client: Client,
    base_url: String,
    token: String,
    retry_attempts: u32,
}

impl HttpComputePlatform {
    /// Creates a client for `base_url` authenticating with `token`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, retry_attempts: u32) -> Self {
        Self {
            client: Client::new(),
            base_url: trim_trailing_slash(base_url.into()),
            token: token.into(),
            retry_attempts,
        }
    }

    async fn submit_once(&self, request: &ExportRequest) -> Result<JobId, ComputeApiError> {
        let response = self
            .client
            .post(format!("{}/exports", self.base_url))
            .bearer_auth(&self.token)
            .json(&ExportPayload::from_request(request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(ComputeApiError::Rejected { status, message });
        }

        let body: SubmitResponse = response.json().await?;
        Ok(JobId(body.id))
    }

    async fn list_once(&self) -> Result<Vec<JobRecord>, ComputeApiError> {
        let response = self
            .client
            .get(format!("{}/jobs", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(ComputeApiError::Rejected { status, message });
        }

        let listing: JobListing = response.json().await?;
        listing
            .jobs
            .into_iter()
            .map(|entry| {
                let state = JobState::from_remote(&entry.state).ok_or_else(|| {
                    ComputeApiError::UnknownState {
                        id: entry.id.clone(),
                        state: entry.state.clone(),
                    }
                })?;
                Ok(JobRecord {
                    id: JobId(entry.id),
                    state,
                })
            })
            .collect()
    }
}

impl ComputePlatform for HttpComputePlatform {
    type Error = ComputeApiError;

    fn submit<'a>(&'a self, request: &'a ExportRequest) -> PlatformFuture<'a, JobId, Self::Error> {
        // Submission is not retried locally: rejection policy belongs
        // upstream, and a blind resubmit could double-schedule the export.
        Box::pin(self.submit_once(request))
    }

    fn list_jobs(&self) -> PlatformFuture<'_, Vec<JobRecord>, Self::Error> {
        Box::pin(super::with_retries(self.retry_attempts, "job listing", || {
            self.list_once()
        }))
    }
}

fn trim_trailing_slash(mut value: String) -> String {
    while value.ends_with('/') {
        value.pop();
    }
    value
}
