//! API client for the Canvas LMS submissions endpoint.
//!
//! Grades are posted with `PUT .../courses/{course}/assignments/{assignment}/submissions/{student}`,
//! which is idempotent on the Canvas side.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, Url};
use serde::Serialize;
use tracing::{debug, warn};

use super::{ApiError, GradingClient};
use crate::attendance::Grade;
use crate::roster::StudentId;

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Serialize)]
struct SubmissionUpdate<'a> {
    submission: SubmissionFields<'a>,
}

#[derive(Debug, Serialize)]
struct SubmissionFields<'a> {
    assignment_id: u64,
    posted_grade: Grade,
    user_id: &'a str,
    submission_type: Option<&'a str>,
}

/// API client for Canvas.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct CanvasClient {
    client: Client,
    base_url: Url,
    course_id: u64,
    assignment_id: u64,
    token: Option<String>,
}

impl CanvasClient {
    /// Create a client for one course assignment.
    ///
    /// `base_url` is the API root, e.g. `https://school.instructure.com/api/v1`.
    pub fn new(base_url: &str, course_id: u64, assignment_id: u64, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid Canvas base URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Canvas base URL cannot be used as a base: {}", base_url);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            course_id,
            assignment_id,
            token: None,
        })
    }

    /// Create a new CanvasClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            token: Some(token),
            ..self.clone()
        }
    }

    fn submission_url(&self, student: &StudentId) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidRequest(format!("Bad base URL {}", self.base_url)))?
            .pop_if_empty()
            .push("courses")
            .push(&self.course_id.to_string())
            .push("assignments")
            .push(&self.assignment_id.to_string())
            .push("submissions")
            .push(student.as_str());
        Ok(url)
    }

    fn submission_body<'a>(&self, student: &'a StudentId, grade: Grade) -> SubmissionUpdate<'a> {
        SubmissionUpdate {
            submission: SubmissionFields {
                assignment_id: self.assignment_id,
                posted_grade: grade,
                user_id: student.as_str(),
                submission_type: None,
            },
        }
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidRequest("Token contains invalid header characters".to_string()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<(), ApiError> {
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn put<B: Serialize + Sync>(&self, url: Url, body: &B) -> Result<(), ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .put(url.clone())
                .headers(self.auth_headers()?)
                .json(body)
                .send()
                .await?;

            match Self::check_response(response).await {
                Err(ApiError::RateLimited { .. }) if retries < MAX_RATE_LIMIT_RETRIES => {
                    retries += 1;
                    warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl GradingClient for CanvasClient {
    async fn set_grade(&self, student: &StudentId, grade: Grade) -> Result<(), ApiError> {
        let url = self.submission_url(student)?;
        let body = self.submission_body(student, grade);
        debug!(student = %student, grade, "Posting grade");
        self.put(url, &body).await
    }
}
