use crate::batch::Batch;
use crate::error::{Error, Result};
use crate::model::{Finding, PackageCoordinate, QueryEnvelope};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Component-report endpoint of Sonatype OSS Index.
pub const DEFAULT_ENDPOINT: &str = "https://ossindex.sonatype.org/api/v3/component-report";

/// User agent sent with every component-report request.
pub const CHECKER_USER_AGENT: &str = "VulnerabilityChecker/1.0";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for a component-report style vulnerability API.
///
/// One POST per batch, no retries. Every failure is folded into the
/// returned [`QueryEnvelope`].
pub struct OssIndexChecker {
    client: reqwest::Client,
    endpoint: String,
}

impl OssIndexChecker {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT, DEFAULT_TIMEOUT)
    }

    /// # Errors
    ///
    /// Returns [`Error::HttpClient`] if the HTTP client cannot be built.
    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::HttpClient)?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, batch: &Batch) -> QueryEnvelope {
        let body = match serde_json::to_vec(&ComponentReportRequest {
            coordinates: batch.coordinates(),
        }) {
            Ok(body) => body,
            Err(e) => return QueryEnvelope::transport(e),
        };

        let response = match self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, CHECKER_USER_AGENT)
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return QueryEnvelope::transport(e),
        };

        let status = response.status();
        if status != StatusCode::OK {
            return QueryEnvelope::status(status.as_u16());
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return QueryEnvelope::transport(e),
        };

        match serde_json::from_str::<Vec<Finding>>(&text) {
            Ok(findings) => QueryEnvelope::Findings(findings),
            Err(e) => QueryEnvelope::transport(e),
        }
    }
}

#[derive(Serialize)]
struct ComponentReportRequest<'a> {
    coordinates: &'a [PackageCoordinate],
}

#[async_trait]
impl super::VulnerabilityChecker for OssIndexChecker {
    fn name(&self) -> &'static str {
        "OSS Index"
    }

    async fn query_batch(&self, batch: &Batch) -> QueryEnvelope {
        debug!(
            batch = batch.index(),
            size = batch.len(),
            endpoint = %self.endpoint,
            "querying component reports"
        );

        let envelope = self.post(batch).await;
        match &envelope {
            QueryEnvelope::Findings(findings) => {
                debug!(batch = batch.index(), findings = findings.len(), "batch succeeded");
            }
            QueryEnvelope::Failed(err) => {
                warn!(batch = batch.index(), status = ?err.http_status, "{}", err.error);
            }
        }
        envelope
    }
}
