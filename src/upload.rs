//! Batch uploader for the remote ingestion endpoint.
//!
//! Splits a sequence of [`CanonicalDataPoint`]s into contiguous batches of
//! at most `batch_size` points and uploads every batch as its own task.
//!
//! # Request
//!
//! ```text
//! POST {endpoint}/ingest
//! Authorization: Bearer <credential>
//! Content-Type: application/json
//! X-Request-ID: <fresh uuid per attempt>
//!
//! { "tenant_id": "...", "data_points": [ ... ] }
//! ```
//!
//! # Retry strategy (per batch)
//!
//! - HTTP 2xx → delivered
//! - no response (connect error, timeout) or HTTP 5xx → retry per [`RetryPolicy`]
//! - HTTP 401 / 403 → fail immediately
//! - any other status → fail immediately, message taken from the body's
//!   `message` or `detail` field when present
//!
//! # Aggregation
//!
//! The upload returns `Err` only when every batch failed. If at least one
//! batch was delivered the result is `Ok`, with the failures counted in
//! [`SyncResult::failed_batches`]. Batches are delivered in no particular
//! order.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SyncError;
use crate::models::{CanonicalDataPoint, SyncResult};
use crate::retry::RetryPolicy;

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Tunables for one uploader.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub batch_size: usize,
    pub retry: RetryPolicy,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Number of batches `len` points split into.
pub fn batch_count(len: usize, batch_size: usize) -> usize {
    len.div_ceil(batch_size.max(1))
}

/// Contiguous, order-preserving batches of at most `batch_size` points.
pub fn partition(
    points: &[CanonicalDataPoint],
    batch_size: usize,
) -> std::slice::Chunks<'_, CanonicalDataPoint> {
    points.chunks(batch_size.max(1))
}

/// `{endpoint}/ingest`, rejecting anything that is not http(s).
pub fn ingest_url(endpoint: &str) -> Result<Url, SyncError> {
    let base = endpoint.trim().trim_end_matches('/');
    let url = Url::parse(&format!("{}/ingest", base)).map_err(|_| SyncError::InvalidEndpoint)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(SyncError::InvalidEndpoint),
    }
}

#[derive(Serialize)]
struct IngestRequest<'a> {
    tenant_id: &'a str,
    data_points: &'a [CanonicalDataPoint],
}

/// What to do after one HTTP attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered,
    Retry(SyncError),
    Fail(SyncError),
}

/// Map an HTTP status and response body onto the retry contract.
pub fn classify_response(status: u16, body: &[u8]) -> AttemptOutcome {
    match status {
        200..=299 => AttemptOutcome::Delivered,
        401 => AttemptOutcome::Fail(SyncError::AuthenticationError),
        403 => AttemptOutcome::Fail(SyncError::ForbiddenError(
            error_message(body).unwrap_or_else(|| "Forbidden".to_string()),
        )),
        500..=599 => AttemptOutcome::Retry(SyncError::UnknownError(
            error_message(body).unwrap_or_else(|| format!("HTTP {}", status)),
        )),
        _ => AttemptOutcome::Fail(SyncError::UnknownError(
            error_message(body).unwrap_or_else(|| format!("HTTP {}", status)),
        )),
    }
}

/// `message` or `detail` from a JSON error body.
fn error_message(body: &[u8]) -> Option<String> {
    let json: serde_json::Value = serde_json::from_slice(body).ok()?;
    ["message", "detail"]
        .iter()
        .find_map(|key| json.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

/// Per-upload state shared read-only by every batch task.
struct BatchContext {
    client: Client,
    url: Url,
    bearer: String,
    retry: RetryPolicy,
}

/// Uploads canonical data points for one tenant.
pub struct BatchUploader {
    client: Client,
    tenant_id: String,
    settings: UploadSettings,
}

impl BatchUploader {
    pub fn new(tenant_id: impl Into<String>, settings: UploadSettings) -> Result<Self, SyncError> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            client,
            tenant_id: tenant_id.into(),
            settings,
        })
    }

    /// Upload `points` to `{endpoint}/ingest` and tally per-batch outcomes.
    ///
    /// `total_records` in the result is always `points.len()`.
    pub async fn upload(
        &self,
        points: &[CanonicalDataPoint],
        credential: &str,
        endpoint: &str,
    ) -> Result<SyncResult, SyncError> {
        let url = ingest_url(endpoint)?;
        let ctx = Arc::new(BatchContext {
            client: self.client.clone(),
            url,
            bearer: format!("Bearer {}", credential),
            retry: self.settings.retry,
        });

        let total_batches = batch_count(points.len(), self.settings.batch_size);
        info!(
            records = points.len(),
            batches = total_batches,
            batch_size = self.settings.batch_size,
            "uploading"
        );

        let mut tally = BatchTally::default();
        let mut tasks = JoinSet::new();

        for (index, batch) in partition(points, self.settings.batch_size).enumerate() {
            let body = match serde_json::to_vec(&IngestRequest {
                tenant_id: &self.tenant_id,
                data_points: batch,
            }) {
                Ok(body) => body,
                Err(err) => {
                    warn!(batch = index, error = %err, "could not encode batch");
                    tally.record(Err(err.into()));
                    continue;
                }
            };
            let ctx = Arc::clone(&ctx);
            tasks.spawn(async move { (index, send_with_retry(&ctx, index, body).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(attempts))) => {
                    debug!(batch = index, attempts, "batch delivered");
                    tally.record(Ok(()));
                }
                Ok((index, Err(err))) => {
                    warn!(batch = index, error = %err, "batch failed");
                    tally.record(Err(err));
                }
                Err(join_err) => {
                    warn!(error = %join_err, "batch task aborted");
                    tally.record(Err(SyncError::UnknownError(join_err.to_string())));
                }
            }
        }

        tally.finish(total_batches, points.len())
    }
}

/// Outcome accumulator owned by the joining task.
#[derive(Debug, Default)]
struct BatchTally {
    ok: usize,
    failed: usize,
    last_error: Option<SyncError>,
}

impl BatchTally {
    fn record(&mut self, outcome: Result<(), SyncError>) {
        match outcome {
            Ok(()) => self.ok += 1,
            Err(err) => {
                self.failed += 1;
                self.last_error = Some(err);
            }
        }
    }

    fn finish(self, total_batches: usize, total_records: usize) -> Result<SyncResult, SyncError> {
        let result = SyncResult {
            total_batches,
            successful_batches: self.ok,
            failed_batches: self.failed,
            total_records,
        };
        if self.failed > 0 && self.ok == 0 {
            return Err(self
                .last_error
                .unwrap_or_else(|| SyncError::UnknownError("All batches failed".to_string())));
        }
        info!(
            delivered = result.successful_batches,
            failed = result.failed_batches,
            records = result.total_records,
            "upload complete"
        );
        Ok(result)
    }
}

/// Upload one batch, retrying transport failures and 5xx responses.
///
/// Returns the number of attempts it took on success.
async fn send_with_retry(ctx: &BatchContext, index: usize, body: Vec<u8>) -> Result<u32, SyncError> {
    let max_attempts = ctx.retry.max_attempts();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let outcome = match send_once(ctx, &body).await {
            Ok((status, response_body)) => classify_response(status, &response_body),
            Err(err) if err.is_transport() => AttemptOutcome::Retry(err),
            Err(err) => AttemptOutcome::Fail(err),
        };

        match outcome {
            AttemptOutcome::Delivered => return Ok(attempt),
            AttemptOutcome::Fail(err) => return Err(err),
            AttemptOutcome::Retry(err) => {
                if attempt >= max_attempts {
                    return Err(err);
                }
                let delay = ctx.retry.delay_before(attempt);
                warn!(
                    batch = index,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying batch"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn send_once(ctx: &BatchContext, body: &[u8]) -> Result<(u16, Vec<u8>), SyncError> {
    let response = ctx
        .client
        .post(ctx.url.clone())
        .header(AUTHORIZATION, &ctx.bearer)
        .header(CONTENT_TYPE, "application/json")
        .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string())
        .body(body.to_vec())
        .send()
        .await?;

    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .unwrap_or_default();
    Ok((status, body))
}
