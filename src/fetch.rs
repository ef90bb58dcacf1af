//! Fetch orchestration: fan out one query per tracked type, fan in, merge.
//!
//! # Merge policy
//!
//! All 15 queries run as independent tasks. The joining task owns the only
//! accumulator: successful results are appended in completion order, then
//! the whole sequence is stable-sorted by timestamp, so points with equal
//! timestamps keep the order they were discovered in.
//!
//! # Failure policy
//!
//! - every query failed → `Err` with the most recently observed error
//! - at least one query succeeded → `Ok` with the merged points; errors of
//!   the failed queries are logged and otherwise dropped
//!
//! The second rule means a fetch can succeed with incomplete data.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::convert::{convert_sample, convert_workout};
use crate::error::SyncError;
use crate::metrics::SampleQuery;
use crate::models::CanonicalDataPoint;
use crate::store::{DateWindow, HealthStore};

/// Runs the per-type queries for a window and merges their results.
#[derive(Clone)]
pub struct FetchOrchestrator {
    store: Arc<dyn HealthStore>,
}

impl FetchOrchestrator {
    pub fn new(store: Arc<dyn HealthStore>) -> Self {
        Self { store }
    }

    /// Fetch and normalize every tracked sample whose start lies in `window`.
    ///
    /// The returned points are sorted non-decreasing by timestamp.
    pub async fn fetch(&self, window: DateWindow) -> Result<Vec<CanonicalDataPoint>, SyncError> {
        let mut tasks = JoinSet::new();
        for query in SampleQuery::ALL {
            let store = Arc::clone(&self.store);
            tasks.spawn(async move { (query, run_query(store.as_ref(), query, window).await) });
        }

        let mut merged: Vec<CanonicalDataPoint> = Vec::new();
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut last_error: Option<SyncError> = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((query, Ok(points))) => {
                    debug!(data_type = query.tag(), points = points.len(), "query finished");
                    succeeded += 1;
                    merged.extend(points);
                }
                Ok((query, Err(err))) => {
                    warn!(data_type = query.tag(), error = %err, "query failed");
                    failed += 1;
                    last_error = Some(err);
                }
                Err(join_err) => {
                    warn!(error = %join_err, "query task aborted");
                    failed += 1;
                    last_error = Some(SyncError::QueryError(join_err.to_string()));
                }
            }
        }

        if succeeded == 0 {
            return Err(last_error
                .unwrap_or_else(|| SyncError::QueryError("no queries were issued".to_string())));
        }

        merged.sort_by_key(|p| p.timestamp);

        info!(
            points = merged.len(),
            queries_ok = succeeded,
            queries_failed = failed,
            "fetch complete"
        );
        Ok(merged)
    }
}

async fn run_query(
    store: &dyn HealthStore,
    query: SampleQuery,
    window: DateWindow,
) -> Result<Vec<CanonicalDataPoint>, SyncError> {
    let mut points: Vec<CanonicalDataPoint> = match query {
        SampleQuery::Samples(metric) => store
            .query_samples(metric, window)
            .await?
            .iter()
            .map(|s| convert_sample(s, metric.tag()))
            .collect(),
        SampleQuery::Workouts => store
            .query_workouts(window)
            .await?
            .iter()
            .map(convert_workout)
            .collect(),
    };

    let before = points.len();
    points.retain(|p| window.contains(p.timestamp));
    if points.len() != before {
        warn!(
            data_type = query.tag(),
            dropped = before - points.len(),
            "store returned samples outside the requested window"
        );
    }
    Ok(points)
}
