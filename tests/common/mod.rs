//! Shared fixtures for integration tests: an in-memory health store and a
//! mock HTTP server for the ingestion and token endpoints.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Duration, TimeZone, Utc};
use health_sync::error::SyncError;
use health_sync::metrics::{MetricType, SampleQuery};
use health_sync::models::{
    CategorySample, Metadata, QuantitySample, RawSample, SampleSource, WorkoutSample,
};
use health_sync::store::{DateWindow, HealthStore};
use health_sync::units::{Quantity, Unit};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;

// ─── Sample builders ────────────────────────────────────────────────

/// 2024-05-01 at `hour:minute` UTC.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
}

/// The whole of 2024-05-01.
pub fn day_window() -> DateWindow {
    DateWindow::new(at(0, 0), at(0, 0) + Duration::days(1)).unwrap()
}

pub fn source() -> SampleSource {
    SampleSource {
        name: "Test Watch".into(),
        version: Some("10.4".into()),
        device: Some("Watch7,1".into()),
    }
}

pub fn quantity(start: DateTime<Utc>, value: f64, unit: Unit) -> RawSample {
    RawSample::Quantity(QuantitySample {
        start,
        end: start + Duration::minutes(1),
        quantity: Quantity::new(value, unit),
        source: source(),
        metadata: Metadata::new(),
    })
}

pub fn category(start: DateTime<Utc>, value: i64) -> RawSample {
    RawSample::Category(CategorySample {
        start,
        end: start + Duration::hours(1),
        value,
        source: source(),
        metadata: Metadata::new(),
    })
}

pub fn workout(start: DateTime<Utc>, minutes: i64, activity_type: u32) -> WorkoutSample {
    WorkoutSample {
        start,
        end: start + Duration::minutes(minutes),
        activity_type,
        total_energy: None,
        total_distance: None,
        source: source(),
    }
}

// ─── Fake store ─────────────────────────────────────────────────────

/// In-memory [`HealthStore`] with scripted per-type results and delays.
pub struct FakeStore {
    samples: HashMap<MetricType, Result<Vec<RawSample>, SyncError>>,
    workouts: Result<Vec<WorkoutSample>, SyncError>,
    delays: HashMap<&'static str, u64>,
    authorization: Result<bool, SyncError>,
    available: bool,
    gate: Option<Arc<Semaphore>>,
    pub queries: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            samples: HashMap::new(),
            workouts: Ok(Vec::new()),
            delays: HashMap::new(),
            authorization: Ok(true),
            available: true,
            gate: None,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn with_samples(mut self, metric: MetricType, samples: Vec<RawSample>) -> Self {
        self.samples.insert(metric, Ok(samples));
        self
    }

    pub fn with_workouts(mut self, workouts: Vec<WorkoutSample>) -> Self {
        self.workouts = Ok(workouts);
        self
    }

    pub fn failing(mut self, query: SampleQuery, err: SyncError) -> Self {
        match query {
            SampleQuery::Samples(metric) => {
                self.samples.insert(metric, Err(err));
            }
            SampleQuery::Workouts => self.workouts = Err(err),
        }
        self
    }

    /// Every query fails with `err`; later builder calls can override.
    pub fn failing_all(mut self, err: SyncError) -> Self {
        for query in SampleQuery::ALL {
            self = self.failing(query, err.clone());
        }
        self
    }

    /// Delay the query for `tag` by `millis` before answering.
    pub fn delayed(mut self, tag: &'static str, millis: u64) -> Self {
        self.delays.insert(tag, millis);
        self
    }

    pub fn denying(mut self) -> Self {
        self.authorization = Ok(false);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Hold every query until the semaphore receives permits.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    async fn pause(&self, tag: &str) {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        if let Some(ms) = self.delays.get(tag) {
            tokio::time::sleep(std::time::Duration::from_millis(*ms)).await;
        }
    }
}

#[async_trait]
impl HealthStore for FakeStore {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn request_authorization(&self, queries: &[SampleQuery]) -> Result<bool, SyncError> {
        assert_eq!(queries.len(), 15);
        self.authorization.clone()
    }

    async fn query_samples(
        &self,
        metric: MetricType,
        _window: DateWindow,
    ) -> Result<Vec<RawSample>, SyncError> {
        self.pause(metric.tag()).await;
        self.samples.get(&metric).cloned().unwrap_or(Ok(Vec::new()))
    }

    async fn query_workouts(&self, _window: DateWindow) -> Result<Vec<WorkoutSample>, SyncError> {
        self.pause("workoutType").await;
        self.workouts.clone()
    }
}

// ─── Mock HTTP server ───────────────────────────────────────────────

/// One request seen by the mock server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Value,
    pub at: Instant,
}

impl Recorded {
    pub fn header(&self, name: &str) -> String {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    /// `value` of the first data point; identifies a batch across retries.
    pub fn first_value(&self) -> f64 {
        self.body["data_points"][0]["value"].as_f64().unwrap_or(-1.0)
    }
}

type Responder = Arc<dyn Fn(&Value) -> (u16, Value) + Send + Sync>;

pub struct MockServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    /// Serve `POST /ingest` with `ingest` and `POST /token` with `token`.
    pub async fn start<I, T>(ingest: I, token: T) -> Self
    where
        I: Fn(&Value) -> (u16, Value) + Send + Sync + 'static,
        T: Fn(&Value) -> (u16, Value) + Send + Sync + 'static,
    {
        let requests: Arc<Mutex<Vec<Recorded>>> = Arc::new(Mutex::new(Vec::new()));
        let ingest: Responder = Arc::new(ingest);
        let token: Responder = Arc::new(token);

        let app = Router::new()
            .route("/ingest", post(handler("/ingest", ingest, requests.clone())))
            .route("/token", post(handler("/token", token, requests.clone())));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    /// Ingest-only server; the token endpoint issues `"issued-token"`.
    pub async fn ingest<I>(ingest: I) -> Self
    where
        I: Fn(&Value) -> (u16, Value) + Send + Sync + 'static,
    {
        Self::start(ingest, |_| (200, json!({ "token": "issued-token" }))).await
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

type Reply = Pin<Box<dyn Future<Output = (StatusCode, Json<Value>)> + Send>>;

fn handler(
    path: &'static str,
    responder: Responder,
    requests: Arc<Mutex<Vec<Recorded>>>,
) -> impl Fn(HeaderMap, Bytes) -> Reply + Clone + Send + Sync + 'static {
    move |headers: HeaderMap, body: Bytes| -> Reply {
        let responder = responder.clone();
        let requests = requests.clone();
        Box::pin(async move {
            let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            let (status, reply) = responder(&body);
            requests.lock().unwrap().push(Recorded {
                path: path.to_string(),
                headers,
                body,
                at: Instant::now(),
            });
            (StatusCode::from_u16(status).unwrap(), Json(reply))
        })
    }
}

/// An http URL nothing is listening on.
pub async fn closed_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// An http URL whose listener accepts each connection and closes it
/// without answering. The counter tracks accepted connections.
pub async fn dropping_endpoint() -> (String, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });
    (format!("http://{}", addr), accepted)
}
