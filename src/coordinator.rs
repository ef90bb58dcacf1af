//! Sync coordination: credential, authorization, fetch, upload.
//!
//! ```text
//! Idle ─▶ FetchingCredential ─▶ Authorizing ─▶ Ready ─▶ Fetching ─▶ Uploading ─▶ Done
//!               │                    │                     │            │
//!               └────────────────────┴─────────▶ Failed ◀──┴────────────┘
//! ```
//!
//! [`SyncCoordinator::setup`] and [`SyncCoordinator::sync`] share one
//! in-flight guard: calling either while another call is running returns
//! [`SyncError::Busy`] without touching status.
//!
//! Status is owned by the coordinator. Callers read it with
//! [`SyncCoordinator::status`] or follow changes through
//! [`SyncCoordinator::subscribe`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::credential::CredentialSource;
use crate::error::SyncError;
use crate::fetch::FetchOrchestrator;
use crate::metrics::SampleQuery;
use crate::models::SyncResult;
use crate::store::{DateWindow, HealthStore};
use crate::upload::{ingest_url, BatchUploader, UploadSettings};

/// Stage of the coordinator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    FetchingCredential,
    Authorizing,
    Ready,
    Fetching,
    Uploading,
    Done,
    Failed,
}

/// Externally observable coordinator state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    /// Human-readable description of the current stage or failure.
    pub message: String,
    pub is_error: bool,
    pub is_authorized: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_result: Option<SyncResult>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            message: "Ready".to_string(),
            is_error: false,
            is_authorized: false,
            last_sync: None,
            last_result: None,
        }
    }
}

/// Everything the coordinator needs to know about the remote side.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Base URL of the ingestion API; batches go to `{endpoint}/ingest`.
    pub endpoint: String,
    pub tenant_id: String,
    pub upload: UploadSettings,
}

/// Human summary of a finished upload.
pub fn summarize(result: &SyncResult) -> String {
    let mut line = format!(
        "Sync complete! Records: {} | Batches: {}/{}",
        result.total_records, result.successful_batches, result.total_batches
    );
    if result.failed_batches > 0 {
        line.push_str(&format!(" | Failed: {}", result.failed_batches));
    }
    line
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives one device's sync: setup once, then any number of syncs.
pub struct SyncCoordinator {
    settings: SyncSettings,
    store: Arc<dyn HealthStore>,
    credentials: Arc<dyn CredentialSource>,
    fetcher: FetchOrchestrator,
    uploader: BatchUploader,
    credential: Mutex<Option<String>>,
    status: watch::Sender<SyncStatus>,
    in_flight: AtomicBool,
}

impl SyncCoordinator {
    /// Build a coordinator. Fails with [`SyncError::InvalidEndpoint`] when
    /// the ingestion endpoint is not an http(s) URL.
    pub fn new(
        settings: SyncSettings,
        store: Arc<dyn HealthStore>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, SyncError> {
        ingest_url(&settings.endpoint)?;
        let uploader = BatchUploader::new(settings.tenant_id.clone(), settings.upload.clone())?;
        let (status, _) = watch::channel(SyncStatus::default());

        Ok(Self {
            fetcher: FetchOrchestrator::new(Arc::clone(&store)),
            settings,
            store,
            credentials,
            uploader,
            credential: Mutex::new(None),
            status,
            in_flight: AtomicBool::new(false),
        })
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Fetch an upload credential, then request read permission.
    pub async fn setup(&self) -> Result<(), SyncError> {
        let _guard = self.begin()?;

        self.transition(SyncPhase::FetchingCredential, "Fetching token from backend...");
        let token = match self.credentials.fetch_credential().await {
            Ok(token) => token,
            Err(err) => {
                self.fail(format!("Failed to get token from backend: {}", err), false);
                return Err(err);
            }
        };
        self.set_credential(Some(token));

        self.transition(SyncPhase::Authorizing, "Requesting health data permission...");
        if !self.store.is_available() {
            let err = SyncError::StoreUnavailable;
            self.fail(format!("Authorization failed: {}", err), false);
            return Err(err);
        }

        match self.store.request_authorization(&SampleQuery::ALL).await {
            Ok(true) => {
                self.status.send_modify(|s| {
                    s.phase = SyncPhase::Ready;
                    s.message = "Authorized".to_string();
                    s.is_error = false;
                    s.is_authorized = true;
                });
                info!("health data access authorized");
                Ok(())
            }
            Ok(false) => {
                self.fail("Authorization denied".to_string(), false);
                Err(SyncError::AuthorizationDenied)
            }
            Err(err) => {
                self.fail(format!("Authorization failed: {}", err), false);
                Err(err)
            }
        }
    }

    /// Fetch every sample in `window` and upload it.
    ///
    /// Requires a successful [`setup`](Self::setup). Partial delivery is
    /// reported as success; see [`crate::upload`].
    pub async fn sync(&self, window: DateWindow) -> Result<SyncResult, SyncError> {
        let _guard = self.begin()?;

        let credential = match self.authorized_credential() {
            Some(c) => c,
            None => {
                self.status.send_modify(|s| {
                    s.message = "Not authorized. Run setup first.".to_string();
                    s.is_error = true;
                });
                return Err(SyncError::NotAuthorized);
            }
        };

        info!(
            start = %window.start().to_rfc3339(),
            end = %window.end().to_rfc3339(),
            "sync started"
        );
        self.transition(SyncPhase::Fetching, "Syncing...");
        let points = match self.fetcher.fetch(window).await {
            Ok(points) => points,
            Err(err) => {
                self.fail(format!("Sync failed: {}", err), true);
                return Err(err);
            }
        };

        self.transition(
            SyncPhase::Uploading,
            &format!("Uploading {} records...", points.len()),
        );
        match self
            .uploader
            .upload(&points, &credential, &self.settings.endpoint)
            .await
        {
            Ok(result) => {
                let message = summarize(&result);
                info!(%message, "sync finished");
                self.status.send_modify(|s| {
                    s.phase = SyncPhase::Done;
                    s.message = message;
                    s.is_error = false;
                    s.last_sync = Some(Utc::now());
                    s.last_result = Some(result);
                });
                Ok(result)
            }
            Err(err) => {
                self.fail(format!("Sync failed: {}", err), true);
                Err(err)
            }
        }
    }

    fn begin(&self) -> Result<InFlight<'_>, SyncError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::Busy)?;
        Ok(InFlight(&self.in_flight))
    }

    fn transition(&self, phase: SyncPhase, message: &str) {
        self.status.send_modify(|s| {
            s.phase = phase;
            s.message = message.to_string();
            s.is_error = false;
        });
    }

    /// Enter `Failed`. A sync failure keeps the authorization; a setup
    /// failure revokes it.
    fn fail(&self, message: String, keep_authorization: bool) {
        warn!(%message, "sync coordinator failed");
        if !keep_authorization {
            self.set_credential(None);
        }
        self.status.send_modify(|s| {
            s.phase = SyncPhase::Failed;
            s.message = message;
            s.is_error = true;
            s.is_authorized = s.is_authorized && keep_authorization;
        });
    }

    fn set_credential(&self, token: Option<String>) {
        let mut slot = self.credential.lock().unwrap_or_else(|p| p.into_inner());
        *slot = token;
    }

    fn authorized_credential(&self) -> Option<String> {
        if !self.status.borrow().is_authorized {
            return None;
        }
        self.credential
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}
