//! Error taxonomy for the sync pipeline.
//!
//! Every stage (authorization, store queries, credential fetch, batch
//! upload) reports failures as a [`SyncError`]. The `Display` text is the
//! human-readable message surfaced in coordinator status.
//!
//! Only two classes are ever retried automatically, and only inside the
//! batch uploader: transport failures ([`SyncError::NetworkError`]) and
//! HTTP 5xx responses. See [`crate::upload`].

/// Failure of any stage of a sync run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The local health data store does not exist on this device.
    #[error("Health data store not available on this device.")]
    StoreUnavailable,

    /// The user declined the read permission prompt.
    #[error("Health data permission denied.")]
    AuthorizationDenied,

    /// The permission request itself failed.
    #[error("Authorization error: {0}")]
    AuthorizationError(String),

    /// A query against the local store failed.
    #[error("Health data query error: {0}")]
    QueryError(String),

    /// No HTTP response was received (connect failure, timeout, reset).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// HTTP 401 from a remote service.
    #[error("Auth failed (token invalid/expired).")]
    AuthenticationError,

    /// HTTP 403 from a remote service.
    #[error("Forbidden: {0}")]
    ForbiddenError(String),

    /// A request body could not be encoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The configured endpoint is not a usable http(s) URL.
    #[error("Invalid URL.")]
    InvalidEndpoint,

    /// A response arrived but did not have the expected shape.
    #[error("Invalid response.")]
    InvalidResponse,

    /// Any other terminal failure, usually a non-retryable HTTP status.
    #[error("Error: {0}")]
    UnknownError(String),

    /// A setup or sync is already running on this coordinator.
    #[error("A sync is already in progress.")]
    Busy,

    /// `sync` was requested before a successful setup.
    #[error("Not authorized. Run setup first.")]
    NotAuthorized,
}

impl SyncError {
    /// Whether the batch uploader may retry after this error.
    ///
    /// HTTP 5xx exhaustion is reported as [`SyncError::UnknownError`] but
    /// the retry decision for it is made from the status code, not from here.
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::NetworkError(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        // A builder error carries a URL only when the URL itself was rejected.
        if err.is_builder() && err.url().is_some() {
            SyncError::InvalidEndpoint
        } else if err.is_builder() {
            SyncError::UnknownError(err.to_string())
        } else if err.is_decode() {
            SyncError::InvalidResponse
        } else {
            SyncError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationError(err.to_string())
    }
}
