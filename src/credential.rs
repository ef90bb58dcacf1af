//! Upload credentials.
//!
//! The ingestion endpoint authenticates uploads with a short-lived bearer
//! token issued by a separate token service. [`CredentialSource`] is the
//! seam the coordinator fetches through; [`TokenServiceClient`] talks to
//! the real service and [`StaticCredential`] hands out a fixed token.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::SyncError;

/// Something that can produce an upload credential.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch_credential(&self) -> Result<String, SyncError>;
}

/// A credential known up front.
pub struct StaticCredential(String);

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl CredentialSource for StaticCredential {
    async fn fetch_credential(&self) -> Result<String, SyncError> {
        Ok(self.0.clone())
    }
}

/// Exchanges an app auth token for an upload token.
///
/// `POST <token_url>` with `Authorization: Bearer <app_token>` and body
/// `{"expires_in_hours": N}`; the service answers `{"token": "..."}`.
pub struct TokenServiceClient {
    client: Client,
    url: Url,
    app_token: String,
    expires_in_hours: u32,
}

impl TokenServiceClient {
    pub fn new(
        token_url: &str,
        app_token: impl Into<String>,
        expires_in_hours: u32,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let url = Url::parse(token_url).map_err(|_| SyncError::InvalidEndpoint)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::InvalidEndpoint);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            app_token: app_token.into(),
            expires_in_hours,
        })
    }
}

#[async_trait]
impl CredentialSource for TokenServiceClient {
    async fn fetch_credential(&self) -> Result<String, SyncError> {
        let body = serde_json::json!({ "expires_in_hours": self.expires_in_hours });

        let response = self
            .client
            .post(self.url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.app_token))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), "token service responded");

        match status.as_u16() {
            200..=299 => {}
            401 => return Err(SyncError::AuthenticationError),
            403 => return Err(SyncError::ForbiddenError("Forbidden".to_string())),
            code => return Err(SyncError::UnknownError(format!("HTTP {}", code))),
        }

        let json: serde_json::Value = response.json().await.map_err(|err| {
            warn!(error = %err, "token response was not JSON");
            SyncError::InvalidResponse
        })?;

        json.get("token")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or(SyncError::InvalidResponse)
    }
}
