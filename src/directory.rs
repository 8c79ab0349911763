//! Session directory client.
//!
//! The directory is an external HTTP JSON service under `{base}/api/v1`. It
//! lists, creates and deletes sessions and issues per-member join URLs. The
//! engine talks to it through [`SessionDirectory`] so tests can substitute an
//! in-process fake; [`HttpDirectory`] is the `reqwest` implementation.
//!
//! ERROR HANDLING
//! ==============
//! Failures are returned to the caller as-is. Nothing here retries.

#[cfg(test)]
#[path = "directory_test.rs"]
mod directory_test;

use async_trait::async_trait;
use frames::{CreateSessionRequest, JoinResponse, Session};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// API prefix appended to the directory base URL.
pub const API_PREFIX: &str = "/api/v1";

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("invalid directory URL: {0}")]
    InvalidBaseUrl(String),
    #[error("directory request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("directory returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Request/response operations against the session directory.
#[async_trait(?Send)]
pub trait SessionDirectory {
    /// # Errors
    ///
    /// Returns a [`DirectoryError`] if the request fails.
    async fn list_sessions(&self) -> Result<Vec<Session>, DirectoryError>;

    /// # Errors
    ///
    /// Returns a [`DirectoryError`] if the request fails.
    async fn create_session(&self, request: &CreateSessionRequest) -> Result<Session, DirectoryError>;

    /// Ask for a join URL for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`DirectoryError`] if the request fails.
    async fn join_session(&self, session_id: &str) -> Result<JoinResponse, DirectoryError>;

    /// # Errors
    ///
    /// Returns a [`DirectoryError`] if the request fails.
    async fn delete_session(&self, session_id: &str) -> Result<(), DirectoryError>;

    /// URL the directory is served from. Relative join URLs resolve against it.
    fn base_url(&self) -> &Url;
}

/// [`SessionDirectory`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    client: reqwest::Client,
    base: Url,
}

impl HttpDirectory {
    /// # Errors
    ///
    /// Returns [`DirectoryError::InvalidBaseUrl`] unless `base` is an absolute
    /// http(s) URL.
    pub fn new(base: &str) -> Result<Self, DirectoryError> {
        Self::with_client(reqwest::Client::new(), base)
    }

    /// # Errors
    ///
    /// Returns [`DirectoryError::InvalidBaseUrl`] unless `base` is an absolute
    /// http(s) URL.
    pub fn with_client(client: reqwest::Client, base: &str) -> Result<Self, DirectoryError> {
        let Ok(parsed) = Url::parse(base) else {
            return Err(DirectoryError::InvalidBaseUrl(base.to_owned()));
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DirectoryError::InvalidBaseUrl(base.to_owned()));
        }
        Ok(Self { client, base: parsed })
    }

    /// Scheme, host and port of the directory; keys persisted client state.
    #[must_use]
    pub fn origin(&self) -> String {
        origin_of(&self.base)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{API_PREFIX}/{}", self.base.as_str().trim_end_matches('/'), path.trim_start_matches('/'))
    }

    async fn send(&self, method: Method, path: &str, body: Option<&CreateSessionRequest>) -> Result<reqwest::Response, DirectoryError> {
        let url = self.endpoint(path);
        debug!(%method, %url, "directory request");

        let request = self.client.request(method, &url);
        let request = if let Some(json) = body { request.json(json) } else { request };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(error) => {
                    debug!(%url, %error, "failed to read rejected response body");
                    String::new()
                }
            };
            warn!(status = status.as_u16(), %url, "directory request rejected");
            return Err(DirectoryError::Status { status: status.as_u16(), body });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&CreateSessionRequest>,
    ) -> Result<T, DirectoryError> {
        let response = self.send(method, path, body).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait(?Send)]
impl SessionDirectory for HttpDirectory {
    async fn list_sessions(&self) -> Result<Vec<Session>, DirectoryError> {
        let sessions: Option<Vec<Session>> = self.send_json(Method::GET, "sessions", None).await?;
        Ok(sessions.unwrap_or_default())
    }

    async fn create_session(&self, request: &CreateSessionRequest) -> Result<Session, DirectoryError> {
        self.send_json(Method::POST, "sessions", Some(request)).await
    }

    async fn join_session(&self, session_id: &str) -> Result<JoinResponse, DirectoryError> {
        self.send_json(Method::POST, &format!("sessions/{session_id}/join"), None).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), DirectoryError> {
        self.send(Method::DELETE, &format!("sessions/{session_id}"), None).await?;
        Ok(())
    }

    fn base_url(&self) -> &Url {
        &self.base
    }
}

/// Serialized origin of `url`, e.g. `https://example.com:8443`.
#[must_use]
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}
