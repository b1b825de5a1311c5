//! REST client for the TellMeMo HTTP API.
//!
//! Wraps the endpoints the client core needs (job status and
//! cancellation, project task and summary lists, organization
//! invitations, session refresh) using [`reqwest`] with a bearer token.

use serde::{Deserialize, Serialize};
use tellmemo_core::bulk_invite::InviteEntry;
use tellmemo_core::job::JobUpdate;
use tellmemo_core::roles::OrgRole;
use tellmemo_core::summaries::Summary;
use tellmemo_core::tasks::Task;

/// Path segments every endpoint lives under.
const API_PREFIX: &[&str] = &["api", "v1"];

/// HTTP client for one TellMeMo backend.
#[derive(Debug, Clone)]
pub struct TellMeMoApi {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

/// Tokens returned by the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Body of `POST /organizations/{id}/invitations`.
#[derive(Debug, Serialize)]
struct InvitationRequest<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    role: OrgRole,
}

/// Errors from the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("TellMeMo API error ({status}): {body}")]
    Status {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The configured base URL cannot carry a path.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Short message suitable for showing to a user. Uses the `detail`
    /// field of a JSON error body when present.
    pub fn user_message(&self) -> String {
        match self {
            Self::Request(e) => e.to_string(),
            Self::InvalidUrl(_) => self.to_string(),
            Self::Status { status, body } => serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
                .unwrap_or_else(|| format!("Request failed with status {status}")),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::InvalidUrl(_) => None,
        }
    }
}

impl TellMeMoApi {
    /// * `api_url` - Base HTTP URL, e.g. `https://api.tellmemo.io`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token.filter(|t| !t.is_empty());
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Current status of a job. `GET /jobs/{id}`.
    pub async fn get_job(&self, job_id: &str) -> Result<JobUpdate, ApiError> {
        let response = self.get(&["jobs", job_id])?.send().await?;
        Self::parse_response(response).await
    }

    /// Request cancellation of a job. `POST /jobs/{id}/cancel`.
    pub async fn cancel_job(&self, job_id: &str) -> Result<(), ApiError> {
        let response = self.post(&["jobs", job_id, "cancel"])?.send().await?;
        Self::check_status(response).await
    }

    /// Jobs of a project. `GET /projects/{id}/jobs`.
    pub async fn list_project_jobs(&self, project_id: &str) -> Result<Vec<JobUpdate>, ApiError> {
        let response = self
            .get(&["projects", project_id, "jobs"])?
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Tasks of a project. `GET /projects/{id}/tasks`.
    pub async fn list_tasks(&self, project_id: &str) -> Result<Vec<Task>, ApiError> {
        let response = self
            .get(&["projects", project_id, "tasks"])?
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Summaries of a project. `GET /projects/{id}/summaries`.
    pub async fn list_summaries(&self, project_id: &str) -> Result<Vec<Summary>, ApiError> {
        let response = self
            .get(&["projects", project_id, "summaries"])?
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Invite one person. `POST /organizations/{id}/invitations`.
    pub async fn send_invitation(&self, org_id: &str, entry: &InviteEntry) -> Result<(), ApiError> {
        let body = InvitationRequest {
            email: &entry.email,
            name: entry.name.as_deref(),
            role: entry.role,
        };

        let response = self
            .post(&["organizations", org_id, "invitations"])?
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Exchange a refresh token for a new session. `POST /auth/refresh`.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ApiError> {
        let response = self
            .post(&["auth", "refresh"])?
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Try to restore a session at startup. Any failure yields `None` so
    /// the caller can fall back to the login flow.
    pub async fn try_restore_session(&self, refresh_token: Option<&str>) -> Option<Session> {
        let refresh_token = refresh_token.filter(|t| !t.is_empty())?;
        match self.refresh_session(refresh_token).await {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::info!(error = %e, "Session restore failed");
                None
            }
        }
    }

    // ---- private helpers ----

    /// `{api_url}/api/v1/{segments...}`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<reqwest::Url, ApiError> {
        let invalid = |reason: String| ApiError::InvalidUrl(format!("{}: {reason}", self.api_url));

        let mut url = reqwest::Url::parse(&self.api_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot be a base".into()))?
            .pop_if_empty()
            .extend(API_PREFIX.iter().chain(segments));
        Ok(url)
    }

    fn get(&self, segments: &[&str]) -> Result<reqwest::RequestBuilder, ApiError> {
        Ok(self.authorize(self.client.get(self.url(segments)?)))
    }

    fn post(&self, segments: &[&str]) -> Result<reqwest::RequestBuilder, ApiError> {
        Ok(self.authorize(self.client.post(self.url(segments)?)))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`ApiError::Status`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
