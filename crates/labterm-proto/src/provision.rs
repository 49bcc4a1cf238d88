//! Provisioning REST client.
//!
//! The backend allocates a scenario on `POST /api/scenarios` and returns
//! the session coordinates; `POST /api/scenarios/{id}/extend_timer` pushes
//! the expiration deadline out. Both endpoints report failures as an
//! `{"error": ...}` body.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::ApiError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Scenario provisioning runs infrastructure automation server-side and can
/// take minutes.
const PROVISION_TIMEOUT: Duration = Duration::from_secs(900);

/// Session coordinates returned by a successful provision call.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProvisionedScenario {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "websocketPath")]
    pub websocket_path: String,
    /// Absolute expiration deadline, Unix epoch seconds.
    #[serde(rename = "endTime")]
    pub end_time: u64,
}

#[derive(Debug, Deserialize)]
struct ExtendResponse {
    #[serde(rename = "newEndTime")]
    new_end_time: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Capability for requesting a deadline extension, consumed by the
/// expiration timer. Implemented by [`ScenarioApi`]; mocked in tests.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Returns the new absolute deadline in epoch seconds.
    async fn extend(&self, session_id: &str) -> Result<u64, ApiError>;
}

pub struct ScenarioApi {
    base_url: String,
    http: reqwest::Client,
}

impl ScenarioApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Provision a scenario and return its session coordinates.
    pub async fn provision(&self, repo: &str) -> Result<ProvisionedScenario, ApiError> {
        let url = format!("{}/api/scenarios", self.base_url);
        info!(repo = repo, "provisioning scenario");

        let response = self
            .http
            .post(&url)
            .timeout(PROVISION_TIMEOUT)
            .json(&json!({ "repo": repo }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| ApiError::MalformedResponse(e.to_string()))
    }

    /// Extend the session deadline; returns the new end time.
    pub async fn extend_timer(&self, session_id: &str) -> Result<u64, ApiError> {
        let url = format!("{}/api/scenarios/{}/extend_timer", self.base_url, session_id);
        info!(session_id = session_id, "requesting timer extension");

        let response = self
            .http
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &body));
        }

        let parsed: ExtendResponse =
            serde_json::from_str(&body).map_err(|e| ApiError::MalformedResponse(e.to_string()))?;
        Ok(parsed.new_end_time)
    }
}

#[async_trait]
impl Provisioner for ScenarioApi {
    async fn extend(&self, session_id: &str) -> Result<u64, ApiError> {
        self.extend_timer(session_id).await
    }
}

fn status_error(status: u16, body: &str) -> ApiError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or_else(|| format!("HTTP {}", status));
    ApiError::Status { status, message }
}
