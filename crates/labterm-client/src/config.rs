use std::env;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:5000";
const DEFAULT_RECONNECT_ATTEMPTS: u32 = 3;
const DEFAULT_JOIN_SETTLE_MS: u64 = 150;
const DEFAULT_REFIT_SETTLE_MS: u64 = 200;

/// Explicit configuration for one session client.
///
/// Everything the client needs to reach the backend travels through this
/// value; there is no ambient endpoint state.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP base of the backend (provisioning API and channel endpoints).
    pub base_url: String,
    /// How many reconnects the session survives before closing.
    pub reconnect_attempts: u32,
    /// Delay between joining and the first resize negotiation, so the
    /// display can settle and report an accurate fit.
    pub join_settle: Duration,
    /// Delay between a layout-mode change and the follow-up re-fit.
    pub refit_settle: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env::var("LABTERM_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            reconnect_attempts: env::var("LABTERM_RECONNECT_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RECONNECT_ATTEMPTS),
            join_settle: Duration::from_millis(
                env::var("LABTERM_JOIN_SETTLE_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_JOIN_SETTLE_MS),
            ),
            refit_settle: Duration::from_millis(
                env::var("LABTERM_REFIT_SETTLE_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_REFIT_SETTLE_MS),
            ),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    pub fn with_join_settle(mut self, settle: Duration) -> Self {
        self.join_settle = settle;
        self
    }

    pub fn with_refit_settle(mut self, settle: Duration) -> Self {
        self.refit_settle = settle;
        self
    }
}
