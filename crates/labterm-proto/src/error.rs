use thiserror::Error;

/// Errors produced while encoding or decoding wire frames.
#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Missing '{0}' field in frame")]
    MissingField(&'static str),
}

/// Errors produced by a transport channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel not connected")]
    NotConnected,

    #[error("Channel closed")]
    Closed,

    #[error("Invalid channel endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },
}

/// Errors from the provisioning REST API.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server rejected request ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Malformed server response: {0}")]
    MalformedResponse(String),
}

impl ApiError {
    /// Returns whether this error is potentially transient and may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Http(e) => e.is_timeout() || e.is_connect(),
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::MalformedResponse(_) => false,
        }
    }

    /// Returns a helpful suggestion for resolving the error.
    pub fn suggestion(&self) -> String {
        match self {
            ApiError::Http(_) => {
                "Check that the backend is reachable and the base URL is correct.".to_string()
            }
            ApiError::Status { status: 404, .. } => {
                "The session may have expired or been cleaned up. Start a new scenario.".to_string()
            }
            ApiError::Status { .. } => {
                "The backend reported an error. Check the server logs.".to_string()
            }
            ApiError::MalformedResponse(_) => {
                "The backend returned an unexpected payload. Check client/server versions."
                    .to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = ApiError::Status {
            status: 404,
            message: "Scenario session not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Server rejected request (404): Scenario session not found"
        );
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let err = ApiError::Status {
            status: 502,
            message: "bad gateway".to_string(),
        };
        assert!(err.is_retryable());

        let err = ApiError::Status {
            status: 404,
            message: "not found".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_found_suggestion_mentions_new_scenario() {
        let err = ApiError::Status {
            status: 404,
            message: "gone".to_string(),
        };
        assert!(err.suggestion().contains("new scenario"));
    }

    #[test]
    fn test_channel_error_display() {
        assert_eq!(
            ChannelError::NotConnected.to_string(),
            "Channel not connected"
        );
    }
}
