use thiserror::Error;

/// Precondition failures when starting a session.
///
/// These abort initialization before any resource is created; nothing is
/// rendered, the violation is only logged.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StartError {
    #[error("Missing session id")]
    MissingSessionId,

    #[error("Missing channel path")]
    MissingChannelPath,
}

impl StartError {
    /// Returns a helpful suggestion for resolving the error.
    pub fn suggestion(&self) -> String {
        match self {
            StartError::MissingSessionId => {
                "Provision a scenario first; the backend response carries the session id."
                    .to_string()
            }
            StartError::MissingChannelPath => {
                "The provisioning response did not include a channel path. Check the backend."
                    .to_string()
            }
        }
    }
}
