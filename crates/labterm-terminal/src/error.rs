use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Fit computation failed: {0}")]
    Fit(String),

    #[error("Engine disposed")]
    Disposed,
}
