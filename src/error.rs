use thiserror::Error;

/// Errors surfaced by the inbound service operations.
///
/// Phase-illegal actions arriving from the input layer are deliberately NOT
/// errors: concurrent button presses racing the state machine are expected,
/// so those are traced and dropped inside the services. This type covers
/// genuine caller mistakes.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid input provided by the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}
