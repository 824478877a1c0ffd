use thiserror::Error;

/// Failure to make sense of a line received from the child.
///
/// Surfaced by the transport when a line is not valid UTF-8 or not valid
/// JSON; the engine turns this into `BridgeError::Protocol`.
#[derive(Debug, Error)]
pub enum WireDecodeError {
    #[error("line from child was not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("line from child was not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
