use node_edge_protocol::JsErrorPayload;
use thiserror::Error;

/// Root error type for everything this crate can fail with.
///
/// Rust has no shared base exception class, so unlike
/// `original_source/node_edge/exceptions.py::NodeEdgeException` (a base
/// class other exceptions inherit from), this is a flat enum every failure
/// mode lives inside — matching how the teacher's
/// `mirrord_protocol::error::ResponseError` is built.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Host-side argument validation failed (e.g. awaiting a non-awaitable
    /// pointer, or passing a non-proxy to `as_mapping`).
    #[error("{0}")]
    Value(String),

    /// An argument could not be marshaled across the wire (unrepresentable
    /// value passed to `call`/`set_attr`/`set_item`).
    #[error("value is not representable across the bridge: {0}")]
    Type(String),

    /// Environment directory selection, package.json materialization, or
    /// dependency installation failed.
    #[error("failed to set up the node environment: {0}")]
    EnvSetup(String),

    /// The child never connected within the startup timeout.
    #[error("node child did not connect within {0:?}")]
    EngineStart(std::time::Duration),

    /// An operation was attempted after the engine (or the pointer it
    /// targets) was torn down.
    #[error("engine is closed")]
    EngineClosed,

    /// A line from the child could not be parsed as a protocol frame.
    #[error("malformed message from child: {0}")]
    Protocol(String),

    /// An exception forwarded from the JS side, message and stack intact.
    #[error(transparent)]
    JavaScript(#[from] JavaScriptError),

    /// `arr[i]` where `i` is out of bounds.
    #[error("index {0} out of range")]
    IndexOutOfRange(u64),

    /// `mapping["missing"]` or `obj["missing"]`.
    #[error("key {0:?} not found")]
    KeyNotFound(String),

    /// `obj.missing` after the attribute was deleted or never existed.
    #[error("attribute {0:?} not found")]
    AttributeNotFound(String),
}

/// A JS exception forwarded verbatim from the child, replicating the JS
/// `Error` object as closely as spec.md §4.7 calls for.
#[derive(Debug, Error)]
#[error("{}", display_js_error(.message, .stack))]
pub struct JavaScriptError {
    pub message: String,
    pub stack: String,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn display_js_error(message: &str, stack: &str) -> String {
    format!("{message}:\n{stack}")
}

impl From<JsErrorPayload> for JavaScriptError {
    fn from(payload: JsErrorPayload) -> Self {
        JavaScriptError {
            message: payload.message,
            stack: payload.stack,
            extra: payload.extra,
        }
    }
}

impl From<JsErrorPayload> for BridgeError {
    fn from(payload: JsErrorPayload) -> Self {
        BridgeError::JavaScript(JavaScriptError::from(payload))
    }
}
