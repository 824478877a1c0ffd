use serde::{Deserialize, Serialize};

/// A value crossing the host/child boundary: either JSON-representable data,
/// or a handle to a remote object that must be proxied.
///
/// See spec.md §3 "Value envelope".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueEnvelope {
    Naive {
        data: serde_json::Value,
    },
    Pointer {
        id: u64,
        awaitable: bool,
        iterable: bool,
        repr: String,
    },
}

/// A key used by `get_item`/`set_item`/`del_item`: either a string property
/// name or a numeric (array) index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemKey {
    Index(u64),
    Name(String),
}

impl From<u64> for ItemKey {
    fn from(index: u64) -> Self {
        ItemKey::Index(index)
    }
}

impl From<String> for ItemKey {
    fn from(name: String) -> Self {
        ItemKey::Name(name)
    }
}

impl From<&str> for ItemKey {
    fn from(name: &str) -> Self {
        ItemKey::Name(name.to_owned())
    }
}

/// A forwarded JS error, preserving `message`, `stack`, and whatever extra
/// fields the child attached. Mirrors `original_source/node_edge/exceptions.py::JavaScriptError`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsErrorPayload {
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(default)]
    pub stack: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_message() -> String {
    "unknown error".to_string()
}

impl std::fmt::Display for JsErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:\n{}", self.message, self.stack)
    }
}
