//! Host-side object wrappers around a [`Pointer`](crate::handle::Pointer),
//! per spec.md §4.6. The flavor (generic, array, mapping) is chosen by the
//! engine at materialization time from the pointer's metadata; each flavor
//! is a thin newtype over the same underlying request-submission path.

mod array;
mod mapping;
mod object;

pub use array::ArrayProxy;
pub use mapping::MappingProxy;
pub use object::ObjectProxy;

use std::sync::Arc;

use node_edge_protocol::ItemKey;

use crate::dispatcher::{Intent, Outcome};
use crate::error::{BridgeError, JavaScriptError};
use crate::handle::{EngineContext, Pointer};
use crate::value::{self, Value};

/// The operations every proxy flavor forwards to the child, shared by
/// [`ObjectProxy`], [`ArrayProxy`], and [`MappingProxy`].
///
/// Kept crate-private: callers interact through the flavor-specific structs,
/// which is also where flavor-specific `Debug`/`Display` reprs live (spec.md
/// §4.6's `<JavaScriptProxy ...>` / `<JavaScriptArrayProxy ...>` /
/// `<JavaScriptMappingProxy ...>` wrappers, per
/// `original_source/tests/test_proxy.py`).
#[derive(Clone)]
pub(crate) struct ProxyCore {
    pointer: Pointer,
    context: Arc<EngineContext>,
}

impl ProxyCore {
    pub(crate) fn new(pointer: Pointer, context: Arc<EngineContext>) -> Self {
        ProxyCore { pointer, context }
    }

    pub(crate) fn pointer(&self) -> &Pointer {
        &self.pointer
    }

    /// Submits an intent and materializes the result into a host [`Value`],
    /// per spec.md §4.4's `final_value`.
    async fn call_and_materialize(&self, intent: Intent) -> Result<Value, BridgeError> {
        match self.context.submit(intent).await? {
            Outcome::Success(envelope) => Ok(value::materialize(envelope, &self.context)),
            Outcome::JsError(error) => Err(BridgeError::from(error)),
            Outcome::Closed => Err(BridgeError::EngineClosed),
        }
    }

    pub(crate) async fn get_attr(&self, name: &str) -> Result<Value, BridgeError> {
        match self
            .call_and_materialize(Intent::GetAttr {
                pointer_id: self.pointer.id(),
                name: name.to_string(),
            })
            .await
        {
            Err(BridgeError::JavaScript(_)) => {
                Err(BridgeError::AttributeNotFound(name.to_string()))
            }
            other => other,
        }
    }

    pub(crate) async fn set_attr(&self, name: &str, value: Value) -> Result<(), BridgeError> {
        self.call_and_materialize(Intent::SetAttr {
            pointer_id: self.pointer.id(),
            name: name.to_string(),
            value: value.into_json()?,
        })
        .await
        .map(|_| ())
    }

    pub(crate) async fn del_attr(&self, name: &str) -> Result<(), BridgeError> {
        self.call_and_materialize(Intent::DelAttr {
            pointer_id: self.pointer.id(),
            name: name.to_string(),
        })
        .await
        .map(|_| ())
    }

    pub(crate) async fn get_item(&self, key: ItemKey) -> Result<Value, BridgeError> {
        match self
            .call_and_materialize(Intent::GetItem {
                pointer_id: self.pointer.id(),
                key: key.clone(),
            })
            .await
        {
            Err(BridgeError::JavaScript(js)) => Err(key_error(key, js)),
            other => other,
        }
    }

    pub(crate) async fn set_item(&self, key: ItemKey, value: Value) -> Result<(), BridgeError> {
        self.call_and_materialize(Intent::SetItem {
            pointer_id: self.pointer.id(),
            key,
            value: value.into_json()?,
        })
        .await
        .map(|_| ())
    }

    pub(crate) async fn del_item(&self, key: ItemKey) -> Result<(), BridgeError> {
        match self
            .call_and_materialize(Intent::DelItem {
                pointer_id: self.pointer.id(),
                key: key.clone(),
            })
            .await
        {
            Err(BridgeError::JavaScript(js)) => Err(key_error(key, js)),
            other => other.map(|_| ()),
        }
    }

    pub(crate) async fn call(&self, args: Vec<Value>) -> Result<Value, BridgeError> {
        let marshaled = args
            .into_iter()
            .map(Value::into_json)
            .collect::<Result<Vec<_>, _>>()?;
        self.call_and_materialize(Intent::Call {
            pointer_id: self.pointer.id(),
            args: marshaled,
        })
        .await
    }

    pub(crate) async fn length(&self) -> Result<u64, BridgeError> {
        let value = self
            .call_and_materialize(Intent::Length {
                pointer_id: self.pointer.id(),
            })
            .await?;
        as_u64(value)
    }

    pub(crate) async fn keys(&self) -> Result<Vec<String>, BridgeError> {
        let value = self
            .call_and_materialize(Intent::Keys {
                pointer_id: self.pointer.id(),
            })
            .await?;
        match value {
            Value::Naive(serde_json::Value::Array(items)) => items
                .into_iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        BridgeError::Protocol("keys response contained a non-string".to_string())
                    })
                })
                .collect(),
            _ => Err(BridgeError::Protocol(
                "keys response was not an array".to_string(),
            )),
        }
    }

    pub(crate) async fn repr(&self) -> Result<String, BridgeError> {
        let value = self
            .call_and_materialize(Intent::Repr {
                pointer_id: self.pointer.id(),
            })
            .await?;
        match value {
            Value::Naive(serde_json::Value::String(s)) => Ok(s),
            _ => Err(BridgeError::Protocol(
                "repr response was not a string".to_string(),
            )),
        }
    }
}

fn as_u64(value: Value) -> Result<u64, BridgeError> {
    match value {
        Value::Naive(serde_json::Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| BridgeError::Protocol("length response was not a u64".to_string())),
        _ => Err(BridgeError::Protocol(
            "length response was not a number".to_string(),
        )),
    }
}

fn key_error(key: ItemKey, _js: JavaScriptError) -> BridgeError {
    match key {
        ItemKey::Index(index) => BridgeError::IndexOutOfRange(index),
        ItemKey::Name(name) => BridgeError::KeyNotFound(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn fake_js_error() -> JavaScriptError {
        JavaScriptError {
            message: "fail".to_string(),
            stack: String::new(),
            extra: serde_json::Map::new(),
        }
    }

    #[rstest]
    #[case(ItemKey::from(3u64))]
    #[case(ItemKey::from("missing"))]
    fn key_error_picks_the_variant_matching_the_key_shape(#[case] key: ItemKey) {
        let is_index = matches!(key, ItemKey::Index(_));
        match key_error(key, fake_js_error()) {
            BridgeError::IndexOutOfRange(_) => assert!(is_index),
            BridgeError::KeyNotFound(_) => assert!(!is_index),
            other => panic!("unexpected error variant: {other:?}"),
        }
    }
}
