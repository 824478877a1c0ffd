use std::sync::Arc;

use node_edge_protocol::ValueEnvelope;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::BridgeError;
use crate::handle::{pointer_meta, EngineContext, Pointer};
use crate::proxy::{ArrayProxy, MappingProxy, ObjectProxy, ProxyCore};

/// A value crossing the host/child boundary in either direction, per
/// spec.md §3's "Value envelope" as seen from the host side.
///
/// `Naive`/`List`/`Map` hold only JSON-representable content; `Object`,
/// `Array`, and `Mapping` hold a live reference to a remote object. The
/// `List`/`Map` variants exist (distinct from `Naive`'s own nested JSON
/// arrays/objects) because a single JS array or object literal can mix
/// plain data with object references in the same container —
/// `do_something([1, 2, 3, 4, return42])` in
/// `original_source/tests/test_call.py` passes a list containing both
/// integers and a function proxy as one argument. `Pointer` lets a bare
/// handle (not wrapped in any particular proxy flavor) be passed back as an
/// argument the same way, matching that same test's
/// `"qux": return42.__dict__["__pointer__"]`.
#[derive(Debug, Clone)]
pub enum Value {
    Naive(JsonValue),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
    Object(ObjectProxy),
    Array(ArrayProxy),
    Mapping(MappingProxy),
    Pointer(Pointer),
}

impl Value {
    /// Converts an arbitrary serializable Rust value into a naive `Value`.
    ///
    /// This is the Rust analogue of the original's "anything JSON-safe
    /// passes through" rule, and also the one place marshaling can fail
    /// synchronously before any wire traffic (spec.md §4.4: "non-representable
    /// inputs raise `BridgeTypeError`") — Rust's static typing already rules
    /// out passing something like a bare socket or object() the way
    /// `test_call.py::test_call`'s `do_something(object())` does, so the
    /// failure mode here is a `Serialize` impl that rejects its own content
    /// (a `NaN`/infinite float, a map with a non-string key).
    pub fn try_from_serializable<T: Serialize>(value: &T) -> Result<Value, BridgeError> {
        serde_json::to_value(value)
            .map(Value::Naive)
            .map_err(|err| BridgeError::Type(err.to_string()))
    }

    pub(crate) fn into_json(self) -> Result<JsonValue, BridgeError> {
        match self {
            Value::Naive(v) => Ok(v),
            Value::List(items) => Ok(JsonValue::Array(
                items
                    .into_iter()
                    .map(Value::into_json)
                    .collect::<Result<_, _>>()?,
            )),
            Value::Map(entries) => {
                let mut map = serde_json::Map::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key, value.into_json()?);
                }
                Ok(JsonValue::Object(map))
            }
            Value::Object(proxy) => Ok(pointer_reference(proxy.pointer().id())),
            Value::Array(proxy) => Ok(pointer_reference(proxy.pointer().id())),
            Value::Mapping(proxy) => Ok(pointer_reference(proxy.pointer().id())),
            Value::Pointer(pointer) => Ok(pointer_reference(pointer.id())),
        }
    }
}

fn pointer_reference(id: u64) -> JsonValue {
    serde_json::json!({ "__pointer__": id })
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        Value::Naive(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Naive(JsonValue::Bool(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Naive(JsonValue::Number(value.into()))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value).map_or(Value::Naive(JsonValue::Null), |n| {
            Value::Naive(JsonValue::Number(n))
        })
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Naive(JsonValue::String(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Naive(JsonValue::String(value.to_string()))
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::List(values)
    }
}

impl From<Pointer> for Value {
    fn from(pointer: Pointer) -> Self {
        Value::Pointer(pointer)
    }
}

impl From<ObjectProxy> for Value {
    fn from(proxy: ObjectProxy) -> Self {
        Value::Object(proxy)
    }
}

impl From<ArrayProxy> for Value {
    fn from(proxy: ArrayProxy) -> Self {
        Value::Array(proxy)
    }
}

impl From<MappingProxy> for Value {
    fn from(proxy: MappingProxy) -> Self {
        Value::Mapping(proxy)
    }
}

/// Builds the host [`Value`] for a response envelope, materializing pointer
/// envelopes into a live handle and choosing the array-vs-generic-object
/// proxy flavor by pointer metadata, per spec.md §4.4's `final_value`.
pub(crate) fn materialize(envelope: ValueEnvelope, context: &Arc<EngineContext>) -> Value {
    match pointer_meta(&envelope) {
        Some(meta) => {
            let iterable = meta.iterable;
            let pointer = context.materialize_pointer(context, meta);
            let core = ProxyCore::new(pointer, context.clone());
            if iterable {
                Value::Array(ArrayProxy::new(core))
            } else {
                Value::Object(ObjectProxy::new(core))
            }
        }
        None => match envelope {
            ValueEnvelope::Naive { data } => Value::Naive(data),
            ValueEnvelope::Pointer { .. } => unreachable!("pointer_meta handles Pointer variants"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naive_round_trips_through_json() {
        let value = Value::from(JsonValue::from(2));
        assert_eq!(value.into_json().unwrap(), JsonValue::from(2));
    }

    #[test]
    fn list_with_mixed_content_marshals_each_element() {
        let value = Value::List(vec![Value::from(1i64), Value::from("two")]);
        let json = value.into_json().unwrap();
        assert_eq!(json, serde_json::json!([1, "two"]));
    }

    #[test]
    fn try_from_serializable_rejects_nan() {
        let result = Value::try_from_serializable(&f64::NAN);
        assert!(result.is_err());
    }

    #[test]
    fn bare_pointer_marshals_to_a_pointer_reference() {
        let pointer = Pointer::detached(7, false, false, "fake");
        let value = Value::from(pointer);
        assert_eq!(value.into_json().unwrap(), serde_json::json!({"__pointer__": 7}));
    }

    #[test]
    fn map_entry_mixing_naive_and_pointer_marshals_both() {
        let pointer = Pointer::detached(9, false, false, "fake");
        let value = Value::Map(vec![
            ("foo".to_string(), Value::from(1i64)),
            ("qux".to_string(), Value::from(pointer)),
        ]);
        let json = value.into_json().unwrap();
        assert_eq!(json["foo"], 1);
        assert_eq!(json["qux"]["__pointer__"], 9);
    }
}
