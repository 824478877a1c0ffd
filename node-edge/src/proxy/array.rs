use std::fmt;

use super::ProxyCore;
use crate::error::BridgeError;
use crate::handle::Pointer;
use crate::value::Value;

/// The array proxy flavor, per spec.md §4.6: integer indexing bounds-checked
/// by the child, length, iteration, and append (`Call` on the remote
/// `push`).
#[derive(Clone)]
pub struct ArrayProxy {
    core: ProxyCore,
}

impl ArrayProxy {
    pub(crate) fn new(core: ProxyCore) -> Self {
        ArrayProxy { core }
    }

    pub fn pointer(&self) -> &Pointer {
        self.core.pointer()
    }

    pub async fn get(&self, index: u64) -> Result<Value, BridgeError> {
        self.core.get_item(index.into()).await
    }

    pub async fn set(&self, index: u64, value: Value) -> Result<(), BridgeError> {
        self.core.set_item(index.into(), value).await
    }

    pub async fn delete(&self, index: u64) -> Result<(), BridgeError> {
        self.core.del_item(index.into()).await
    }

    pub async fn len(&self) -> Result<u64, BridgeError> {
        self.core.length().await
    }

    pub async fn is_empty(&self) -> Result<bool, BridgeError> {
        Ok(self.len().await? == 0)
    }

    /// Appends `value` via a `Call` on the remote array's `push`, per
    /// spec.md §4.6. `get_attr("push")` returns a function proxy already
    /// bound to the array as its receiver (the runtime binds every method
    /// it hands out to the object it came from), so calling it standalone
    /// still mutates the right array.
    pub async fn append(&self, value: Value) -> Result<(), BridgeError> {
        match self.core.get_attr("push").await? {
            Value::Object(push) => push.call(vec![value]).await.map(|_| ()),
            _ => Err(BridgeError::Value(
                "remote array's push was not callable".to_string(),
            )),
        }
    }

    /// Materializes every element, snapshotting the length at the start
    /// (spec.md §9's resolved Open Question: "pick snapshot for
    /// determinism" over re-querying length each step).
    pub async fn to_vec(&self) -> Result<Vec<Value>, BridgeError> {
        let len = self.len().await?;
        let mut items = Vec::with_capacity(len as usize);
        for index in 0..len {
            items.push(self.get(index).await?);
        }
        Ok(items)
    }
}

impl fmt::Debug for ArrayProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<JavaScriptArrayProxy {}>", self.core.pointer().repr())
    }
}
