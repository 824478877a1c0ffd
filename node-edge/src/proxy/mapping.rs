use std::fmt;

use super::ProxyCore;
use crate::error::BridgeError;
use crate::handle::Pointer;
use crate::value::Value;

/// The mapping proxy flavor, produced only by
/// [`as_mapping`](crate::engine::as_mapping) (spec.md §4.6: "produced by
/// `as_mapping(x)`", never automatically from `eval`/`call` results).
#[derive(Clone)]
pub struct MappingProxy {
    core: ProxyCore,
}

impl MappingProxy {
    pub(crate) fn new(core: ProxyCore) -> Self {
        MappingProxy { core }
    }

    pub fn pointer(&self) -> &Pointer {
        self.core.pointer()
    }

    pub async fn get(&self, key: &str) -> Result<Value, BridgeError> {
        self.core.get_item(key.into()).await
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<(), BridgeError> {
        self.core.set_item(key.into(), value).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), BridgeError> {
        self.core.del_item(key.into()).await
    }

    /// The child's own enumerable keys, in insertion order
    /// (`original_source/tests/test_proxy.py::test_mapping_proxy`).
    pub async fn keys(&self) -> Result<Vec<String>, BridgeError> {
        self.core.keys().await
    }

    pub async fn len(&self) -> Result<u64, BridgeError> {
        self.core.length().await
    }

    pub async fn is_empty(&self) -> Result<bool, BridgeError> {
        Ok(self.len().await? == 0)
    }
}

impl fmt::Debug for MappingProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<JavaScriptMappingProxy {}>", self.core.pointer().repr())
    }
}
