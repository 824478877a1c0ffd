use std::fmt;

use node_edge_protocol::ItemKey;

use super::ProxyCore;
use crate::error::BridgeError;
use crate::handle::Pointer;
use crate::value::Value;

/// The generic object proxy flavor, per spec.md §4.6.
///
/// Forwards attribute and string-keyed item access to the child, and
/// supports calling the underlying remote value as a function regardless of
/// whether the child actually reports it as callable — a non-function call
/// simply surfaces whatever JS error the child raises.
#[derive(Clone)]
pub struct ObjectProxy {
    core: ProxyCore,
}

impl ObjectProxy {
    pub(crate) fn new(core: ProxyCore) -> Self {
        ObjectProxy { core }
    }

    /// The underlying pointer. The reserved `__pointer__` name from
    /// spec.md §4.6 is this method, not an interceptable attribute — Rust
    /// has no metaprotocol to shadow dynamically, so reserving one method
    /// name is the direct analogue.
    pub fn pointer(&self) -> &Pointer {
        self.core.pointer()
    }

    pub async fn get_attr(&self, name: &str) -> Result<Value, BridgeError> {
        self.core.get_attr(name).await
    }

    pub async fn set_attr(&self, name: &str, value: Value) -> Result<(), BridgeError> {
        self.core.set_attr(name, value).await
    }

    pub async fn del_attr(&self, name: &str) -> Result<(), BridgeError> {
        self.core.del_attr(name).await
    }

    pub async fn get_item(&self, key: impl Into<ItemKey>) -> Result<Value, BridgeError> {
        self.core.get_item(key.into()).await
    }

    pub async fn set_item(&self, key: impl Into<ItemKey>, value: Value) -> Result<(), BridgeError> {
        self.core.set_item(key.into(), value).await
    }

    pub async fn del_item(&self, key: impl Into<ItemKey>) -> Result<(), BridgeError> {
        self.core.del_item(key.into()).await
    }

    pub async fn call(&self, args: Vec<Value>) -> Result<Value, BridgeError> {
        self.core.call(args).await
    }

    /// The child's own string form of the remote value (spec.md §4.6:
    /// `Repr(ptr)` via the child's formatter).
    pub async fn repr(&self) -> Result<String, BridgeError> {
        self.core.repr().await
    }
}

impl fmt::Debug for ObjectProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<JavaScriptProxy {}>", self.core.pointer().repr())
    }
}
