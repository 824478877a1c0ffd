//! Host-side bridge to a managed Node.js child interpreter, speaking the
//! newline-delimited JSON protocol defined in `node-edge-protocol` over a
//! loopback TCP socket. See [`Engine`] for the public entry point.

mod dispatcher;
mod env;
mod error;
pub mod engine;
mod handle;
mod manifest;
mod proxy;
mod supervisor;
mod transport;
mod value;

pub use engine::{as_mapping, with_engine, Awaitable, Engine, EngineGuard, EngineOptions, Mappable};
pub use error::{BridgeError, JavaScriptError};
pub use handle::Pointer;
pub use manifest::Manifest;
pub use proxy::{ArrayProxy, MappingProxy, ObjectProxy};
pub use value::Value;
