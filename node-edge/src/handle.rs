use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use node_edge_protocol::ValueEnvelope;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::dispatcher::{DispatchEvent, Intent, Outcome};
use crate::error::BridgeError;

/// A remote-object handle, per spec.md §3.
///
/// Cheaply cloneable (it's an `Arc` under the hood); the underlying
/// `PointerInner` is only torn down — which enqueues a `free(id)` request —
/// when the last clone is dropped. This is the Rust stand-in for the
/// original's CPython refcounting + GC finalizer
/// (`original_source/tests/test_gc.py`), since Rust has no tracing GC to hook
/// a weakref callback into.
///
/// Also carries the weak back-reference to the engine spec.md §3 calls for,
/// so that free functions like `as_mapping` can rebuild a proxy from a bare
/// pointer without the caller separately threading the engine through.
#[derive(Clone, Debug)]
pub struct Pointer(Arc<PointerInner>);

#[derive(Debug)]
struct PointerInner {
    id: u64,
    awaitable: bool,
    iterable: bool,
    repr: String,
    context: Weak<EngineContext>,
}

impl Pointer {
    /// Constructs a pointer with no back-reference to any engine. Used by
    /// callers (and `test_gc.py`'s Rust analogue) who want to probe an id
    /// directly; operations on it will fail with `EngineClosedError` since
    /// there is nothing to reach.
    pub fn detached(id: u64, awaitable: bool, iterable: bool, repr: impl Into<String>) -> Self {
        Pointer(Arc::new(PointerInner {
            id,
            awaitable,
            iterable,
            repr: repr.into(),
            context: Weak::new(),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn awaitable(&self) -> bool {
        self.0.awaitable
    }

    pub fn iterable(&self) -> bool {
        self.0.iterable
    }

    pub fn repr(&self) -> &str {
        &self.0.repr
    }

    pub(crate) fn context(&self) -> Option<Arc<EngineContext>> {
        self.0.context.upgrade()
    }
}

impl Drop for PointerInner {
    fn drop(&mut self) {
        if let Some(context) = self.context.upgrade() {
            trace!(pointer_id = self.id, "last handle dropped, enqueuing free");
            context.enqueue_free(self.id);
        }
    }
}

/// Everything a live [`Pointer`] or proxy needs to reach back into the
/// engine: the dispatcher's event channel, the GC free-forwarding sink, and
/// the handle table that deduplicates pointer ids. Pointers hold this only
/// weakly, so a pointer outliving its engine is inert rather than keeping
/// the engine's internals alive (spec.md §4.5's `EngineClosedError`
/// invariant).
pub(crate) struct EngineContext {
    events: mpsc::Sender<DispatchEvent>,
    free_tx: mpsc::UnboundedSender<u64>,
    closed: AtomicBool,
    handles: HandleTable,
}

impl EngineContext {
    pub(crate) fn new(
        events: mpsc::Sender<DispatchEvent>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<u64>) {
        let (free_tx, free_rx) = mpsc::unbounded_channel();
        (
            Arc::new(EngineContext {
                events,
                free_tx,
                closed: AtomicBool::new(false),
                handles: HandleTable::default(),
            }),
            free_rx,
        )
    }

    /// Submits an intent to the dispatcher and awaits its resolution. Every
    /// blocking host operation (`eval`, `await_`, attribute/item/call
    /// access) goes through this one path, per spec.md §5's "every public
    /// operation submits a request and blocks the caller on a one-shot
    /// notification".
    pub(crate) async fn submit(&self, intent: Intent) -> Result<Outcome, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(DispatchEvent::Submit(intent, tx))
            .await
            .map_err(|_| BridgeError::EngineClosed)?;
        rx.await.map_err(|_| BridgeError::EngineClosed)
    }

    pub(crate) fn materialize_pointer(&self, self_arc: &Arc<EngineContext>, meta: PointerMeta) -> Pointer {
        self.handles.materialize(meta, self_arc)
    }

    fn enqueue_free(&self, id: u64) {
        if !self.closed.load(Ordering::Relaxed) {
            let _ = self.free_tx.send(id);
        }
    }

    /// Stops forwarding further frees once the engine has shut down — a
    /// pointer dropped after `stop()` has nothing left to talk to.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

/// Maps pointer ids to live handles so that two envelopes naming the same id
/// materialize into the *same* handle (spec.md §3: "two proxies constructed
/// from the same pointer id are interchangeable"), not two independently
/// lifetimed ones that could free the remote object out from under each
/// other.
#[derive(Debug, Default)]
pub(crate) struct HandleTable {
    entries: Mutex<HashMap<u64, Weak<PointerInner>>>,
}

impl HandleTable {
    fn materialize(&self, meta: PointerMeta, context: &Arc<EngineContext>) -> Pointer {
        let mut entries = self.entries.lock().expect("handle table lock poisoned");

        if let Some(existing) = entries.get(&meta.id).and_then(Weak::upgrade) {
            return Pointer(existing);
        }

        // The entry we just failed to upgrade (if any) is dead; sweep every
        // dead entry now rather than letting the map grow by one stale slot
        // per freed pointer for the life of the engine.
        entries.retain(|_, weak| weak.strong_count() > 0);

        let inner = Arc::new(PointerInner {
            id: meta.id,
            awaitable: meta.awaitable,
            iterable: meta.iterable,
            repr: meta.repr,
            context: Arc::downgrade(context),
        });
        entries.insert(meta.id, Arc::downgrade(&inner));
        Pointer(inner)
    }
}

/// The fields of a `{"type": "pointer", ...}` envelope, extracted for
/// `HandleTable::materialize`.
#[derive(Debug, Clone)]
pub(crate) struct PointerMeta {
    pub id: u64,
    pub awaitable: bool,
    pub iterable: bool,
    pub repr: String,
}

pub(crate) fn pointer_meta(envelope: &ValueEnvelope) -> Option<PointerMeta> {
    match envelope {
        ValueEnvelope::Pointer {
            id,
            awaitable,
            iterable,
            repr,
        } => Some(PointerMeta {
            id: *id,
            awaitable: *awaitable,
            iterable: *iterable,
            repr: repr.clone(),
        }),
        ValueEnvelope::Naive { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> (Arc<EngineContext>, mpsc::UnboundedReceiver<u64>) {
        let (events_tx, _events_rx) = mpsc::channel(16);
        EngineContext::new(events_tx)
    }

    #[test]
    fn materializing_the_same_id_twice_reuses_the_handle() {
        let (context, _free_rx) = context();

        let meta = PointerMeta {
            id: 7,
            awaitable: false,
            iterable: false,
            repr: "repr".to_string(),
        };

        let first = context.materialize_pointer(&context, meta.clone());
        let second = context.materialize_pointer(&context, meta);

        assert_eq!(first.id(), second.id());
    }

    #[test]
    fn dropping_the_last_handle_enqueues_a_free() {
        let (context, mut free_rx) = context();

        let meta = PointerMeta {
            id: 42,
            awaitable: false,
            iterable: false,
            repr: "repr".to_string(),
        };
        let pointer = context.materialize_pointer(&context, meta);
        drop(pointer);

        assert_eq!(free_rx.try_recv().unwrap(), 42);
    }

    #[test]
    fn closed_context_does_not_enqueue_frees() {
        let (context, mut free_rx) = context();
        context.close();

        let meta = PointerMeta {
            id: 1,
            awaitable: false,
            iterable: false,
            repr: "repr".to_string(),
        };
        drop(context.materialize_pointer(&context, meta));

        assert!(free_rx.try_recv().is_err());
    }

    #[test]
    fn materializing_a_fresh_id_sweeps_dead_entries() {
        let (context, _free_rx) = context();

        let first = PointerMeta {
            id: 1,
            awaitable: false,
            iterable: false,
            repr: "repr".to_string(),
        };
        drop(context.materialize_pointer(&context, first));
        assert_eq!(context.handles.entries.lock().unwrap().len(), 1);

        let second = PointerMeta {
            id: 2,
            awaitable: false,
            iterable: false,
            repr: "repr".to_string(),
        };
        let _kept = context.materialize_pointer(&context, second);

        // id 1's entry was dead (its pointer was dropped above); materializing
        // id 2 should have swept it rather than leaving it to accumulate.
        assert_eq!(context.handles.entries.lock().unwrap().len(), 1);
    }

    #[test]
    fn detached_pointer_has_no_engine_back_reference() {
        let pointer = Pointer::detached(9, true, false, "fake");
        assert_eq!(pointer.id(), 9);
        assert!(pointer.awaitable());
        assert!(pointer.context().is_none());
        drop(pointer); // must not panic even with no engine attached
    }
}
