use std::collections::HashMap;

use node_edge_protocol::{
    AttrPayload, AwaitPayload, CallPayload, ClientRequest, EvalPayload, FreePayload, ItemKey,
    ItemPayload, JsErrorPayload, PointerPayload, ResponseFrame, ResponsePayload, SetAttrPayload,
    SetItemPayload, ValueEnvelope,
};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// What a public operation (`eval`, `await_`, attribute/item/call access)
/// wants done, before the dispatcher assigns it a correlation id.
///
/// Kept separate from [`ClientRequest`] because `event_id` assignment is the
/// dispatcher's job (spec.md §4.4: "assign `cid = fresh_id()`"), not the
/// caller's.
#[derive(Debug)]
pub(crate) enum Intent {
    Eval {
        code: String,
    },
    Await {
        pointer_id: u64,
    },
    Call {
        pointer_id: u64,
        args: Vec<serde_json::Value>,
    },
    GetAttr {
        pointer_id: u64,
        name: String,
    },
    SetAttr {
        pointer_id: u64,
        name: String,
        value: serde_json::Value,
    },
    DelAttr {
        pointer_id: u64,
        name: String,
    },
    GetItem {
        pointer_id: u64,
        key: ItemKey,
    },
    SetItem {
        pointer_id: u64,
        key: ItemKey,
        value: serde_json::Value,
    },
    DelItem {
        pointer_id: u64,
        key: ItemKey,
    },
    Length {
        pointer_id: u64,
    },
    Keys {
        pointer_id: u64,
    },
    Repr {
        pointer_id: u64,
    },
}

impl Intent {
    fn into_request(self, event_id: String) -> ClientRequest {
        match self {
            Intent::Eval { code } => ClientRequest::Eval {
                payload: EvalPayload { event_id, code },
            },
            Intent::Await { pointer_id } => ClientRequest::Await {
                payload: AwaitPayload {
                    event_id,
                    pointer_id,
                },
            },
            Intent::Call { pointer_id, args } => ClientRequest::Call {
                payload: CallPayload {
                    event_id,
                    pointer_id,
                    args,
                },
            },
            Intent::GetAttr { pointer_id, name } => ClientRequest::GetAttr {
                payload: AttrPayload {
                    event_id,
                    pointer_id,
                    name,
                },
            },
            Intent::SetAttr {
                pointer_id,
                name,
                value,
            } => ClientRequest::SetAttr {
                payload: SetAttrPayload {
                    event_id,
                    pointer_id,
                    name,
                    value,
                },
            },
            Intent::DelAttr { pointer_id, name } => ClientRequest::DelAttr {
                payload: AttrPayload {
                    event_id,
                    pointer_id,
                    name,
                },
            },
            Intent::GetItem { pointer_id, key } => ClientRequest::GetItem {
                payload: ItemPayload {
                    event_id,
                    pointer_id,
                    key,
                },
            },
            Intent::SetItem {
                pointer_id,
                key,
                value,
            } => ClientRequest::SetItem {
                payload: SetItemPayload {
                    event_id,
                    pointer_id,
                    key,
                    value,
                },
            },
            Intent::DelItem { pointer_id, key } => ClientRequest::DelItem {
                payload: ItemPayload {
                    event_id,
                    pointer_id,
                    key,
                },
            },
            Intent::Length { pointer_id } => ClientRequest::Length {
                payload: PointerPayload {
                    event_id,
                    pointer_id,
                },
            },
            Intent::Keys { pointer_id } => ClientRequest::Keys {
                payload: PointerPayload {
                    event_id,
                    pointer_id,
                },
            },
            Intent::Repr { pointer_id } => ClientRequest::Repr {
                payload: PointerPayload {
                    event_id,
                    pointer_id,
                },
            },
        }
    }
}

/// What a waiter is eventually resolved with.
#[derive(Debug)]
pub(crate) enum Outcome {
    Success(ValueEnvelope),
    JsError(JsErrorPayload),
    /// The engine shut down (or the child disappeared) before a response
    /// arrived.
    Closed,
}

type Waiter = oneshot::Sender<Outcome>;

/// Events the dispatcher's single task consumes, per spec.md §4.4's table.
#[derive(Debug)]
pub(crate) enum DispatchEvent {
    Finish,
    Submit(Intent, Waiter),
    Free(u64),
    Remote(ResponseFrame),
    ProtocolError(String),
    /// The reader observed the child disconnect (cleanly or not).
    PeerClosed,
}

/// The dispatcher: the single task that owns the outbound socket half and
/// the pending-waiter table, per spec.md §4.4 and §5.
pub(crate) async fn run(
    mut write_half: OwnedWriteHalf,
    mut events: mpsc::Receiver<DispatchEvent>,
) {
    let mut pending: HashMap<String, Waiter> = HashMap::new();
    let mut next_id: u64 = 0;

    while let Some(event) = events.recv().await {
        match event {
            DispatchEvent::Finish => break,
            DispatchEvent::PeerClosed => break,
            DispatchEvent::Submit(intent, waiter) => {
                next_id += 1;
                let event_id = next_id.to_string();
                let request = intent.into_request(event_id.clone());

                if write_request(&mut write_half, &request).await.is_err() {
                    let _ = waiter.send(Outcome::Closed);
                    break;
                }
                pending.insert(event_id, waiter);
            }
            DispatchEvent::Free(pointer_id) => {
                let request = ClientRequest::Free {
                    payload: FreePayload { pointer_id },
                };
                // Fire-and-forget: a write failure here just means the
                // engine is already going down.
                let _ = write_request(&mut write_half, &request).await;
            }
            DispatchEvent::Remote(frame) => {
                let Some(waiter) = pending.remove(&frame.event_id) else {
                    debug!(event_id = %frame.event_id, "response for unknown/already-resolved correlation id, dropped");
                    continue;
                };
                let outcome = match frame.payload {
                    ResponsePayload::Result { result } => Outcome::Success(result),
                    ResponsePayload::Error { error } => Outcome::JsError(error),
                };
                let _ = waiter.send(outcome);
            }
            DispatchEvent::ProtocolError(message) => {
                warn!(%message, "malformed message from child");
            }
        }
    }

    for (_, waiter) in pending.drain() {
        let _ = waiter.send(Outcome::Closed);
    }
}

async fn write_request(
    write_half: &mut OwnedWriteHalf,
    request: &ClientRequest,
) -> std::io::Result<()> {
    let mut line = node_edge_protocol::encode_request(request)
        .expect("ClientRequest serialization cannot fail");
    line.push('\n');
    write_half.write_all(line.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let (accepted, connected) = tokio::join!(listener.accept(), connect);
        (accepted.unwrap().0, connected.unwrap())
    }

    #[tokio::test]
    async fn resolves_one_waiter_per_correlation_id() {
        let (server, mut client) = loopback_pair().await;
        let (_read, write) = server.into_split();
        let (tx, rx) = mpsc::channel(16);

        let dispatcher = tokio::spawn(run(write, rx));

        let (waiter_tx, waiter_rx) = oneshot::channel();
        tx.send(DispatchEvent::Submit(
            Intent::Eval {
                code: "1+1".to_string(),
            },
            waiter_tx,
        ))
        .await
        .unwrap();

        use tokio::io::{AsyncBufReadExt, BufReader};
        let mut reader = BufReader::new(&mut client);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let sent: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(sent["type"], "eval");
        let event_id = sent["payload"]["event_id"].as_str().unwrap().to_string();

        let response = format!(
            "{{\"type\":\"eval_result\",\"event_id\":\"{event_id}\",\"payload\":{{\"result\":{{\"type\":\"naive\",\"data\":2}}}}}}\n"
        );
        use tokio::io::AsyncWriteExt as _;
        client.write_all(response.as_bytes()).await.unwrap();

        let decoded = node_edge_protocol::decode_line(response.trim()).unwrap();
        tx.send(DispatchEvent::Remote(decoded)).await.unwrap();

        let outcome = waiter_rx.await.unwrap();
        match outcome {
            Outcome::Success(ValueEnvelope::Naive { data }) => assert_eq!(data, 2),
            other => panic!("unexpected outcome: {other:?}"),
        }

        tx.send(DispatchEvent::Finish).await.unwrap();
        dispatcher.await.unwrap();
    }

    #[tokio::test]
    async fn peer_closed_releases_outstanding_waiters() {
        let (server, client) = loopback_pair().await;
        let (_read, write) = server.into_split();
        let (tx, rx) = mpsc::channel(16);
        let dispatcher = tokio::spawn(run(write, rx));

        let (waiter_tx, waiter_rx) = oneshot::channel();
        tx.send(DispatchEvent::Submit(
            Intent::Eval {
                code: "1+1".to_string(),
            },
            waiter_tx,
        ))
        .await
        .unwrap();

        drop(client);
        tx.send(DispatchEvent::PeerClosed).await.unwrap();

        let outcome = waiter_rx.await.unwrap();
        assert!(matches!(outcome, Outcome::Closed));
        dispatcher.await.unwrap();
    }

    #[tokio::test]
    async fn unmatched_event_id_is_dropped_without_panicking() {
        let (server, _client) = loopback_pair().await;
        let (_read, write) = server.into_split();
        let (tx, rx) = mpsc::channel(16);
        let dispatcher = tokio::spawn(run(write, rx));

        let frame = node_edge_protocol::decode_line(
            r#"{"type":"eval_result","event_id":"999","payload":{"result":{"type":"naive","data":null}}}"#,
        )
        .unwrap();
        tx.send(DispatchEvent::Remote(frame)).await.unwrap();
        tx.send(DispatchEvent::Finish).await.unwrap();
        dispatcher.await.unwrap();
    }
}
