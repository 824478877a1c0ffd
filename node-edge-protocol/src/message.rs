use serde::{Deserialize, Serialize};

use crate::envelope::{ItemKey, JsErrorPayload, ValueEnvelope};

/// A request frame sent to the child over the wire, per spec.md §6.
///
/// Every request is `{"type": "...", "payload": {...}}`; `free` is the only
/// variant whose payload carries no `event_id` (it is fire-and-forget and
/// never gets a response).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    Eval { payload: EvalPayload },
    Await { payload: AwaitPayload },
    Call { payload: CallPayload },
    GetAttr { payload: AttrPayload },
    SetAttr { payload: SetAttrPayload },
    DelAttr { payload: AttrPayload },
    GetItem { payload: ItemPayload },
    SetItem { payload: SetItemPayload },
    DelItem { payload: ItemPayload },
    Length { payload: PointerPayload },
    Keys { payload: PointerPayload },
    Repr { payload: PointerPayload },
    Free { payload: FreePayload },
}

impl ClientRequest {
    /// The `event_id` this request expects a response on, if any.
    pub fn event_id(&self) -> Option<&str> {
        match self {
            ClientRequest::Eval { payload } => Some(&payload.event_id),
            ClientRequest::Await { payload } => Some(&payload.event_id),
            ClientRequest::Call { payload } => Some(&payload.event_id),
            ClientRequest::GetAttr { payload } => Some(&payload.event_id),
            ClientRequest::SetAttr { payload } => Some(&payload.event_id),
            ClientRequest::DelAttr { payload } => Some(&payload.event_id),
            ClientRequest::GetItem { payload } => Some(&payload.event_id),
            ClientRequest::SetItem { payload } => Some(&payload.event_id),
            ClientRequest::DelItem { payload } => Some(&payload.event_id),
            ClientRequest::Length { payload } => Some(&payload.event_id),
            ClientRequest::Keys { payload } => Some(&payload.event_id),
            ClientRequest::Repr { payload } => Some(&payload.event_id),
            ClientRequest::Free { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalPayload {
    pub event_id: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AwaitPayload {
    pub event_id: String,
    pub pointer_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallPayload {
    pub event_id: String,
    pub pointer_id: u64,
    pub args: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttrPayload {
    pub event_id: String,
    pub pointer_id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetAttrPayload {
    pub event_id: String,
    pub pointer_id: u64,
    pub name: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemPayload {
    pub event_id: String,
    pub pointer_id: u64,
    pub key: ItemKey,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetItemPayload {
    pub event_id: String,
    pub pointer_id: u64,
    pub key: ItemKey,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointerPayload {
    pub event_id: String,
    pub pointer_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FreePayload {
    pub pointer_id: u64,
}

/// A response (or out-of-band error) frame received from the child.
///
/// Unlike requests, the `event_id` lives at the top level alongside `type`,
/// per spec.md §6: `{"type": "<op>_result", "event_id": ..., "payload": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub event_id: String,
    pub payload: ResponsePayload,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Result { result: ValueEnvelope },
    Error { error: JsErrorPayload },
}

impl ResponseFrame {
    /// True when `type` ends in `_error` (the counterpart field shape already
    /// disambiguates this, but operations sometimes want the string too for
    /// logging).
    pub fn is_error(&self) -> bool {
        matches!(self.payload, ResponsePayload::Error { .. })
    }
}
