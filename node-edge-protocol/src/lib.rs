//! Wire types for the node-edge bridge protocol: newline-delimited JSON
//! request/response frames exchanged with a child JS interpreter.
//!
//! This crate has no I/O of its own; it only describes the shapes on the
//! wire, mirroring how `mirrord-protocol` is split out from the crates that
//! actually own the socket.

pub mod envelope;
pub mod error;
pub mod message;

pub use envelope::{ItemKey, JsErrorPayload, ValueEnvelope};
pub use error::WireDecodeError;
pub use message::{
    AttrPayload, AwaitPayload, CallPayload, ClientRequest, EvalPayload, FreePayload, ItemPayload,
    PointerPayload, ResponseFrame, ResponsePayload, SetAttrPayload, SetItemPayload,
};

/// Parses one line of child output into a [`ResponseFrame`].
pub fn decode_line(line: &str) -> Result<ResponseFrame, WireDecodeError> {
    Ok(serde_json::from_str(line)?)
}

/// Serializes a request frame as a single line (without the trailing `\n`,
/// which the transport appends).
pub fn encode_request(request: &ClientRequest) -> Result<String, serde_json::Error> {
    serde_json::to_string(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use message::{EvalPayload, FreePayload};

    #[test]
    fn encodes_eval_request_with_nested_payload() {
        let request = ClientRequest::Eval {
            payload: EvalPayload {
                event_id: "1".to_string(),
                code: "1 + 1".to_string(),
            },
        };
        let encoded = encode_request(&request).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["type"], "eval");
        assert_eq!(value["payload"]["event_id"], "1");
        assert_eq!(value["payload"]["code"], "1 + 1");
    }

    #[test]
    fn encodes_free_request_without_event_id() {
        let request = ClientRequest::Free {
            payload: FreePayload { pointer_id: 7 },
        };
        let encoded = encode_request(&request).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["type"], "free");
        assert_eq!(value["payload"]["pointer_id"], 7);
        assert!(value["payload"].get("event_id").is_none());
    }

    #[test]
    fn decodes_eval_result_with_top_level_event_id() {
        let line = r#"{"type":"eval_result","event_id":"42","payload":{"result":{"type":"naive","data":2}}}"#;
        let frame = decode_line(line).unwrap();
        assert_eq!(frame.event_id, "42");
        assert!(!frame.is_error());
        match frame.payload {
            ResponsePayload::Result { result } => {
                assert_eq!(result, ValueEnvelope::Naive { data: 2.into() });
            }
            _ => panic!("expected a result payload"),
        }
    }

    #[test]
    fn decodes_eval_error_with_extra_fields() {
        let line = r#"{"type":"eval_error","event_id":"42","payload":{"error":{"message":"fail","stack":"Error: fail","code":"E_FAIL"}}}"#;
        let frame = decode_line(line).unwrap();
        assert!(frame.is_error());
        match frame.payload {
            ResponsePayload::Error { error } => {
                assert_eq!(error.message, "fail");
                assert_eq!(error.extra.get("code").unwrap(), "E_FAIL");
            }
            _ => panic!("expected an error payload"),
        }
    }

    #[test]
    fn rejects_malformed_json() {
        let result = decode_line("not json");
        assert!(result.is_err());
    }

    #[test]
    fn item_key_serializes_as_bare_string_or_number() {
        let by_name = ItemKey::from("foo");
        assert_eq!(serde_json::to_value(&by_name).unwrap(), "foo");
        let by_index = ItemKey::from(3u64);
        assert_eq!(serde_json::to_value(&by_index).unwrap(), 3);
    }
}
