//! Wire codec: one JSON-RPC message per frame.
//!
//! `decode` validates structure before anything reaches the dispatcher. When a
//! frame is rejected, the error keeps whatever correlation id could be recovered
//! so the caller can still answer it.

use crate::error::ProtocolError;
use crate::protocol::types::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcErrorResponse, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, Message, RequestId,
};
use serde_json::{Map, Value};
use std::borrow::Cow;
use thiserror::Error;
use tracing::error;

/// A frame that could not be turned into a [`Message`].
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct DecodeError {
    /// Correlation id recovered from the frame, if any.
    pub id: Option<RequestId>,
    pub error: ProtocolError,
}

impl DecodeError {
    fn new(id: Option<RequestId>, error: ProtocolError) -> Self {
        Self { id, error }
    }

    fn invalid(id: Option<RequestId>, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::new(id, ProtocolError::InvalidRequest(reason.into()))
    }

    /// The error message to send back, when the id is recoverable.
    pub fn to_reply(&self) -> Option<JsonRpcErrorResponse> {
        self.id
            .clone()
            .map(|id| JsonRpcErrorResponse::new(Some(id), self.error.to_jsonrpc()))
    }
}

/// Decode one frame.
pub fn decode(frame: &str) -> Result<Message, DecodeError> {
    let value: Value = serde_json::from_str(frame)
        .map_err(|_| DecodeError::new(None, ProtocolError::ParseError))?;

    let Value::Object(object) = value else {
        return Err(DecodeError::invalid(None, "message must be a JSON object"));
    };

    let id = recover_id(&object)?;

    match object.get("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => {}
        _ => return Err(DecodeError::invalid(id, "jsonrpc must be \"2.0\"")),
    }

    if object.contains_key("method") {
        return decode_call(object, id);
    }

    match (object.get("result"), object.get("error")) {
        (Some(_), Some(_)) => Err(DecodeError::invalid(
            id,
            "response carries both result and error",
        )),
        (Some(_), None) => {
            let id = id.ok_or_else(|| DecodeError::invalid(None, "response without id"))?;
            let result = object.get("result").cloned().unwrap_or(Value::Null);
            Ok(Message::Response(JsonRpcResponse::success(id, result)))
        }
        (None, Some(error)) => {
            if !object.contains_key("id") {
                return Err(DecodeError::invalid(None, "error response without id"));
            }
            let error: JsonRpcError = serde_json::from_value(error.clone())
                .map_err(|e| DecodeError::invalid(id.clone(), format!("malformed error: {}", e)))?;
            Ok(Message::Error(JsonRpcErrorResponse::new(id, error)))
        }
        (None, None) => Err(DecodeError::invalid(
            id,
            "message is neither request, notification nor response",
        )),
    }
}

fn recover_id(object: &Map<String, Value>) -> Result<Option<RequestId>, DecodeError> {
    match object.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(RequestId::String(s.clone()))),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(|n| Some(RequestId::Number(n)))
            .ok_or_else(|| DecodeError::invalid(None, "id must be an integer or string")),
        Some(_) => Err(DecodeError::invalid(None, "id must be an integer or string")),
    }
}

fn decode_call(object: Map<String, Value>, id: Option<RequestId>) -> Result<Message, DecodeError> {
    let method = match object.get("method") {
        Some(Value::String(method)) if !method.is_empty() => method.clone(),
        _ => return Err(DecodeError::invalid(id, "method must be a non-empty string")),
    };

    let params = match object.get("params") {
        None => None,
        Some(params @ (Value::Object(_) | Value::Array(_))) => Some(params.clone()),
        Some(_) => {
            return Err(DecodeError::invalid(id, "params must be an object or array"));
        }
    };

    if object.contains_key("result") || object.contains_key("error") {
        return Err(DecodeError::invalid(id, "request carries result or error"));
    }

    match id {
        Some(id) => {
            let request = JsonRpcRequest::new(id, method);
            Ok(Message::Request(match params {
                Some(params) => request.with_params(params),
                None => request,
            }))
        }
        None if object.get("id").is_some() => {
            Err(DecodeError::invalid(None, "request id must not be null"))
        }
        None => {
            let notification = JsonRpcNotification::new(method);
            Ok(Message::Notification(match params {
                Some(params) => notification.with_params(params),
                None => notification,
            }))
        }
    }
}

/// Encode one message into a frame (without the trailing newline).
///
/// Internally built messages always serialize; a failure here is a bug, so it is
/// logged and replaced by a generic internal error carrying the same id.
pub fn encode(message: &Message) -> String {
    match serde_json::to_string(message) {
        Ok(frame) => frame,
        Err(e) => {
            error!("Failed to encode message {:?}: {}", message.id(), e);
            let fallback = JsonRpcErrorResponse::new(
                message.id().cloned(),
                ProtocolError::InternalError("response could not be encoded".into()).to_jsonrpc(),
            );
            serde_json::to_string(&fallback).unwrap_or_else(|_| {
                r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#
                    .to_string()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_request() {
        let message = decode(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .unwrap();
        let Message::Request(request) = message else {
            panic!("expected request");
        };
        assert_eq!(request.method, "initialize");
        assert_eq!(request.id, RequestId::Number(1));
    }

    #[test]
    fn test_decode_notification() {
        let message = decode(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(matches!(message, Message::Notification(_)));
        assert!(message.id().is_none());
    }

    #[test]
    fn test_decode_response_and_error() {
        let message = decode(r#"{"jsonrpc":"2.0","id":"a","result":{"ok":true}}"#).unwrap();
        assert!(matches!(message, Message::Response(_)));

        let message = decode(
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#,
        )
        .unwrap();
        let Message::Error(error) = message else {
            panic!("expected error");
        };
        assert!(error.id.is_none());
        assert_eq!(error.error.code, -32700);
    }

    #[test]
    fn test_malformed_json_has_no_id() {
        let err = decode(r#"{"jsonrpc":"2.0","id":4,"method":"#).unwrap_err();
        assert!(matches!(err.error, ProtocolError::ParseError));
        assert!(err.id.is_none());
        assert!(err.to_reply().is_none());
    }

    #[test]
    fn test_structural_fault_keeps_id() {
        let err = decode(r#"{"jsonrpc":"1.0","id":9,"method":"tools/list"}"#).unwrap_err();
        assert_eq!(err.id, Some(RequestId::Number(9)));
        assert_eq!(err.error.code(), -32600);

        let reply = err.to_reply().unwrap();
        assert_eq!(reply.id, Some(RequestId::Number(9)));

        let err = decode(r#"{"jsonrpc":"2.0","id":"x","method":"tools/call","params":3}"#)
            .unwrap_err();
        assert_eq!(err.id, Some(RequestId::String("x".into())));

        let err = decode(r#"{"jsonrpc":"2.0","id":2,"method":7}"#).unwrap_err();
        assert_eq!(err.id, Some(RequestId::Number(2)));
    }

    #[test]
    fn test_rejects_non_object_and_bad_ids() {
        assert!(decode("[1,2,3]").is_err());
        assert!(decode(r#"{"jsonrpc":"2.0","id":1.5,"method":"ping"}"#).is_err());
        assert!(decode(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).is_err());
        assert!(decode(r#"{"jsonrpc":"2.0","id":3}"#).is_err());
        assert!(decode(r#"{"jsonrpc":"2.0","id":3,"result":1,"error":{"code":1,"message":"x"}}"#)
            .is_err());
    }

    #[test]
    fn test_canonical_frames_round_trip() {
        let frames = [
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#,
            r#"{"jsonrpc":"2.0","id":"req-7","method":"tools/call","params":{"name":"get_forecast","arguments":{"city":"Tokyo","days":2}}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#,
            r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32601,"message":"Method not found: x"}}"#,
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32002,"message":"Resource not found: a://b","data":{"uri":"a://b"}}}"#,
        ];

        for frame in frames {
            assert_eq!(encode(&decode(frame).unwrap()), frame);
        }
    }
}
