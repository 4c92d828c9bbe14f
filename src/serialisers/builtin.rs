use super::{MessageBodyReader, MessageBodyWriter};
use crate::error::HandlerError;
use crate::model::TypeDescriptor;
use mime::Mime;
use serde_json::Value;

/// `application/json` (and `+json`) via serde_json. Writes anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMessageBody;

impl MessageBodyWriter for JsonMessageBody {
    fn name(&self) -> &str {
        "json"
    }

    fn is_writeable(&self, _entity: &Value, _media_type: &Mime) -> bool {
        true
    }

    fn write_to(&self, entity: &Value, _media_type: &Mime) -> Result<Vec<u8>, HandlerError> {
        serde_json::to_vec(entity).map_err(|e| HandlerError::Internal(e.to_string()))
    }

    fn is_all_writeable(&self) -> bool {
        true
    }
}

impl MessageBodyReader for JsonMessageBody {
    fn name(&self) -> &str {
        "json"
    }

    fn read_from(&self, _declared: &TypeDescriptor, _media_type: &Mime, body: &[u8]) -> Result<Value, HandlerError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(body).map_err(|e| HandlerError::bad_request(format!("invalid JSON body: {e}")))
    }
}

/// Strings as `text/plain`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringMessageBody;

impl MessageBodyWriter for StringMessageBody {
    fn name(&self) -> &str {
        "string"
    }

    fn is_writeable(&self, entity: &Value, _media_type: &Mime) -> bool {
        entity.is_string()
    }

    fn write_to(&self, entity: &Value, _media_type: &Mime) -> Result<Vec<u8>, HandlerError> {
        match entity {
            Value::String(s) => Ok(s.as_bytes().to_vec()),
            other => Err(HandlerError::Internal(format!("cannot write {other} as text"))),
        }
    }
}

impl MessageBodyReader for StringMessageBody {
    fn name(&self) -> &str {
        "string"
    }

    fn read_from(&self, _declared: &TypeDescriptor, _media_type: &Mime, body: &[u8]) -> Result<Value, HandlerError> {
        String::from_utf8(body.to_vec())
            .map(Value::String)
            .map_err(|_| HandlerError::bad_request("body is not valid UTF-8"))
    }
}

/// Raw bytes, represented as an array of numbers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteArrayMessageBody;

impl MessageBodyWriter for ByteArrayMessageBody {
    fn name(&self) -> &str {
        "bytes"
    }

    fn is_writeable(&self, entity: &Value, _media_type: &Mime) -> bool {
        match entity {
            Value::String(_) => true,
            Value::Array(items) => items.iter().all(|v| v.as_u64().is_some_and(|n| n <= 255)),
            _ => false,
        }
    }

    fn write_to(&self, entity: &Value, _media_type: &Mime) -> Result<Vec<u8>, HandlerError> {
        match entity {
            Value::String(s) => Ok(s.as_bytes().to_vec()),
            Value::Array(items) => items
                .iter()
                .map(|v| {
                    v.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| HandlerError::Internal("byte out of range".to_string()))
                })
                .collect(),
            other => Err(HandlerError::Internal(format!("cannot write {other} as bytes"))),
        }
    }
}

impl MessageBodyReader for ByteArrayMessageBody {
    fn name(&self) -> &str {
        "bytes"
    }

    fn read_from(&self, _declared: &TypeDescriptor, _media_type: &Mime, body: &[u8]) -> Result<Value, HandlerError> {
        Ok(Value::Array(body.iter().map(|b| Value::from(*b)).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_round_trip_and_errors() {
        let ty = TypeDescriptor::class("Widget");
        let v = JsonMessageBody
            .read_from(&ty, &mime::APPLICATION_JSON, br#"{"id":7}"#)
            .unwrap();
        assert_eq!(v, json!({"id": 7}));
        assert_eq!(JsonMessageBody.read_from(&ty, &mime::APPLICATION_JSON, b"  ").unwrap(), Value::Null);
        let err = JsonMessageBody
            .read_from(&ty, &mime::APPLICATION_JSON, b"{oops")
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_bytes_writer() {
        let out = ByteArrayMessageBody
            .write_to(&json!([104, 105]), &mime::APPLICATION_OCTET_STREAM)
            .unwrap();
        assert_eq!(out, b"hi");
        assert!(!ByteArrayMessageBody.is_writeable(&json!([300]), &mime::APPLICATION_OCTET_STREAM));
    }
}
