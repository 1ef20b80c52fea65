//! Two-phase envelope codec.
//!
//! The raw request bytes are parsed once into a loosely-typed JSON document.
//! The `header` subtree is projected first, so header validation can
//! short-circuit before the payload's concrete type is even known; the
//! `request` subtree is projected later, into whichever operation shape the
//! registry resolves. Numeric literals survive both projections losslessly
//! (`serde_json` runs with `arbitrary_precision`).

use serde::Deserialize;
use serde_json::Value;

use crate::envelope::{RequestHeader, ResponseMessage};

/// Decode/encode failure at the envelope level.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to decode request envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("failed to decode request header: {0}")]
    Header(#[source] serde_json::Error),
    #[error("failed to encode response: {0}")]
    EncodeResponse(#[source] serde_json::Error),
    #[error("failed to decode response: {0}")]
    DecodeResponse(#[source] serde_json::Error),
}

/// Parses raw request bytes into a loosely-typed document.
///
/// # Errors
///
/// [`CodecError::Envelope`] if the bytes are not valid JSON.
pub fn parse_document(raw: &[u8]) -> Result<Value, CodecError> {
    serde_json::from_slice(raw).map_err(CodecError::Envelope)
}

/// Header pass: projects only the `header` subtree of the document.
///
/// The `request` subtree is deliberately ignored at this stage. An absent or
/// null header yields `None` (the header is optional on the wire).
///
/// # Errors
///
/// [`CodecError::Header`] if the document is not a JSON object or the header
/// subtree does not match the [`RequestHeader`] shape.
pub fn decode_header(document: &Value) -> Result<Option<RequestHeader>, CodecError> {
    if !document.is_object() {
        return Err(CodecError::Header(<serde_json::Error as serde::de::Error>::custom(
            "request envelope must be a JSON object",
        )));
    }
    match document.get("header") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => RequestHeader::deserialize(value)
            .map(Some)
            .map_err(CodecError::Header),
    }
}

/// Payload pass, step one: locates the `request` subtree.
///
/// Returns `None` when the payload is absent or null; the caller then falls
/// back to the operation's default instance.
#[must_use]
pub fn request_payload(document: &Value) -> Option<&Value> {
    match document.get("request") {
        None | Some(Value::Null) => None,
        present => present,
    }
}

/// Serializes a response envelope to wire bytes.
///
/// # Errors
///
/// [`CodecError::EncodeResponse`] on serialization failure; engine-built
/// responses cannot hit this in practice.
pub fn encode_response(message: &ResponseMessage) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(message).map_err(CodecError::EncodeResponse)
}

/// Deserializes a response envelope from wire bytes (the client side of the
/// protocol, used by request/reply transports and tests).
///
/// # Errors
///
/// [`CodecError::DecodeResponse`] if the bytes do not hold a response
/// envelope.
pub fn decode_response(raw: &[u8]) -> Result<ResponseMessage, CodecError> {
    serde_json::from_slice(raw).map_err(CodecError::DecodeResponse)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::envelope::{error_types, Error};

    #[test]
    fn header_pass_ignores_request_subtree() {
        // The request subtree is junk for any operation shape; the header
        // pass must still succeed.
        let doc = parse_document(
            br#"{"header":{"timestamp":"2017-06-07 11:37:58"},"request":[1,2,[3]]}"#,
        )
        .unwrap();
        let header = decode_header(&doc).expect("header pass should succeed");
        assert_eq!(
            header.map(|h| h.timestamp),
            Some("2017-06-07 11:37:58".to_string())
        );
    }

    #[test]
    fn absent_header_decodes_to_none() {
        let doc = parse_document(br#"{"request":{"name":"Jan"}}"#).unwrap();
        assert_eq!(decode_header(&doc).unwrap(), None);
    }

    #[test]
    fn null_header_decodes_to_none() {
        let doc = parse_document(br#"{"header":null}"#).unwrap();
        assert_eq!(decode_header(&doc).unwrap(), None);
    }

    #[test]
    fn malformed_header_subtree_is_rejected() {
        let doc = parse_document(br#"{"header":["not","a","header"]}"#).unwrap();
        assert!(decode_header(&doc).is_err());
    }

    #[test]
    fn non_object_envelope_is_rejected() {
        for raw in [&b"[1,2,3]"[..], b"\"hello\"", b"42"] {
            let doc = parse_document(raw).unwrap();
            assert!(decode_header(&doc).is_err(), "should reject {raw:?}");
        }
    }

    #[test]
    fn invalid_json_is_rejected_at_parse() {
        assert!(parse_document(b"{not json").is_err());
        assert!(parse_document(b"").is_err());
    }

    #[test]
    fn request_payload_absent_and_null() {
        let doc = parse_document(br#"{"header":{}}"#).unwrap();
        assert_eq!(request_payload(&doc), None);

        let doc = parse_document(br#"{"request":null}"#).unwrap();
        assert_eq!(request_payload(&doc), None);
    }

    #[test]
    fn request_payload_returns_subtree() {
        let doc = parse_document(br#"{"request":{"name":"Jan"}}"#).unwrap();
        assert_eq!(request_payload(&doc), Some(&json!({"name": "Jan"})));
    }

    #[test]
    fn numeric_literals_survive_the_document_pass() {
        // u64::MAX does not fit an f64; a float round-trip would corrupt it.
        let doc = parse_document(br#"{"request":{"amount":18446744073709551615}}"#).unwrap();
        let payload = request_payload(&doc).unwrap();
        let out = serde_json::to_string(payload).unwrap();
        assert_eq!(out, r#"{"amount":18446744073709551615}"#);
    }

    #[test]
    fn response_roundtrip_through_wire_bytes() {
        let msg = ResponseMessage {
            error: Some(Error::new(error_types::INVALID_REQUEST, "missing name")),
            ..ResponseMessage::default()
        };
        let bytes = encode_response(&msg).unwrap();
        assert_eq!(decode_response(&bytes).unwrap(), msg);
    }
}
