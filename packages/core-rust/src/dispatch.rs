//! Dispatch engine: raw bytes plus an operation name in, response envelope
//! out.
//!
//! [`DispatchEngine::handle`] is total: every failure short-circuits into an
//! error envelope at the point of detection, and nothing crosses the
//! dispatch boundary, not even a panic inside operation code. Transports
//! call [`DispatchEngine::handle_raw`] and write whatever bytes come back.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::envelope::{
    error_types, validate_header, Error, RequestHeader, ResponseHeader, ResponseMessage,
};
use crate::registry::OperationRegistry;
use crate::timestamp;
use crate::traits::{Outcome, PrototypeError};

/// Turns (operation name, raw request bytes) into a response envelope.
///
/// Holds no per-request state; one engine is shared by all transports and
/// concurrent dispatch calls never contend. The registry it carries is
/// read-only by the time requests arrive.
pub struct DispatchEngine {
    registry: Arc<OperationRegistry>,
}

impl DispatchEngine {
    #[must_use]
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Dispatches one request, short-circuiting on the first failure:
    ///
    /// 1. header-pass decode (`decodeJSONRequestHeader`)
    /// 2. header validation (`invalidRequestHeader`)
    /// 3. registry lookup (`unknownOper`, before any payload decode)
    /// 4. fresh instance + payload-pass decode (`decodeJSONRequestData`)
    /// 5. contract check (`operMissingValidator`)
    /// 6. `validate` (operation's error builder, `invalidRequest` default)
    /// 7. `run`, whose outcome lands unchanged in `response`/`error`
    ///
    /// Always returns a well-formed envelope; never panics.
    #[must_use]
    pub fn handle(&self, oper_name: &str, raw: &[u8]) -> ResponseMessage {
        let started = Instant::now();
        debug!(oper = oper_name, bytes = raw.len(), "dispatching request");

        let document = match codec::parse_document(raw) {
            Ok(document) => document,
            Err(err) => {
                warn!(oper = oper_name, %err, "rejected request envelope");
                return ResponseMessage::from_error(Error::new(
                    error_types::DECODE_REQUEST_HEADER,
                    err.to_string(),
                ));
            }
        };

        let header = match codec::decode_header(&document) {
            Ok(header) => header,
            Err(err) => {
                warn!(oper = oper_name, %err, "rejected request header");
                return ResponseMessage::from_error(Error::new(
                    error_types::DECODE_REQUEST_HEADER,
                    err.to_string(),
                ));
            }
        };

        if let Err(err) = validate_header(header.as_ref()) {
            warn!(oper = oper_name, %err, "invalid request header");
            return ResponseMessage::from_error(Error::new(
                error_types::INVALID_REQUEST_HEADER,
                format!("invalid request header: {err}"),
            ));
        }

        // Lookup precedes the payload pass: an unknown operation must never
        // cost a payload decode.
        let Some(prototype) = self.registry.lookup(oper_name) else {
            warn!(oper = oper_name, "unknown operation");
            return ResponseMessage::from_error(Error::tagged(error_types::UNKNOWN_OPER));
        };

        let payload = codec::request_payload(&document);

        let oper = match prototype.instantiate(payload) {
            Ok(oper) => oper,
            Err(err @ PrototypeError::Decode(_)) => {
                warn!(oper = oper_name, %err, "rejected request data");
                return ResponseMessage::from_error(Error::new(
                    error_types::DECODE_REQUEST_DATA,
                    err.to_string(),
                ));
            }
            Err(err @ PrototypeError::ContractUnsatisfied) => {
                error!(oper = oper_name, %err, "misconfigured operation");
                return ResponseMessage::from_error(Error::new(
                    error_types::OPER_MISSING_VALIDATOR,
                    format!("internal software error: {err}"),
                ));
            }
        };

        let echoed = match header.as_ref() {
            Some(h) if h.echo_request => payload.cloned(),
            _ => None,
        };

        // The operation boundary is the fault-isolation line: a panicking
        // operation must not take the request handler down with it.
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            if let Err(err) = oper.validate() {
                debug!(oper = oper_name, %err, "request failed validation");
                return oper.error_message(error_types::INVALID_REQUEST, &err.to_string());
            }
            assemble_response(header.as_ref(), echoed, oper.run(), started)
        }));

        match outcome {
            Ok(response) => {
                let elapsed_ms =
                    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                info!(oper = oper_name, elapsed_ms, "request completed");
                response
            }
            Err(panic) => {
                error!(
                    oper = oper_name,
                    cause = panic_cause(panic.as_ref()),
                    "operation panicked"
                );
                ResponseMessage::from_error(Error::new(
                    error_types::INTERNAL,
                    "operation failed unexpectedly",
                ))
            }
        }
    }

    /// Byte-level entry point for transports: dispatches and serializes the
    /// response envelope.
    #[must_use]
    pub fn handle_raw(&self, oper_name: &str, raw: &[u8]) -> Vec<u8> {
        let response = self.handle(oper_name, raw);
        match codec::encode_response(&response) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(oper = oper_name, %err, "failed to encode response envelope");
                br#"{"error":{"type":"internalError","description":"failed to encode response"}}"#
                    .to_vec()
            }
        }
    }
}

/// Assembles the envelope for a completed run: stamped response header,
/// echoed identity fields, optional echoed payload, and the run outcome in
/// the `response`/`error` slot.
fn assemble_response(
    request_header: Option<&RequestHeader>,
    echoed: Option<Value>,
    outcome: Outcome,
    started: Instant,
) -> ResponseMessage {
    let duration_ns = i64::try_from(started.elapsed().as_nanos()).unwrap_or(i64::MAX);

    let mut header = ResponseHeader {
        timestamp: timestamp::now_canonical(),
        duration_ns,
        ..ResponseHeader::default()
    };
    if let Some(request) = request_header {
        header.uuid = request.uuid.clone();
        header.consumer = request.consumer.clone();
        header.provider = request.provider.clone();
    }

    let mut message = ResponseMessage {
        header: Some(header),
        request: echoed,
        ..ResponseMessage::default()
    };
    match outcome {
        Outcome::Response(response) => message.response = Some(response),
        Outcome::Error(err) => message.error = Some(err),
    }
    message
}

fn panic_cause(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(text) = panic.downcast_ref::<&str>() {
        text
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text
    } else {
        "unknown panic payload"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::traits::{Operation, OperationPrototype, ValidationError};

    // ---- Fixtures ----

    #[derive(Debug, Default, Deserialize)]
    struct Hello {
        #[serde(default)]
        name: String,
    }

    impl Operation for Hello {
        fn validate(&self) -> Result<(), ValidationError> {
            if self.name.is_empty() {
                return Err(ValidationError::new("missing name"));
            }
            Ok(())
        }

        fn run(&self) -> Outcome {
            Outcome::Response(Value::String(format!("Hi {}", self.name)))
        }
    }

    struct CountingOper {
        validate_calls: Arc<AtomicU32>,
        run_calls: Arc<AtomicU32>,
        fail_validation: bool,
    }

    impl Operation for CountingOper {
        fn validate(&self) -> Result<(), ValidationError> {
            self.validate_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_validation {
                return Err(ValidationError::new("rejected by stub"));
            }
            Ok(())
        }

        fn run(&self) -> Outcome {
            self.run_calls.fetch_add(1, Ordering::SeqCst);
            Outcome::Response(Value::Null)
        }
    }

    struct CountingPrototype {
        instantiate_calls: Arc<AtomicU32>,
        validate_calls: Arc<AtomicU32>,
        run_calls: Arc<AtomicU32>,
        fail_validation: bool,
    }

    impl CountingPrototype {
        fn new(fail_validation: bool) -> Self {
            Self {
                instantiate_calls: Arc::new(AtomicU32::new(0)),
                validate_calls: Arc::new(AtomicU32::new(0)),
                run_calls: Arc::new(AtomicU32::new(0)),
                fail_validation,
            }
        }
    }

    impl OperationPrototype for CountingPrototype {
        fn instantiate(
            &self,
            _payload: Option<&Value>,
        ) -> Result<Box<dyn Operation>, PrototypeError> {
            self.instantiate_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingOper {
                validate_calls: Arc::clone(&self.validate_calls),
                run_calls: Arc::clone(&self.run_calls),
                fail_validation: self.fail_validation,
            }))
        }
    }

    struct PanickingOper;

    impl Operation for PanickingOper {
        fn validate(&self) -> Result<(), ValidationError> {
            Ok(())
        }

        fn run(&self) -> Outcome {
            panic!("boom");
        }
    }

    struct PanickingPrototype;

    impl OperationPrototype for PanickingPrototype {
        fn instantiate(
            &self,
            _payload: Option<&Value>,
        ) -> Result<Box<dyn Operation>, PrototypeError> {
            Ok(Box::new(PanickingOper))
        }
    }

    struct BrokenPrototype;

    impl OperationPrototype for BrokenPrototype {
        fn instantiate(
            &self,
            _payload: Option<&Value>,
        ) -> Result<Box<dyn Operation>, PrototypeError> {
            Err(PrototypeError::ContractUnsatisfied)
        }
    }

    fn engine_with_hello() -> DispatchEngine {
        let registry = OperationRegistry::new();
        registry.register_json::<Hello>("hello").unwrap();
        DispatchEngine::new(Arc::new(registry))
    }

    fn error_type(response: &ResponseMessage) -> Option<&str> {
        response.error.as_ref().map(|e| e.error_type.as_str())
    }

    // ---- Happy path ----

    #[test]
    fn hello_with_name_responds() {
        let engine = engine_with_hello();
        let response = engine.handle("hello", br#"{"request":{"name":"Jan"}}"#);

        assert_eq!(response.response, Some(json!("Hi Jan")));
        assert!(response.error.is_none());
        assert!(response.request.is_none(), "no echo unless requested");

        let header = response.header.expect("success carries a header");
        assert!(header.duration_ns >= 0);
        assert!(
            timestamp::parse(&header.timestamp).is_some(),
            "header timestamp must be canonical: {}",
            header.timestamp
        );
    }

    #[test]
    fn hello_with_empty_name_fails_validation() {
        let engine = engine_with_hello();
        let response = engine.handle("hello", br#"{"request":{"name":""}}"#);

        assert_eq!(
            response.error,
            Some(Error::new(error_types::INVALID_REQUEST, "missing name"))
        );
        assert!(response.response.is_none());
    }

    #[test]
    fn absent_payload_falls_back_to_default_instance() {
        let engine = engine_with_hello();
        let response = engine.handle("hello", b"{}");

        // Default Hello has an empty name, so validation rejects it.
        assert_eq!(error_type(&response), Some("invalidRequest"));
    }

    // ---- Engine error taxonomy ----

    #[test]
    fn unknown_operation_is_tagged_without_description() {
        let engine = engine_with_hello();
        let response = engine.handle("bye", br#"{"request":{"name":"Jan"}}"#);

        assert_eq!(response.error, Some(Error::tagged(error_types::UNKNOWN_OPER)));
        assert!(response.header.is_none());
    }

    #[test]
    fn unknown_operation_never_attempts_payload_decode() {
        let registry = OperationRegistry::new();
        let prototype = CountingPrototype::new(false);
        let instantiate_calls = Arc::clone(&prototype.instantiate_calls);
        registry.register("known", Arc::new(prototype)).unwrap();
        let engine = DispatchEngine::new(Arc::new(registry));

        let response = engine.handle("unknown", br#"{"request":{"x":1}}"#);

        assert_eq!(error_type(&response), Some("unknownOper"));
        assert_eq!(instantiate_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_validation_never_invokes_run() {
        let registry = OperationRegistry::new();
        let prototype = CountingPrototype::new(true);
        let validate_calls = Arc::clone(&prototype.validate_calls);
        let run_calls = Arc::clone(&prototype.run_calls);
        registry.register("stub", Arc::new(prototype)).unwrap();
        let engine = DispatchEngine::new(Arc::new(registry));

        let response = engine.handle("stub", b"{}");

        assert_eq!(error_type(&response), Some("invalidRequest"));
        assert_eq!(validate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(run_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn malformed_bytes_fail_the_header_pass() {
        let engine = engine_with_hello();
        let response = engine.handle("hello", b"{not json");

        assert_eq!(error_type(&response), Some("decodeJSONRequestHeader"));
    }

    #[test]
    fn malformed_header_subtree_fails_the_header_pass() {
        let engine = engine_with_hello();
        let response = engine.handle("hello", br#"{"header":[1,2]}"#);

        assert_eq!(error_type(&response), Some("decodeJSONRequestHeader"));
    }

    #[test]
    fn invalid_timestamp_fails_header_validation() {
        let engine = engine_with_hello();
        let response = engine.handle(
            "hello",
            br#"{"header":{"timestamp":"yesterday"},"request":{"name":"Jan"}}"#,
        );

        assert_eq!(error_type(&response), Some("invalidRequestHeader"));
        let description = response.error.unwrap().description.unwrap();
        assert!(description.contains(timestamp::CANONICAL_PATTERN));
    }

    #[test]
    fn expired_request_fails_header_validation() {
        let engine = engine_with_hello();
        let stamp = (chrono::Local::now() - chrono::Duration::seconds(10))
            .format(timestamp::CANONICAL_FORMAT)
            .to_string();
        let raw = serde_json::to_vec(&json!({
            "header": {"timestamp": stamp, "max-duration": 5_000_000_000_i64},
            "request": {"name": "Jan"},
        }))
        .unwrap();

        let response = engine.handle("hello", &raw);

        assert_eq!(error_type(&response), Some("invalidRequestHeader"));
        assert!(response
            .error
            .unwrap()
            .description
            .unwrap()
            .contains("has expired"));
    }

    #[test]
    fn zero_max_duration_never_expires() {
        let engine = engine_with_hello();
        let raw = serde_json::to_vec(&json!({
            "header": {"timestamp": "2017-06-07 11:37:58.000+02:00", "max-duration": 0},
            "request": {"name": "Jan"},
        }))
        .unwrap();

        let response = engine.handle("hello", &raw);

        assert_eq!(response.response, Some(json!("Hi Jan")));
    }

    #[test]
    fn mismatched_payload_fails_the_payload_pass() {
        let engine = engine_with_hello();
        let response = engine.handle("hello", br#"{"request":{"name":42}}"#);

        assert_eq!(error_type(&response), Some("decodeJSONRequestData"));
    }

    #[test]
    fn contract_unsatisfied_maps_to_missing_validator() {
        let registry = OperationRegistry::new();
        registry.register("broken", Arc::new(BrokenPrototype)).unwrap();
        let engine = DispatchEngine::new(Arc::new(registry));

        let response = engine.handle("broken", b"{}");

        assert_eq!(error_type(&response), Some("operMissingValidator"));
    }

    #[test]
    fn panicking_operation_becomes_internal_error() {
        let registry = OperationRegistry::new();
        registry
            .register("explode", Arc::new(PanickingPrototype))
            .unwrap();
        let engine = DispatchEngine::new(Arc::new(registry));

        let response = engine.handle("explode", b"{}");

        assert_eq!(
            response.error,
            Some(Error::new(
                error_types::INTERNAL,
                "operation failed unexpectedly"
            ))
        );
    }

    // ---- Echo ----

    #[test]
    fn echo_request_true_echoes_the_decoded_payload() {
        let engine = engine_with_hello();
        let stamp = timestamp::now_canonical();
        let raw = serde_json::to_vec(&json!({
            "header": {"timestamp": stamp, "echo-request": true},
            "request": {"name": "Jan"},
        }))
        .unwrap();

        let response = engine.handle("hello", &raw);

        assert_eq!(response.request, Some(json!({"name": "Jan"})));
        assert_eq!(response.response, Some(json!("Hi Jan")));
    }

    #[test]
    fn echo_request_false_never_echoes() {
        let engine = engine_with_hello();
        let stamp = timestamp::now_canonical();
        let raw = serde_json::to_vec(&json!({
            "header": {"timestamp": stamp, "echo-request": false},
            "request": {"name": "Jan"},
        }))
        .unwrap();

        let response = engine.handle("hello", &raw);

        assert!(response.request.is_none());
        assert_eq!(response.response, Some(json!("Hi Jan")));
    }

    // ---- Header echo ----

    #[test]
    fn identity_fields_are_echoed_verbatim() {
        let engine = engine_with_hello();
        let stamp = timestamp::now_canonical();
        let raw = serde_json::to_vec(&json!({
            "header": {
                "timestamp": stamp,
                "uuid": "req-7",
                "consumer": {"name": "client", "tid": "t-1"},
                "provider": {"name": "does-not-route"},
            },
            "request": {"name": "Jan"},
        }))
        .unwrap();

        let response = engine.handle("hello", &raw);

        let header = response.header.expect("success carries a header");
        assert_eq!(header.uuid.as_deref(), Some("req-7"));
        assert_eq!(
            header.consumer.as_ref().and_then(|c| c.name.as_deref()),
            Some("client")
        );
        assert_eq!(
            header.provider.as_ref().and_then(|p| p.name.as_deref()),
            Some("does-not-route"),
            "provider is informational and echoed, never used for routing"
        );
    }

    // ---- Byte-level entry point ----

    #[test]
    fn handle_raw_returns_wire_bytes() {
        let engine = engine_with_hello();
        let bytes = engine.handle_raw("hello", br#"{"request":{"name":"Jan"}}"#);
        let decoded = codec::decode_response(&bytes).unwrap();

        assert_eq!(decoded.response, Some(json!("Hi Jan")));
    }

    #[test]
    fn handle_raw_unknown_oper_matches_wire_contract() {
        let engine = engine_with_hello();
        let bytes = engine.handle_raw("bye", b"{}");
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value, json!({"error": {"type": "unknownOper"}}));
    }
}
