//! Wire envelope types: request/response headers, identities, and errors.
//!
//! Field names follow the JSON wire contract exactly, including the
//! hyphenated `max-duration` / `echo-request` request fields, so every
//! struct carries explicit serde renames instead of a blanket rename rule.
//! Everything in the envelope is optional on the wire unless noted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::timestamp;

// ---------------------------------------------------------------------------
// Error type tags
// ---------------------------------------------------------------------------

/// Well-known values for [`Error::error_type`].
///
/// The taxonomy is flat: a short machine-readable tag plus free-text
/// description, looked up by callers in their own tables.
pub mod error_types {
    /// Header portion of the envelope is malformed.
    pub const DECODE_REQUEST_HEADER: &str = "decodeJSONRequestHeader";
    /// Header present but semantically invalid (bad timestamp or expired).
    pub const INVALID_REQUEST_HEADER: &str = "invalidRequestHeader";
    /// Operation name not registered.
    pub const UNKNOWN_OPER: &str = "unknownOper";
    /// Payload portion malformed for the resolved operation's shape.
    pub const DECODE_REQUEST_DATA: &str = "decodeJSONRequestData";
    /// Resolved prototype does not satisfy the operation contract.
    pub const OPER_MISSING_VALIDATOR: &str = "operMissingValidator";
    /// Operation-level validation failure (default tag; operations may
    /// substitute their own).
    pub const INVALID_REQUEST: &str = "invalidRequest";
    /// Fault isolated at the dispatch boundary (e.g. a panicking operation).
    pub const INTERNAL: &str = "internalError";
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Free-form identity of the sender (`consumer`) or intended recipient
/// (`provider`). Never validated, only echoed back in the response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Identity {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    /// Transaction id, significant only in the sender's own context.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tid: Option<String>,
    /// Session id, significant only in the sender's own context.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sid: Option<String>,
}

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// Optional header of a request envelope.
///
/// `timestamp` uses the canonical format `YYYY-MM-DD HH:MM:SS.mmm±HH:MM`
/// with the fallbacks accepted by [`timestamp::parse`]. `max-duration` is
/// wire-encoded as signed integer nanoseconds; zero means "no expiry".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestHeader {
    #[serde(default)]
    pub timestamp: String,
    /// Correlation id, echoed verbatim in the response.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub consumer: Option<Identity>,
    /// Who "should" handle this request. Informational only: the
    /// transport-resolved operation name is the routing authority.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub provider: Option<Identity>,
    /// How long the sender will wait for a response, in nanoseconds.
    #[serde(rename = "max-duration", default)]
    pub max_duration_ns: i64,
    /// True if the request payload must be echoed in the response.
    #[serde(rename = "echo-request", default)]
    pub echo_request: bool,
}

/// Optional header of a response envelope. Identity fields are echoed from
/// the request header; `timestamp` and `duration` are stamped by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseHeader {
    #[serde(default)]
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub consumer: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub provider: Option<Identity>,
    /// Elapsed processing time in nanoseconds.
    #[serde(rename = "duration", default)]
    pub duration_ns: i64,
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Structured error carried in a response envelope.
///
/// A response holds at most one of `error` / `response`; the engine's
/// builders only ever set one of the two.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Error {
    /// Short machine-readable category tag (see [`error_types`]).
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
}

impl Error {
    /// Error with a tag and a free-text description.
    pub fn new(error_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            description: Some(description.into()),
        }
    }

    /// Error carrying only a tag.
    pub fn tagged(error_type: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            description: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Request envelope. The `request` payload stays loosely typed here because
/// its concrete shape depends on which operation the transport selected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequestMessage {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub header: Option<RequestHeader>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request: Option<serde_json::Value>,
}

/// Response envelope. `request` is present only when the caller asked for
/// its payload to be echoed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub header: Option<ResponseHeader>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<Error>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub response: Option<serde_json::Value>,
}

impl ResponseMessage {
    /// Bare error envelope: no header, no echo.
    #[must_use]
    pub fn from_error(error: Error) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Header validation
// ---------------------------------------------------------------------------

/// Rejection reason for a present-but-invalid request header.
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("invalid timestamp {value:?}, expecting {}", timestamp::CANONICAL_PATTERN)]
    InvalidTimestamp { value: String },
    #[error("timestamp {timestamp:?} + max-duration {max_duration} has expired")]
    Expired {
        timestamp: String,
        max_duration: Duration,
    },
}

impl RequestHeader {
    /// Validates the header: timestamp format negotiation and expiry check.
    ///
    /// `uuid`, `consumer` and `provider` need no validation; they are echoed
    /// whatever they hold. On success returns the resolved timestamp and
    /// max-duration (negative wire values count as zero).
    ///
    /// # Errors
    ///
    /// [`HeaderError::InvalidTimestamp`] if no accepted format matches;
    /// [`HeaderError::Expired`] if max-duration is positive and the request
    /// is older than timestamp + max-duration.
    pub fn validate(&self) -> Result<(DateTime<Utc>, Duration), HeaderError> {
        let parsed =
            timestamp::parse(&self.timestamp).ok_or_else(|| HeaderError::InvalidTimestamp {
                value: self.timestamp.clone(),
            })?;

        let max_duration = timestamp::duration_from_nanos(self.max_duration_ns);
        if max_duration > Duration::zero() && Utc::now() > parsed + max_duration {
            return Err(HeaderError::Expired {
                timestamp: self.timestamp.clone(),
                max_duration,
            });
        }
        Ok((parsed, max_duration))
    }
}

/// Validates an optional request header.
///
/// The header is optional by design: when absent, validation succeeds
/// immediately with the current wall-clock time and zero max-duration.
///
/// # Errors
///
/// Propagates [`RequestHeader::validate`] failures when a header is present.
pub fn validate_header(
    header: Option<&RequestHeader>,
) -> Result<(DateTime<Utc>, Duration), HeaderError> {
    match header {
        None => Ok((Utc::now(), Duration::zero())),
        Some(h) => h.validate(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
