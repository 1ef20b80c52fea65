//! Operation contract and prototype factories.
//!
//! Every registered operation implements [`Operation`]; the registry stores
//! [`OperationPrototype`] factories that produce a fresh, independently owned
//! instance per request, ready for payload decoding. [`JsonPrototype`] covers
//! the common case of a serde-decodable operation struct.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::envelope::{Error, ResponseMessage};

// ---------------------------------------------------------------------------
// Operation contract
// ---------------------------------------------------------------------------

/// A result kind an operation declares it may return.
///
/// Used for external documentation generation, not for runtime branching.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultKind {
    pub name: String,
    pub description: String,
}

/// Failure reported by [`Operation::validate`]. The text becomes the
/// `description` of the error envelope.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(description: impl Into<String>) -> Self {
        Self(description.into())
    }
}

/// Outcome of [`Operation::run`]: exactly one of response payload or error.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Response(Value),
    Error(Error),
}

/// The capability set every registered operation must satisfy.
pub trait Operation: Send + Sync {
    /// Pure structural/semantic check of the decoded instance. No side
    /// effects; runs before [`Operation::run`].
    ///
    /// # Errors
    ///
    /// A [`ValidationError`] whose text describes what is missing or wrong.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Executes the operation's business behavior.
    fn run(&self) -> Outcome;

    /// Builds an error envelope for a failed request.
    ///
    /// The default produces the uniform envelope shape; operations override
    /// this to customize the error type or description while the engine
    /// stays generic.
    fn error_message(&self, error_type: &str, cause: &str) -> ResponseMessage {
        ResponseMessage::from_error(Error::new(error_type, cause))
    }

    /// Declared possible result kinds, for documentation generation.
    fn results(&self) -> Vec<ResultKind> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Prototypes
// ---------------------------------------------------------------------------

/// Instantiation failure reported by a prototype.
#[derive(Debug, thiserror::Error)]
pub enum PrototypeError {
    /// The `request` subtree does not match the operation's shape.
    #[error("failed to decode request data: {0}")]
    Decode(#[source] serde_json::Error),
    /// The prototype cannot produce a contract-satisfying instance. Internal
    /// inconsistency; unreachable in a correctly configured process.
    #[error("operation does not implement the operation contract")]
    ContractUnsatisfied,
}

/// Immutable per-operation factory held by the registry.
///
/// The prototype itself is never used as request-scoped state: each call to
/// `instantiate` yields a fresh instance whose lifetime is one request.
pub trait OperationPrototype: Send + Sync {
    /// Produces a fresh operation instance populated from the payload, or
    /// the operation's default value when the payload is absent.
    ///
    /// # Errors
    ///
    /// [`PrototypeError::Decode`] if the payload does not match the shape;
    /// [`PrototypeError::ContractUnsatisfied`] if no contract-satisfying
    /// instance can be produced.
    fn instantiate(&self, payload: Option<&Value>) -> Result<Box<dyn Operation>, PrototypeError>;
}

/// Prototype for operations decodable straight from the `request` subtree.
pub struct JsonPrototype<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonPrototype<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonPrototype<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OperationPrototype for JsonPrototype<T>
where
    T: Operation + DeserializeOwned + Default + 'static,
{
    fn instantiate(&self, payload: Option<&Value>) -> Result<Box<dyn Operation>, PrototypeError> {
        let oper = match payload {
            Some(value) => T::deserialize(value).map_err(PrototypeError::Decode)?,
            None => T::default(),
        };
        Ok(Box::new(oper))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
