//! Crossbar Core — request/response envelope, operation registry, and the
//! transport-agnostic dispatch engine.

pub mod codec;
pub mod dispatch;
pub mod envelope;
pub mod registry;
pub mod timestamp;
pub mod traits;

pub use codec::CodecError;
pub use dispatch::DispatchEngine;
pub use envelope::{
    error_types, validate_header, Error, HeaderError, Identity, RequestHeader, RequestMessage,
    ResponseHeader, ResponseMessage,
};
pub use registry::{OperationRegistry, RegistryError};
pub use traits::{
    JsonPrototype, Operation, OperationPrototype, Outcome, PrototypeError, ResultKind,
    ValidationError,
};
