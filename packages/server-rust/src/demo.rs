//! Demo `hello` operation.
//!
//! The smallest complete operation: one payload field, one validation rule,
//! one response. The binary registers it at startup and the integration
//! tests use it as their fixture.

use crossbar_core::{
    Operation, OperationRegistry, Outcome, RegistryError, ResultKind, ValidationError,
};
use serde::Deserialize;
use serde_json::Value;

/// Greets the caller by name.
#[derive(Debug, Default, Deserialize)]
pub struct HelloOper {
    #[serde(default)]
    pub name: String,
}

impl Operation for HelloOper {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::new("missing name"));
        }
        Ok(())
    }

    fn run(&self) -> Outcome {
        Outcome::Response(Value::String(format!("Hi {}", self.name)))
    }

    fn results(&self) -> Vec<ResultKind> {
        vec![ResultKind {
            name: "greeting".to_string(),
            description: "greeting string addressed to the caller".to_string(),
        }]
    }
}

/// Registers the demo operations.
///
/// # Errors
///
/// Propagates [`RegistryError`]; the binary treats this as fatal startup
/// misconfiguration.
pub fn register(registry: &OperationRegistry) -> Result<(), RegistryError> {
    registry.register_json::<HelloOper>("hello")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
