//! Capability Layer
//!
//! Resolves a frame's entry point to something invocable and runs it. Three
//! variants exist: in-process callables, external processes speaking JSON over
//! stdin/stdout, and remote endpoints speaking JSON over HTTP.

pub mod in_process;
pub mod process;
pub mod registry;
pub mod remote;

pub use in_process::InProcessCapability;
pub use process::ProcessCapability;
pub use registry::{CapabilityRegistry, BUILTIN_ECHO};
pub use remote::RemoteCapability;

use crate::catalog::{CapabilityKind, ResultMap, Stage};
use crate::error::CapabilityError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Everything a capability sees for one attempt. Serialized as the JSON
/// document handed to process and remote capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityInput {
    pub frame_id: String,
    pub stage: Stage,
    pub attempt: u32,
    pub input: Value,
    pub parameters: BTreeMap<String, Value>,
    pub previous_results: ResultMap,
    #[serde(default)]
    pub preserved_context: ResultMap,
}

#[async_trait]
pub trait Capability: Send + Sync {
    fn kind(&self) -> CapabilityKind;

    async fn invoke(&self, input: CapabilityInput) -> Result<ResultMap, CapabilityError>;
}

/// Require a JSON object result.
pub(crate) fn into_result_map(value: Value) -> Result<ResultMap, CapabilityError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(CapabilityError::MalformedResult(format!(
            "expected JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
