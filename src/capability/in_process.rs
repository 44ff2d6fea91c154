//! In-process capabilities: plain callables run on the blocking thread pool.

use crate::capability::{Capability, CapabilityInput};
use crate::catalog::{CapabilityKind, ResultMap};
use crate::error::CapabilityError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

type Callable = dyn Fn(CapabilityInput) -> Result<ResultMap, CapabilityError> + Send + Sync;

/// Wraps a synchronous function. A timeout drops the awaiting future but
/// cannot stop the callable itself; it runs to completion on its thread.
#[derive(Clone)]
pub struct InProcessCapability {
    name: String,
    func: Arc<Callable>,
}

impl InProcessCapability {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(CapabilityInput) -> Result<ResultMap, CapabilityError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the frame's effective parameters as the result.
    pub fn echo() -> Self {
        Self::new(super::BUILTIN_ECHO, |input: CapabilityInput| {
            Ok(input.parameters.into_iter().collect())
        })
    }
}

impl fmt::Debug for InProcessCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessCapability")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Capability for InProcessCapability {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::InProcess
    }

    async fn invoke(&self, input: CapabilityInput) -> Result<ResultMap, CapabilityError> {
        let func = Arc::clone(&self.func);
        tokio::task::spawn_blocking(move || (*func)(input))
            .await
            .map_err(|e| CapabilityError::Invocation(format!("{} panicked: {}", self.name, e)))?
    }
}
