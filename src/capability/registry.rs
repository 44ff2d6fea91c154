//! Capability registry: maps frame entry points to invocable capabilities.

use crate::capability::{
    Capability, InProcessCapability, ProcessCapability, RemoteCapability,
};
use crate::catalog::{CapabilityKind, Frame};
use crate::error::CapabilityError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Id of the built-in in-process capability that echoes frame parameters.
pub const BUILTIN_ECHO: &str = "builtin.echo";

/// Injected lookup from `(kind, entry point)` to a capability.
///
/// In-process capabilities must be registered. Process and remote
/// capabilities may be registered explicitly (tests, wrappers) or are derived
/// from the entry point on first use.
pub struct CapabilityRegistry {
    registered: RwLock<HashMap<(CapabilityKind, String), Arc<dyn Capability>>>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRegistry {
    /// Registry containing only the built-in capabilities.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register_in_process(InProcessCapability::echo());
        registry
    }

    pub fn empty() -> Self {
        Self {
            registered: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, entry_point: impl Into<String>, capability: Arc<dyn Capability>) {
        let key = (capability.kind(), entry_point.into());
        self.registered.write().insert(key, capability);
    }

    pub fn register_in_process(&self, capability: InProcessCapability) {
        let id = capability.name().to_string();
        self.register(id, Arc::new(capability));
    }

    pub fn contains(&self, kind: CapabilityKind, entry_point: &str) -> bool {
        self.registered
            .read()
            .contains_key(&(kind, entry_point.to_string()))
    }

    pub fn resolve(&self, frame: &Frame) -> Result<Arc<dyn Capability>, CapabilityError> {
        let key = (frame.capability_kind, frame.entry_point.clone());
        if let Some(capability) = self.registered.read().get(&key) {
            return Ok(Arc::clone(capability));
        }

        let derived: Arc<dyn Capability> = match frame.capability_kind {
            CapabilityKind::InProcess => {
                return Err(CapabilityError::NotRegistered(frame.entry_point.clone()))
            }
            CapabilityKind::Process => {
                Arc::new(ProcessCapability::from_entry_point(&frame.entry_point)?)
            }
            CapabilityKind::Remote => Arc::new(RemoteCapability::new(frame.entry_point.clone())?),
        };
        self.registered.write().insert(key, Arc::clone(&derived));
        Ok(derived)
    }
}
