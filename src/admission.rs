//! Resource Admission
//!
//! Grants resource allocations to frames against per-agent ceilings and the
//! capacity reported by a [`CapacityProbe`].

pub mod controller;
pub mod probe;
pub mod types;

pub use controller::{AdmissionController, SweeperHandle};
pub use probe::{CapacityProbe, StaticProbe, SystemProbe};
pub use types::{
    AdmissionDecision, AdmissionPriority, AdmissionSnapshot, AgentStatus, AllocationStatus,
    ResourceAllocation, ResourceDemand, ResourceRequest, ResourceType,
};
