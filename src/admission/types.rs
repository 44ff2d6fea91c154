//! Admission request, allocation and report types.

use crate::error::AdmissionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Resource kinds tracked by the controller. Units: cpu in percent, memory
/// and disk in GB, network in Mbps, gpu in devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Cpu,
    Memory,
    Disk,
    Network,
    Gpu,
}

impl ResourceType {
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Cpu,
        ResourceType::Memory,
        ResourceType::Disk,
        ResourceType::Network,
        ResourceType::Gpu,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Cpu => "cpu",
            ResourceType::Memory => "memory",
            ResourceType::Disk => "disk",
            ResourceType::Network => "network",
            ResourceType::Gpu => "gpu",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = AdmissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AdmissionError::InvalidRequest(format!("unknown resource type: {}", s)))
    }
}

/// Admission priority. Pending requests are served highest first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionPriority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
    Emergency = 4,
}

impl FromStr for AdmissionPriority {
    type Err = AdmissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(AdmissionPriority::Low),
            "normal" => Ok(AdmissionPriority::Normal),
            "high" => Ok(AdmissionPriority::High),
            "critical" => Ok(AdmissionPriority::Critical),
            "emergency" => Ok(AdmissionPriority::Emergency),
            other => Err(AdmissionError::InvalidRequest(format!(
                "unknown priority: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStatus {
    Active,
    Completed,
    Failed,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub request_id: String,
    pub agent_id: String,
    pub resource_type: ResourceType,
    pub amount: f64,
    pub priority: AdmissionPriority,
    pub duration: Duration,
    pub purpose: String,
    pub requested_at: DateTime<Utc>,
}

impl ResourceRequest {
    pub const DEFAULT_DURATION: Duration = Duration::from_secs(300);

    pub fn new(agent_id: impl Into<String>, resource_type: ResourceType, amount: f64) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            resource_type,
            amount,
            priority: AdmissionPriority::Normal,
            duration: Self::DEFAULT_DURATION,
            purpose: String::new(),
            requested_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: AdmissionPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }

    pub(crate) fn validate(&self) -> Result<(), AdmissionError> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(AdmissionError::InvalidRequest(format!(
                "request {} asks for non-positive {} amount {}",
                self.request_id, self.resource_type, self.amount
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub allocation_id: String,
    pub request_id: String,
    pub agent_id: String,
    pub resource_type: ResourceType,
    pub amount: f64,
    pub priority: AdmissionPriority,
    pub purpose: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AllocationStatus,
}

impl ResourceAllocation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.end_time
    }
}

/// One resource demand declared by a frame's `resources` parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDemand {
    pub resource_type: ResourceType,
    pub amount: f64,
}

impl ResourceDemand {
    /// Parse a `{"cpu": 10, "memory": 2.5}` object.
    pub fn parse_all(value: &Value) -> Result<Vec<ResourceDemand>, AdmissionError> {
        let object = value.as_object().ok_or_else(|| {
            AdmissionError::InvalidRequest("resources must be an object".to_string())
        })?;
        object
            .iter()
            .map(|(key, amount)| {
                let amount = amount.as_f64().ok_or_else(|| {
                    AdmissionError::InvalidRequest(format!("amount for {} must be a number", key))
                })?;
                Ok(ResourceDemand {
                    resource_type: key.parse()?,
                    amount,
                })
            })
            .collect()
    }
}

/// Result of serving one pending request.
#[derive(Debug, Clone)]
pub struct AdmissionDecision {
    pub request_id: String,
    pub agent_id: String,
    pub priority: AdmissionPriority,
    pub outcome: Result<ResourceAllocation, AdmissionError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub active: Vec<ResourceAllocation>,
    pub totals: BTreeMap<ResourceType, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdmissionSnapshot {
    pub active_allocations: usize,
    pub history_allocations: usize,
    pub pending_requests: usize,
    pub reserved: BTreeMap<ResourceType, f64>,
}
