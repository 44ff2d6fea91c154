//! Admission controller: per-agent ceilings over sampled capacity.

use crate::admission::probe::{CapacityProbe, SystemProbe};
use crate::admission::types::{
    AdmissionDecision, AdmissionSnapshot, AgentStatus, AllocationStatus, ResourceAllocation,
    ResourceRequest, ResourceType,
};
use crate::config::AdmissionConfig;
use crate::error::AdmissionError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Request waiting in the pending queue.
#[derive(Debug)]
struct PendingRequest {
    request: ResourceRequest,
    arrival: u64,
}

impl PartialEq for PendingRequest {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PendingRequest {}

impl Ord for PendingRequest {
    /// Higher priority first, then earlier arrival. BinaryHeap is a max-heap,
    /// so the earlier arrival must compare as Greater.
    fn cmp(&self, other: &Self) -> Ordering {
        match self.request.priority.cmp(&other.request.priority) {
            Ordering::Equal => other.arrival.cmp(&self.arrival),
            ordering => ordering,
        }
    }
}

impl PartialOrd for PendingRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct AdmissionState {
    active: HashMap<String, ResourceAllocation>,
    history: VecDeque<ResourceAllocation>,
    history_limit: usize,
    pending: BinaryHeap<PendingRequest>,
    arrivals: u64,
}

impl AdmissionState {
    fn held_by(&self, agent_id: &str, resource: ResourceType) -> f64 {
        self.active
            .values()
            .filter(|a| a.agent_id == agent_id && a.resource_type == resource)
            .map(|a| a.amount)
            .sum()
    }

    fn reserved(&self, resource: ResourceType) -> f64 {
        self.active
            .values()
            .filter(|a| a.resource_type == resource)
            .map(|a| a.amount)
            .sum()
    }

    fn retire(&mut self, allocation_id: &str, status: AllocationStatus, now: DateTime<Utc>) -> Option<ResourceAllocation> {
        let mut allocation = self.active.remove(allocation_id)?;
        allocation.status = status;
        allocation.end_time = now;
        if self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(allocation.clone());
        Some(allocation)
    }
}

/// Grants or denies resource requests.
///
/// Every decision is a read-modify-write under a single lock: the ceiling
/// check, the capacity check and the grant happen atomically. A request is
/// either granted in full or denied; there are no partial grants.
///
/// Pending requests are served in strict priority order with no aging, so a
/// steady stream of high-priority work can starve low-priority requests.
pub struct AdmissionController {
    config: AdmissionConfig,
    probe: Arc<dyn CapacityProbe>,
    state: Mutex<AdmissionState>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig, probe: Arc<dyn CapacityProbe>) -> Self {
        let state = AdmissionState {
            history_limit: config.history_limit.max(1),
            ..AdmissionState::default()
        };
        Self {
            config,
            probe,
            state: Mutex::new(state),
        }
    }

    /// Controller sampling the host through `sysinfo`.
    pub fn with_system_probe(config: AdmissionConfig) -> Self {
        let probe = SystemProbe::new(config.network_capacity_mbps, config.gpu_capacity);
        Self::new(config, Arc::new(probe))
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Decide a request immediately.
    pub fn request(&self, request: ResourceRequest) -> Result<ResourceAllocation, AdmissionError> {
        request.validate()?;
        let mut state = self.state.lock();
        self.admit(&mut state, request, Utc::now())
    }

    fn admit(
        &self,
        state: &mut AdmissionState,
        request: ResourceRequest,
        now: DateTime<Utc>,
    ) -> Result<ResourceAllocation, AdmissionError> {
        let resource = request.resource_type;
        let ceiling = self.config.per_agent_ceiling.get(resource);
        let held = state.held_by(&request.agent_id, resource);
        if held + request.amount > ceiling {
            let reason = format!(
                "agent {} would hold {:.2} {} (ceiling {:.2})",
                request.agent_id,
                held + request.amount,
                resource,
                ceiling
            );
            warn!(request_id = %request.request_id, agent_id = %request.agent_id, %reason, "Admission denied");
            return Err(AdmissionError::Denied {
                request_id: request.request_id,
                reason,
            });
        }

        let available = self.probe.available(resource) - state.reserved(resource);
        if request.amount > available {
            let reason = format!(
                "{:.2} {} requested, {:.2} available",
                request.amount,
                resource,
                available.max(0.0)
            );
            warn!(request_id = %request.request_id, agent_id = %request.agent_id, %reason, "Admission denied");
            return Err(AdmissionError::Denied {
                request_id: request.request_id,
                reason,
            });
        }

        let lease = chrono::Duration::from_std(request.duration)
            .unwrap_or_else(|_| chrono::Duration::seconds(i64::from(u32::MAX)));
        let allocation = ResourceAllocation {
            allocation_id: uuid::Uuid::new_v4().to_string(),
            request_id: request.request_id,
            agent_id: request.agent_id,
            resource_type: resource,
            amount: request.amount,
            priority: request.priority,
            purpose: request.purpose,
            start_time: now,
            end_time: now + lease,
            status: AllocationStatus::Active,
        };
        debug!(
            allocation_id = %allocation.allocation_id,
            agent_id = %allocation.agent_id,
            resource = %resource,
            amount = allocation.amount,
            "Allocation granted"
        );
        state
            .active
            .insert(allocation.allocation_id.clone(), allocation.clone());
        Ok(allocation)
    }

    /// Return an allocation; it moves to history as `completed`.
    pub fn release(&self, allocation_id: &str) -> Result<ResourceAllocation, AdmissionError> {
        self.retire(allocation_id, AllocationStatus::Completed)
    }

    pub fn suspend(&self, allocation_id: &str) -> Result<ResourceAllocation, AdmissionError> {
        self.retire(allocation_id, AllocationStatus::Suspended)
    }

    pub fn fail(&self, allocation_id: &str) -> Result<ResourceAllocation, AdmissionError> {
        self.retire(allocation_id, AllocationStatus::Failed)
    }

    fn retire(
        &self,
        allocation_id: &str,
        status: AllocationStatus,
    ) -> Result<ResourceAllocation, AdmissionError> {
        let allocation = self
            .state
            .lock()
            .retire(allocation_id, status, Utc::now())
            .ok_or_else(|| AdmissionError::AllocationNotFound(allocation_id.to_string()))?;
        debug!(allocation_id, status = ?status, "Allocation retired");
        Ok(allocation)
    }

    /// Reclaim every active allocation whose lease ended before `now`.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .active
            .values()
            .filter(|a| a.is_expired(now))
            .map(|a| a.allocation_id.clone())
            .collect();
        for allocation_id in &expired {
            state.retire(allocation_id, AllocationStatus::Completed, now);
        }
        if !expired.is_empty() {
            info!(reclaimed = expired.len(), "Swept expired allocations");
        }
        expired.len()
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the handle is stopped.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let controller = Arc::clone(self);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        controller.sweep(Utc::now());
                    }
                }
            }
            debug!("Allocation sweeper stopped");
        });
        SweeperHandle {
            stop: Some(stop_tx),
            join: Some(join),
        }
    }

    /// Queue a request for [`process_pending`](Self::process_pending).
    pub fn submit(&self, request: ResourceRequest) -> Result<String, AdmissionError> {
        request.validate()?;
        let mut state = self.state.lock();
        let request_id = request.request_id.clone();
        let arrival = state.arrivals;
        state.arrivals += 1;
        state.pending.push(PendingRequest { request, arrival });
        Ok(request_id)
    }

    /// Serve every pending request, highest priority first, ties by arrival.
    /// Each one is granted or explicitly denied.
    pub fn process_pending(&self) -> Vec<AdmissionDecision> {
        let mut state = self.state.lock();
        let now = Utc::now();
        let mut decisions = Vec::with_capacity(state.pending.len());
        while let Some(PendingRequest { request, .. }) = state.pending.pop() {
            let request_id = request.request_id.clone();
            let agent_id = request.agent_id.clone();
            let priority = request.priority;
            let outcome = self.admit(&mut state, request, now);
            decisions.push(AdmissionDecision {
                request_id,
                agent_id,
                priority,
                outcome,
            });
        }
        decisions
    }

    pub fn agent_status(&self, agent_id: &str) -> AgentStatus {
        let state = self.state.lock();
        let active: Vec<ResourceAllocation> = state
            .active
            .values()
            .filter(|a| a.agent_id == agent_id)
            .cloned()
            .collect();
        let mut totals = BTreeMap::new();
        for allocation in &active {
            *totals.entry(allocation.resource_type).or_insert(0.0) += allocation.amount;
        }
        AgentStatus {
            agent_id: agent_id.to_string(),
            active,
            totals,
        }
    }

    pub fn snapshot(&self) -> AdmissionSnapshot {
        let state = self.state.lock();
        AdmissionSnapshot {
            active_allocations: state.active.len(),
            history_allocations: state.history.len(),
            pending_requests: state.pending.len(),
            reserved: ResourceType::ALL
                .into_iter()
                .map(|t| (t, state.reserved(t)))
                .filter(|(_, amount)| *amount > 0.0)
                .collect(),
        }
    }

    pub fn history(&self) -> Vec<ResourceAllocation> {
        self.state.lock().history.iter().cloned().collect()
    }
}

/// Stops the background sweeper.
pub struct SweeperHandle {
    stop: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}
