//! Frame executor: the bounded attempt loop for a single frame.

use crate::admission::{
    AdmissionController, AdmissionPriority, ResourceAllocation, ResourceDemand, ResourceRequest,
};
use crate::capability::CapabilityRegistry;
use crate::catalog::{ResultMap, PARAM_PRIORITY, PARAM_RESOURCES};
use crate::config::ExecutorConfig;
use crate::error::{AdmissionError, FrameError};
use crate::execution::context::ExecutionContext;
use crate::execution::history::{AttemptRecord, ExecutionHistory};
use crate::execution::outcome::FrameOutcome;
use crate::recovery::{FailureCategory, FailureContext, RecoveryManager};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct FrameExecutor {
    registry: Arc<CapabilityRegistry>,
    admission: Arc<AdmissionController>,
    recovery: Arc<RecoveryManager>,
    history: Arc<ExecutionHistory>,
    config: ExecutorConfig,
}

impl FrameExecutor {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        admission: Arc<AdmissionController>,
        recovery: Arc<RecoveryManager>,
        history: Arc<ExecutionHistory>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry,
            admission,
            recovery,
            history,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<ExecutionHistory> {
        &self.history
    }

    pub fn recovery(&self) -> &Arc<RecoveryManager> {
        &self.recovery
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// Run attempts until success, a resource denial, or the attempt ceiling.
    pub async fn execute(&self, mut ctx: ExecutionContext) -> FrameOutcome {
        let started = Instant::now();
        loop {
            let attempt = ctx.attempt_number();
            let attempt_started = Instant::now();
            debug!(
                frame_id = %ctx.frame_id(),
                stage = %ctx.stage,
                attempt,
                timeout_secs = ctx.timeout.as_secs(),
                "Starting attempt"
            );

            let allocations = match self.acquire(&ctx) {
                Ok(allocations) => allocations,
                Err(err) => {
                    let reason = match err {
                        AdmissionError::Denied { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    let error = FrameError::ResourceUnavailable {
                        frame_id: ctx.frame.id.clone(),
                        reason,
                    };
                    warn!(frame_id = %ctx.frame_id(), attempt, error = %error, "Admission denied; not retrying");
                    let category = error.category();
                    self.record(&ctx, attempt_started, Some((&error, category)));
                    self.recovery
                        .record_terminal(&ctx.frame.id, attempt, category, &error.cause());
                    ctx.attempt_count += 1;
                    return FrameOutcome::failed(
                        ctx.frame.id.clone(),
                        ctx.stage,
                        error,
                        ctx.attempt_count,
                        started.elapsed(),
                    );
                }
            };

            let result = self.invoke(&ctx).await;
            self.release(&allocations);

            let error = match result {
                Ok(result) => {
                    self.record(&ctx, attempt_started, None);
                    info!(frame_id = %ctx.frame_id(), stage = %ctx.stage, attempt, "Frame succeeded");
                    return FrameOutcome::succeeded(
                        ctx.frame.id.clone(),
                        ctx.stage,
                        result,
                        attempt,
                        started.elapsed(),
                    );
                }
                Err(error) => error,
            };

            let message = error.to_string();
            let category = error.category();
            self.record(&ctx, attempt_started, Some((&error, category)));
            ctx.attempt_count += 1;
            warn!(
                frame_id = %ctx.frame_id(),
                attempt,
                max_attempts = ctx.max_attempts,
                category = %category,
                error = %message,
                "Attempt failed"
            );

            if !ctx.has_attempts_left() {
                self.recovery
                    .record_terminal(&ctx.frame.id, attempt, category, &error.cause());
                return FrameOutcome::failed(
                    ctx.frame.id.clone(),
                    ctx.stage,
                    FrameError::AttemptsExhausted {
                        frame_id: ctx.frame.id.clone(),
                        attempts: ctx.attempt_count,
                        category,
                        last_error: message,
                    },
                    ctx.attempt_count,
                    started.elapsed(),
                );
            }

            let recovery = self
                .recovery
                .recover(FailureContext {
                    frame_id: ctx.frame.id.clone(),
                    category,
                    error_message: error.cause(),
                    attempt,
                    max_attempts: ctx.max_attempts,
                    timeout_secs: ctx.timeout.as_secs(),
                    parameters: ctx.parameters.clone(),
                })
                .await;
            if recovery.adjustment.sweep_allocations {
                self.admission.sweep(Utc::now());
            }
            ctx.apply(&recovery.adjustment);
        }
    }

    /// Grant every declared resource demand, or none of them.
    fn acquire(&self, ctx: &ExecutionContext) -> Result<Vec<ResourceAllocation>, AdmissionError> {
        let Some(resources) = ctx.parameters.get(PARAM_RESOURCES) else {
            return Ok(Vec::new());
        };
        let demands = ResourceDemand::parse_all(resources)?;
        let priority = match ctx.parameters.get(PARAM_PRIORITY) {
            Some(Value::String(raw)) => raw.parse()?,
            Some(other) => {
                return Err(AdmissionError::InvalidRequest(format!(
                    "priority must be a string, got {}",
                    other
                )))
            }
            None => AdmissionPriority::default(),
        };

        let mut granted = Vec::with_capacity(demands.len());
        for demand in demands {
            let request = ResourceRequest::new(ctx.frame.id.clone(), demand.resource_type, demand.amount)
                .with_priority(priority)
                .with_duration(ctx.timeout)
                .with_purpose(format!("{} attempt {}", ctx.frame.id, ctx.attempt_number()));
            match self.admission.request(request) {
                Ok(allocation) => granted.push(allocation),
                Err(err) => {
                    self.release(&granted);
                    return Err(err);
                }
            }
        }
        Ok(granted)
    }

    fn release(&self, allocations: &[ResourceAllocation]) {
        for allocation in allocations {
            // An expired lease may already have been swept.
            if let Err(e) = self.admission.release(&allocation.allocation_id) {
                debug!(allocation_id = %allocation.allocation_id, error = %e, "Allocation already retired");
            }
        }
    }

    async fn invoke(&self, ctx: &ExecutionContext) -> Result<ResultMap, FrameError> {
        let frame_id = ctx.frame.id.clone();
        let capability = self
            .registry
            .resolve(&ctx.frame)
            .map_err(|source| FrameError::Capability {
                frame_id: frame_id.clone(),
                source,
            })?;

        let result = match tokio::time::timeout(ctx.timeout, capability.invoke(ctx.capability_input())).await {
            Err(_) => {
                return Err(FrameError::Timeout {
                    frame_id,
                    timeout_secs: ctx.timeout.as_secs(),
                })
            }
            Ok(Err(source)) => return Err(FrameError::Capability { frame_id, source }),
            Ok(Ok(result)) => result,
        };

        check_success_criteria(ctx, &result)?;
        Ok(result)
    }

    fn record(
        &self,
        ctx: &ExecutionContext,
        attempt_started: Instant,
        failure: Option<(&FrameError, FailureCategory)>,
    ) {
        self.history.append(AttemptRecord {
            run_id: ctx.run_id.clone(),
            frame_id: ctx.frame.id.clone(),
            stage: ctx.stage,
            attempt: ctx.attempt_number(),
            duration: attempt_started.elapsed(),
            error: failure
                .map(|(error, category)| (error.kind().to_string(), category, error.to_string())),
        });
    }
}

/// Every criterion key must be present with an exactly equal value.
fn check_success_criteria(ctx: &ExecutionContext, result: &ResultMap) -> Result<(), FrameError> {
    for (key, expected) in &ctx.frame.success_criteria {
        let detail = match result.get(key) {
            Some(actual) if actual == expected => continue,
            Some(actual) => format!("field {} expected {}, got {}", key, expected, actual),
            None => format!("field {} missing (expected {})", key, expected),
        };
        return Err(FrameError::SuccessCriteriaUnmet {
            frame_id: ctx.frame.id.clone(),
            detail,
        });
    }
    Ok(())
}
