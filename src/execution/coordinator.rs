//! Parallel execution coordinator: runs a batch group by group on a bounded
//! worker pool, with a barrier between groups.

use crate::catalog::Frame;
use crate::config::CoordinatorConfig;
use crate::execution::context::{BatchContext, ExecutionContext};
use crate::execution::executor::FrameExecutor;
use crate::execution::history::{millis, BatchSummary};
use crate::execution::outcome::{BatchOutcome, FrameOutcome};
use crate::resolver;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub struct ParallelCoordinator {
    executor: Arc<FrameExecutor>,
    config: CoordinatorConfig,
}

impl ParallelCoordinator {
    pub fn new(executor: Arc<FrameExecutor>, config: CoordinatorConfig) -> Self {
        Self { executor, config }
    }

    pub fn executor(&self) -> &Arc<FrameExecutor> {
        &self.executor
    }

    pub fn max_workers(&self) -> usize {
        self.config.max_workers.max(1)
    }

    /// Run `frames` as one batch.
    ///
    /// Every member of a group reaches a terminal outcome before the next
    /// group is dispatched. A frame whose in-batch dependency failed or was
    /// blocked is reported as blocked without being dispatched. Sibling
    /// failures never abort the batch.
    pub async fn run(&self, frames: &[Arc<Frame>], batch: &BatchContext) -> BatchOutcome {
        let started = Instant::now();
        let plan = resolver::resolve(frames);
        let semaphore = Arc::new(Semaphore::new(self.max_workers()));
        let mut unsuccessful: HashSet<String> = HashSet::new();
        let mut finished: HashMap<String, FrameOutcome> = HashMap::new();

        info!(
            run_id = %batch.run_id,
            stage = %batch.stage,
            total_frames = plan.total_frames(),
            groups = plan.groups.len(),
            max_workers = self.max_workers(),
            "Dispatching batch"
        );

        for (group_index, group) in plan.groups.iter().enumerate() {
            let mut futures = FuturesUnordered::new();
            for frame in group {
                let blockers: Vec<String> = frame
                    .dependencies
                    .iter()
                    .filter(|dep| unsuccessful.contains(*dep))
                    .cloned()
                    .collect();
                if !blockers.is_empty() {
                    warn!(frame_id = %frame.id, blocked_by = ?blockers, "Dependency did not succeed; frame not dispatched");
                    unsuccessful.insert(frame.id.clone());
                    finished.insert(
                        frame.id.clone(),
                        FrameOutcome::blocked(frame.id.clone(), batch.stage, blockers),
                    );
                    continue;
                }

                let ctx = ExecutionContext::for_frame(batch, Arc::clone(frame), self.executor.config());
                let executor = Arc::clone(&self.executor);
                let semaphore = Arc::clone(&semaphore);
                futures.push(async move {
                    // The semaphore is never closed.
                    let _permit = semaphore.acquire_owned().await.ok();
                    executor.execute(ctx).await
                });
            }

            while let Some(outcome) = futures.next().await {
                if !outcome.is_success() {
                    unsuccessful.insert(outcome.frame_id.clone());
                }
                finished.insert(outcome.frame_id.clone(), outcome);
            }
            info!(run_id = %batch.run_id, stage = %batch.stage, group_index, "Group complete");
        }

        let outcomes: Vec<FrameOutcome> = plan
            .groups
            .iter()
            .flatten()
            .filter_map(|frame| finished.remove(&frame.id))
            .collect();

        let wall = started.elapsed();
        let sum: Duration = outcomes.iter().map(|o| o.duration).sum();
        let summary = BatchSummary {
            run_id: batch.run_id.clone(),
            stage: batch.stage,
            total_frames: plan.total_frames(),
            independent_frames: plan.independent_frames(),
            groups: plan.groups.len(),
            successful: outcomes.iter().filter(|o| o.is_success()).count(),
            failed: outcomes
                .iter()
                .filter(|o| o.error.is_some())
                .count(),
            blocked: outcomes.iter().filter(|o| !o.blocked_by.is_empty()).count(),
            wall_clock_ms: millis(wall),
            sum_durations_ms: millis(sum),
            speedup: BatchSummary::speedup_of(sum, wall),
            time_saved_ms: millis(sum.saturating_sub(wall)),
            degraded: plan.degraded.is_some(),
            timestamp: Utc::now(),
        };
        info!(
            run_id = %summary.run_id,
            stage = %summary.stage,
            successful = summary.successful,
            failed = summary.failed,
            blocked = summary.blocked,
            speedup = summary.speedup,
            "Batch complete"
        );
        self.executor.history().push_batch(summary.clone());

        BatchOutcome {
            outcomes,
            groups: plan.group_ids(),
            degraded: plan.degraded,
            summary,
        }
    }
}
