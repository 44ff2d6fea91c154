//! Dependency Resolver
//!
//! Partitions a batch of frames into ordered execution groups. Group 0 holds
//! every frame with no in-batch dependency; each later group holds the frames
//! whose in-batch dependencies all sit in earlier groups. Dependencies on
//! frames outside the batch are treated as already satisfied.

use crate::catalog::Frame;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Warning attached to a plan when the remaining frames could not be ordered.
/// The listed frames run together as the final group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CyclicDependencyDegraded {
    pub frame_ids: Vec<String>,
}

impl fmt::Display for CyclicDependencyDegraded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CyclicDependencyDegraded: {} frame(s) scheduled without ordering: {}",
            self.frame_ids.len(),
            self.frame_ids.join(", ")
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    pub groups: Vec<Vec<Arc<Frame>>>,
    pub degraded: Option<CyclicDependencyDegraded>,
}

impl ExecutionPlan {
    pub fn total_frames(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Size of group 0.
    pub fn independent_frames(&self) -> usize {
        self.groups.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Index of the group holding `frame_id`.
    pub fn group_of(&self, frame_id: &str) -> Option<usize> {
        self.groups
            .iter()
            .position(|group| group.iter().any(|f| f.id == frame_id))
    }

    pub fn group_ids(&self) -> Vec<Vec<String>> {
        self.groups
            .iter()
            .map(|group| group.iter().map(|f| f.id.clone()).collect())
            .collect()
    }
}

/// Group `frames`, keeping insertion order inside every group. A frame id
/// listed twice is scheduled once.
pub fn resolve(frames: &[Arc<Frame>]) -> ExecutionPlan {
    let mut seen = HashSet::new();
    let mut remaining: Vec<Arc<Frame>> = frames
        .iter()
        .filter(|f| seen.insert(f.id.clone()))
        .cloned()
        .collect();

    let mut plan = ExecutionPlan::default();
    while !remaining.is_empty() {
        let pending: HashSet<&str> = remaining.iter().map(|f| f.id.as_str()).collect();
        let (ready, blocked): (Vec<_>, Vec<_>) = remaining.iter().cloned().partition(|frame| {
            !frame
                .dependencies
                .iter()
                .any(|dep| pending.contains(dep.as_str()))
        });

        if ready.is_empty() {
            let warning = CyclicDependencyDegraded {
                frame_ids: blocked.iter().map(|f| f.id.clone()).collect(),
            };
            warn!(
                frame_ids = ?warning.frame_ids,
                "Circular dependency detected; running remaining frames as one group"
            );
            plan.groups.push(blocked);
            plan.degraded = Some(warning);
            break;
        }

        plan.groups.push(ready);
        remaining = blocked;
    }
    plan
}
