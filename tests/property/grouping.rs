//! Property-based tests for dependency grouping

use proptest::prelude::*;
use scaffold_engine::catalog::{CapabilityKind, Catalog, Frame};
use scaffold_engine::resolver;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const MAX_FRAMES: usize = 12;

fn frame(id: String, dependencies: Vec<String>) -> Frame {
    Frame {
        name: id.clone(),
        id,
        capability_kind: CapabilityKind::InProcess,
        entry_point: "builtin.echo".to_string(),
        dependencies,
        rollback_description: String::new(),
        version: "1.0".to_string(),
        parameters: BTreeMap::new(),
        success_criteria: BTreeMap::new(),
    }
}

/// Row `i` of the adjacency bits selects dependencies among frames `0..i`,
/// so the resulting graph is acyclic.
fn dag(bits: &[Vec<bool>]) -> Vec<Frame> {
    bits.iter()
        .enumerate()
        .map(|(i, row)| {
            let deps = row
                .iter()
                .take(i)
                .enumerate()
                .filter(|(_, set)| **set)
                .map(|(j, _)| format!("f{}", j))
                .collect();
            frame(format!("f{}", i), deps)
        })
        .collect()
}

fn adjacency() -> impl Strategy<Value = Vec<Vec<bool>>> {
    prop::collection::vec(prop::collection::vec(any::<bool>(), MAX_FRAMES), 1..MAX_FRAMES)
}

/// Every frame lands in exactly one group, after all of its dependencies
#[test]
fn test_groups_partition_and_respect_dependencies() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&adjacency(), |bits| {
            let frames: Vec<Arc<Frame>> = dag(&bits).into_iter().map(Arc::new).collect();
            let plan = resolver::resolve(&frames);

            prop_assert!(plan.degraded.is_none());
            prop_assert_eq!(plan.total_frames(), frames.len());

            let mut group_of: HashMap<&str, usize> = HashMap::new();
            for (index, group) in plan.groups.iter().enumerate() {
                prop_assert!(!group.is_empty());
                for member in group {
                    prop_assert!(group_of.insert(member.id.as_str(), index).is_none());
                }
            }
            prop_assert_eq!(group_of.len(), frames.len());

            for frame in &frames {
                let own = group_of[frame.id.as_str()];
                for dep in &frame.dependencies {
                    prop_assert!(group_of[dep.as_str()] < own);
                }
                if frame.dependencies.is_empty() {
                    prop_assert_eq!(own, 0);
                }
            }
            Ok(())
        })
        .unwrap();
}

/// A cycle degrades the plan but never drops or duplicates frames
#[test]
fn test_cycles_degrade_without_losing_frames() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(adjacency(), 2usize..MAX_FRAMES), |(bits, cycle_len)| {
            let mut frames = dag(&bits);
            let offset = frames.len();
            for i in 0..cycle_len {
                let next = offset + (i + 1) % cycle_len;
                frames.push(frame(format!("f{}", offset + i), vec![format!("f{}", next)]));
            }
            let frames: Vec<Arc<Frame>> = frames.into_iter().map(Arc::new).collect();
            let plan = resolver::resolve(&frames);

            let degraded = plan.degraded.clone();
            prop_assert!(degraded.is_some());
            prop_assert_eq!(degraded.map(|d| d.frame_ids.len()), Some(cycle_len));

            let mut seen: Vec<&str> = plan
                .groups
                .iter()
                .flatten()
                .map(|f| f.id.as_str())
                .collect();
            seen.sort_unstable();
            let mut expected: Vec<&str> = frames.iter().map(|f| f.id.as_str()).collect();
            expected.sort_unstable();
            prop_assert_eq!(seen, expected);
            Ok(())
        })
        .unwrap();
}

/// The catalog fingerprint ignores declaration order
#[test]
fn test_fingerprint_independent_of_order() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&adjacency(), |bits| {
            let frames = dag(&bits);
            let mut reversed = frames.clone();
            reversed.reverse();

            let forward = Catalog::new(frames, vec![]).unwrap();
            let backward = Catalog::new(reversed, vec![]).unwrap();
            prop_assert_eq!(forward.fingerprint(), backward.fingerprint());
            prop_assert_eq!(forward.dependency_edges(), backward.dependency_edges());
            Ok(())
        })
        .unwrap();
}
