//! Group creation order
//!
//! Groups form a forest through their parent references. Parents have to exist on the
//! target before their children can point at them, so groups are created breadth-first
//! from the roots.

use kuma_restore_types::{GroupRecord, SnapshotId};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::warn;

/// How an ordered group relates to its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLink {
    /// Top-level group
    None,
    /// Parent is in the snapshot and precedes this group
    InSnapshot(SnapshotId),
    /// Parent is missing from the snapshot or part of a cycle; created at top level
    Detached(SnapshotId),
}

impl ParentLink {
    pub fn in_snapshot(&self) -> Option<SnapshotId> {
        match self {
            ParentLink::InSnapshot(id) => Some(*id),
            _ => None,
        }
    }
}

/// A group together with the parent link it will be created with
#[derive(Debug, Clone, Copy)]
pub struct OrderedGroup<'a> {
    pub record: &'a GroupRecord,
    pub parent: ParentLink,
}

/// Order groups so every parent precedes its children
///
/// Each group is emitted exactly once. Siblings keep their snapshot order. Groups that
/// cannot be reached from a root (cycles, self-parents) are emitted at their first
/// position in the snapshot with the offending edge detached.
pub fn order_groups(groups: &[GroupRecord]) -> Vec<OrderedGroup<'_>> {
    let known: HashSet<SnapshotId> = groups.iter().map(|g| g.old_id).collect();

    let mut children: HashMap<SnapshotId, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for (index, group) in groups.iter().enumerate() {
        match group.parent_old_id {
            Some(parent) if known.contains(&parent) => {
                children.entry(parent).or_default().push(index)
            }
            Some(parent) => {
                warn!(
                    "Group '{}' ({}) references parent {} which is not in the backup, creating it at top level",
                    group.name, group.old_id, parent
                );
                roots.push((index, ParentLink::Detached(parent)));
            }
            None => roots.push((index, ParentLink::None)),
        }
    }

    let mut ordered = Vec::with_capacity(groups.len());
    let mut emitted = vec![false; groups.len()];
    let mut queue: VecDeque<(usize, ParentLink)> = roots.into_iter().collect();
    drain(groups, &children, &mut queue, &mut emitted, &mut ordered);

    // Whatever is left hangs off a cycle
    for index in 0..groups.len() {
        if emitted[index] {
            continue;
        }
        let group = &groups[index];
        // Only groups with an in-snapshot parent can be left over
        let parent = group.parent_old_id.unwrap_or(group.old_id);
        warn!(
            "Group '{}' ({}) is part of a parent cycle, creating it at top level",
            group.name, group.old_id
        );
        queue.push_back((index, ParentLink::Detached(parent)));
        drain(groups, &children, &mut queue, &mut emitted, &mut ordered);
    }

    ordered
}

fn drain<'a>(
    groups: &'a [GroupRecord],
    children: &HashMap<SnapshotId, Vec<usize>>,
    queue: &mut VecDeque<(usize, ParentLink)>,
    emitted: &mut [bool],
    ordered: &mut Vec<OrderedGroup<'a>>,
) {
    while let Some((index, parent)) = queue.pop_front() {
        if emitted[index] {
            continue;
        }
        emitted[index] = true;
        let record = &groups[index];
        ordered.push(OrderedGroup { record, parent });

        if let Some(kids) = children.get(&record.old_id) {
            for &child in kids {
                if !emitted[child] {
                    queue.push_back((child, ParentLink::InSnapshot(record.old_id)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use serde_json::Map;

    fn group(id: i64, parent: Option<i64>) -> GroupRecord {
        GroupRecord {
            old_id: SnapshotId(id),
            name: format!("G{}", id),
            parent_old_id: parent.map(SnapshotId),
            raw: Map::new(),
        }
    }

    fn ids(ordered: &[OrderedGroup<'_>]) -> Vec<i64> {
        ordered.iter().map(|g| g.record.old_id.get()).collect()
    }

    fn assert_parents_first(groups: &[GroupRecord], ordered: &[OrderedGroup<'_>]) {
        let position: HashMap<SnapshotId, usize> = ordered
            .iter()
            .enumerate()
            .map(|(i, g)| (g.record.old_id, i))
            .collect();
        for entry in ordered {
            if let ParentLink::InSnapshot(parent) = entry.parent {
                assert!(
                    position[&parent] < position[&entry.record.old_id],
                    "parent {} must precede {}",
                    parent,
                    entry.record.old_id
                );
            }
        }
        assert_eq!(ordered.len(), groups.len());
    }

    #[test]
    fn test_chain_is_ordered_parent_first() {
        // Arrange: C(parent=B), B(parent=A), A listed in reverse
        let groups = vec![group(3, Some(2)), group(2, Some(1)), group(1, None)];

        // Act
        let ordered = order_groups(&groups);

        // Assert
        assert_eq!(ids(&ordered), vec![1, 2, 3]);
        assert_eq!(ordered[0].parent, ParentLink::None);
        assert_eq!(ordered[1].parent, ParentLink::InSnapshot(SnapshotId(1)));
        assert_eq!(ordered[2].parent, ParentLink::InSnapshot(SnapshotId(2)));
    }

    #[test]
    fn test_siblings_keep_snapshot_order() {
        let groups = vec![
            group(1, None),
            group(5, Some(1)),
            group(2, None),
            group(4, Some(1)),
            group(3, Some(2)),
        ];

        let ordered = order_groups(&groups);

        assert_eq!(ids(&ordered), vec![1, 2, 5, 4, 3]);
    }

    #[test]
    fn test_missing_parent_is_detached_root() {
        let groups = vec![group(1, Some(99)), group(2, Some(1))];

        let ordered = order_groups(&groups);

        assert_eq!(ids(&ordered), vec![1, 2]);
        assert_eq!(ordered[0].parent, ParentLink::Detached(SnapshotId(99)));
        assert_eq!(ordered[1].parent, ParentLink::InSnapshot(SnapshotId(1)));
    }

    #[test]
    fn test_cycle_terminates_and_emits_each_once() {
        // Arrange: 1 -> 2 -> 3 -> 1, plus 4 under 3 and an unrelated root
        let groups = vec![
            group(1, Some(3)),
            group(2, Some(1)),
            group(3, Some(2)),
            group(4, Some(3)),
            group(5, None),
        ];

        // Act
        let ordered = order_groups(&groups);

        // Assert
        assert_eq!(ids(&ordered), vec![5, 1, 2, 3, 4]);
        assert_eq!(ordered[1].parent, ParentLink::Detached(SnapshotId(3)));
        assert_parents_first(&groups, &ordered);
    }

    #[test]
    fn test_self_parent_is_detached() {
        let groups = vec![group(7, Some(7))];

        let ordered = order_groups(&groups);

        assert_eq!(ids(&ordered), vec![7]);
        assert_eq!(ordered[0].parent, ParentLink::Detached(SnapshotId(7)));
    }

    #[test]
    fn test_empty_input() {
        assert!(order_groups(&[]).is_empty());
    }

    #[test]
    fn test_random_forests_order_parents_first() {
        let mut rng = StdRng::seed_from_u64(0x5eed_cafe);

        for _ in 0..200 {
            let size = rng.gen_range(1..=30i64);
            // Parent always has a smaller id, so the input is a forest
            let mut groups: Vec<GroupRecord> = (1..=size)
                .map(|id| {
                    let parent = if id == 1 || rng.gen_bool(0.25) {
                        None
                    } else {
                        Some(rng.gen_range(1..id))
                    };
                    group(id, parent)
                })
                .collect();
            // Children may come before parents in the snapshot
            groups.shuffle(&mut rng);

            let ordered = order_groups(&groups);

            assert_parents_first(&groups, &ordered);
            assert!(ordered
                .iter()
                .all(|g| !matches!(g.parent, ParentLink::Detached(_))));
        }
    }
}
