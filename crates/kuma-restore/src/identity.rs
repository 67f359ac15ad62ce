//! Snapshot id → target id resolution

use kuma_restore_types::{EntityKind, RestoreError, RestoreResult, SnapshotId, TargetId};
use std::collections::HashMap;
use tracing::debug;

/// Mapping from snapshot entities to the target entities that restore them
///
/// Populated as entities are created or matched by name. References are only ever
/// resolved through this map, so a reference to something not yet restored is an
/// error rather than a silently missing field.
#[derive(Debug, Default, Clone)]
pub struct IdentityMap {
    mappings: HashMap<(EntityKind, SnapshotId), TargetId>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `old_id` is restored as `new_id`
    ///
    /// Recording the same pair twice is a no-op. Recording a different target for an
    /// already mapped entity means it was restored twice and fails with
    /// `IdentityConflict`.
    pub fn record_mapping(
        &mut self,
        kind: EntityKind,
        old_id: SnapshotId,
        new_id: TargetId,
    ) -> RestoreResult<()> {
        match self.mappings.get(&(kind, old_id)) {
            Some(existing) if *existing == new_id => Ok(()),
            Some(existing) => Err(RestoreError::IdentityConflict {
                kind,
                old_id,
                existing: *existing,
                attempted: new_id,
            }),
            None => {
                debug!("Mapped {} {} -> {}", kind, old_id, new_id);
                self.mappings.insert((kind, old_id), new_id);
                Ok(())
            }
        }
    }

    /// Target id for a snapshot entity that must already be restored
    pub fn resolve(&self, kind: EntityKind, old_id: SnapshotId) -> RestoreResult<TargetId> {
        self.lookup(kind, old_id)
            .ok_or(RestoreError::UnresolvedReference { kind, old_id })
    }

    /// Like `resolve`, but an absent reference resolves to `None`
    pub fn resolve_optional(
        &self,
        kind: EntityKind,
        old_id: Option<SnapshotId>,
    ) -> RestoreResult<Option<TargetId>> {
        old_id.map(|old_id| self.resolve(kind, old_id)).transpose()
    }

    /// Resolve a set of references, splitting it into resolved ids and the ones
    /// that have no mapping
    pub fn resolve_each(
        &self,
        kind: EntityKind,
        old_ids: &[SnapshotId],
    ) -> (Vec<TargetId>, Vec<SnapshotId>) {
        let mut resolved = Vec::with_capacity(old_ids.len());
        let mut missing = Vec::new();
        for old_id in old_ids {
            match self.lookup(kind, *old_id) {
                Some(new_id) => resolved.push(new_id),
                None => missing.push(*old_id),
            }
        }
        (resolved, missing)
    }

    pub fn lookup(&self, kind: EntityKind, old_id: SnapshotId) -> Option<TargetId> {
        self.mappings.get(&(kind, old_id)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_before_record_fails() {
        // Arrange
        let map = IdentityMap::new();

        // Act
        let result = map.resolve(EntityKind::Group, SnapshotId(7));

        // Assert
        match result {
            Err(RestoreError::UnresolvedReference { kind, old_id }) => {
                assert_eq!(kind, EntityKind::Group);
                assert_eq!(old_id, SnapshotId(7));
            }
            other => panic!("expected UnresolvedReference, got {:?}", other),
        }
    }

    #[test]
    fn test_record_then_resolve() {
        let mut map = IdentityMap::new();
        map.record_mapping(EntityKind::Group, SnapshotId(7), TargetId(70))
            .unwrap();

        assert_eq!(
            map.resolve(EntityKind::Group, SnapshotId(7)).unwrap(),
            TargetId(70)
        );
    }

    #[test]
    fn test_kinds_are_separate_namespaces() {
        let mut map = IdentityMap::new();
        map.record_mapping(EntityKind::Notification, SnapshotId(1), TargetId(10))
            .unwrap();

        assert!(map.resolve(EntityKind::Group, SnapshotId(1)).is_err());
        assert_eq!(map.lookup(EntityKind::Group, SnapshotId(1)), None);
        assert_eq!(
            map.lookup(EntityKind::Notification, SnapshotId(1)),
            Some(TargetId(10))
        );
    }

    #[test]
    fn test_record_is_idempotent() {
        let mut map = IdentityMap::new();
        map.record_mapping(EntityKind::Monitor, SnapshotId(3), TargetId(30))
            .unwrap();

        assert!(map
            .record_mapping(EntityKind::Monitor, SnapshotId(3), TargetId(30))
            .is_ok());
    }

    #[test]
    fn test_conflicting_record_fails() {
        let mut map = IdentityMap::new();
        map.record_mapping(EntityKind::Monitor, SnapshotId(3), TargetId(30))
            .unwrap();

        let result = map.record_mapping(EntityKind::Monitor, SnapshotId(3), TargetId(31));

        assert!(matches!(
            result,
            Err(RestoreError::IdentityConflict {
                existing: TargetId(30),
                attempted: TargetId(31),
                ..
            })
        ));
        assert_eq!(map.lookup(EntityKind::Monitor, SnapshotId(3)), Some(TargetId(30)));
    }

    #[test]
    fn test_resolve_optional() {
        let mut map = IdentityMap::new();
        map.record_mapping(EntityKind::Group, SnapshotId(1), TargetId(100))
            .unwrap();

        assert_eq!(map.resolve_optional(EntityKind::Group, None).unwrap(), None);
        assert_eq!(
            map.resolve_optional(EntityKind::Group, Some(SnapshotId(1)))
                .unwrap(),
            Some(TargetId(100))
        );
        assert!(map
            .resolve_optional(EntityKind::Group, Some(SnapshotId(2)))
            .is_err());
    }

    #[test]
    fn test_resolve_each_splits_missing() {
        let mut map = IdentityMap::new();
        map.record_mapping(EntityKind::Notification, SnapshotId(1), TargetId(11))
            .unwrap();
        map.record_mapping(EntityKind::Notification, SnapshotId(3), TargetId(33))
            .unwrap();

        let (resolved, missing) = map.resolve_each(
            EntityKind::Notification,
            &[SnapshotId(1), SnapshotId(2), SnapshotId(3)],
        );

        assert_eq!(resolved, vec![TargetId(11), TargetId(33)]);
        assert_eq!(missing, vec![SnapshotId(2)]);
    }
}
