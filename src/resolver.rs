//! # Resolver Module
//!
//! Backfills persisted ids into relation references. A reference whose key
//! matches a snapshot record receives that record's id; any other reference
//! keeps an absent id, meaning its target is created in this batch or a later
//! one.

use crate::error::{ReconcileError, Result, Side};
use crate::identity::{CompositeKey, KeyBuilder};
use crate::model::{PersistedId, Record, Reference};
use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Read-only lookup from composite key to snapshot position and id.
#[derive(Debug, Clone, Default)]
pub struct SnapshotIndex {
    entries: HashMap<CompositeKey, (usize, PersistedId)>,
}

impl SnapshotIndex {
    /// Index a snapshot, rejecting records without ids or with shared keys.
    pub fn build(snapshot: &[Record], keys: &KeyBuilder) -> Result<Self> {
        let mut entries = HashMap::with_capacity(snapshot.len());
        for (position, record) in snapshot.iter().enumerate() {
            let key = keys.key(record);
            let id = record
                .id
                .ok_or_else(|| ReconcileError::MissingPersistedId { key: key.clone() })?;
            if let Some((first, _)) = entries.get(&key) {
                return Err(ReconcileError::DuplicateKey {
                    key,
                    side: Side::Snapshot,
                    first: *first,
                    second: position,
                });
            }
            entries.insert(key, (position, id));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn id_for(&self, key: &CompositeKey) -> Option<PersistedId> {
        self.entries.get(key).map(|(_, id)| *id)
    }

    pub fn position_of(&self, key: &CompositeKey) -> Option<usize> {
        self.entries.get(key).map(|(position, _)| *position)
    }

    pub fn contains(&self, key: &CompositeKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &CompositeKey> {
        self.entries.keys()
    }
}

/// Attach the persisted id of the snapshot record `reference` points at.
///
/// Returns whether an id was found. An unmatched reference has its id
/// cleared rather than left stale.
pub fn resolve_reference(
    reference: &mut Reference,
    index: &SnapshotIndex,
    keys: &KeyBuilder,
) -> bool {
    reference.id = index.id_for(&keys.key(reference));
    reference.id.is_some()
}

/// Outcome counts of one resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub resolved: usize,
    pub pending: usize,
}

impl std::ops::Add for ResolutionStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            resolved: self.resolved + rhs.resolved,
            pending: self.pending + rhs.pending,
        }
    }
}

fn resolve_record(record: &mut Record, index: &SnapshotIndex, keys: &KeyBuilder) -> ResolutionStats {
    let mut stats = ResolutionStats::default();
    for reference in record.references_mut() {
        if resolve_reference(reference, index, keys) {
            stats.resolved += 1;
        } else {
            stats.pending += 1;
        }
    }
    stats
}

/// Resolve every parent and child reference of every record.
#[instrument(skip(records, index, keys), fields(records = records.len()), level = "debug")]
pub fn resolve_relations(
    records: &mut [Record],
    index: &SnapshotIndex,
    keys: &KeyBuilder,
    parallel: bool,
) -> ResolutionStats {
    let stats = if parallel {
        records
            .par_iter_mut()
            .map(|record| resolve_record(record, index, keys))
            .reduce(ResolutionStats::default, |a, b| a + b)
    } else {
        records
            .iter_mut()
            .map(|record| resolve_record(record, index, keys))
            .fold(ResolutionStats::default(), |a, b| a + b)
    };
    debug!(
        resolved = stats.resolved,
        pending = stats.pending,
        "resolved relation references"
    );
    stats
}

/// A reference that matches neither the snapshot nor the current batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingReference {
    /// Record holding the reference.
    pub holder: CompositeKey,
    /// Key the reference points at.
    pub target: CompositeKey,
}

/// Collect unresolved references whose target is absent from the batch too.
///
/// These are kept on the records untouched; the list is diagnostic.
pub fn find_dangling(
    records: &[Record],
    candidate_keys: &HashSet<CompositeKey>,
    keys: &KeyBuilder,
) -> Vec<DanglingReference> {
    let mut dangling = Vec::new();
    for record in records {
        for reference in record.references().filter(|r| !r.is_resolved()) {
            let target = keys.key(reference);
            if !candidate_keys.contains(&target) {
                let holder = keys.key(record);
                warn!(%holder, %target, "relation points outside snapshot and batch");
                dangling.push(DanglingReference { holder, target });
            }
        }
    }
    dangling
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataSource, Environment};

    fn persisted(wdpa_p_id: &str, id: i64) -> Record {
        Record::candidate(
            Environment::Terrestrial,
            "MEX",
            555,
            wdpa_p_id,
            DataSource::ProtectedPlanet,
        )
        .with_id(PersistedId(id))
    }

    #[test]
    fn test_build_rejects_missing_id() {
        let mut record = persisted("555", 1);
        record.id = None;
        let err = SnapshotIndex::build(&[record], &KeyBuilder::default()).unwrap_err();
        assert!(matches!(err, ReconcileError::MissingPersistedId { .. }));
    }

    #[test]
    fn test_build_rejects_duplicate_snapshot_keys() {
        let err = SnapshotIndex::build(
            &[persisted("555", 1), persisted("555", 2)],
            &KeyBuilder::default(),
        )
        .unwrap_err();
        match err {
            ReconcileError::DuplicateKey {
                side,
                first,
                second,
                ..
            } => {
                assert_eq!(side, Side::Snapshot);
                assert_eq!((first, second), (0, 1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reference_to_existing_record_gets_id() {
        let keys = KeyBuilder::default();
        let index = SnapshotIndex::build(&[persisted("555", 7)], &keys).unwrap();

        let mut reference = Reference::to_record(&persisted("555", 7));
        reference.id = None;
        assert!(resolve_reference(&mut reference, &index, &keys));
        assert_eq!(reference.id, Some(PersistedId(7)));
    }

    #[test]
    fn test_reference_to_new_record_stays_unresolved() {
        let keys = KeyBuilder::default();
        let index = SnapshotIndex::build(&[persisted("555", 7)], &keys).unwrap();

        let mut reference = Reference::to_record(&persisted("555_A", 0));
        reference.id = Some(PersistedId(99));
        assert!(!resolve_reference(&mut reference, &index, &keys));
        assert_eq!(reference.id, None);
    }

    #[test]
    fn test_resolve_relations_counts_each_reference() {
        let keys = KeyBuilder::default();
        let index = SnapshotIndex::build(&[persisted("555", 7)], &keys).unwrap();

        let mut parent = persisted("555", 0);
        parent.id = None;
        let mut child = persisted("555_A", 0);
        child.id = None;
        parent.children = Some(vec![Reference::to_record(&child)]);
        child.parent = Some(Reference::to_record(&parent));

        let mut records = vec![parent, child];
        let stats = resolve_relations(&mut records, &index, &keys, true);
        assert_eq!(stats, ResolutionStats { resolved: 1, pending: 1 });
        assert_eq!(records[1].parent.as_ref().unwrap().id, Some(PersistedId(7)));
        assert_eq!(records[0].children.as_ref().unwrap()[0].id, None);
    }

    #[test]
    fn test_find_dangling_ignores_batch_targets() {
        let keys = KeyBuilder::default();
        let mut holder = persisted("555_A", 0);
        holder.id = None;
        let sibling = persisted("555_B", 0);
        let missing = persisted("555_Z", 0);
        holder.children = Some(vec![
            Reference::to_record(&sibling),
            Reference::to_record(&missing),
        ]);

        let candidate_keys: HashSet<CompositeKey> =
            [keys.key(&holder), keys.key(&sibling)].into_iter().collect();
        let dangling = find_dangling(&[holder.clone()], &candidate_keys, &keys);
        assert_eq!(
            dangling,
            vec![DanglingReference {
                holder: keys.key(&holder),
                target: keys.key(&missing),
            }]
        );
    }
}
