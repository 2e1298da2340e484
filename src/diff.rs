//! # Diff Module
//!
//! Aligns a candidate batch against a persisted snapshot by composite key and
//! partitions it into new, changed and deleted records.
//!
//! Keys present on both sides are compared field by field:
//!
//! - plain fields change when the candidate value is present and differs
//! - numeric fields are rounded, then compared with a relative tolerance
//! - `parent` is compared by resolved id
//! - `children` is compared as a set of resolved ids; an unresolved child
//!   always counts as a change
//!
//! A candidate value of null never clears a plain or numeric field.

use crate::error::{ReconcileError, Result, Side};
use crate::fields::{Comparison, Field, FieldValue};
use crate::identity::{CompositeKey, KeyBuilder};
use crate::model::{PersistedId, Record, Reference};
use crate::resolver::{find_dangling, DanglingReference, SnapshotIndex};
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Rounding and tolerance applied to numeric fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericTolerance {
    /// Decimal places kept before comparing.
    pub precision: u32,
    /// Relative difference above which a value counts as changed.
    pub relative_threshold: f64,
    /// Added before rounding so half-way values round up.
    pub epsilon: f64,
}

impl Default for NumericTolerance {
    fn default() -> Self {
        Self {
            precision: crate::config::DEFAULT_NUMERIC_PRECISION,
            relative_threshold: crate::config::DEFAULT_RELATIVE_THRESHOLD,
            epsilon: crate::config::DEFAULT_ROUNDING_EPSILON,
        }
    }
}

impl NumericTolerance {
    fn factor(&self) -> f64 {
        10f64.powi(self.precision as i32)
    }

    /// Value expressed in whole units of the last kept decimal place.
    pub fn units(&self, value: f64) -> f64 {
        ((value + self.epsilon) * self.factor()).round()
    }

    pub fn round(&self, value: f64) -> f64 {
        self.units(value) / self.factor()
    }
}

/// Plain comparison: a present candidate value that differs from the snapshot.
pub fn plain_changed(candidate: &FieldValue<'_>, persisted: &FieldValue<'_>) -> bool {
    !candidate.is_null() && candidate != persisted
}

/// Numeric comparison with rounding and relative tolerance.
pub fn numeric_changed(
    candidate: Option<f64>,
    persisted: Option<f64>,
    tolerance: &NumericTolerance,
) -> bool {
    let Some(candidate) = candidate else {
        return false;
    };
    let Some(persisted) = persisted else {
        return true;
    };
    // Scaled units are exact integers, so only the threshold product carries
    // floating-point error. A difference of exactly the threshold is unchanged.
    let candidate = tolerance.units(candidate);
    let persisted = tolerance.units(persisted);
    if persisted == 0.0 {
        return candidate != 0.0;
    }
    let allowed = tolerance.relative_threshold * persisted.abs();
    (candidate - persisted).abs() - allowed > tolerance.epsilon * persisted.abs().max(1.0)
}

/// Single relation comparison by resolved id.
pub fn relation_changed(candidate: Option<&Reference>, persisted: Option<&Reference>) -> bool {
    match (candidate, persisted) {
        (None, None) => false,
        (Some(_), None) | (None, Some(_)) => true,
        (Some(candidate), Some(persisted)) => candidate.id != persisted.id,
    }
}

/// Multi relation comparison. An absent collection counts as empty.
pub fn relations_changed(candidate: Option<&[Reference]>, persisted: Option<&[Reference]>) -> bool {
    let candidate = candidate.unwrap_or(&[]);
    let persisted = persisted.unwrap_or(&[]);

    if candidate.len() != persisted.len() {
        return true;
    }
    if candidate.iter().chain(persisted).any(|r| r.id.is_none()) {
        return true;
    }

    let left: HashSet<PersistedId> = candidate.iter().filter_map(|r| r.id).collect();
    let right: HashSet<PersistedId> = persisted.iter().filter_map(|r| r.id).collect();
    left != right
}

/// Compare one field of an aligned pair.
pub fn field_changed(
    field: Field,
    candidate: &Record,
    persisted: &Record,
    tolerance: &NumericTolerance,
) -> bool {
    let left = field.value(candidate);
    let right = field.value(persisted);
    match field.comparison() {
        Comparison::Plain => plain_changed(&left, &right),
        Comparison::Numeric => numeric_changed(left.as_f64(), right.as_f64(), tolerance),
        Comparison::SingleRelation => relation_changed(left.as_relation(), right.as_relation()),
        Comparison::MultiRelation => relations_changed(left.as_relations(), right.as_relations()),
    }
}

/// Per-field change flags for one aligned pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChanges {
    pub key: CompositeKey,
    pub id: PersistedId,
    pub fields: BTreeMap<Field, bool>,
}

impl FieldChanges {
    pub fn any(&self) -> bool {
        self.fields.values().any(|changed| *changed)
    }

    pub fn changed(&self) -> impl Iterator<Item = Field> + '_ {
        self.fields
            .iter()
            .filter(|(_, changed)| **changed)
            .map(|(field, _)| *field)
    }
}

/// Output of one diff run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Candidates with no snapshot counterpart. Never carry an id.
    pub new: Vec<Record>,
    /// Candidate values carrying the snapshot id, for pairs that differ.
    pub changed: Vec<Record>,
    /// Snapshot ids with no candidate counterpart.
    pub deleted: Vec<PersistedId>,
    /// One row per compared pair.
    pub changed_fields: Vec<FieldChanges>,
    /// References that match neither the snapshot nor the batch.
    pub dangling_references: Vec<DanglingReference>,
}

/// Counts describing a change set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub new: usize,
    pub changed: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub dangling: usize,
    pub field_totals: BTreeMap<Field, usize>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.changed.is_empty() && self.deleted.is_empty()
    }

    pub fn summary(&self) -> ChangeSummary {
        let mut field_totals = BTreeMap::new();
        for row in &self.changed_fields {
            for field in row.changed() {
                *field_totals.entry(field).or_insert(0) += 1;
            }
        }
        ChangeSummary {
            new: self.new.len(),
            changed: self.changed.len(),
            deleted: self.deleted.len(),
            unchanged: self.changed_fields.len() - self.changed.len(),
            dangling: self.dangling_references.len(),
            field_totals,
        }
    }

    /// New records whose relations still point at other new records.
    ///
    /// These need a second write once the batch has been inserted and ids
    /// are known.
    pub fn pending_relation_patches(&self) -> Vec<&Record> {
        self.new
            .iter()
            .filter(|record| record.references().any(|r| !r.is_resolved()))
            .collect()
    }
}

/// Key every candidate, rejecting malformed records and duplicate keys.
pub(crate) fn index_candidates(
    candidates: &[Record],
    keys: &KeyBuilder,
) -> Result<(Vec<CompositeKey>, HashMap<CompositeKey, usize>)> {
    let mut ordered = Vec::with_capacity(candidates.len());
    let mut positions = HashMap::with_capacity(candidates.len());
    for (index, record) in candidates.iter().enumerate() {
        if let Some(field) = keys.missing_required(record) {
            return Err(ReconcileError::MalformedRecord {
                index,
                side: Side::Candidates,
                field,
            });
        }
        let key = keys.key(record);
        if let Some(first) = positions.insert(key.clone(), index) {
            return Err(ReconcileError::DuplicateKey {
                key,
                side: Side::Candidates,
                first,
                second: index,
            });
        }
        ordered.push(key);
    }
    Ok((ordered, positions))
}

fn as_new(record: &Record) -> Record {
    let mut record = record.clone();
    record.id = None;
    record
}

/// Compute the change set of `candidates` against `snapshot`.
///
/// Relations on `candidates` are expected to be resolved already. Fails on
/// duplicate keys in either input, on candidates missing a required key field
/// and on snapshot records without an id.
pub fn diff(
    candidates: &[Record],
    snapshot: &[Record],
    keys: &KeyBuilder,
    tolerance: &NumericTolerance,
) -> Result<ChangeSet> {
    let index = SnapshotIndex::build(snapshot, keys)?;
    diff_with_index(candidates, snapshot, &index, keys, tolerance)
}

/// Same as [`diff`], reusing an index already built over `snapshot`.
///
/// `index` must have been built from `snapshot` with the same `keys`.
#[instrument(
    skip(candidates, snapshot, index, keys, tolerance),
    fields(candidates = candidates.len(), snapshot = snapshot.len()),
    level = "debug"
)]
pub fn diff_with_index(
    candidates: &[Record],
    snapshot: &[Record],
    index: &SnapshotIndex,
    keys: &KeyBuilder,
    tolerance: &NumericTolerance,
) -> Result<ChangeSet> {
    let (candidate_keys, positions) = index_candidates(candidates, keys)?;

    let key_set: HashSet<CompositeKey> = positions.keys().cloned().collect();
    let dangling_references = find_dangling(candidates, &key_set, keys);

    if index.is_empty() {
        debug!("empty snapshot, every candidate is new");
        return Ok(ChangeSet {
            new: candidates.iter().map(as_new).collect(),
            dangling_references,
            ..ChangeSet::default()
        });
    }

    let mut change_set = ChangeSet {
        dangling_references,
        ..ChangeSet::default()
    };

    for (candidate, key) in candidates.iter().zip(candidate_keys) {
        let Some(position) = index.position_of(&key) else {
            change_set.new.push(as_new(candidate));
            continue;
        };
        let persisted = &snapshot[position];
        let Some(id) = persisted.id else {
            return Err(ReconcileError::MissingPersistedId { key });
        };

        let fields: BTreeMap<Field, bool> = Field::ALL
            .iter()
            .map(|field| (*field, field_changed(*field, candidate, persisted, tolerance)))
            .collect();
        let row = FieldChanges { key, id, fields };

        if row.any() {
            let mut changed = candidate.clone();
            changed.id = Some(id);
            change_set.changed.push(changed);
        }
        change_set.changed_fields.push(row);
    }

    change_set.deleted = snapshot
        .iter()
        .filter(|record| !positions.contains_key(&keys.key(*record)))
        .filter_map(|record| record.id)
        .collect();

    debug!(
        new = change_set.new.len(),
        changed = change_set.changed.len(),
        deleted = change_set.deleted.len(),
        compared = change_set.changed_fields.len(),
        "diff complete"
    );

    Ok(change_set)
}
