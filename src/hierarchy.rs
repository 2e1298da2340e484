//! # Hierarchy Module
//!
//! Groups candidate records that describe the same underlying designation and
//! elects one parent per group using a source-priority policy. The parent
//! receives references to every other member; every other member receives a
//! reference back to the parent.
//!
//! Groups are disjoint, so assignment runs in parallel across groups without
//! shared state. Ordering inside a group is decided by a stable sort and is
//! therefore reproducible across runs.

use crate::diff::index_candidates;
use crate::error::{ReconcileError, Result, Side};
use crate::identity::{normalize_scalar, CompositeKey, KeyBuilder};
use crate::model::{DataSource, Record, Reference};
use hashbrown::HashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Precedence tier of a record within its group. Lower sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    /// Primary source, root sub-unit of the designation.
    PrimaryRoot,
    /// Primary source, any sub-unit.
    Primary,
    /// Secondary source, root sub-unit of the designation.
    SecondaryRoot,
    Other,
}

/// Ranking used to pick the parent of a group.
pub trait PriorityPolicy: Send + Sync {
    fn tier(&self, record: &Record) -> PriorityTier;
}

/// Default policy: authoritative source first, root sub-units before others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcePrecedence {
    pub primary: DataSource,
    pub secondary: DataSource,
}

impl Default for SourcePrecedence {
    fn default() -> Self {
        Self {
            primary: DataSource::ProtectedPlanet,
            secondary: DataSource::Mpatlas,
        }
    }
}

impl PriorityPolicy for SourcePrecedence {
    fn tier(&self, record: &Record) -> PriorityTier {
        let root = is_root_unit(record);
        match record.data_source {
            Some(source) if source == self.primary && root => PriorityTier::PrimaryRoot,
            Some(source) if source == self.primary => PriorityTier::Primary,
            Some(source) if source == self.secondary && root => PriorityTier::SecondaryRoot,
            _ => PriorityTier::Other,
        }
    }
}

/// Whether the record's sub-designation id equals its designation id.
pub fn is_root_unit(record: &Record) -> bool {
    match (&record.wdpa_p_id, &record.wdpaid) {
        (Some(sub), Some(designation)) => normalize_scalar(sub) == normalize_scalar(designation),
        _ => false,
    }
}

/// Candidate records sharing one designation, environment and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: CompositeKey,
    pub records: Vec<Record>,
}

/// Partition `records` into groups by `group_keys`.
///
/// Groups keep first-appearance order; members keep input order.
pub fn group_records(records: Vec<Record>, group_keys: &KeyBuilder) -> Result<Vec<Group>> {
    let mut positions: HashMap<CompositeKey, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for (index, record) in records.into_iter().enumerate() {
        if let Some(field) = group_keys.missing_required(&record) {
            return Err(ReconcileError::MalformedRecord {
                index,
                side: Side::Candidates,
                field,
            });
        }
        let key = group_keys.key(&record);
        match positions.get(&key) {
            Some(&position) => groups[position].records.push(record),
            None => {
                positions.insert(key.clone(), groups.len());
                groups.push(Group {
                    key,
                    records: vec![record],
                });
            }
        }
    }

    Ok(groups)
}

/// Order one group by priority and link its members.
///
/// The first record after a stable sort becomes the parent. A singleton group
/// ends up with neither parent nor children.
pub fn assign_hierarchy(group: Vec<Record>, policy: &dyn PriorityPolicy) -> Vec<Record> {
    if group.is_empty() {
        return group;
    }

    let mut ranked: Vec<(PriorityTier, Record)> = group
        .into_iter()
        .map(|record| (policy.tier(&record), record))
        .collect();
    ranked.sort_by_key(|(tier, _)| *tier);

    let mut ordered: Vec<Record> = ranked.into_iter().map(|(_, record)| record).collect();

    let parent_ref = Reference::to_record(&ordered[0]);
    let child_refs: Vec<Reference> = ordered[1..].iter().map(Reference::to_record).collect();

    let (head, rest) = ordered.split_at_mut(1);
    head[0].parent = None;
    head[0].children = if child_refs.is_empty() {
        None
    } else {
        Some(child_refs)
    };
    for record in rest {
        record.parent = Some(parent_ref.clone());
        record.children = None;
    }

    ordered
}

/// Group a whole batch and assign hierarchy to every group.
///
/// Fails if two records share a composite key under `keys`.
#[instrument(
    skip(records, keys, group_keys, policy),
    fields(records = records.len()),
    level = "debug"
)]
pub fn assign_all(
    records: Vec<Record>,
    keys: &KeyBuilder,
    group_keys: &KeyBuilder,
    policy: &dyn PriorityPolicy,
    parallel: bool,
) -> Result<Vec<Record>> {
    index_candidates(&records, keys)?;
    let groups = group_records(records, group_keys)?;
    let linked = groups.iter().filter(|g| g.records.len() > 1).count();
    debug!(groups = groups.len(), linked, "grouped candidate batch");

    let assigned: Vec<Vec<Record>> = if parallel {
        groups
            .into_par_iter()
            .map(|group| assign_hierarchy(group.records, policy))
            .collect()
    } else {
        groups
            .into_iter()
            .map(|group| assign_hierarchy(group.records, policy))
            .collect()
    };

    Ok(assigned.into_iter().flatten().collect())
}
