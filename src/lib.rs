//! # PA Reconcile
//!
//! Identity resolution, hierarchy assignment and incremental diffing for a
//! protected-area catalogue merged from two source datasets.
//!
//! A run takes a normalized candidate batch and the previously persisted
//! snapshot, both fully materialized, and produces a [`ChangeSet`]:
//!
//! 1. candidates are grouped by designation and linked parent/children
//! 2. relation references are backfilled with persisted ids
//! 3. candidates are aligned with the snapshot by composite key and diffed
//!
//! Applying the change set to storage is left to the caller.

pub mod config;
pub mod diff;
pub mod error;
pub mod fields;
pub mod hierarchy;
pub mod identity;
pub mod model;
pub mod resolver;
pub mod utils;

// Re-export main types for convenience
pub use config::SyncConfig;
pub use diff::{ChangeSet, ChangeSummary, FieldChanges, NumericTolerance};
pub use error::{ReconcileError, Side};
pub use fields::Field;
pub use hierarchy::{PriorityPolicy, PriorityTier, SourcePrecedence};
pub use identity::{CompositeKey, KeyBuilder, KeyField};
pub use model::{DataSource, Environment, PersistedId, Record, Reference, Scalar};
pub use resolver::{ResolutionStats, SnapshotIndex};

use tracing::info;

/// Main API for catalogue reconciliation
pub struct Reconciler {
    config: SyncConfig,
    policy: Box<dyn PriorityPolicy>,
    keys: KeyBuilder,
    group_keys: KeyBuilder,
}

impl Reconciler {
    /// Create a reconciler using the configured source precedence.
    pub fn new(config: SyncConfig) -> Self {
        let policy = config.sources;
        Self::with_policy(config, policy)
    }

    /// Create a reconciler with a custom parent election policy.
    pub fn with_policy<P>(config: SyncConfig, policy: P) -> Self
    where
        P: PriorityPolicy + 'static,
    {
        let keys = config.key_builder();
        let group_keys = config.group_builder();
        Self {
            config,
            policy: Box::new(policy),
            keys,
            group_keys,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn key_builder(&self) -> &KeyBuilder {
        &self.keys
    }

    /// Composite key of a record under the configured key layout.
    pub fn key_for(&self, record: &Record) -> CompositeKey {
        self.keys.key(record)
    }

    /// Group candidates and link each group's members to its elected parent.
    pub fn assign_hierarchy(&self, candidates: Vec<Record>) -> error::Result<Vec<Record>> {
        hierarchy::assign_all(
            candidates,
            &self.keys,
            &self.group_keys,
            self.policy.as_ref(),
            self.config.parallel,
        )
    }

    /// Backfill persisted ids into the relation references of `records`.
    pub fn resolve_relations(
        &self,
        records: &mut [Record],
        snapshot: &[Record],
    ) -> error::Result<ResolutionStats> {
        let index = SnapshotIndex::build(snapshot, &self.keys)?;
        Ok(resolver::resolve_relations(
            records,
            &index,
            &self.keys,
            self.config.parallel,
        ))
    }

    /// Diff already linked and resolved candidates against `snapshot`.
    pub fn diff(&self, candidates: &[Record], snapshot: &[Record]) -> error::Result<ChangeSet> {
        diff::diff(candidates, snapshot, &self.keys, &self.config.numeric)
    }

    /// Run the full pipeline: hierarchy, relation resolution, diff.
    pub fn reconcile(
        &self,
        candidates: Vec<Record>,
        snapshot: &[Record],
    ) -> error::Result<ChangeSet> {
        let index = SnapshotIndex::build(snapshot, &self.keys)?;
        let mut linked = self.assign_hierarchy(candidates)?;
        let stats =
            resolver::resolve_relations(&mut linked, &index, &self.keys, self.config.parallel);
        let change_set =
            diff::diff_with_index(&linked, snapshot, &index, &self.keys, &self.config.numeric)?;

        let summary = change_set.summary();
        info!(
            candidates = linked.len(),
            snapshot = snapshot.len(),
            new = summary.new,
            changed = summary.changed,
            deleted = summary.deleted,
            unchanged = summary.unchanged,
            resolved_relations = stats.resolved,
            pending_relations = stats.pending,
            dangling = summary.dangling,
            "reconciliation complete"
        );
        Ok(change_set)
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}
