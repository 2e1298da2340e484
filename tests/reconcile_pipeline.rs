#[path = "../src/test_support.rs"]
mod test_support;

use std::collections::HashSet;

use pa_reconcile::{
    DataSource, Environment, Field, PersistedId, Reconciler, Record, Reference, SyncConfig,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use test_support::{generate_candidates, persist};

fn mex(wdpa_p_id: &str, source: DataSource) -> Record {
    Record::candidate(Environment::Terrestrial, "MEX", 555, wdpa_p_id, source)
}

#[test]
fn area_change_beyond_tolerance_is_reported_as_changed() -> anyhow::Result<()> {
    let reconciler = Reconciler::default();
    let snapshot = vec![mex("555", DataSource::ProtectedPlanet)
        .with_id(PersistedId(1))
        .with_area(10.00)];
    let candidates = vec![mex("555", DataSource::ProtectedPlanet).with_area(10.20)];

    let change_set = reconciler.reconcile(candidates, &snapshot)?;

    assert!(change_set.new.is_empty());
    assert!(change_set.deleted.is_empty());
    assert_eq!(change_set.changed.len(), 1);
    let changed = &change_set.changed[0];
    assert_eq!(changed.id, Some(PersistedId(1)));
    assert_eq!(changed.area, Some(10.2));
    assert!(changed.parent.is_none());
    assert!(changed.children.is_none());
    Ok(())
}

#[test]
fn area_change_at_threshold_is_ignored() -> anyhow::Result<()> {
    let reconciler = Reconciler::default();
    let snapshot = vec![mex("555", DataSource::ProtectedPlanet)
        .with_id(PersistedId(1))
        .with_area(100.00)];

    let at_threshold = reconciler.reconcile(
        vec![mex("555", DataSource::ProtectedPlanet).with_area(101.00)],
        &snapshot,
    )?;
    assert!(at_threshold.is_empty());

    let over_threshold = reconciler.reconcile(
        vec![mex("555", DataSource::ProtectedPlanet).with_area(101.01)],
        &snapshot,
    )?;
    assert_eq!(over_threshold.changed.len(), 1);

    let small = vec![mex("555", DataSource::ProtectedPlanet)
        .with_id(PersistedId(1))
        .with_area(7.00)];
    let at_threshold = reconciler.reconcile(
        vec![mex("555", DataSource::ProtectedPlanet).with_area(7.07)],
        &small,
    )?;
    assert!(at_threshold.is_empty());
    let over_threshold = reconciler.reconcile(
        vec![mex("555", DataSource::ProtectedPlanet).with_area(7.08)],
        &small,
    )?;
    assert_eq!(over_threshold.changed.len(), 1);
    Ok(())
}

#[test]
fn new_child_points_at_existing_parent_id() -> anyhow::Result<()> {
    let reconciler = Reconciler::default();
    let snapshot = vec![mex("555", DataSource::ProtectedPlanet).with_id(PersistedId(40))];
    let candidates = vec![
        mex("555", DataSource::ProtectedPlanet),
        mex("555_A", DataSource::ProtectedPlanet),
        mex("555_B", DataSource::Mpatlas),
    ];

    let change_set = reconciler.reconcile(candidates, &snapshot)?;

    assert_eq!(change_set.new.len(), 2);
    for record in &change_set.new {
        assert_eq!(record.parent.as_ref().and_then(|r| r.id), Some(PersistedId(40)));
    }

    // The existing parent gained two children that do not exist yet.
    assert_eq!(change_set.changed.len(), 1);
    let parent = &change_set.changed[0];
    let children = parent.children.as_ref().expect("children");
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|r| r.id.is_none()));
    assert!(change_set.changed_fields[0].fields[&Field::Children]);
    assert!(change_set.dangling_references.is_empty());
    Ok(())
}

#[test]
fn new_child_of_new_parent_keeps_absent_id() -> anyhow::Result<()> {
    let reconciler = Reconciler::default();
    let candidates = vec![
        mex("555_A", DataSource::Mpatlas),
        mex("555", DataSource::ProtectedPlanet),
    ];

    let change_set = reconciler.reconcile(candidates, &[])?;

    assert_eq!(change_set.new.len(), 2);
    assert_eq!(change_set.new[0].data_source, Some(DataSource::ProtectedPlanet));
    let child = &change_set.new[1];
    let parent_ref = child.parent.as_ref().expect("parent reference");
    assert_eq!(parent_ref.id, None);
    assert_eq!(change_set.pending_relation_patches().len(), 2);
    Ok(())
}

#[test]
fn children_order_does_not_count_as_change() -> anyhow::Result<()> {
    let reconciler = Reconciler::default();
    let parent = mex("555", DataSource::ProtectedPlanet);
    let a = mex("555_A", DataSource::ProtectedPlanet);
    let b = mex("555_B", DataSource::ProtectedPlanet);

    let with_ids = |record: &Record, id: i64| {
        let mut reference = Reference::to_record(record);
        reference.id = Some(PersistedId(id));
        reference
    };

    let mut stored_parent = parent.clone().with_id(PersistedId(1));
    stored_parent.children = Some(vec![with_ids(&b, 3), with_ids(&a, 2)]);
    let mut stored_a = a.clone().with_id(PersistedId(2));
    stored_a.parent = Some(with_ids(&parent, 1));
    let mut stored_b = b.clone().with_id(PersistedId(3));
    stored_b.parent = Some(with_ids(&parent, 1));

    let change_set =
        reconciler.reconcile(vec![parent, a, b], &[stored_parent, stored_a, stored_b])?;
    assert!(change_set.is_empty(), "unexpected changes: {:?}", change_set);
    Ok(())
}

#[test]
fn rerunning_against_persisted_output_is_a_noop() -> anyhow::Result<()> {
    let reconciler = Reconciler::default();
    let candidates = generate_candidates(200, 11);

    let first = reconciler.reconcile(candidates.clone(), &[])?;
    assert_eq!(first.new.len(), candidates.len());
    let snapshot = persist(&first.new, reconciler.key_builder(), 1);

    let second = reconciler.reconcile(candidates.clone(), &snapshot)?;
    assert!(second.new.is_empty());
    assert!(second.changed.is_empty());
    assert!(second.deleted.is_empty());
    assert_eq!(second.changed_fields.len(), candidates.len());

    let third = reconciler.reconcile(candidates, &snapshot)?;
    assert_eq!(second, third);
    Ok(())
}

#[test]
fn partition_accounts_for_every_key_once() -> anyhow::Result<()> {
    let reconciler = Reconciler::default();
    let previous = generate_candidates(150, 3);
    let first = reconciler.reconcile(previous, &[])?;
    let snapshot = persist(&first.new, reconciler.key_builder(), 1000);

    // A different seed overlaps on some designations and not others.
    let candidates = generate_candidates(180, 4);
    let change_set = reconciler.reconcile(candidates.clone(), &snapshot)?;

    let keys = reconciler.key_builder();
    let candidate_keys: HashSet<_> = candidates.iter().map(|r| keys.key(r)).collect();
    let snapshot_keys: HashSet<_> = snapshot.iter().map(|r| keys.key(r)).collect();

    let new_keys: HashSet<_> = change_set.new.iter().map(|r| keys.key(r)).collect();
    let static_keys: HashSet<_> = change_set
        .changed_fields
        .iter()
        .map(|row| row.key.clone())
        .collect();
    let deleted_ids: HashSet<_> = change_set.deleted.iter().copied().collect();
    let deleted_keys: HashSet<_> = snapshot
        .iter()
        .filter(|r| deleted_ids.contains(&r.id.unwrap()))
        .map(|r| keys.key(r))
        .collect();

    assert_eq!(new_keys.len(), change_set.new.len());
    assert!(new_keys.is_disjoint(&static_keys));
    assert!(new_keys.is_disjoint(&deleted_keys));
    assert!(static_keys.is_disjoint(&deleted_keys));

    let union: HashSet<_> = new_keys
        .union(&static_keys)
        .cloned()
        .chain(deleted_keys.iter().cloned())
        .collect();
    let expected: HashSet<_> = candidate_keys.union(&snapshot_keys).cloned().collect();
    assert_eq!(union, expected);

    for record in &change_set.changed {
        assert!(record.id.is_some());
        assert!(static_keys.contains(&keys.key(record)));
    }
    Ok(())
}

#[test]
fn parent_election_ignores_input_order() -> anyhow::Result<()> {
    let reconciler = Reconciler::new(SyncConfig {
        parallel: false,
        ..SyncConfig::default()
    });
    let group = vec![
        mex("555_B", DataSource::Mpatlas).with_name("secondary"),
        mex("555", DataSource::ProtectedPlanet).with_name("primary-self"),
        mex("555_A", DataSource::ProtectedPlanet).with_name("primary-other"),
        mex("555", DataSource::Mpatlas).with_zone(1).with_name("secondary-self"),
    ];

    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..10 {
        let mut shuffled = group.clone();
        shuffled.shuffle(&mut rng);
        let linked = reconciler.assign_hierarchy(shuffled)?;

        assert_eq!(linked[0].name.as_deref(), Some("primary-self"));
        let keys = reconciler.key_builder();
        let children: HashSet<_> = linked[0]
            .children
            .as_ref()
            .expect("children")
            .iter()
            .map(|r| keys.key(r))
            .collect();
        let expected: HashSet<_> = linked[1..].iter().map(|r| keys.key(r)).collect();
        assert_eq!(children.len(), 3);
        assert_eq!(children, expected);
    }
    Ok(())
}

#[test]
fn duplicate_candidates_fail_the_whole_run() {
    let reconciler = Reconciler::default();
    let candidates = vec![
        mex("555", DataSource::ProtectedPlanet),
        mex("555", DataSource::Mpatlas),
    ];
    let err = reconciler.reconcile(candidates, &[]).unwrap_err();
    assert!(matches!(
        err,
        pa_reconcile::ReconcileError::DuplicateKey { .. }
    ));
}

#[test]
fn missing_location_is_rejected() {
    let reconciler = Reconciler::default();
    let mut broken = mex("555", DataSource::ProtectedPlanet);
    broken.location = None;
    let err = reconciler.reconcile(vec![broken], &[]).unwrap_err();
    assert!(matches!(
        err,
        pa_reconcile::ReconcileError::MalformedRecord { index: 0, .. }
    ));
}
