use std::collections::HashMap;

use pa_reconcile::{
    CompositeKey, DataSource, Environment, KeyBuilder, PersistedId, Record, Scalar,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const LOCATIONS: [&str; 5] = ["MEX", "BRA", "FRA", "ABNJ", "USA"];

/// Generate a candidate batch of `designations` designations, each with one
/// to six members drawn from both sources.
///
/// Composite keys are unique by construction. Designation ids are sometimes
/// encoded as floats to exercise key normalization.
pub fn generate_candidates(designations: u32, seed: u64) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::new();

    for wdpaid in 1..=designations {
        let location = LOCATIONS[rng.random_range(0..LOCATIONS.len())];
        let environment = if rng.random_bool(0.5) {
            Environment::Marine
        } else {
            Environment::Terrestrial
        };
        let root = wdpaid.to_string();

        let mut members = Vec::new();
        if rng.random_bool(0.8) {
            members.push(Record::candidate(
                environment,
                location,
                i64::from(wdpaid),
                root.clone(),
                DataSource::ProtectedPlanet,
            ));
        }
        for suffix in ["A", "B"].iter().take(rng.random_range(0..3)) {
            members.push(Record::candidate(
                environment,
                location,
                i64::from(wdpaid),
                format!("{}_{}", root, suffix),
                DataSource::ProtectedPlanet,
            ));
        }
        for zone in 1..=rng.random_range(0..3i64) {
            members.push(
                Record::candidate(
                    environment,
                    location,
                    i64::from(wdpaid),
                    root.clone(),
                    DataSource::Mpatlas,
                )
                .with_zone(zone),
            );
        }
        if members.is_empty() {
            members.push(Record::candidate(
                environment,
                location,
                i64::from(wdpaid),
                root.clone(),
                DataSource::Mpatlas,
            ));
        }

        for (position, mut record) in members.into_iter().enumerate() {
            if rng.random_bool(0.3) {
                record.wdpaid = Some(Scalar::Float(f64::from(wdpaid)));
            }
            let area = (rng.random_range(0.1..5000.0f64) * 100.0).round() / 100.0;
            let coverage = (rng.random_range(0.0..100.0f64) * 100.0).round() / 100.0;
            record = record
                .with_name(format!("Designation {} / {}", wdpaid, position))
                .with_area(area)
                .with_coverage(coverage);
            record.year = Some(rng.random_range(1950..2024));
            record.designation = Some("National Park".to_string());
            records.push(record);
        }
    }

    records
}

/// Simulate the storage collaborator's two-phase insert: assign ids, then
/// patch references that pointed at records created in the same batch.
pub fn persist(records: &[Record], keys: &KeyBuilder, first_id: i64) -> Vec<Record> {
    let mut stored: Vec<Record> = records
        .iter()
        .cloned()
        .zip(first_id..)
        .map(|(mut record, id)| {
            record.id = Some(PersistedId(id));
            record
        })
        .collect();

    let ids: HashMap<CompositeKey, PersistedId> = stored
        .iter()
        .filter_map(|record| record.id.map(|id| (keys.key(record), id)))
        .collect();

    for record in &mut stored {
        for reference in record.references_mut() {
            if reference.id.is_none() {
                reference.id = ids.get(&keys.key(reference)).copied();
            }
        }
    }

    stored
}
