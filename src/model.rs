//! # Data Model
//!
//! Canonical record shape shared by candidate batches and persisted snapshots,
//! plus the lightweight cross-record references used for parent/child links.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier assigned by the storage collaborator once a record is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistedId(pub i64);

impl fmt::Display for PersistedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Realm a designation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Marine,
    Terrestrial,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Marine => "marine",
            Environment::Terrestrial => "terrestrial",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dataset a record was ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSource {
    ProtectedPlanet,
    Mpatlas,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::ProtectedPlanet => "protected-planet",
            DataSource::Mpatlas => "mpatlas",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loosely typed identifier value as it arrives from the source datasets.
///
/// Nullable integer columns are frequently encoded as floats upstream, so the
/// same designation id may show up as `170`, `170.0` or `"170"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(i64::from(value))
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

/// Minimal pointer to another record: its group-key fields plus the persisted
/// id when one is known.
///
/// An absent `id` means the target does not exist in storage yet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PersistedId>,
    pub environment: Option<Environment>,
    pub location: Option<String>,
    pub wdpaid: Option<Scalar>,
    pub wdpa_p_id: Option<Scalar>,
    pub zone_id: Option<Scalar>,
}

impl Reference {
    /// Build an unresolved reference pointing at `record`.
    pub fn to_record(record: &Record) -> Self {
        Self {
            id: None,
            environment: record.environment,
            location: record.location.clone(),
            wdpaid: record.wdpaid.clone(),
            wdpa_p_id: record.wdpa_p_id.clone(),
            zone_id: record.zone_id.clone(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.id.is_some()
    }
}

/// One protected-area designation in canonical form.
///
/// Candidate records never carry `id`; snapshot records always do.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<PersistedId>,
    pub environment: Option<Environment>,
    pub location: Option<String>,
    pub wdpaid: Option<Scalar>,
    pub wdpa_p_id: Option<Scalar>,
    pub zone_id: Option<Scalar>,
    pub data_source: Option<DataSource>,
    pub name: Option<String>,
    pub area: Option<f64>,
    pub coverage: Option<f64>,
    #[serde(deserialize_with = "lenient_year")]
    pub year: Option<i32>,
    pub designation: Option<String>,
    pub designation_type: Option<String>,
    pub iucn_category: Option<String>,
    pub protection_level: Option<String>,
    pub establishment_stage: Option<String>,
    pub bbox: Option<Vec<f64>>,
    pub parent: Option<Reference>,
    pub children: Option<Vec<Reference>>,
}

/// Accept a year encoded as an integer or as an integral float (`2001.0`).
fn lenient_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawYear {
        Int(i64),
        Float(f64),
    }

    match Option::<RawYear>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawYear::Int(v)) => i32::try_from(v)
            .map(Some)
            .map_err(|_| D::Error::custom(format!("year {v} out of range"))),
        Some(RawYear::Float(v))
            if v.fract() == 0.0 && (i32::MIN as f64..=i32::MAX as f64).contains(&v) =>
        {
            Ok(Some(v as i32))
        }
        Some(RawYear::Float(v)) => Err(D::Error::custom(format!("year {v} is not a whole number"))),
    }
}

impl Record {
    /// Start a candidate record from its group-key fields.
    pub fn candidate(
        environment: Environment,
        location: impl Into<String>,
        wdpaid: impl Into<Scalar>,
        wdpa_p_id: impl Into<Scalar>,
        data_source: DataSource,
    ) -> Self {
        Self {
            environment: Some(environment),
            location: Some(location.into()),
            wdpaid: Some(wdpaid.into()),
            wdpa_p_id: Some(wdpa_p_id.into()),
            data_source: Some(data_source),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: PersistedId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_zone(mut self, zone_id: impl Into<Scalar>) -> Self {
        self.zone_id = Some(zone_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_area(mut self, area: f64) -> Self {
        self.area = Some(area);
        self
    }

    pub fn with_coverage(mut self, coverage: f64) -> Self {
        self.coverage = Some(coverage);
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Every relation reference carried by this record, parent first.
    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.parent
            .iter()
            .chain(self.children.iter().flat_map(|children| children.iter()))
    }

    pub fn references_mut(&mut self) -> impl Iterator<Item = &mut Reference> {
        self.parent
            .iter_mut()
            .chain(self.children.iter_mut().flat_map(|children| children.iter_mut()))
    }
}
