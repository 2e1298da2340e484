//! # Fields Module
//!
//! Typed view over the non-key fields of a [`Record`] and the comparison kind
//! each one uses during diffing.

use crate::model::{DataSource, Record, Reference};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a field is compared between a candidate and its persisted counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// Changed when the candidate value is present and differs.
    Plain,
    /// Rounded relative comparison with tolerance.
    Numeric,
    /// At most one reference, compared by resolved id.
    SingleRelation,
    /// Unordered references, compared as id sets.
    MultiRelation,
}

/// A compared (non-key) field of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    DataSource,
    Year,
    Designation,
    DesignationType,
    IucnCategory,
    ProtectionLevel,
    EstablishmentStage,
    Bbox,
    Area,
    Coverage,
    Parent,
    Children,
}

impl Field {
    pub const ALL: [Field; 13] = [
        Field::Name,
        Field::DataSource,
        Field::Year,
        Field::Designation,
        Field::DesignationType,
        Field::IucnCategory,
        Field::ProtectionLevel,
        Field::EstablishmentStage,
        Field::Bbox,
        Field::Area,
        Field::Coverage,
        Field::Parent,
        Field::Children,
    ];

    pub fn comparison(&self) -> Comparison {
        match self {
            Field::Area | Field::Coverage => Comparison::Numeric,
            Field::Parent => Comparison::SingleRelation,
            Field::Children => Comparison::MultiRelation,
            _ => Comparison::Plain,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::DataSource => "data_source",
            Field::Year => "year",
            Field::Designation => "designation",
            Field::DesignationType => "designation_type",
            Field::IucnCategory => "iucn_category",
            Field::ProtectionLevel => "protection_level",
            Field::EstablishmentStage => "establishment_stage",
            Field::Bbox => "bbox",
            Field::Area => "area",
            Field::Coverage => "coverage",
            Field::Parent => "parent",
            Field::Children => "children",
        }
    }

    /// Read this field from `record`.
    pub fn value<'a>(&self, record: &'a Record) -> FieldValue<'a> {
        match self {
            Field::Name => FieldValue::text(record.name.as_deref()),
            Field::DataSource => record
                .data_source
                .map_or(FieldValue::Null, FieldValue::Source),
            Field::Year => record.year.map_or(FieldValue::Null, FieldValue::Int),
            Field::Designation => FieldValue::text(record.designation.as_deref()),
            Field::DesignationType => FieldValue::text(record.designation_type.as_deref()),
            Field::IucnCategory => FieldValue::text(record.iucn_category.as_deref()),
            Field::ProtectionLevel => FieldValue::text(record.protection_level.as_deref()),
            Field::EstablishmentStage => {
                FieldValue::text(record.establishment_stage.as_deref())
            }
            Field::Bbox => record
                .bbox
                .as_deref()
                .map_or(FieldValue::Null, FieldValue::Floats),
            Field::Area => record.area.map_or(FieldValue::Null, FieldValue::Float),
            Field::Coverage => record.coverage.map_or(FieldValue::Null, FieldValue::Float),
            Field::Parent => record
                .parent
                .as_ref()
                .map_or(FieldValue::Null, FieldValue::Relation),
            Field::Children => record
                .children
                .as_deref()
                .map_or(FieldValue::Null, FieldValue::Relations),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Borrowed, typed value of one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Null,
    Text(&'a str),
    Int(i32),
    Float(f64),
    Floats(&'a [f64]),
    Source(DataSource),
    Relation(&'a Reference),
    Relations(&'a [Reference]),
}

impl<'a> FieldValue<'a> {
    fn text(value: Option<&'a str>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Text)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    pub fn as_relation(&self) -> Option<&'a Reference> {
        match self {
            FieldValue::Relation(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_relations(&self) -> Option<&'a [Reference]> {
        match self {
            FieldValue::Relations(r) => Some(r),
            _ => None,
        }
    }
}
