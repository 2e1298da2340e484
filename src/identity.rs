//! # Identity Module
//!
//! Builds composite keys from a fixed, ordered tuple of key fields. The same
//! builder is applied to candidates, snapshot records and relation references
//! so all three align on identical strings.

use crate::model::{Record, Reference, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token emitted for a missing value.
///
/// Text values have `\` escaped, so no legitimate value can normalize to this.
pub const NULL_TOKEN: &str = "\\N";

/// Separator between normalized field values.
pub const KEY_SEPARATOR: char = '|';

/// A field that participates in record identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyField {
    Environment,
    Location,
    Wdpaid,
    WdpaPId,
    ZoneId,
}

impl KeyField {
    /// Key used to align records across runs.
    pub fn default_key() -> Vec<KeyField> {
        vec![
            KeyField::Environment,
            KeyField::Wdpaid,
            KeyField::WdpaPId,
            KeyField::ZoneId,
            KeyField::Location,
        ]
    }

    /// Key shared by every record of one designation.
    pub fn default_group() -> Vec<KeyField> {
        vec![KeyField::Wdpaid, KeyField::Environment, KeyField::Location]
    }

    /// Whether a record lacking this field is malformed.
    pub fn is_required(&self) -> bool {
        matches!(
            self,
            KeyField::Environment | KeyField::Location | KeyField::Wdpaid
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            KeyField::Environment => "environment",
            KeyField::Location => "location",
            KeyField::Wdpaid => "wdpaid",
            KeyField::WdpaPId => "wdpa_p_id",
            KeyField::ZoneId => "zone_id",
        }
    }
}

impl fmt::Display for KeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Anything that exposes the key fields of a record.
pub trait Keyed {
    fn key_token(&self, field: KeyField) -> Option<String>;
}

impl Keyed for Record {
    fn key_token(&self, field: KeyField) -> Option<String> {
        match field {
            KeyField::Environment => self.environment.map(|e| e.as_str().to_string()),
            KeyField::Location => self.location.as_deref().map(escape_text),
            KeyField::Wdpaid => self.wdpaid.as_ref().map(normalize_scalar),
            KeyField::WdpaPId => self.wdpa_p_id.as_ref().map(normalize_scalar),
            KeyField::ZoneId => self.zone_id.as_ref().map(normalize_scalar),
        }
    }
}

impl Keyed for Reference {
    fn key_token(&self, field: KeyField) -> Option<String> {
        match field {
            KeyField::Environment => self.environment.map(|e| e.as_str().to_string()),
            KeyField::Location => self.location.as_deref().map(escape_text),
            KeyField::Wdpaid => self.wdpaid.as_ref().map(normalize_scalar),
            KeyField::WdpaPId => self.wdpa_p_id.as_ref().map(normalize_scalar),
            KeyField::ZoneId => self.zone_id.as_ref().map(normalize_scalar),
        }
    }
}

/// Normalize an identifier value to its key token.
///
/// Floats are rounded to the nearest integer so `170.0` and `170` agree.
/// Floats outside the `i64` range keep their own textual form.
pub fn normalize_scalar(value: &Scalar) -> String {
    match value {
        Scalar::Int(v) => v.to_string(),
        Scalar::Float(v) => {
            let rounded = v.round();
            if (i64::MIN as f64..i64::MAX as f64).contains(&rounded) {
                (rounded as i64).to_string()
            } else {
                escape_text(&v.to_string())
            }
        }
        Scalar::Text(v) => escape_text(v),
    }
}

fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch == '\\' || ch == KEY_SEPARATOR {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Deterministic identity string built from an ordered set of key fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeKey(String);

impl CompositeKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds composite keys from a fixed field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    fields: Vec<KeyField>,
}

impl KeyBuilder {
    pub fn new(fields: Vec<KeyField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[KeyField] {
        &self.fields
    }

    /// Build the key for anything exposing key fields.
    pub fn key<K: Keyed + ?Sized>(&self, item: &K) -> CompositeKey {
        let mut key = String::new();
        for (position, field) in self.fields.iter().enumerate() {
            if position > 0 {
                key.push(KEY_SEPARATOR);
            }
            match item.key_token(*field) {
                Some(token) => key.push_str(&token),
                None => key.push_str(NULL_TOKEN),
            }
        }
        CompositeKey(key)
    }

    /// First required key field missing from `item`, if any.
    pub fn missing_required<K: Keyed + ?Sized>(&self, item: &K) -> Option<KeyField> {
        self.fields
            .iter()
            .copied()
            .find(|field| field.is_required() && item.key_token(*field).is_none())
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new(KeyField::default_key())
    }
}
