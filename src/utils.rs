//! # Utils Module
//!
//! Human-readable and JSON exports of a change set.

use crate::diff::ChangeSet;
use crate::identity::KeyBuilder;
use anyhow::Result;
use std::fmt::Write;

/// Export a change set as a text summary.
pub fn export_to_text_summary(change_set: &ChangeSet, keys: &KeyBuilder) -> Result<String> {
    let summary = change_set.summary();
    let mut out = String::new();

    writeln!(out, "Catalogue Sync Summary")?;
    writeln!(out, "======================")?;
    writeln!(out)?;
    writeln!(out, "New: {}", summary.new)?;
    writeln!(out, "Changed: {}", summary.changed)?;
    writeln!(out, "Deleted: {}", summary.deleted)?;
    writeln!(out, "Unchanged: {}", summary.unchanged)?;
    writeln!(out, "Dangling references: {}", summary.dangling)?;
    writeln!(out)?;

    if !summary.field_totals.is_empty() {
        writeln!(out, "Changes by field:")?;
        for (field, total) in &summary.field_totals {
            writeln!(out, "  {}: {}", field, total)?;
        }
        writeln!(out)?;
    }

    for row in change_set.changed_fields.iter().filter(|row| row.any()) {
        let fields: Vec<&str> = row.changed().map(|field| field.name()).collect();
        writeln!(out, "  ~ {} [{}] {}", row.id, row.key, fields.join(", "))?;
    }
    for record in &change_set.new {
        writeln!(out, "  + [{}] {}", keys.key(record), record.name.as_deref().unwrap_or("-"))?;
    }
    for id in &change_set.deleted {
        writeln!(out, "  - {}", id)?;
    }

    Ok(out)
}

/// Serialize a change set to pretty JSON.
pub fn export_to_json(change_set: &ChangeSet) -> Result<String> {
    Ok(serde_json::to_string_pretty(change_set)?)
}
