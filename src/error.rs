//! Errors raised by hierarchy assignment and diffing.

use crate::identity::{CompositeKey, KeyField};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which input a violating record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Candidates,
    Snapshot,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Candidates => f.write_str("candidate batch"),
            Side::Snapshot => f.write_str("snapshot"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ReconcileError {
    /// Two records in one input share a composite key.
    #[error("duplicate composite key {key} in {side} (records {first} and {second})")]
    DuplicateKey {
        key: CompositeKey,
        side: Side,
        first: usize,
        second: usize,
    },

    /// A record is missing a field required to identify it.
    #[error("record {index} in {side} is missing required field {field}")]
    MalformedRecord {
        index: usize,
        side: Side,
        field: KeyField,
    },

    /// A snapshot record has no persisted id.
    #[error("snapshot record {key} has no persisted id")]
    MissingPersistedId { key: CompositeKey },
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
