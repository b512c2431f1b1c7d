//! Records and samples: the two value types the store hands out.

use serde::{Deserialize, Serialize};

use crate::sequence::Timestamp;

/// Identity of a series.
///
/// A record is created once, on the first load-with-create for its name, and
/// never changes afterwards. Values returned by the store are copies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    /// The series name. Never empty for a record produced by the store.
    pub name: String,
    /// When the record was created.
    pub created_at: Timestamp,
}

impl Record {
    /// Creates a record.
    pub fn new(name: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            name: name.into(),
            created_at,
        }
    }

    /// Returns whether this record names a series.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }

    /// Inode number for the file view of this record.
    pub fn inode(&self) -> u64 {
        self.created_at
    }
}

/// A value valid at a specific time.
///
/// Samples are immutable. For stored history, `observed_at` is the time the
/// write was sequenced; for query results it is the time the query ran.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// The observed value.
    pub value: f64,
    /// When the value was observed.
    pub observed_at: Timestamp,
}

impl Sample {
    /// Creates a sample.
    pub fn new(value: f64, observed_at: Timestamp) -> Self {
        Self { value, observed_at }
    }

    /// Renders the value as file content: shortest decimal form plus `\n`.
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}\n", self.value).into_bytes()
    }
}
