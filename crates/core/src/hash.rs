// SPDX-License-Identifier: MIT

//! Per-process rendezvous hashes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque per-process token whose string form doubles as a rendezvous
/// filename.
///
/// Generated once per master/worker record and kept stable across revives,
/// so a worker's status and shutdown-stub files keep the same path for the
/// whole lifetime of its record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessHash(String);

impl ProcessHash {
    /// Generate a fresh random hash (32 hex chars, 16 random bytes).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ProcessHash {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProcessHash {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
#[path = "hash_tests.rs"]
mod tests;
