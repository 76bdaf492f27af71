//! Schema document types and schema-set comparison.
//!
//! Schemas live on a policy's topic and are versioned independently of the
//! policy. Publish increments and publishes every draft schema the policy
//! references; already-published schemas are skipped and counted separately.

use serde::{Deserialize, Serialize};

/// Publication state of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaStatus {
    Draft,
    Published,
}

/// A schema document as tracked alongside a policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Stable IRI referenced from block configs.
    pub iri: String,
    pub name: String,
    pub version: String,
    pub status: SchemaStatus,
    pub topic_id: String,
    pub owner: String,
    /// System schemas ship with the engine and are published once per
    /// policy topic at creation time.
    #[serde(default)]
    pub system: bool,
    /// The schema body. Opaque to the engine.
    #[serde(default)]
    pub document: serde_json::Value,
}

impl SchemaDocument {
    /// Pairwise similarity code.
    ///
    /// Negative values are full-match sentinels (`-1`: same iri and version,
    /// `-2`: same iri, different version); non-negative values are a 0..100
    /// similarity rate.
    pub fn compare(&self, other: &SchemaDocument) -> i32 {
        if self.iri == other.iri {
            if self.version == other.version {
                return -1;
            }
            return -2;
        }
        if self.name == other.name {
            100
        } else {
            0
        }
    }
}

/// Aggregate similarity of two schema sets.
///
/// For every schema in the first set, takes its best match in the second;
/// the aggregate is the weakest of those best matches, mapped back to the
/// sentinel bands (`-1` all exact, `-2` all same-iri, `-3` near-full,
/// otherwise the 0..100 rate). Returns 0 when either set is empty.
pub fn compare_schema_sets(first: &[SchemaDocument], second: &[SchemaDocument]) -> i32 {
    if first.is_empty() || second.is_empty() {
        return 0;
    }

    if first.len() == 1 && second.len() == 1 {
        return first[0].compare(&second[0]);
    }

    let mut min = 104;
    for schema1 in first {
        let mut max = 0;
        for schema2 in second {
            let mut result = schema1.compare(schema2);
            if result < 0 {
                result += 104;
            }
            max = max.max(result);
        }
        min = min.min(max);
    }

    if min >= 103 {
        -1
    } else if min >= 102 {
        -2
    } else if min > 100 {
        -3
    } else {
        min
    }
}
