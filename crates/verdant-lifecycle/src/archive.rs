//! Policy archive export/import.
//!
//! The archive is the portable form of a policy: its metadata, full block
//! config, and every referenced non-system schema, serialized to JSON and
//! gzip-compressed. Uuids and tags survive the round-trip untouched; uuids
//! are regenerated at publish time, not at import.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use verdant_contracts::{
    error::{EngineError, EngineResult},
    policy::Policy,
    schema::SchemaDocument,
    version::version_compare,
};

/// The decompressed archive content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyArchive {
    pub policy: Policy,
    pub schemas: Vec<SchemaDocument>,
}

/// Serialize and compress a policy with its schemas.
pub fn export(policy: &Policy, schemas: &[SchemaDocument]) -> EngineResult<Vec<u8>> {
    let archive = PolicyArchive {
        policy: policy.clone(),
        schemas: schemas.to_vec(),
    };
    let json = serde_json::to_vec(&archive)
        .map_err(|e| EngineError::validation(format!("could not encode policy archive: {e}")))?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .and_then(|_| encoder.finish())
        .map_err(|e| EngineError::validation(format!("could not compress policy archive: {e}")))
}

/// Decompress and parse an archive.
pub fn import_bytes(bytes: &[u8]) -> EngineResult<PolicyArchive> {
    let mut decoder = GzDecoder::new(bytes);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| EngineError::validation(format!("archive is not valid gzip: {e}")))?;
    serde_json::from_slice(&json)
        .map_err(|e| EngineError::validation(format!("archive content is malformed: {e}")))
}

/// Summary of an archive shown before import.
#[derive(Debug, Clone, Serialize)]
pub struct ArchivePreview {
    pub name: String,
    pub description: String,
    pub version: String,
    pub block_count: usize,
    pub schemas: Vec<SchemaPreviewEntry>,
    /// Versions newer than the archived one found on the source topic.
    pub newer_versions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaPreviewEntry {
    pub name: String,
    pub version: String,
}

/// Build the preview summary. `published_versions` holds every version seen
/// on the archive's source topic (empty for file-based imports, which have
/// no topic context).
pub fn preview(archive: &PolicyArchive, published_versions: &[String]) -> ArchivePreview {
    let mut block_count = 0;
    if let Some(config) = &archive.policy.config {
        config.walk(&mut |_| block_count += 1);
    }

    let mut newer_versions: Vec<String> = published_versions
        .iter()
        .filter(|v| version_compare(v, &archive.policy.version) > 0)
        .cloned()
        .collect();
    newer_versions.sort();
    newer_versions.dedup();

    ArchivePreview {
        name: archive.policy.name.clone(),
        description: archive.policy.description.clone(),
        version: archive.policy.version.clone(),
        block_count,
        schemas: archive
            .schemas
            .iter()
            .map(|s| SchemaPreviewEntry {
                name: s.name.clone(),
                version: s.version.clone(),
            })
            .collect(),
        newer_versions,
    }
}
