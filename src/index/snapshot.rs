//! On-disk snapshots of tenant indexes.
//!
//! Each project persists as a file pair under the configured root directory:
//!
//! - `project_{id}.vectors` — bincode: embedding dimension plus the
//!   append-only slot arena (bulk float data).
//! - `project_{id}.map` — JSON: the forward and reverse mapping tables.
//!
//! Snapshots are a warm-cache optimization, never a second source of truth.
//! The durable record store can always reproduce them via a rebuild, so any
//! unreadable or inconsistent snapshot is reported as an error and the
//! caller degrades to an empty index.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{PhotosearchError, Result};
use crate::index::{Slot, SlotEntry, TenantIndex};
use crate::vector::{AssetId, ProjectId, Vector};

const VECTORS_SUFFIX: &str = ".vectors";
const MAPPING_SUFFIX: &str = ".map";
const FILE_PREFIX: &str = "project_";

#[derive(Debug, Serialize, Deserialize)]
struct VectorsFile {
    dimension: usize,
    vectors: Vec<Vector>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MappingFile {
    forward: HashMap<Slot, SlotEntry>,
    reverse: HashMap<AssetId, Slot>,
}

/// Path of the vector arena file for a project.
pub fn vectors_path(root: &Path, project_id: ProjectId) -> PathBuf {
    root.join(format!("{FILE_PREFIX}{project_id}{VECTORS_SUFFIX}"))
}

/// Path of the mapping file for a project.
pub fn mapping_path(root: &Path, project_id: ProjectId) -> PathBuf {
    root.join(format!("{FILE_PREFIX}{project_id}{MAPPING_SUFFIX}"))
}

/// Write both snapshot files for a project.
///
/// Files are written to a temporary sibling and renamed into place so a
/// crash mid-write never leaves a truncated snapshot. Failed writes are
/// retried `retries` additional times before the error surfaces; retry
/// policy beyond that belongs to the caller.
pub fn save(
    root: &Path,
    project_id: ProjectId,
    index: &TenantIndex,
    retries: usize,
) -> Result<()> {
    fs::create_dir_all(root)?;

    let (dimension, vectors, forward, reverse) = index.parts();

    let vectors_bytes = bincode::serialize(&VectorsFile {
        dimension,
        vectors: vectors.clone(),
    })
    .map_err(|e| PhotosearchError::snapshot(format!("vector arena encode failed: {e}")))?;

    let mapping_bytes = serde_json::to_vec(&MappingFile {
        forward: forward.clone(),
        reverse: reverse.clone(),
    })?;

    write_atomic(&vectors_path(root, project_id), &vectors_bytes, retries)?;
    write_atomic(&mapping_path(root, project_id), &mapping_bytes, retries)?;
    Ok(())
}

/// Load a project's snapshot.
///
/// Returns `Ok(None)` when no snapshot exists. Corrupt or inconsistent
/// snapshot contents are an error; the registry treats that as "no usable
/// snapshot" and starts the project empty.
pub fn load(
    root: &Path,
    project_id: ProjectId,
    expected_dimension: usize,
) -> Result<Option<TenantIndex>> {
    let vectors_file = vectors_path(root, project_id);
    let mapping_file = mapping_path(root, project_id);
    if !vectors_file.exists() || !mapping_file.exists() {
        return Ok(None);
    }

    let vectors: VectorsFile = bincode::deserialize(&fs::read(&vectors_file)?)
        .map_err(|e| PhotosearchError::snapshot(format!("vector arena decode failed: {e}")))?;
    let mapping: MappingFile = serde_json::from_slice(&fs::read(&mapping_file)?)?;

    if vectors.dimension != expected_dimension {
        return Err(PhotosearchError::snapshot(format!(
            "snapshot dimension {} does not match configured dimension {}",
            vectors.dimension, expected_dimension
        )));
    }

    let index = TenantIndex::from_parts(
        vectors.dimension,
        vectors.vectors,
        mapping.forward,
        mapping.reverse,
    )?;
    Ok(Some(index))
}

/// List every project id with a vector arena file under the root.
///
/// Used for eager warm starts. Unrecognized file names are skipped. A
/// missing root directory yields an empty list.
pub fn scan_project_ids(root: &Path) -> Result<Vec<ProjectId>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut ids = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stem) = name
            .strip_prefix(FILE_PREFIX)
            .and_then(|rest| rest.strip_suffix(VECTORS_SUFFIX))
        else {
            continue;
        };
        if let Ok(project_id) = stem.parse::<ProjectId>() {
            ids.push(project_id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

fn write_atomic(path: &Path, bytes: &[u8], retries: usize) -> Result<()> {
    let tmp = path.with_extension(match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.tmp"),
        None => "tmp".to_string(),
    });

    let mut last_error = None;
    for attempt in 0..=retries {
        let result = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, path));
        match result {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(
                    "snapshot write to {} failed (attempt {}/{}): {}",
                    path.display(),
                    attempt + 1,
                    retries + 1,
                    e
                );
                last_error = Some(e);
            }
        }
    }
    Err(last_error
        .map(PhotosearchError::from)
        .unwrap_or_else(|| PhotosearchError::snapshot("snapshot write failed")))
}
