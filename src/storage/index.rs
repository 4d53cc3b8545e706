//! Nested-entry index: names of files of one type inside stored zips.
//!
//! The index is rebuilt from the upstream on every call and never cached.

use std::io::Cursor;

use tracing::info;
use zip::ZipArchive;

use super::contents::ContentsStore;
use crate::errors::StoreError;

/// Extension of the containers that are opened.
pub const CONTAINER_EXTENSION: &str = ".zip";

/// Result of an index scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Matching member names in encounter order, duplicates kept.
    Entries(Vec<String>),
    /// No container held a matching member.
    Empty,
}

impl IndexOutcome {
    pub fn into_entries(self) -> Vec<String> {
        match self {
            IndexOutcome::Entries(entries) => entries,
            IndexOutcome::Empty => Vec::new(),
        }
    }
}

/// Lowercase `ext` with exactly one leading dot (`"SB3"` -> `".sb3"`).
pub fn normalize_extension(ext: &str) -> String {
    format!(".{}", ext.trim_start_matches('.').to_ascii_lowercase())
}

fn has_extension(name: &str, dotted_lower: &str) -> bool {
    name.to_ascii_lowercase().ends_with(dotted_lower)
}

/// Collect the names of members ending in `target_extension` across every
/// `.zip` object in `store`.
///
/// Matching is case-insensitive for both the container and the member
/// extension.  A failed listing fails the scan.  Each container is isolated:
/// one that cannot be fetched, decoded, or opened is logged as a warning
/// and skipped.
pub async fn index(
    store: &ContentsStore,
    target_extension: &str,
) -> Result<IndexOutcome, StoreError> {
    let target = normalize_extension(target_extension);
    let entries = store.list().await?;

    let mut found = Vec::new();
    let mut scanned = 0usize;

    for entry in entries
        .iter()
        .filter(|e| has_extension(&e.name, CONTAINER_EXTENSION))
    {
        let Some(url) = entry.url.as_deref() else {
            continue;
        };

        let data = match store.fetch(url).await.and_then(|object| object.decode()) {
            Ok(data) => data,
            Err(StoreError::UnsupportedEncoding { encoding, .. }) => {
                store.log().warn(format!(
                    "Skipped {}: encoding={}",
                    entry.name,
                    encoding.as_deref().unwrap_or("None")
                ));
                continue;
            }
            Err(e) => {
                store
                    .log()
                    .warn(format!("Skipped {} while indexing: {e}", entry.name));
                continue;
            }
        };

        match member_names(data, &target) {
            Ok(names) => {
                scanned += 1;
                found.extend(names);
            }
            Err(e) => {
                store
                    .log()
                    .warn(format!("Skipped {}: not a readable zip: {e}", entry.name));
            }
        }
    }

    metrics::counter!(crate::metrics::INDEXED_ENTRIES_TOTAL).increment(found.len() as u64);
    info!(
        containers = scanned,
        matches = found.len(),
        extension = %target,
        "nested entries indexed"
    );

    if found.is_empty() {
        Ok(IndexOutcome::Empty)
    } else {
        Ok(IndexOutcome::Entries(found))
    }
}

/// Member names in `data` (a zip) that end in `dotted_lower`.
fn member_names(data: Vec<u8>, dotted_lower: &str) -> Result<Vec<String>, StoreError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut names = Vec::new();
    for i in 0..archive.len() {
        let file = archive.by_index_raw(i)?;
        if has_extension(file.name(), dotted_lower) {
            names.push(file.name().to_string());
        }
    }
    Ok(names)
}
