//! Bundle export: every stored object in one zip archive.

use std::io::{Cursor, Write};

use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::contents::ContentsStore;
use crate::errors::StoreError;

/// Name clients receive the bundle under.
pub const BUNDLE_FILENAME: &str = "uploads.zip";

/// Build a zip of every object in `store`.
///
/// A failed listing fails the export before any object is fetched.
/// After that, objects are isolated from each other: one that cannot be
/// fetched, is not base64, or is empty is skipped with a warning in the
/// upload log.  Members are named exactly after the objects and appear in
/// listing order.
pub async fn export(store: &ContentsStore) -> Result<Vec<u8>, StoreError> {
    let entries = store.list().await?;
    debug!(objects = entries.len(), "exporting bundle");

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut written = 0usize;

    for entry in &entries {
        let Some(url) = entry.url.as_deref() else {
            continue;
        };
        if entry.name.is_empty() {
            continue;
        }

        let object = match store.fetch(url).await {
            Ok(object) => object,
            Err(e) => {
                store
                    .log()
                    .warn(format!("Skipped {}: fetch failed: {e}", entry.name));
                continue;
            }
        };

        let data = match object.decode() {
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
                store.log().warn(format!("Skipped {}: {e}", entry.name));
                continue;
            }
        };

        zip.start_file(entry.name.as_str(), options)?;
        zip.write_all(&data)?;
        written += 1;
    }

    let bytes = zip.finish()?.into_inner();
    metrics::counter!(crate::metrics::BUNDLE_OBJECTS_TOTAL).increment(written as u64);
    info!(
        objects = written,
        listed = entries.len(),
        size = bytes.len(),
        "bundle exported"
    );
    Ok(bytes)
}
