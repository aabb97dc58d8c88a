//! Single-entry zip packaging for config bundles.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::CryptoError;

/// Package `contents` as the only entry of a zip archive.
///
/// The entry timestamp is pinned to the zip epoch (1980-01-01) so identical
/// input always yields identical archive bytes.
pub fn package_single_entry(entry_name: &str, contents: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o600);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file(entry_name, options)?;
    writer.write_all(contents)?;
    let cursor = writer.finish()?;

    tracing::debug!(entry_name, bytes = contents.len(), "Packaged config archive");
    Ok(cursor.into_inner())
}
