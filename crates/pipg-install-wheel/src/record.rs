use std::io::Write;

/// A single line of a `RECORD` file: path, hash, size.
///
/// Hash and size are empty for the `RECORD` entry itself, per the
/// recording-installed-packages spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    /// Path relative to site-packages, `/`-separated.
    pub path: String,
    /// `sha256=<hex digest>`, or empty.
    pub hash: String,
    /// File size in bytes, or `None` for the RECORD line.
    pub size: Option<u64>,
}

impl RecordEntry {
    pub(crate) fn new(path: String, sha256_hex: &str, size: u64) -> Self {
        Self {
            path,
            hash: format!("sha256={sha256_hex}"),
            size: Some(size),
        }
    }
}

/// Serialize RECORD entries as CSV into `writer`, appending the empty
/// self-entry for `record_path`.
pub(crate) fn write_record(
    writer: impl Write,
    record_path: &str,
    entries: &[RecordEntry],
) -> Result<(), csv::Error> {
    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
    for entry in entries {
        csv_writer.write_record([
            entry.path.as_str(),
            entry.hash.as_str(),
            &entry.size.map(|size| size.to_string()).unwrap_or_default(),
        ])?;
    }
    // The RECORD file cannot contain its own hash and size.
    csv_writer.write_record([record_path, "", ""])?;
    csv_writer.flush()?;
    Ok(())
}
