use crate::core::ProductRecord;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Writes records as a pretty-printed JSON array, creating parent directories as needed.
/// Non-ASCII text is written as-is.
pub fn write_json<P: AsRef<Path>>(path: P, records: &[ProductRecord]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(records)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
    debug!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}
