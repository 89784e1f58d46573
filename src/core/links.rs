use anyhow::{Context, Result};
use std::path::Path;

/// Reads one URL per line, skipping blank lines and `#` comments.
pub fn load_links<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read link file: {}", path.display()))?;
    Ok(parse_links(&content))
}

pub fn parse_links(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
