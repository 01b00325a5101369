//! Append captured output to files named in the test definition.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

/// Append `lines` to `path`, newline-terminated, creating the file if needed.
///
/// Empty output still creates the file but appends nothing.
pub fn append_lines(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    if lines.is_empty() {
        return Ok(());
    }
    let mut buf = lines.join("\n");
    buf.push('\n');
    file.write_all(buf.as_bytes())
        .with_context(|| format!("append to {}", path.display()))?;
    Ok(())
}
