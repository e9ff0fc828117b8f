//! I/O helpers for quest runner commands.

pub mod agent;
pub mod auth;
pub mod config;
pub mod credentials;
#[cfg(test)]
pub(crate) mod http_stub;
pub mod prompt_store;
pub mod process;
pub mod proxies;
pub mod signer;
pub mod telemetry;
pub mod transport;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Write `contents` to `path` via a sibling temp file and rename.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path has no file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
