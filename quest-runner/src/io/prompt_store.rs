//! JSON storage for the prompt superset and the pruned set.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Load a JSON array of strings.
pub fn load_prompt_list(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let prompts: Vec<String> = serde_json::from_str(&contents)
        .with_context(|| format!("parse {} as a JSON array of strings", path.display()))?;
    debug!(path = %path.display(), count = prompts.len(), "prompt list loaded");
    Ok(prompts)
}

/// Load a prompt list that may not exist yet; a missing file is empty.
pub fn load_optional_prompt_list(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        debug!(path = %path.display(), "prompt list missing, treating as empty");
        return Ok(Vec::new());
    }
    load_prompt_list(path)
}

/// Atomically replace the file with a pretty-printed JSON array.
pub fn write_prompt_list(path: &Path, prompts: &[String]) -> Result<()> {
    debug!(path = %path.display(), count = prompts.len(), "writing prompt list");
    let mut buf = serde_json::to_string_pretty(prompts).context("serialize prompt list")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
