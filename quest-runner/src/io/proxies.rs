//! Proxy list loading.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::proxy::ProxyDescriptor;

/// Load newline-delimited proxy descriptors. Blank lines and `#` comments are
/// skipped; a malformed line fails the load with its line number.
pub fn load_proxies(path: &Path) -> Result<Vec<ProxyDescriptor>> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let proxies = parse_proxy_list(&contents)
        .with_context(|| format!("parse proxy list {}", path.display()))?;
    debug!(path = %path.display(), count = proxies.len(), "proxies loaded");
    Ok(proxies)
}

/// Load the proxy list, treating a missing file as empty.
pub fn load_optional_proxies(path: &Path) -> Result<Vec<ProxyDescriptor>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    load_proxies(path)
}

fn parse_proxy_list(contents: &str) -> Result<Vec<ProxyDescriptor>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            ProxyDescriptor::parse(line).with_context(|| format!("line {}", idx + 1))
        })
        .collect()
}
