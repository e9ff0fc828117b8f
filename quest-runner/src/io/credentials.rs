//! Wallet list loading.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::core::types::Credential;

/// Load newline-delimited wallet addresses, optionally paired with a parallel
/// file of secrets (one per line, same order).
pub fn load_credentials(path: &Path, secrets_path: Option<&Path>) -> Result<Vec<Credential>> {
    let addresses = read_lines(path)?;
    let credentials: Vec<Credential> = match secrets_path {
        None => addresses.into_iter().map(Credential::new).collect(),
        Some(secrets_path) => {
            let secrets = read_lines(secrets_path)?;
            if secrets.len() != addresses.len() {
                bail!(
                    "{} lists {} wallets but {} lists {} secrets",
                    path.display(),
                    addresses.len(),
                    secrets_path.display(),
                    secrets.len()
                );
            }
            addresses
                .into_iter()
                .zip(secrets)
                .map(|(address, secret)| Credential::with_secret(address, secret))
                .collect()
        }
    };
    debug!(path = %path.display(), count = credentials.len(), "credentials loaded");
    Ok(credentials)
}

/// Keep only the credentials whose address is listed, in the listed order.
///
/// An empty selection keeps everything.
pub fn select_credentials(all: &[Credential], wanted: &[String]) -> Result<Vec<Credential>> {
    if wanted.is_empty() {
        return Ok(all.to_vec());
    }
    wanted
        .iter()
        .map(|address| {
            all.iter()
                .find(|credential| &credential.address == address)
                .cloned()
                .with_context(|| format!("wallet {address} is not in the credential list"))
        })
        .collect()
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
