//! Prompt backlog with failure-driven pruning.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::Rng;
use tracing::{info, warn};

use crate::core::backlog::{add_pruned, shuffle_batch, working_set};
use crate::io::prompt_store::{load_optional_prompt_list, load_prompt_list, write_prompt_list};

/// The configured prompt superset minus the persisted pruned set.
///
/// Pruning is global across credentials and persists across runs until the
/// pruned file is cleared externally.
#[derive(Debug, Clone)]
pub struct QuestionPool {
    superset: Vec<String>,
    pruned: Vec<String>,
    pruned_path: PathBuf,
}

impl QuestionPool {
    /// Load the superset and the (possibly absent) pruned set.
    pub fn load(prompts_path: &Path, pruned_path: &Path) -> Result<Self> {
        let superset = load_prompt_list(prompts_path).context("load prompt superset")?;
        let pruned = load_optional_prompt_list(pruned_path).context("load pruned prompts")?;
        let pool = Self {
            superset,
            pruned,
            pruned_path: pruned_path.to_path_buf(),
        };
        info!(
            total = pool.superset.len(),
            pruned = pool.pruned.len(),
            working = pool.working_set().len(),
            "prompt pool ready"
        );
        Ok(pool)
    }

    pub fn superset_len(&self) -> usize {
        self.superset.len()
    }

    pub fn pruned(&self) -> &[String] {
        &self.pruned
    }

    /// Superset minus pruned, in superset order.
    pub fn working_set(&self) -> Vec<String> {
        working_set(&self.superset, &self.pruned)
    }

    /// Re-read the pruned set and return a freshly shuffled working set.
    ///
    /// An unreadable pruned file keeps the in-memory set.
    pub fn next_batch<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<String> {
        match load_optional_prompt_list(&self.pruned_path) {
            Ok(pruned) => self.pruned = pruned,
            Err(err) => warn!(
                path = %self.pruned_path.display(),
                error = %format!("{err:#}"),
                kept = self.pruned.len(),
                "could not reload pruned prompts, keeping the current set"
            ),
        }
        let mut batch = self.working_set();
        shuffle_batch(&mut batch, rng);
        batch
    }

    /// Record that no endpoint could answer `prompt` and persist the pruned
    /// set immediately. Returns true if the prompt was newly pruned.
    pub fn record_total_failure(&mut self, prompt: &str) -> Result<bool> {
        if !add_pruned(&mut self.pruned, prompt) {
            return Ok(false);
        }
        if let Err(err) = write_prompt_list(&self.pruned_path, &self.pruned) {
            warn!(path = %self.pruned_path.display(), "failed to persist pruned prompts");
            self.pruned.retain(|existing| existing != prompt);
            return Err(err);
        }
        info!(path = %self.pruned_path.display(), "prompt pruned");
        Ok(true)
    }
}
