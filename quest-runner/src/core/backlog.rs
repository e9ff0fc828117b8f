//! Working-set derivation for the prompt backlog.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;

/// Prompts from `superset` that are not in `pruned`, in superset order.
pub fn working_set(superset: &[String], pruned: &[String]) -> Vec<String> {
    let pruned: HashSet<&str> = pruned.iter().map(String::as_str).collect();
    superset
        .iter()
        .filter(|prompt| !pruned.contains(prompt.as_str()))
        .cloned()
        .collect()
}

/// Uniform in-place shuffle of the batch.
pub fn shuffle_batch<R: Rng + ?Sized>(batch: &mut [String], rng: &mut R) {
    batch.shuffle(rng);
}

/// Append `prompt` to the pruned list unless already present.
///
/// Returns true if the list changed.
pub fn add_pruned(pruned: &mut Vec<String>, prompt: &str) -> bool {
    if pruned.iter().any(|existing| existing == prompt) {
        return false;
    }
    pruned.push(prompt.to_string());
    true
}
