//! Per-credential score accounting.

use std::collections::HashMap;

/// Accumulates points per credential address and compares them to the goal.
///
/// Scores only move upward within a run; [`ProgressTracker::reset`] starts a
/// new run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressTracker {
    goal: u32,
    scores: HashMap<String, u32>,
}

impl ProgressTracker {
    pub fn new(goal: u32) -> Self {
        Self {
            goal,
            scores: HashMap::new(),
        }
    }

    /// Start every listed credential at zero and drop anything else.
    pub fn reset<'a>(&mut self, addresses: impl IntoIterator<Item = &'a str>) {
        self.scores.clear();
        for address in addresses {
            self.scores.insert(address.to_string(), 0);
        }
    }

    /// Add `amount` to the credential's score and return the new total.
    pub fn credit(&mut self, address: &str, amount: u32) -> u32 {
        let score = self.scores.entry(address.to_string()).or_insert(0);
        *score = score.saturating_add(amount);
        *score
    }

    pub fn score(&self, address: &str) -> u32 {
        self.scores.get(address).copied().unwrap_or(0)
    }

    pub fn is_goal_reached(&self, address: &str) -> bool {
        self.score(address) >= self.goal
    }

    /// True when every listed credential has reached the goal.
    ///
    /// An empty selection never counts as complete.
    pub fn all_reached<'a>(&self, addresses: impl IntoIterator<Item = &'a str>) -> bool {
        let mut any = false;
        for address in addresses {
            if !self.is_goal_reached(address) {
                return false;
            }
            any = true;
        }
        any
    }
}
