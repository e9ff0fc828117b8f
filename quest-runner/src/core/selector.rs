//! Randomized endpoint selection without replacement.

use rand::Rng;

/// Tracks which endpoints have been tried for the current prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriedSet {
    tried: Vec<bool>,
}

impl TriedSet {
    pub fn new(endpoint_count: usize) -> Self {
        Self {
            tried: vec![false; endpoint_count],
        }
    }

    /// Indices not yet tried, in configuration order.
    pub fn untried(&self) -> Vec<usize> {
        self.tried
            .iter()
            .enumerate()
            .filter(|(_, tried)| !**tried)
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn is_exhausted(&self) -> bool {
        self.tried.iter().all(|tried| *tried)
    }

    /// Pick one untried index uniformly at random and mark it tried.
    ///
    /// Returns `None` once every endpoint has been tried.
    pub fn pick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<usize> {
        let untried = self.untried();
        if untried.is_empty() {
            return None;
        }
        let idx = untried[rng.gen_range(0..untried.len())];
        self.tried[idx] = true;
        Some(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::rngs::mock::StepRng;

    #[test]
    fn picks_every_index_exactly_once() {
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut set = TriedSet::new(3);
            let mut picked = Vec::new();
            while let Some(idx) = set.pick(&mut rng) {
                picked.push(idx);
            }
            picked.sort_unstable();
            assert_eq!(picked, vec![0, 1, 2], "seed {seed}");
            assert!(set.is_exhausted());
        }
    }

    #[test]
    fn zero_rng_walks_configuration_order() {
        let mut rng = StepRng::new(0, 0);
        let mut set = TriedSet::new(3);
        assert_eq!(set.pick(&mut rng), Some(0));
        assert_eq!(set.pick(&mut rng), Some(1));
        assert_eq!(set.pick(&mut rng), Some(2));
        assert_eq!(set.pick(&mut rng), None);
    }

    #[test]
    fn empty_set_is_immediately_exhausted() {
        let mut rng = StepRng::new(0, 0);
        let mut set = TriedSet::new(0);
        assert!(set.is_exhausted());
        assert_eq!(set.pick(&mut rng), None);
    }

    #[test]
    fn pick_marks_index_tried() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut set = TriedSet::new(2);
        assert_eq!(set.untried().len(), 2);
        set.pick(&mut rng);
        assert_eq!(set.untried().len(), 1);
    }
}
