//! Chooses which source rasters to cut for a given target vector (§4.5.2).

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use graph::FeatureName;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum RasterSelector {
    /// Draws up to `target_raster_count - already_have_count` candidates without
    /// replacement, seeded so a driver's selection is reproducible run to run.
    Random { target_raster_count: i64, seed: u64 },
}

impl RasterSelector {
    pub fn select(&self, already_have_count: i64, candidates: &[FeatureName], call_index: u64) -> Vec<FeatureName> {
        match self {
            RasterSelector::Random { target_raster_count, seed } => {
                let remaining = (*target_raster_count - already_have_count).max(0) as usize;
                if remaining == 0 || candidates.is_empty() {
                    return Vec::new();
                }
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(call_index));
                let mut pool: Vec<FeatureName> = candidates.to_vec();
                pool.shuffle(&mut rng);
                pool.truncate(remaining.min(pool.len()));
                pool
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<FeatureName> {
        (0..n).map(|i| FeatureName::from(format!("r{i}"))).collect()
    }

    #[test]
    fn draws_no_more_than_the_remaining_quota() {
        let selector = RasterSelector::Random { target_raster_count: 3, seed: 42 };
        let chosen = selector.select(1, &names(10), 0);
        assert_eq!(chosen.len(), 2);
    }

    #[test]
    fn returns_nothing_once_quota_already_met() {
        let selector = RasterSelector::Random { target_raster_count: 2, seed: 42 };
        let chosen = selector.select(2, &names(10), 0);
        assert!(chosen.is_empty());
    }

    #[test]
    fn never_draws_more_than_available_candidates() {
        let selector = RasterSelector::Random { target_raster_count: 10, seed: 7 };
        let chosen = selector.select(0, &names(3), 0);
        assert_eq!(chosen.len(), 3);
    }

    #[test]
    fn is_deterministic_for_a_fixed_seed_and_call_index() {
        let selector = RasterSelector::Random { target_raster_count: 2, seed: 99 };
        let a = selector.select(0, &names(10), 5);
        let b = selector.select(0, &names(10), 5);
        assert_eq!(a, b);
    }
}
