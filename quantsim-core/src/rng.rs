//! Deterministic RNG hierarchy.
//!
//! A master seed expands into sub-seeds for each `(label, iteration)` pair via
//! BLAKE3. Derivation is hash-based, so a Monte Carlo sample or a frontier
//! draw gets the same stream whichever rayon worker happens to run it.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Deterministic RNG hierarchy keyed by a master seed.
#[derive(Debug, Clone)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    /// Hierarchy for an optional seed; `None` draws the master seed from OS entropy.
    pub fn from_option(seed: Option<u64>) -> Self {
        Self::new(seed.unwrap_or_else(rand::random))
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Sub-seed for `(label, iteration)`. Independent of derivation order.
    pub fn sub_seed(&self, label: &str, iteration: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(label.as_bytes());
        hasher.update(&iteration.to_le_bytes());
        let hash = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }

    pub fn rng_for(&self, label: &str, iteration: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(label, iteration))
    }
}
