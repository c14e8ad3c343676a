//! Deterministic seed hierarchy.
//!
//! A master seed generates deterministic sub-seeds for each `(scope, component,
//! index)` tuple, e.g. `("sim", "fill_model", 0)`. Sub-seeds are derived via
//! BLAKE3 hashing, so adding a broker or reordering construction never shifts
//! the random stream another component sees.

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct SeedHierarchy {
    master_seed: u64,
}

impl SeedHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive a deterministic sub-seed for a specific (scope, component, index).
    ///
    /// Independent of derivation order: asking for `("a", "x", 0)` before or
    /// after `("b", "x", 0)` yields the same values.
    pub fn sub_seed(&self, scope: &str, component: &str, index: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        // Length prefixes keep ("ab", "c") and ("a", "bc") apart.
        hasher.update(&(scope.len() as u64).to_le_bytes());
        hasher.update(scope.as_bytes());
        hasher.update(&(component.len() as u64).to_le_bytes());
        hasher.update(component.as_bytes());
        hasher.update(&index.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Create a seeded StdRng from a sub-seed.
    pub fn rng_for(&self, scope: &str, component: &str, index: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(scope, component, index))
    }
}
