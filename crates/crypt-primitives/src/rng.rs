use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256};

/// Deterministic generator that can be seeded and topped up with entropy.
pub struct DrbgEngine {
    rng: StdRng,
}

impl DrbgEngine {
    /// Seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Seeded deterministically from arbitrary-length material.
    pub fn from_seed_material(material: &[u8]) -> Self {
        let seed: [u8; 32] = Sha256::digest(material).into();
        Self {
            rng: StdRng::from_seed(seed),
        }
    }

    /// Mix `entropy` into the state.
    pub fn add_entropy(&mut self, entropy: &[u8]) {
        let mut current = [0u8; 32];
        self.rng.fill_bytes(&mut current);
        let mut hasher = Sha256::new();
        hasher.update(current);
        hasher.update(entropy);
        self.rng = StdRng::from_seed(hasher.finalize().into());
        current.fill(0);
    }

    pub fn fill(&mut self, out: &mut [u8]) {
        self.rng.fill_bytes(out);
    }
}

impl std::fmt::Debug for DrbgEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DrbgEngine(<state>)")
    }
}
