use crypt_objects::{CryptoObject, SecretSeed};
use crypt_primitives::DrbgEngine;
use crypt_types::{AlgFamily, AlgId, AllowedUsage, SecurityResult};
use tracing::debug;
use zeroize::Zeroizing;

use super::{require_family, require_usage, CryptoContext, SecretMaterial};

/// Random number generator, OS-seeded until explicitly reseeded.
pub struct RandomGeneratorCtx {
    alg: AlgId,
    engine: DrbgEngine,
    seeded: bool,
}

impl RandomGeneratorCtx {
    pub(crate) fn new(alg: AlgId) -> SecurityResult<Self> {
        require_family(alg, AlgFamily::Rng)?;
        Ok(Self {
            alg,
            engine: DrbgEngine::from_entropy(),
            seeded: false,
        })
    }

    /// Reseed deterministically from a seed that allows RNG initialisation.
    pub fn seed(&mut self, seed: &SecretSeed) -> SecurityResult<()> {
        require_usage(seed.header().allowed_usage, AllowedUsage::ALLOW_RNG_INIT)?;
        self.seed_bytes(seed.raw_material());
        Ok(())
    }

    /// Reseed deterministically from raw bytes.
    pub fn seed_bytes(&mut self, material: &[u8]) {
        self.engine = DrbgEngine::from_seed_material(material);
        self.seeded = true;
        debug!(alg = %self.alg, "generator reseeded");
    }

    pub fn add_entropy(&mut self, entropy: &[u8]) {
        self.engine.add_entropy(entropy);
    }

    pub fn generate(&mut self, out: &mut [u8]) {
        self.engine.fill(out);
    }

    pub fn generate_vec(&mut self, len: usize) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(vec![0u8; len]);
        self.engine.fill(&mut out);
        out
    }

    /// `true` once reseeded from caller material.
    pub fn is_deterministic(&self) -> bool {
        self.seeded
    }
}

impl CryptoContext for RandomGeneratorCtx {
    fn alg_id(&self) -> AlgId {
        self.alg
    }

    fn is_initialized(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for RandomGeneratorCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomGeneratorCtx")
            .field("alg", &self.alg)
            .field("seeded", &self.seeded)
            .finish_non_exhaustive()
    }
}
