use burn::tensor::backend::Backend;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Seed the backend's RNG and return a host-side RNG from the same seed.
pub fn init_seeds<B: Backend>(seed: u64) -> StdRng {
    B::seed(seed);
    tracing::debug!(seed, "seeded backend and host rng");
    StdRng::seed_from_u64(seed)
}
