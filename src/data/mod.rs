use rand::{rngs::StdRng, SeedableRng};

/// Datasets and their lazy grid sources
pub mod dataset;
/// Sample, reference, classification and probability grids
pub mod grid;
/// Dataset pools and bootstrap resampling
pub mod sampler;

/// Seeded generator, or one drawn from entropy when no seed is given.
pub(crate) fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
