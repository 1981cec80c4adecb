use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::data::dataset::Dataset;
use crate::data::rng_from;
use crate::error::{ForestError, Result};

/// Source of training pools for tree growth.
pub trait Sampling: Send + Sync {
    /// Every dataset of the underlying pool.
    fn pool(&self) -> &[Dataset];

    /// Draws the pool a single tree is grown on.
    fn get_sample(&self, seed: Option<u64>) -> Result<Sampler>;

    fn pool_size(&self) -> usize {
        self.pool().len()
    }
}

/// Ordered pool of datasets. The same dataset may appear more than once.
#[derive(Clone, Debug, Default)]
pub struct Sampler {
    pool: Vec<Dataset>,
}

impl Sampler {
    pub fn new(pool: Vec<Dataset>) -> Self {
        Self { pool }
    }

    pub fn add(&mut self, dataset: Dataset) {
        self.pool.push(dataset);
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn datasets(&self) -> &[Dataset] {
        &self.pool
    }

    /// Loads every dataset of the pool, failing on the first broken one.
    pub fn load_all(&self) -> Result<()> {
        for dataset in &self.pool {
            dataset.load()?;
        }
        Ok(())
    }

    /// Partitions the pool into `parts` disjoint samplers of random membership.
    ///
    /// Every sampler takes `ceil(pool / parts)` datasets while any remain, so the last
    /// ones may be smaller or empty. Sizes always sum to the pool size.
    pub fn split(&self, parts: usize, seed: Option<u64>) -> Result<Vec<Sampler>> {
        if parts < 1 {
            return Err(ForestError::InvalidParameter(
                "The number of sampler parts must be greater than 0.".into(),
            ));
        }
        let mut rng = rng_from(seed);
        let mut indices = (0..self.pool.len()).collect::<Vec<_>>();
        indices.shuffle(&mut rng);

        let part_size = self.pool.len().div_ceil(parts);
        let mut remaining = indices.as_slice();
        let mut samplers = Vec::with_capacity(parts);
        for _ in 0..parts {
            let take = part_size.min(remaining.len());
            let (head, tail) = remaining.split_at(take);
            samplers.push(Sampler::new(
                head.iter().map(|&index| self.pool[index].clone()).collect(),
            ));
            remaining = tail;
        }
        Ok(samplers)
    }
}

impl Sampling for Sampler {
    fn pool(&self) -> &[Dataset] {
        &self.pool
    }

    /// The pool as it is: no resampling.
    fn get_sample(&self, _seed: Option<u64>) -> Result<Sampler> {
        Ok(self.clone())
    }
}

/// Sampler that bags every dataset by drawing its frames with replacement.
#[derive(Clone, Debug, Default)]
pub struct BootstrapSampler {
    inner: Sampler,
}

impl BootstrapSampler {
    pub fn new(pool: Vec<Dataset>) -> Self {
        Self {
            inner: Sampler::new(pool),
        }
    }

    pub fn sampler(&self) -> &Sampler {
        &self.inner
    }

    pub fn split(&self, parts: usize, seed: Option<u64>) -> Result<Vec<BootstrapSampler>> {
        Ok(self
            .inner
            .split(parts, seed)?
            .into_iter()
            .map(|inner| BootstrapSampler { inner })
            .collect())
    }
}

impl From<Sampler> for BootstrapSampler {
    fn from(inner: Sampler) -> Self {
        Self { inner }
    }
}

impl Sampling for BootstrapSampler {
    fn pool(&self) -> &[Dataset] {
        self.inner.pool()
    }

    /// Clones every dataset and redraws its in-bag frames, `length()` draws with replacement.
    fn get_sample(&self, seed: Option<u64>) -> Result<Sampler> {
        let mut rng = rng_from(seed);
        let mut pool = Vec::with_capacity(self.inner.pool.len());
        for dataset in &self.inner.pool {
            let mut resampled = dataset.get_clone();
            let frames = resampled.length()?;
            let mut mask = vec![false; frames];
            for _ in 0..frames {
                mask[rng.gen_range(0..frames)] = true;
            }
            resampled.replace(mask)?;
            debug!(
                dataset = resampled.name(),
                frames,
                in_bag = resampled.in_bag_frames().unwrap_or(frames),
                "Bootstrapped dataset"
            );
            pool.push(resampled);
        }
        Ok(Sampler::new(pool))
    }
}
