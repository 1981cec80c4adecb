use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info};

use super::params::ForestParams;
use crate::concurrency::{Progress, Worker, WorkerGroup};
use crate::data::grid::{partition_range, ProbabilityGrid, ProbabilitySliceMut, SampleGrid};
use crate::data::rng_from;
use crate::data::sampler::{BootstrapSampler, Sampler, Sampling};
use crate::error::{ForestError, Result};
use crate::features::FeatureFactory;
use crate::trees::random_tree::RandomTree;

/// Ensemble of random trees grown on samples of the same pool.
#[derive(Debug)]
pub struct Forest {
    params: ForestParams,
    factory: Arc<FeatureFactory>,
    trees: Vec<RandomTree>,
}

impl Forest {
    pub fn new(params: ForestParams, factory: Arc<FeatureFactory>) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            factory,
            trees: Vec::new(),
        })
    }

    /// Forest drawing candidates from every built-in feature family.
    pub fn with_standard_features(params: ForestParams) -> Result<Self> {
        let factory = Arc::new(FeatureFactory::standard(params.features.clone()));
        Self::new(params, factory)
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn factory(&self) -> &Arc<FeatureFactory> {
        &self.factory
    }

    pub fn trees(&self) -> &[RandomTree] {
        &self.trees
    }

    /// Changes how many frame ranges `classify` processes at once.
    pub fn set_classify_threads(&mut self, classify_threads: usize) -> Result<()> {
        self.params.set_classify_threads(classify_threads)
    }

    pub fn is_grown(&self) -> bool {
        !self.trees.is_empty() && self.trees.iter().all(RandomTree::is_grown)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.params.poll_interval_ms)
    }

    /// Pool a single tree is grown on. With `bootstrap` set every dataset of the pool is
    /// bagged afresh; otherwise `sampler` decides.
    fn draw_sample(&self, sampler: &dyn Sampling, seed: u64) -> Result<Sampler> {
        if self.params.bootstrap {
            BootstrapSampler::new(sampler.pool().to_vec()).get_sample(Some(seed))
        } else {
            sampler.get_sample(Some(seed))
        }
    }

    /// Grows every tree on its own sample of `sampler`.
    ///
    /// Samples are drawn, every dataset loaded and its class codes checked up front, so
    /// configuration and load errors surface before any tree starts. With more than one tree thread the trees
    /// are grown by a worker group, where a failing tree terminates the process.
    pub fn grow(&mut self, sampler: &dyn Sampling) -> Result<()> {
        self.params.validate()?;
        self.factory.validate()?;
        if sampler.pool_size() == 0 {
            return Err(ForestError::EmptyPool);
        }
        for dataset in sampler.pool() {
            dataset
                .load()?
                .check_classes(dataset.name(), self.params.tree.num_classes)?;
        }

        let started = Instant::now();
        let num_trees = self.params.num_trees;
        info!(
            trees = num_trees,
            datasets = sampler.pool_size(),
            threads = self.params.tree_threads,
            "Growing forest"
        );

        let mut rng = rng_from(self.params.seed);
        let mut samples = Vec::with_capacity(num_trees);
        let mut trees = Vec::with_capacity(num_trees);
        for index in 0..num_trees {
            samples.push(self.draw_sample(sampler, rng.gen())?);
            let mut params = self.params.tree.clone();
            params.set_seed(Some(rng.gen()));
            trees.push(RandomTree::new(index, params, self.factory.clone()));
        }

        if self.params.tree_threads <= 1 || num_trees == 1 {
            for (tree, sample) in trees.iter_mut().zip(&samples) {
                tree.grow(sample)?;
            }
        } else {
            let mut group = WorkerGroup::new("forest-grow", self.params.tree_threads);
            for (tree, sample) in trees.iter_mut().zip(&samples) {
                let index = tree.index();
                group.push(Worker::new(index..index + 1, move |_, _| tree.grow(sample)));
            }
            group.run_group(self.poll_interval());
        }

        for tree in &trees {
            debug!(
                tree = tree.index(),
                depth = tree.depth(),
                nodes = tree.node_count(),
                leaves = tree.leaf_count(),
                "Tree ready"
            );
        }
        self.trees = trees;
        info!(
            trees = num_trees,
            elapsed_s = started.elapsed().as_secs_f64(),
            "Forest grown"
        );
        Ok(())
    }

    /// Averages the leaf probabilities of every tree at one pixel.
    pub fn classify_pixel(&self, grid: &SampleGrid, x: usize, y: usize) -> Result<Vec<f32>> {
        if !self.is_grown() {
            return Err(ForestError::NotGrown);
        }
        let mut probabilities = vec![0.0; self.params.tree.num_classes];
        self.accumulate(grid, x, y, &mut probabilities)?;
        Ok(probabilities)
    }

    fn accumulate(&self, grid: &SampleGrid, x: usize, y: usize, pixel: &mut [f32]) -> Result<()> {
        pixel.fill(0.0);
        for tree in &self.trees {
            for (total, p) in pixel.iter_mut().zip(tree.classify_pixel(grid, x, y)?) {
                *total += p;
            }
        }
        let count = self.trees.len() as f32;
        pixel.iter_mut().for_each(|p| *p /= count);
        Ok(())
    }

    fn classify_frames(
        &self,
        grid: &SampleGrid,
        slice: &mut ProbabilitySliceMut<'_>,
        progress: &Progress,
    ) -> Result<()> {
        let frames = slice.frames();
        let total = frames.len();
        for (done, x) in frames.enumerate() {
            for y in 0..grid.bins() {
                self.accumulate(grid, x, y, slice.pixel_mut(x, y))?;
            }
            progress.set_done(done + 1, total);
        }
        Ok(())
    }

    /// Class probabilities of every pixel of `grid`, averaged over the trees.
    ///
    /// With more than one classification thread the frames are cut into contiguous
    /// ranges, each written by its own worker into a disjoint part of the output.
    pub fn classify(&self, grid: &SampleGrid) -> Result<ProbabilityGrid> {
        if !self.is_grown() {
            return Err(ForestError::NotGrown);
        }
        let mut output =
            ProbabilityGrid::new(grid.frames(), grid.bins(), self.params.tree.num_classes);
        let threads = self.params.classify_threads.min(grid.frames()).max(1);
        if threads == 1 {
            self.classify_frames(grid, &mut output.as_mut_slice(), &Progress::default())?;
            return Ok(output);
        }

        let ranges = partition_range(grid.frames(), threads);
        let mut group = WorkerGroup::new("forest-classify", threads);
        for (range, mut slice) in ranges.iter().zip(output.split_frames_mut(&ranges)) {
            group.push(Worker::new(range.clone(), move |_, progress| {
                self.classify_frames(grid, &mut slice, progress)
            }));
        }
        group.run_group(self.poll_interval());
        Ok(output)
    }

    /// Path of the file holding tree `index` of a forest stored under `prefix`.
    pub fn tree_path(prefix: &Path, index: usize) -> PathBuf {
        let mut name = OsString::from(prefix.as_os_str());
        name.push(format!(".tree{index}.json"));
        PathBuf::from(name)
    }

    /// Writes every tree to its own file under `prefix`.
    pub fn save(&self, prefix: &Path) -> Result<Vec<PathBuf>> {
        if !self.is_grown() {
            return Err(ForestError::NotGrown);
        }
        let mut paths = Vec::with_capacity(self.trees.len());
        for tree in &self.trees {
            let path = Self::tree_path(prefix, tree.index());
            tree.save(&path)?;
            paths.push(path);
        }
        info!(trees = paths.len(), prefix = %prefix.display(), "Saved forest");
        Ok(paths)
    }

    /// Reads `params.num_trees` trees stored under `prefix`, restoring their features
    /// through `factory`.
    pub fn load(
        prefix: &Path,
        params: ForestParams,
        factory: Arc<FeatureFactory>,
    ) -> Result<Self> {
        params.validate()?;
        let trees = (0..params.num_trees)
            .map(|index| {
                RandomTree::load(
                    &Self::tree_path(prefix, index),
                    params.tree.clone(),
                    factory.clone(),
                )
            })
            .collect::<Result<Vec<_>>>()?;
        info!(trees = trees.len(), prefix = %prefix.display(), "Loaded forest");
        Ok(Self {
            params,
            factory,
            trees,
        })
    }
}
