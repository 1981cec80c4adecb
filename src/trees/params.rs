use serde::{Deserialize, Serialize};

use crate::error::{ForestError, Result};

fn invalid(message: &str) -> ForestError {
    ForestError::InvalidParameter(message.to_string())
}

/// Growth parameters of a single random tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    pub num_classes: usize,
    pub max_depth: u16,
    /// Minimum number of active pixels a node needs to be split.
    pub min_samples: usize,
    /// Random features drawn per node.
    pub num_candidates: usize,
    /// Random thresholds drawn per candidate feature.
    pub num_thresholds: usize,
    /// Fraction of the bins of an in-bag frame activated at the root.
    pub pixel_fraction: f64,
    /// Threads available for growing subtrees concurrently.
    pub node_threads: usize,
    /// Subtrees with fewer active pixels than this may be grown in their own thread.
    pub node_thread_max_pixels: usize,
    /// Nodes with at least this many active pixels split their candidate search across workers.
    pub search_parallel_min_pixels: usize,
    pub search_chunks: usize,
    pub poll_interval_ms: u64,
    pub seed: Option<u64>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeParams {
    pub fn new() -> Self {
        Self {
            num_classes: 2,
            max_depth: 12,
            min_samples: 4,
            num_candidates: 20,
            num_thresholds: 10,
            pixel_fraction: 0.3,
            node_threads: 4,
            node_thread_max_pixels: 50_000,
            search_parallel_min_pixels: 200_000,
            search_chunks: 4,
            poll_interval_ms: 2_000,
            seed: None,
        }
    }

    pub fn set_num_classes(&mut self, num_classes: usize) -> Result<()> {
        if num_classes < 1 {
            return Err(invalid("The number of classes must be greater than 0."));
        }
        self.num_classes = num_classes;
        Ok(())
    }

    pub fn set_max_depth(&mut self, max_depth: u16) -> Result<()> {
        self.max_depth = max_depth;
        Ok(())
    }

    pub fn set_min_samples(&mut self, min_samples: usize) -> Result<()> {
        if min_samples < 2 {
            return Err(invalid("The minimum number of samples to split must be greater than 1."));
        }
        self.min_samples = min_samples;
        Ok(())
    }

    pub fn set_num_candidates(&mut self, num_candidates: usize) -> Result<()> {
        if num_candidates < 1 {
            return Err(invalid("The number of candidate features must be greater than 0."));
        }
        self.num_candidates = num_candidates;
        Ok(())
    }

    pub fn set_num_thresholds(&mut self, num_thresholds: usize) -> Result<()> {
        if num_thresholds < 1 {
            return Err(invalid("The number of thresholds per feature must be greater than 0."));
        }
        self.num_thresholds = num_thresholds;
        Ok(())
    }

    pub fn set_pixel_fraction(&mut self, pixel_fraction: f64) -> Result<()> {
        if !(pixel_fraction > 0.0 && pixel_fraction <= 1.0) {
            return Err(invalid("The pixel fraction must be in (0.0, 1.0]."));
        }
        self.pixel_fraction = pixel_fraction;
        Ok(())
    }

    pub fn set_node_threads(&mut self, node_threads: usize) -> Result<()> {
        self.node_threads = node_threads;
        Ok(())
    }

    pub fn set_node_thread_max_pixels(&mut self, max_pixels: usize) -> Result<()> {
        self.node_thread_max_pixels = max_pixels;
        Ok(())
    }

    pub fn set_search_parallel_min_pixels(&mut self, min_pixels: usize) -> Result<()> {
        self.search_parallel_min_pixels = min_pixels;
        Ok(())
    }

    pub fn set_search_chunks(&mut self, search_chunks: usize) -> Result<()> {
        if search_chunks < 1 {
            return Err(invalid("The number of search chunks must be greater than 0."));
        }
        self.search_chunks = search_chunks;
        Ok(())
    }

    pub fn set_seed(&mut self, seed: Option<u64>) {
        self.seed = seed;
    }

    /// Checks every field, as the setters would.
    pub fn validate(&self) -> Result<()> {
        self.clone().set_num_classes(self.num_classes)?;
        self.clone().set_min_samples(self.min_samples)?;
        self.clone().set_num_candidates(self.num_candidates)?;
        self.clone().set_num_thresholds(self.num_thresholds)?;
        self.clone().set_pixel_fraction(self.pixel_fraction)?;
        self.clone().set_search_chunks(self.search_chunks)?;
        if self.poll_interval_ms == 0 {
            return Err(invalid("The poll interval must be greater than 0 ms."));
        }
        Ok(())
    }
}
