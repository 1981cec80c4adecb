use serde::{Deserialize, Serialize};

use crate::error::{ForestError, Result};
use crate::features::FeatureParams;
use crate::trees::params::TreeParams;

/// Parameters of a forest and of the trees it grows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub num_trees: usize,
    /// Trees grown at the same time.
    pub tree_threads: usize,
    /// Frame ranges classified at the same time.
    pub classify_threads: usize,
    pub poll_interval_ms: u64,
    /// Redraw the frames of every dataset with replacement for each tree.
    pub bootstrap: bool,
    pub seed: Option<u64>,
    pub tree: TreeParams,
    pub features: FeatureParams,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self::new()
    }
}

impl ForestParams {
    pub fn new() -> Self {
        Self {
            num_trees: 3,
            tree_threads: 2,
            classify_threads: 4,
            poll_interval_ms: 2_000,
            bootstrap: true,
            seed: None,
            tree: TreeParams::new(),
            features: FeatureParams::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn set_num_trees(&mut self, num_trees: usize) -> Result<()> {
        if num_trees < 1 {
            return Err(ForestError::InvalidParameter(
                "The number of trees must be greater than 0.".into(),
            ));
        }
        self.num_trees = num_trees;
        Ok(())
    }

    pub fn set_tree_threads(&mut self, tree_threads: usize) -> Result<()> {
        if tree_threads < 1 {
            return Err(ForestError::InvalidParameter(
                "The number of tree threads must be greater than 0.".into(),
            ));
        }
        self.tree_threads = tree_threads;
        Ok(())
    }

    pub fn set_classify_threads(&mut self, classify_threads: usize) -> Result<()> {
        if classify_threads < 1 {
            return Err(ForestError::InvalidParameter(
                "The number of classification threads must be greater than 0.".into(),
            ));
        }
        self.classify_threads = classify_threads;
        Ok(())
    }

    pub fn set_poll_interval_ms(&mut self, poll_interval_ms: u64) -> Result<()> {
        if poll_interval_ms == 0 {
            return Err(ForestError::InvalidParameter(
                "The poll interval must be greater than 0 ms.".into(),
            ));
        }
        self.poll_interval_ms = poll_interval_ms;
        Ok(())
    }

    pub fn set_seed(&mut self, seed: Option<u64>) {
        self.seed = seed;
    }

    pub fn validate(&self) -> Result<()> {
        self.clone().set_num_trees(self.num_trees)?;
        self.clone().set_tree_threads(self.tree_threads)?;
        self.clone().set_classify_threads(self.classify_threads)?;
        self.clone().set_poll_interval_ms(self.poll_interval_ms)?;
        self.tree.validate()?;
        self.features.validate()
    }
}
