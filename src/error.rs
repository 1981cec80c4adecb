//! Error types for forest growth, classification and persistence.

use thiserror::Error;

/// Errors raised by the forest engine.
#[derive(Debug, Error)]
pub enum ForestError {
    /// A growth or classification parameter is out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Two grids that must be parallel have different shapes.
    #[error("Dimension mismatch: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// The sampler holds no datasets.
    #[error("Sample pool is empty")]
    EmptyPool,

    /// Classification was requested before the tree or forest was grown.
    #[error("Model has not been grown yet")]
    NotGrown,

    /// No thread slot is free in a scheduler.
    #[error("Thread scheduler exhausted: all {max} slots in use")]
    SchedulerExhausted { max: usize },

    /// More threads are running than the scheduler admits.
    #[error("Thread scheduler overflow: {active} active threads exceed the cap of {max}")]
    SchedulerOverflow { active: usize, max: usize },

    /// A worker panicked or returned an error.
    #[error("Worker {index} of {group} failed: {message}")]
    WorkerFailed {
        group: String,
        index: usize,
        message: String,
    },

    /// A grid source failed to produce its data.
    #[error("Failed to load dataset: {0}")]
    Load(String),

    /// A stored feature names a family the factory cannot restore.
    #[error("Unknown feature family: {0}")]
    UnknownFeature(String),

    /// A stored node is neither a complete split nor a leaf.
    #[error("Malformed node {0}: a node must be either a split or a leaf")]
    MalformedNode(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Result type for forest operations.
pub type Result<T> = std::result::Result<T, ForestError>;
