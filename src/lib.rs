//! # Rusty-forest
//!
//! `rusty-forest` grows random forests over 2-D sample grids, such as audio spectra, and
//! assigns every pixel a class probability vector (for example onset, offset or silence).
//! Trees are grown in parallel at two levels, whole trees and large subtrees, each bounded
//! by its own admission-controlled thread scheduler.
//!
//! ## Example Usage
//!
//! ```rust
//! use rusty_forest::data::dataset::Dataset;
//! use rusty_forest::data::grid::{ReferenceGrid, SampleGrid};
//! use rusty_forest::data::sampler::BootstrapSampler;
//! use rusty_forest::forests::{Forest, ForestParams};
//!
//! let mut sample = SampleGrid::zeros(20, 4);
//! let mut reference = ReferenceGrid::zeros(20, 4);
//! for x in (0..20).step_by(4) {
//!     for y in 0..4 {
//!         sample[(x, y)] = 1.0;
//!         reference[(x, y)] = 1;
//!     }
//! }
//! let dataset = Dataset::from_grids("example", sample.clone(), reference).unwrap();
//! let sampler = BootstrapSampler::new(vec![dataset]);
//!
//! let mut params = ForestParams::new();
//! params.set_seed(Some(7));
//! let mut forest = Forest::with_standard_features(params).unwrap();
//! forest.grow(&sampler).unwrap();
//!
//! let probabilities = forest.classify(&sample).unwrap();
//! assert_eq!(probabilities.pixel(0, 0).len(), 2);
//! ```

/// Thread scheduling and batch workers
pub mod concurrency;
/// Grids, datasets and samplers
pub mod data;
/// Error types
pub mod error;
/// Random pixel features
pub mod features;
/// Random forests
pub mod forests;
/// Functions for evaluating classification output
pub mod metrics;
/// Random trees
pub mod trees;

pub use error::{ForestError, Result};
