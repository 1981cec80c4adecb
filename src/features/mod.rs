//! Randomly instantiable pixel predicates.
//!
//! Tree growth only sees the [`Feature`] trait; concrete families register with a
//! [`FeatureFactory`], which also restores persisted features by family name.
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::data::grid::SampleGrid;
use crate::error::{ForestError, Result};

/// Built-in feature families
pub mod pixel;

/// Scores a grid coordinate; a split compares the score with a threshold.
pub trait Feature: Send + Sync + Debug {
    fn evaluate(&self, grid: &SampleGrid, x: usize, y: usize) -> f32;

    /// Draws `count` candidate thresholds for this feature.
    fn random_thresholds(&self, rng: &mut StdRng, count: usize) -> Vec<f32>;

    fn descriptor(&self) -> FeatureDescriptor;
}

/// Persisted form of a feature: its family and the parameters it was drawn with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    pub family: String,
    pub parameters: Vec<f32>,
}

/// Ranges random features are drawn from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    /// Largest frame offset a feature may look at, in either direction.
    pub max_frame_offset: usize,
    /// Largest bin offset a feature may look at, in either direction.
    pub max_bin_offset: usize,
    /// Range of sample values, used to draw thresholds.
    pub value_range: (f32, f32),
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            max_frame_offset: 4,
            max_bin_offset: 6,
            value_range: (0.0, 1.0),
        }
    }
}

impl FeatureParams {
    pub fn validate(&self) -> Result<()> {
        let (low, high) = self.value_range;
        if !(low.is_finite() && high.is_finite()) || low > high {
            return Err(ForestError::InvalidParameter(format!(
                "The feature value range ({low}, {high}) must be finite and ordered."
            )));
        }
        Ok(())
    }
}

/// A family of features sharing a scoring formula.
pub trait FeatureFamily: Send + Sync {
    fn name(&self) -> &'static str;

    fn instantiate(&self, params: &FeatureParams, rng: &mut StdRng) -> Box<dyn Feature>;

    fn restore(&self, parameters: &[f32]) -> Result<Box<dyn Feature>>;
}

/// Registry of feature families used to draw candidates and to restore stored trees.
pub struct FeatureFactory {
    families: Vec<Box<dyn FeatureFamily>>,
    params: FeatureParams,
}

impl Debug for FeatureFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureFactory")
            .field("families", &self.family_names())
            .field("params", &self.params)
            .finish()
    }
}

impl FeatureFactory {
    pub fn new(params: FeatureParams) -> Self {
        Self {
            families: Vec::new(),
            params,
        }
    }

    /// Factory with every built-in family registered.
    pub fn standard(params: FeatureParams) -> Self {
        let mut factory = Self::new(params);
        factory.register(Box::new(pixel::ValueFamily));
        factory.register(Box::new(pixel::DifferenceFamily));
        factory.register(Box::new(pixel::WindowFamily));
        factory
    }

    pub fn register(&mut self, family: Box<dyn FeatureFamily>) {
        self.families.push(family);
    }

    pub fn params(&self) -> &FeatureParams {
        &self.params
    }

    pub fn family_names(&self) -> Vec<&'static str> {
        self.families.iter().map(|family| family.name()).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.families.is_empty() {
            return Err(ForestError::InvalidParameter(
                "The feature factory has no registered families.".into(),
            ));
        }
        self.params.validate()
    }

    /// Draws a feature from a uniformly chosen family.
    pub fn random_feature(&self, rng: &mut StdRng) -> Result<Box<dyn Feature>> {
        if self.families.is_empty() {
            return Err(ForestError::InvalidParameter(
                "The feature factory has no registered families.".into(),
            ));
        }
        let family = &self.families[rng.gen_range(0..self.families.len())];
        Ok(family.instantiate(&self.params, rng))
    }

    pub fn restore(&self, descriptor: &FeatureDescriptor) -> Result<Box<dyn Feature>> {
        self.families
            .iter()
            .find(|family| family.name() == descriptor.family)
            .ok_or_else(|| ForestError::UnknownFeature(descriptor.family.clone()))?
            .restore(&descriptor.parameters)
    }
}

/// Uniform thresholds in `[low, high]`; a degenerate range yields `low` repeatedly.
pub(crate) fn uniform_thresholds(rng: &mut StdRng, count: usize, low: f32, high: f32) -> Vec<f32> {
    if low >= high {
        return vec![low; count];
    }
    (0..count).map(|_| rng.gen_range(low..=high)).collect()
}
