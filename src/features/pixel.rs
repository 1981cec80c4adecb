use rand::rngs::StdRng;
use rand::Rng;

use super::{uniform_thresholds, Feature, FeatureDescriptor, FeatureFamily, FeatureParams};
use crate::data::grid::SampleGrid;
use crate::error::{ForestError, Result};

fn offset(rng: &mut StdRng, max: usize) -> i32 {
    let max = max as i32;
    rng.gen_range(-max..=max)
}

fn at(grid: &SampleGrid, x: usize, y: usize, dx: i32, dy: i32) -> f32 {
    grid.value_or_zero(x as isize + dx as isize, y as isize + dy as isize)
}

fn expect_len(family: &str, parameters: &[f32], len: usize) -> Result<()> {
    if parameters.len() != len {
        return Err(ForestError::InvalidParameter(format!(
            "{family} feature expects {len} parameters, found {}",
            parameters.len()
        )));
    }
    Ok(())
}

/// Sample value at a fixed offset from the pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueFeature {
    pub dx: i32,
    pub dy: i32,
    pub value_range: (f32, f32),
}

impl Feature for ValueFeature {
    fn evaluate(&self, grid: &SampleGrid, x: usize, y: usize) -> f32 {
        at(grid, x, y, self.dx, self.dy)
    }

    fn random_thresholds(&self, rng: &mut StdRng, count: usize) -> Vec<f32> {
        uniform_thresholds(rng, count, self.value_range.0, self.value_range.1)
    }

    fn descriptor(&self) -> FeatureDescriptor {
        FeatureDescriptor {
            family: ValueFamily.name().into(),
            parameters: vec![
                self.dx as f32,
                self.dy as f32,
                self.value_range.0,
                self.value_range.1,
            ],
        }
    }
}

pub struct ValueFamily;

impl FeatureFamily for ValueFamily {
    fn name(&self) -> &'static str {
        "value"
    }

    fn instantiate(&self, params: &FeatureParams, rng: &mut StdRng) -> Box<dyn Feature> {
        Box::new(ValueFeature {
            dx: offset(rng, params.max_frame_offset),
            dy: offset(rng, params.max_bin_offset),
            value_range: params.value_range,
        })
    }

    fn restore(&self, parameters: &[f32]) -> Result<Box<dyn Feature>> {
        expect_len(self.name(), parameters, 4)?;
        Ok(Box::new(ValueFeature {
            dx: parameters[0] as i32,
            dy: parameters[1] as i32,
            value_range: (parameters[2], parameters[3]),
        }))
    }
}

/// Difference between the values at two offsets.
#[derive(Clone, Debug, PartialEq)]
pub struct DifferenceFeature {
    pub first: (i32, i32),
    pub second: (i32, i32),
    pub value_range: (f32, f32),
}

impl Feature for DifferenceFeature {
    fn evaluate(&self, grid: &SampleGrid, x: usize, y: usize) -> f32 {
        at(grid, x, y, self.first.0, self.first.1) - at(grid, x, y, self.second.0, self.second.1)
    }

    fn random_thresholds(&self, rng: &mut StdRng, count: usize) -> Vec<f32> {
        let span = self.value_range.1 - self.value_range.0;
        uniform_thresholds(rng, count, -span, span)
    }

    fn descriptor(&self) -> FeatureDescriptor {
        FeatureDescriptor {
            family: DifferenceFamily.name().into(),
            parameters: vec![
                self.first.0 as f32,
                self.first.1 as f32,
                self.second.0 as f32,
                self.second.1 as f32,
                self.value_range.0,
                self.value_range.1,
            ],
        }
    }
}

pub struct DifferenceFamily;

impl FeatureFamily for DifferenceFamily {
    fn name(&self) -> &'static str {
        "difference"
    }

    fn instantiate(&self, params: &FeatureParams, rng: &mut StdRng) -> Box<dyn Feature> {
        Box::new(DifferenceFeature {
            first: (
                offset(rng, params.max_frame_offset),
                offset(rng, params.max_bin_offset),
            ),
            second: (
                offset(rng, params.max_frame_offset),
                offset(rng, params.max_bin_offset),
            ),
            value_range: params.value_range,
        })
    }

    fn restore(&self, parameters: &[f32]) -> Result<Box<dyn Feature>> {
        expect_len(self.name(), parameters, 6)?;
        Ok(Box::new(DifferenceFeature {
            first: (parameters[0] as i32, parameters[1] as i32),
            second: (parameters[2] as i32, parameters[3] as i32),
            value_range: (parameters[4], parameters[5]),
        }))
    }
}

/// Mean of a frame window ending at the pixel minus the mean of the window after it,
/// read in the bin at `dy`. Rises at offsets, falls at onsets.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowFeature {
    pub width: u32,
    pub dy: i32,
    pub value_range: (f32, f32),
}

impl WindowFeature {
    fn window_mean(&self, grid: &SampleGrid, x: usize, y: usize, from: i32) -> f32 {
        let sum: f32 = (0..self.width as i32)
            .map(|i| at(grid, x, y, from + i, self.dy))
            .sum();
        sum / self.width as f32
    }
}

impl Feature for WindowFeature {
    fn evaluate(&self, grid: &SampleGrid, x: usize, y: usize) -> f32 {
        let width = self.width as i32;
        self.window_mean(grid, x, y, 1 - width) - self.window_mean(grid, x, y, 1)
    }

    fn random_thresholds(&self, rng: &mut StdRng, count: usize) -> Vec<f32> {
        let span = self.value_range.1 - self.value_range.0;
        uniform_thresholds(rng, count, -span, span)
    }

    fn descriptor(&self) -> FeatureDescriptor {
        FeatureDescriptor {
            family: WindowFamily.name().into(),
            parameters: vec![
                self.width as f32,
                self.dy as f32,
                self.value_range.0,
                self.value_range.1,
            ],
        }
    }
}

pub struct WindowFamily;

impl FeatureFamily for WindowFamily {
    fn name(&self) -> &'static str {
        "window"
    }

    fn instantiate(&self, params: &FeatureParams, rng: &mut StdRng) -> Box<dyn Feature> {
        Box::new(WindowFeature {
            width: rng.gen_range(1..=params.max_frame_offset.max(1) as u32),
            dy: offset(rng, params.max_bin_offset),
            value_range: params.value_range,
        })
    }

    fn restore(&self, parameters: &[f32]) -> Result<Box<dyn Feature>> {
        expect_len(self.name(), parameters, 4)?;
        if parameters[0] < 1.0 {
            return Err(ForestError::InvalidParameter(
                "window feature width must be at least 1".into(),
            ));
        }
        Ok(Box::new(WindowFeature {
            width: parameters[0] as u32,
            dy: parameters[1] as i32,
            value_range: (parameters[2], parameters[3]),
        }))
    }
}
