//! Two-dimensional grids shared by the sampler, the trees and the forest.
//!
//! A grid is indexed by `(x, y)` where `x` is the frame (outer dimension, time) and `y`
//! is the bin inside a frame (frequency). Frame-wise data is a grid with one bin.
use nalgebra::DMatrix;
use num_traits::{ToPrimitive, Zero};
use std::fmt::Debug;
use std::ops::{Index, IndexMut, Range};

use crate::error::{ForestError, Result};

pub trait GridValue:
    Debug + Clone + Copy + PartialEq + PartialOrd + Zero + ToPrimitive + Send + Sync + 'static
{
}

impl<T> GridValue for T where
    T: Debug + Clone + Copy + PartialEq + PartialOrd + Zero + ToPrimitive + Send + Sync + 'static
{
}

/// Pixel routing tags stored in a [`ClassificationGrid`].
pub mod tag {
    /// Pixel takes no part in growth.
    pub const OUT_OF_BAG: i8 = -1;
    /// Pixel is in bag but did not reach the node being evaluated.
    pub const UNASSIGNED: i8 = 0;
    /// Pixel is active at the root, or was routed left by its parent split.
    pub const LEFT: i8 = 1;
    /// Pixel was routed right by its parent split.
    pub const RIGHT: i8 = 2;
}

/// Dense 2-D grid backed by a `DMatrix` with one row per frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T: GridValue> {
    data: DMatrix<T>,
}

/// Sample grid of spectral magnitudes.
pub type SampleGrid = Grid<f32>;
/// Reference grid of integer class codes.
pub type ReferenceGrid = Grid<u8>;
/// Per-pixel routing state of one dataset at one node.
pub type ClassificationGrid = Grid<i8>;

impl<T: GridValue> Grid<T> {
    pub fn filled(frames: usize, bins: usize, value: T) -> Self {
        Self {
            data: DMatrix::from_element(frames, bins, value),
        }
    }

    pub fn zeros(frames: usize, bins: usize) -> Self {
        Self::filled(frames, bins, T::zero())
    }

    /// Builds a grid from values laid out frame after frame.
    pub fn from_frames(frames: usize, bins: usize, values: &[T]) -> Result<Self> {
        if values.len() != frames * bins {
            return Err(ForestError::InvalidParameter(format!(
                "{} values cannot fill a {}x{} grid",
                values.len(),
                frames,
                bins
            )));
        }
        Ok(Self {
            data: DMatrix::from_row_slice(frames, bins, values),
        })
    }

    /// Builds a frame-wise grid: one value per frame, one bin wide.
    pub fn framewise(values: Vec<T>) -> Self {
        let frames = values.len();
        Self {
            data: DMatrix::from_vec(frames, 1, values),
        }
    }

    pub fn from_matrix(data: DMatrix<T>) -> Self {
        Self { data }
    }

    pub fn frames(&self) -> usize {
        self.data.nrows()
    }

    pub fn bins(&self) -> usize {
        self.data.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.shape()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        self.data.get((x, y)).copied()
    }

    /// Reads a possibly out-of-grid coordinate, yielding zero outside the grid.
    pub fn value_or_zero(&self, x: isize, y: isize) -> T {
        if x < 0 || y < 0 {
            return T::zero();
        }
        self.get(x as usize, y as usize).unwrap_or_else(T::zero)
    }

    pub fn count(&self, predicate: impl Fn(T) -> bool) -> usize {
        self.data.iter().filter(|&&value| predicate(value)).count()
    }

    pub fn as_matrix(&self) -> &DMatrix<T> {
        &self.data
    }

    /// Fails unless both grids cover the same frames and bins.
    pub fn ensure_same_shape<U: GridValue>(&self, other: &Grid<U>) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(ForestError::DimensionMismatch {
                expected: self.shape(),
                found: other.shape(),
            });
        }
        Ok(())
    }
}

impl<T: GridValue> Index<(usize, usize)> for Grid<T> {
    type Output = T;

    fn index(&self, index: (usize, usize)) -> &T {
        &self.data[index]
    }
}

impl<T: GridValue> IndexMut<(usize, usize)> for Grid<T> {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut T {
        &mut self.data[index]
    }
}

/// Per-pixel class probabilities, stored frame after frame, bin after bin.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbabilityGrid {
    frames: usize,
    bins: usize,
    num_classes: usize,
    data: Vec<f32>,
}

impl ProbabilityGrid {
    pub fn new(frames: usize, bins: usize, num_classes: usize) -> Self {
        Self {
            frames,
            bins,
            num_classes,
            data: vec![0.0; frames * bins * num_classes],
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn pixel(&self, x: usize, y: usize) -> &[f32] {
        let start = (x * self.bins + y) * self.num_classes;
        &self.data[start..start + self.num_classes]
    }

    pub fn pixel_mut(&mut self, x: usize, y: usize) -> &mut [f32] {
        let start = (x * self.bins + y) * self.num_classes;
        &mut self.data[start..start + self.num_classes]
    }

    /// Index of the most probable class of a pixel; the lowest class wins a tie.
    pub fn argmax(&self, x: usize, y: usize) -> usize {
        let mut best = 0;
        for (class, &p) in self.pixel(x, y).iter().enumerate() {
            if p > self.pixel(x, y)[best] {
                best = class;
            }
        }
        best
    }

    /// Probability of one class at every pixel.
    pub fn class_plane(&self, class: usize) -> SampleGrid {
        let mut plane = SampleGrid::zeros(self.frames, self.bins);
        for x in 0..self.frames {
            for y in 0..self.bins {
                plane[(x, y)] = self.pixel(x, y)[class];
            }
        }
        plane
    }

    /// Splits the grid into disjoint mutable views, one per contiguous frame range.
    ///
    /// The ranges must be sorted, non-overlapping and cover `0..frames`.
    pub fn split_frames_mut(&mut self, ranges: &[Range<usize>]) -> Vec<ProbabilitySliceMut<'_>> {
        let stride = self.bins * self.num_classes;
        let mut rest: &mut [f32] = &mut self.data;
        let mut slices = Vec::with_capacity(ranges.len());
        for range in ranges {
            let (head, tail) = rest.split_at_mut(range.len() * stride);
            slices.push(ProbabilitySliceMut {
                first_frame: range.start,
                bins: self.bins,
                num_classes: self.num_classes,
                data: head,
            });
            rest = tail;
        }
        slices
    }

    pub fn as_mut_slice(&mut self) -> ProbabilitySliceMut<'_> {
        ProbabilitySliceMut {
            first_frame: 0,
            bins: self.bins,
            num_classes: self.num_classes,
            data: &mut self.data,
        }
    }
}

/// Mutable view over a contiguous range of frames of a [`ProbabilityGrid`].
#[derive(Debug)]
pub struct ProbabilitySliceMut<'a> {
    first_frame: usize,
    bins: usize,
    num_classes: usize,
    data: &'a mut [f32],
}

impl ProbabilitySliceMut<'_> {
    pub fn frames(&self) -> Range<usize> {
        let count = self.data.len() / (self.bins * self.num_classes).max(1);
        self.first_frame..self.first_frame + count
    }

    /// Pixel at absolute frame `x`.
    pub fn pixel_mut(&mut self, x: usize, y: usize) -> &mut [f32] {
        let start = ((x - self.first_frame) * self.bins + y) * self.num_classes;
        &mut self.data[start..start + self.num_classes]
    }
}

/// Cuts `0..len` into `parts` contiguous ranges; the last range may be shorter.
pub fn partition_range(len: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.max(1);
    let size = len.div_ceil(parts).max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}
