#![allow(dead_code)]

use rusty_forest::data::dataset::Dataset;
use rusty_forest::data::grid::{ReferenceGrid, SampleGrid};
use rusty_forest::forests::ForestParams;
use rusty_forest::trees::TreeParams;

/// Grid with an onset every `period` frames: a bright frame followed by a decaying tail.
pub fn onset_grids(frames: usize, bins: usize, period: usize, phase: usize) -> (SampleGrid, ReferenceGrid) {
    let mut sample = SampleGrid::zeros(frames, bins);
    let mut reference = ReferenceGrid::zeros(frames, bins);
    for x in 0..frames {
        for y in 0..bins {
            let since = (x + period - phase % period) % period;
            if since == 0 {
                reference[(x, y)] = 1;
            }
            let jitter = ((x * 13 + y * 7) % 11) as f32 * 0.01;
            sample[(x, y)] = 0.9 / (since + 1) as f32 + jitter;
        }
    }
    (sample, reference)
}

pub fn onset_dataset(name: &str, frames: usize, bins: usize, phase: usize) -> Dataset {
    let (sample, reference) = onset_grids(frames, bins, 6, phase);
    Dataset::from_grids(name, sample, reference).unwrap()
}

pub fn pool(size: usize) -> Vec<Dataset> {
    (0..size)
        .map(|i| onset_dataset(&format!("d{i}"), 48, 8, i))
        .collect()
}

pub fn forest_params(seed: u64) -> ForestParams {
    ForestParams {
        num_trees: 4,
        tree_threads: 2,
        classify_threads: 3,
        poll_interval_ms: 10,
        seed: Some(seed),
        tree: TreeParams {
            max_depth: 6,
            min_samples: 2,
            num_candidates: 8,
            num_thresholds: 6,
            pixel_fraction: 0.5,
            node_threads: 2,
            poll_interval_ms: 10,
            ..TreeParams::new()
        },
        ..ForestParams::new()
    }
}
