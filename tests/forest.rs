mod common;

use approx::assert_relative_eq;
use common::{forest_params, onset_grids, pool};
use rusty_forest::data::sampler::{BootstrapSampler, Sampler};
use rusty_forest::forests::Forest;
use rusty_forest::metrics::detection::DetectionCounts;
use rusty_forest::trees::{Node, NodeKind};
use rusty_forest::ForestError;

fn check_leaves(node: &Node, num_classes: usize) {
    match node.kind() {
        NodeKind::Leaf(probabilities) => {
            assert_eq!(probabilities.len(), num_classes);
            assert_relative_eq!(probabilities.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
            assert!(node.feature().is_none());
        }
        NodeKind::Split { left, right, .. } => {
            assert!(node.probabilities().is_none());
            check_leaves(left, num_classes);
            check_leaves(right, num_classes);
        }
    }
}

fn grown_forest(seed: u64) -> Forest {
    let mut forest = Forest::with_standard_features(forest_params(seed)).unwrap();
    forest.grow(&BootstrapSampler::new(pool(4))).unwrap();
    forest
}

#[test]
fn test_grown_forest_has_valid_trees() {
    let forest = grown_forest(3);
    assert!(forest.is_grown());
    assert_eq!(forest.trees().len(), 4);
    for (index, tree) in forest.trees().iter().enumerate() {
        assert_eq!(tree.index(), index);
        assert!(tree.depth() <= 6);
        check_leaves(tree.root().unwrap(), 2);
    }
}

#[test]
fn test_growth_is_reproducible_whatever_the_thread_count() {
    let mut sequential_params = forest_params(17);
    sequential_params.tree_threads = 1;
    sequential_params.tree.node_threads = 0;
    let mut sequential = Forest::with_standard_features(sequential_params).unwrap();
    sequential.grow(&BootstrapSampler::new(pool(3))).unwrap();

    let mut threaded_params = forest_params(17);
    threaded_params.tree_threads = 4;
    threaded_params.tree.node_thread_max_pixels = usize::MAX;
    threaded_params.tree.search_parallel_min_pixels = 0;
    threaded_params.tree.search_chunks = 3;
    let mut threaded = Forest::with_standard_features(threaded_params).unwrap();
    threaded.grow(&BootstrapSampler::new(pool(3))).unwrap();

    for (a, b) in sequential.trees().iter().zip(threaded.trees()) {
        assert_eq!(a.root(), b.root());
    }
}

#[test]
fn test_single_and_multi_threaded_classification_agree() {
    let mut forest = grown_forest(5);
    let (sample, _) = onset_grids(37, 8, 6, 2);

    forest.set_classify_threads(1).unwrap();
    let single = forest.classify(&sample).unwrap();
    for threads in [2, 3, 8, 64] {
        forest.set_classify_threads(threads).unwrap();
        assert_eq!(forest.classify(&sample).unwrap(), single);
    }

    for x in [0, 18, 36] {
        assert_eq!(
            single.pixel(x, 4),
            forest.classify_pixel(&sample, x, 4).unwrap().as_slice()
        );
    }
}

#[test]
fn test_forest_ranks_onsets_above_background() {
    let forest = grown_forest(9);
    let (sample, reference) = onset_grids(60, 8, 6, 1);
    let probabilities = forest.classify(&sample).unwrap();

    let (mut onset, mut onsets, mut background, mut backgrounds) = (0.0f64, 0, 0.0f64, 0);
    for x in 0..60 {
        for y in 0..8 {
            let p = probabilities.pixel(x, y)[1] as f64;
            if reference[(x, y)] == 1 {
                onset += p;
                onsets += 1;
            } else {
                background += p;
                backgrounds += 1;
            }
        }
    }
    assert!(onset / onsets as f64 > background / backgrounds as f64);

    let counts = DetectionCounts::count(&probabilities, &reference, 1, 0.0).unwrap();
    assert_eq!(counts.detection_rate(), 1.0);
}

#[test]
fn test_save_and_load_round_trip() {
    let forest = grown_forest(13);
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("onsets");

    let paths = forest.save(&prefix).unwrap();
    assert_eq!(paths.len(), 4);
    assert!(paths.iter().all(|path| path.exists()));
    assert_eq!(paths[2], Forest::tree_path(&prefix, 2));

    let loaded =
        Forest::load(&prefix, forest.params().clone(), forest.factory().clone()).unwrap();
    for (a, b) in forest.trees().iter().zip(loaded.trees()) {
        assert_eq!(a.root(), b.root());
    }

    let (sample, _) = onset_grids(20, 8, 6, 0);
    assert_eq!(
        forest.classify(&sample).unwrap(),
        loaded.classify(&sample).unwrap()
    );
}

#[test]
fn test_load_missing_tree() {
    let dir = tempfile::tempdir().unwrap();
    let forest = grown_forest(2);
    forest.save(&dir.path().join("a")).unwrap();

    let mut params = forest.params().clone();
    params.num_trees = 5;
    assert!(matches!(
        Forest::load(&dir.path().join("a"), params, forest.factory().clone()),
        Err(ForestError::Io(_))
    ));
}

#[test]
fn test_uniform_pool_gives_single_leaf_trees() {
    let (sample, _) = onset_grids(24, 4, 6, 0);
    let reference = rusty_forest::data::grid::ReferenceGrid::zeros(24, 4);
    let dataset =
        rusty_forest::data::dataset::Dataset::from_grids("silence", sample.clone(), reference)
            .unwrap();

    let mut forest = Forest::with_standard_features(forest_params(4)).unwrap();
    forest.grow(&Sampler::new(vec![dataset])).unwrap();
    for tree in forest.trees() {
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.root().unwrap().probabilities(), Some(&[1.0, 0.0][..]));
    }
    assert_eq!(forest.classify_pixel(&sample, 3, 3).unwrap(), vec![1.0, 0.0]);
}
