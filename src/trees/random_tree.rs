//! Random tree growth by recursive node splitting.
//!
//! Growth starts from a pre-classification of every dataset in the pool: a random subset
//! of the bins of each in-bag frame is tagged active, everything else out of bag. Each node
//! then draws random candidate features and thresholds, counts how the active pixels of
//! every class would be routed, keeps the pair with the highest information gain and
//! writes a fresh classification grid tagging its pixels left or right. Small subtrees may
//! be grown in their own thread through a node-level [`ThreadScheduler`]; nodes with many
//! active pixels split their candidate search across a [`WorkerGroup`] instead.
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::node::{Node, SerializedNode};
use super::params::TreeParams;
use super::split::{leaf_probabilities, CountTable, SplitChoice};
use crate::concurrency::{Progress, ThreadScheduler, Worker, WorkerGroup};
use crate::data::dataset::Grids;
use crate::data::grid::{partition_range, tag, ClassificationGrid, ProbabilityGrid, SampleGrid};
use crate::data::rng_from;
use crate::data::sampler::Sampler;
use crate::error::{ForestError, Result};
use crate::features::{Feature, FeatureFactory};

/// Everything a node needs while growing; shared by every thread of one tree.
struct GrowthContext {
    tree: usize,
    params: TreeParams,
    factory: Arc<FeatureFactory>,
    pool: Vec<Arc<Grids>>,
    /// First global frame index of every dataset in `pool`.
    frame_offsets: Vec<usize>,
    total_frames: usize,
    scheduler: ThreadScheduler,
}

/// Pixels of one node: the classification grids of its parent and the tag selecting it.
#[derive(Clone)]
struct Selection {
    grids: Arc<Vec<ClassificationGrid>>,
    mode: i8,
}

impl GrowthContext {
    fn new(
        tree: usize,
        params: TreeParams,
        factory: Arc<FeatureFactory>,
        pool: Vec<Arc<Grids>>,
    ) -> Self {
        let mut frame_offsets = Vec::with_capacity(pool.len());
        let mut total_frames = 0;
        for grids in &pool {
            frame_offsets.push(total_frames);
            total_frames += grids.sample.frames();
        }
        let scheduler = ThreadScheduler::new(format!("tree{tree}-node"), params.node_threads);
        Self {
            tree,
            params,
            factory,
            pool,
            frame_offsets,
            total_frames,
            scheduler,
        }
    }

    /// Class histogram of the pixels tagged `mode`.
    fn histogram(&self, selection: &Selection) -> Vec<u64> {
        let num_classes = self.params.num_classes;
        self.pool
            .par_iter()
            .zip(selection.grids.par_iter())
            .map(|(grids, classification)| {
                let mut counts = vec![0u64; num_classes];
                for x in 0..classification.frames() {
                    for y in 0..classification.bins() {
                        if classification[(x, y)] == selection.mode {
                            counts[grids.reference[(x, y)] as usize] += 1;
                        }
                    }
                }
                counts
            })
            .reduce(
                || vec![0u64; num_classes],
                |mut total, counts| {
                    total.iter_mut().zip(counts).for_each(|(t, c)| *t += c);
                    total
                },
            )
    }

    /// Counts the routing of every active pixel in a global frame range.
    fn count_range(
        &self,
        selection: &Selection,
        features: &[Box<dyn Feature>],
        thresholds: &[Vec<f32>],
        frames: Range<usize>,
        progress: &Progress,
    ) -> CountTable {
        let mut table = CountTable::new(
            features.len(),
            self.params.num_thresholds,
            self.params.num_classes,
        );
        let total = frames.len();
        for (d, grids) in self.pool.iter().enumerate() {
            let offset = self.frame_offsets[d];
            let start = frames.start.max(offset);
            let end = frames.end.min(offset + grids.sample.frames());
            let classification = &selection.grids[d];
            for x in start.saturating_sub(offset)..end.saturating_sub(offset) {
                for y in 0..grids.sample.bins() {
                    if classification[(x, y)] != selection.mode {
                        continue;
                    }
                    let class = grids.reference[(x, y)] as usize;
                    for (k, feature) in features.iter().enumerate() {
                        let score = feature.evaluate(&grids.sample, x, y);
                        for (t, &threshold) in thresholds[k].iter().enumerate() {
                            table.add(k, t, class, Node::routes_left(score, threshold));
                        }
                    }
                }
                progress.set_done(offset + x + 1 - frames.start, total);
            }
        }
        table
    }

    /// Builds the count table of a node, range-partitioned across workers for large nodes.
    fn count_candidates(
        &self,
        selection: &Selection,
        features: &[Box<dyn Feature>],
        thresholds: &[Vec<f32>],
        active: u64,
    ) -> CountTable {
        let chunks = self.params.search_chunks;
        if chunks < 2 || active < self.params.search_parallel_min_pixels as u64 {
            return self.count_range(
                selection,
                features,
                thresholds,
                0..self.total_frames,
                &Progress::default(),
            );
        }

        let mut group = WorkerGroup::new(format!("tree{}-search", self.tree), chunks).quiet();
        for frames in partition_range(self.total_frames, chunks) {
            group.push(Worker::new(frames, move |frames, progress| {
                Ok(self.count_range(selection, features, thresholds, frames, progress))
            }));
        }
        let mut tables = group
            .run_group(Duration::from_millis(self.params.poll_interval_ms))
            .into_iter();
        let mut table = tables.next().unwrap_or_else(|| {
            CountTable::new(
                features.len(),
                self.params.num_thresholds,
                self.params.num_classes,
            )
        });
        for partial in tables {
            table.merge(&partial);
        }
        table
    }

    /// Tags every active pixel left or right of the winning split; other pixels keep
    /// only their out-of-bag state.
    fn route(
        &self,
        selection: &Selection,
        feature: &dyn Feature,
        threshold: f32,
    ) -> Vec<ClassificationGrid> {
        self.pool
            .par_iter()
            .zip(selection.grids.par_iter())
            .map(|(grids, classification)| {
                let mut routed = ClassificationGrid::filled(
                    classification.frames(),
                    classification.bins(),
                    tag::UNASSIGNED,
                );
                for x in 0..classification.frames() {
                    for y in 0..classification.bins() {
                        routed[(x, y)] = match classification[(x, y)] {
                            mode if mode == selection.mode => {
                                let score = feature.evaluate(&grids.sample, x, y);
                                if Node::routes_left(score, threshold) {
                                    tag::LEFT
                                } else {
                                    tag::RIGHT
                                }
                            }
                            tag::OUT_OF_BAG => tag::OUT_OF_BAG,
                            _ => tag::UNASSIGNED,
                        };
                    }
                }
                routed
            })
            .collect()
    }

    /// Whether a child with `active` pixels should be grown in a new thread.
    fn spawns(&self, active: u64) -> bool {
        active < self.params.node_thread_max_pixels as u64
            && active >= self.params.min_samples as u64
            && self.scheduler.available().unwrap_or(0) > 0
    }
}

/// Grows the subtree over the pixels of `selection`.
fn grow_node(
    context: &Arc<GrowthContext>,
    selection: Selection,
    depth: u16,
    seed: u64,
) -> Result<Node> {
    let params = &context.params;
    let mut rng = StdRng::seed_from_u64(seed);

    let histogram = context.histogram(&selection);
    let active: u64 = histogram.iter().sum();
    let classes_present = histogram.iter().filter(|&&count| count > 0).count();
    if depth >= params.max_depth || active < params.min_samples as u64 || classes_present <= 1 {
        trace!(tree = context.tree, depth, active, "Leaf");
        return Ok(Node::leaf(leaf_probabilities(&histogram)));
    }

    let mut features = (0..params.num_candidates)
        .map(|_| context.factory.random_feature(&mut rng))
        .collect::<Result<Vec<_>>>()?;
    let thresholds = features
        .iter()
        .map(|feature| feature.random_thresholds(&mut rng, params.num_thresholds))
        .collect::<Vec<_>>();
    if let Some(bad) = thresholds.iter().find(|t| t.len() != params.num_thresholds) {
        return Err(ForestError::InvalidParameter(format!(
            "feature produced {} thresholds, {} requested",
            bad.len(),
            params.num_thresholds
        )));
    }

    let table = context.count_candidates(&selection, &features, &thresholds, active);
    let SplitChoice {
        candidate,
        threshold,
        gain,
        left_count,
        right_count,
    } = match table.best_split() {
        Some(choice) if choice.gain > 0.0 => choice,
        _ => {
            trace!(tree = context.tree, depth, active, "No informative split");
            return Ok(Node::leaf(leaf_probabilities(&histogram)));
        }
    };
    let threshold = thresholds[candidate][threshold];
    let feature = features.swap_remove(candidate);
    trace!(
        tree = context.tree,
        depth,
        active,
        gain,
        left = left_count,
        right = right_count,
        "Split"
    );

    let children = Arc::new(context.route(&selection, feature.as_ref(), threshold));
    let left_selection = Selection {
        grids: children.clone(),
        mode: tag::LEFT,
    };
    let right_selection = Selection {
        grids: children,
        mode: tag::RIGHT,
    };
    let left_seed = rng.gen::<u64>();
    let right_seed = rng.gen::<u64>();

    let left_task = if context.spawns(left_count) {
        let task_context = context.clone();
        let task_selection = left_selection.clone();
        match context.scheduler.start(move || {
            grow_node(&task_context, task_selection, depth + 1, left_seed)
        }) {
            Ok(handle) => Some(handle),
            Err(ForestError::SchedulerExhausted { .. }) => None,
            Err(error) => return Err(error),
        }
    } else {
        None
    };

    let right = grow_node(context, right_selection, depth + 1, right_seed)?;
    let left = match left_task {
        Some(handle) => handle.join()?,
        None => grow_node(context, left_selection, depth + 1, left_seed)?,
    };
    Ok(Node::split(feature, threshold, left, right))
}

/// Marks `ceil(fraction * bins)` random bins of every in-bag frame active.
fn preclassify(
    grids: &Grids,
    in_bag: impl Fn(usize) -> bool,
    fraction: f64,
    rng: &mut StdRng,
) -> ClassificationGrid {
    let (frames, bins) = grids.sample.shape();
    let mut classification = ClassificationGrid::filled(frames, bins, tag::OUT_OF_BAG);
    let amount = ((fraction * bins as f64).ceil() as usize).min(bins);
    for x in (0..frames).filter(|&x| in_bag(x)) {
        for y in index::sample(rng, bins, amount) {
            classification[(x, y)] = tag::LEFT;
        }
    }
    classification
}

/// Stored form of a tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedTree {
    pub index: usize,
    pub num_classes: usize,
    pub nodes: Vec<SerializedNode>,
}

/// One tree of a forest.
#[derive(Debug)]
pub struct RandomTree {
    index: usize,
    params: TreeParams,
    factory: Arc<FeatureFactory>,
    root: Option<Node>,
}

impl RandomTree {
    pub fn new(index: usize, params: TreeParams, factory: Arc<FeatureFactory>) -> Self {
        Self {
            index,
            params,
            factory,
            root: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    pub fn is_grown(&self) -> bool {
        self.root.is_some()
    }

    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, Node::depth)
    }

    pub fn node_count(&self) -> usize {
        self.root.as_ref().map_or(0, Node::node_count)
    }

    pub fn leaf_count(&self) -> usize {
        self.root.as_ref().map_or(0, Node::leaf_count)
    }

    /// Grows the tree on every dataset of `sampler`, replacing any previous growth.
    ///
    /// # Errors
    ///
    /// Fails before any work when the parameters are invalid, the pool is empty, a
    /// dataset cannot be loaded or holds a class code outside `0..num_classes`.
    pub fn grow(&mut self, sampler: &Sampler) -> Result<()> {
        self.params.validate()?;
        self.factory.validate()?;
        if sampler.is_empty() {
            return Err(ForestError::EmptyPool);
        }

        let mut rng = rng_from(self.params.seed);
        let mut pool = Vec::with_capacity(sampler.datasets().len());
        let mut classifications = Vec::with_capacity(sampler.datasets().len());
        for dataset in sampler.datasets() {
            let grids = dataset.load()?;
            grids.check_classes(dataset.name(), self.params.num_classes)?;
            classifications.push(preclassify(
                &grids,
                |x| dataset.is_in_bag(x),
                self.params.pixel_fraction,
                &mut rng,
            ));
            pool.push(grids);
        }

        let context = Arc::new(GrowthContext::new(
            self.index,
            self.params.clone(),
            self.factory.clone(),
            pool,
        ));
        let selection = Selection {
            grids: Arc::new(classifications),
            mode: tag::LEFT,
        };
        let mut root = grow_node(&context, selection, 0, rng.gen())?;
        root.assign_ids(0);

        debug!(
            tree = self.index,
            depth = root.depth(),
            nodes = root.node_count(),
            leaves = root.leaf_count(),
            node_threads_peak = context.scheduler.peak_usage(),
            "Grew tree"
        );
        self.root = Some(root);
        Ok(())
    }

    /// Leaf probabilities of one pixel.
    pub fn classify_pixel(&self, grid: &SampleGrid, x: usize, y: usize) -> Result<&[f32]> {
        let root = self.root.as_ref().ok_or(ForestError::NotGrown)?;
        Ok(root.descend(grid, x, y))
    }

    pub fn classify(&self, grid: &SampleGrid) -> Result<ProbabilityGrid> {
        let root = self.root.as_ref().ok_or(ForestError::NotGrown)?;
        let mut probabilities =
            ProbabilityGrid::new(grid.frames(), grid.bins(), self.params.num_classes);
        for x in 0..grid.frames() {
            for y in 0..grid.bins() {
                probabilities
                    .pixel_mut(x, y)
                    .copy_from_slice(root.descend(grid, x, y));
            }
        }
        Ok(probabilities)
    }

    pub fn to_serialized(&self) -> Result<SerializedTree> {
        let root = self.root.as_ref().ok_or(ForestError::NotGrown)?;
        Ok(SerializedTree {
            index: self.index,
            num_classes: self.params.num_classes,
            nodes: root.to_records(),
        })
    }

    pub fn from_serialized(
        stored: &SerializedTree,
        params: TreeParams,
        factory: Arc<FeatureFactory>,
    ) -> Result<Self> {
        if stored.num_classes != params.num_classes {
            return Err(ForestError::InvalidParameter(format!(
                "stored tree {} has {} classes, expected {}",
                stored.index, stored.num_classes, params.num_classes
            )));
        }
        let root = Node::from_records(&stored.nodes, stored.num_classes, &factory)?;
        Ok(Self {
            index: stored.index,
            params,
            factory,
            root: Some(root),
        })
    }

    /// Writes the node graph as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &self.to_serialized()?)?;
        Ok(())
    }

    pub fn load(path: &Path, params: TreeParams, factory: Arc<FeatureFactory>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let stored: SerializedTree = serde_json::from_reader(reader)?;
        Self::from_serialized(&stored, params, factory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::Dataset;
    use crate::data::grid::ReferenceGrid;
    use crate::features::{FeatureDescriptor, FeatureFamily, FeatureParams};
    use crate::trees::node::NodeKind;
    use approx::assert_relative_eq;

    /// Reads the pixel itself and always proposes the threshold 0.5.
    #[derive(Debug)]
    struct Identity;

    impl Feature for Identity {
        fn evaluate(&self, grid: &SampleGrid, x: usize, y: usize) -> f32 {
            grid[(x, y)]
        }

        fn random_thresholds(&self, _rng: &mut StdRng, count: usize) -> Vec<f32> {
            vec![0.5; count]
        }

        fn descriptor(&self) -> FeatureDescriptor {
            FeatureDescriptor {
                family: "identity".into(),
                parameters: vec![],
            }
        }
    }

    struct IdentityFamily;

    impl FeatureFamily for IdentityFamily {
        fn name(&self) -> &'static str {
            "identity"
        }

        fn instantiate(&self, _params: &FeatureParams, _rng: &mut StdRng) -> Box<dyn Feature> {
            Box::new(Identity)
        }

        fn restore(&self, _parameters: &[f32]) -> Result<Box<dyn Feature>> {
            Ok(Box::new(Identity))
        }
    }

    fn onset_dataset(name: &str, frames: usize, bins: usize) -> Dataset {
        let mut sample = SampleGrid::zeros(frames, bins);
        let mut reference = ReferenceGrid::zeros(frames, bins);
        for x in 0..frames {
            for y in 0..bins {
                let onset = x % 5 == 0;
                reference[(x, y)] = onset as u8;
                let jitter = ((x * 7 + y * 3) % 5) as f32 * 0.02;
                sample[(x, y)] = if onset { 0.8 + jitter } else { 0.1 + jitter };
            }
        }
        Dataset::from_grids(name, sample, reference).unwrap()
    }

    fn params(seed: u64) -> TreeParams {
        TreeParams {
            max_depth: 6,
            min_samples: 2,
            num_candidates: 6,
            num_thresholds: 5,
            pixel_fraction: 0.5,
            seed: Some(seed),
            ..TreeParams::new()
        }
    }

    fn standard_factory() -> Arc<FeatureFactory> {
        Arc::new(FeatureFactory::standard(FeatureParams {
            max_frame_offset: 2,
            max_bin_offset: 2,
            value_range: (0.0, 1.0),
        }))
    }

    fn leaves(node: &Node) -> Vec<&[f32]> {
        match node.kind() {
            NodeKind::Leaf(probabilities) => vec![probabilities.as_slice()],
            NodeKind::Split { left, right, .. } => {
                let mut all = leaves(left);
                all.extend(leaves(right));
                all
            }
        }
    }

    #[test]
    fn test_uniform_class_gives_root_leaf() {
        let dataset = Dataset::from_grids(
            "flat",
            SampleGrid::filled(6, 4, 0.3),
            ReferenceGrid::filled(6, 4, 1),
        )
        .unwrap();
        let mut tree = RandomTree::new(
            0,
            TreeParams {
                num_classes: 3,
                ..params(1)
            },
            standard_factory(),
        );
        tree.grow(&Sampler::new(vec![dataset])).unwrap();

        let root = tree.root().unwrap();
        assert_eq!(root.depth(), 0);
        assert_eq!(root.probabilities(), Some(&[0.0, 1.0, 0.0][..]));
    }

    #[test]
    fn test_perfect_separation_at_depth_one() {
        let sample = SampleGrid::from_frames(
            4,
            4,
            &[
                0.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 0.0, //
                1.0, 1.0, 1.0, 1.0, //
                1.0, 1.0, 1.0, 1.0,
            ],
        )
        .unwrap();
        let reference =
            ReferenceGrid::from_frames(4, 4, &[0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1])
                .unwrap();
        let dataset = Dataset::from_grids("rows", sample, reference).unwrap();

        let mut factory = FeatureFactory::new(FeatureParams::default());
        factory.register(Box::new(IdentityFamily));
        let mut tree = RandomTree::new(
            0,
            TreeParams {
                max_depth: 1,
                num_candidates: 1,
                num_thresholds: 1,
                pixel_fraction: 1.0,
                ..params(3)
            },
            Arc::new(factory),
        );
        tree.grow(&Sampler::new(vec![dataset])).unwrap();

        let NodeKind::Split {
            threshold,
            left,
            right,
            ..
        } = tree.root().unwrap().kind()
        else {
            panic!("root should split");
        };
        assert_eq!(*threshold, 0.5);
        assert_eq!(left.probabilities(), Some(&[1.0, 0.0][..]));
        assert_eq!(right.probabilities(), Some(&[0.0, 1.0][..]));
        assert_eq!(tree.node_count(), 3);
    }

    #[test]
    fn test_leaves_are_distributions() {
        let sampler = Sampler::new(vec![onset_dataset("a", 40, 8), onset_dataset("b", 30, 8)]);
        let mut tree = RandomTree::new(0, params(11), standard_factory());
        tree.grow(&sampler).unwrap();

        let root = tree.root().unwrap();
        assert!(root.depth() <= 6);
        for probabilities in leaves(root) {
            assert_eq!(probabilities.len(), 2);
            assert_relative_eq!(probabilities.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_growth_is_deterministic_across_thread_budgets() {
        let sampler = Sampler::new(vec![onset_dataset("a", 60, 10)]);
        let grow = |params: TreeParams| {
            let mut tree = RandomTree::new(0, params, standard_factory());
            tree.grow(&sampler).unwrap();
            tree
        };

        let sequential = grow(TreeParams {
            node_threads: 0,
            ..params(5)
        });
        let threaded = grow(TreeParams {
            node_threads: 4,
            node_thread_max_pixels: usize::MAX,
            ..params(5)
        });
        let partitioned = grow(TreeParams {
            search_parallel_min_pixels: 0,
            search_chunks: 3,
            poll_interval_ms: 5,
            ..params(5)
        });
        assert_eq!(sequential.root(), threaded.root());
        assert_eq!(sequential.root(), partitioned.root());
        assert_eq!(sequential.root(), grow(params(5)).root());
    }

    #[test]
    fn test_out_of_bag_frames_are_ignored() {
        let mut dataset = onset_dataset("a", 20, 4);
        // keep only the frames without onsets
        dataset.replace((0..20).map(|x| x % 5 != 0).collect()).unwrap();
        let mut tree = RandomTree::new(0, params(2), standard_factory());
        tree.grow(&Sampler::new(vec![dataset])).unwrap();
        assert_eq!(tree.root().unwrap().probabilities(), Some(&[1.0, 0.0][..]));
    }

    #[test]
    fn test_class_out_of_range() {
        let dataset = Dataset::from_grids(
            "bad",
            SampleGrid::zeros(2, 2),
            ReferenceGrid::filled(2, 2, 5),
        )
        .unwrap();
        let mut tree = RandomTree::new(0, params(1), standard_factory());
        assert!(matches!(
            tree.grow(&Sampler::new(vec![dataset])),
            Err(ForestError::InvalidParameter(_))
        ));
        assert!(!tree.is_grown());
    }

    #[test]
    fn test_empty_pool() {
        let mut tree = RandomTree::new(0, params(1), standard_factory());
        assert!(matches!(
            tree.grow(&Sampler::default()),
            Err(ForestError::EmptyPool)
        ));
    }

    #[test]
    fn test_classify_requires_growth() {
        let tree = RandomTree::new(0, params(1), standard_factory());
        let grid = SampleGrid::zeros(2, 2);
        assert!(matches!(tree.classify(&grid), Err(ForestError::NotGrown)));
        assert!(matches!(
            tree.classify_pixel(&grid, 0, 0),
            Err(ForestError::NotGrown)
        ));
    }

    #[test]
    fn test_classify_matches_pixel_walk() {
        let dataset = onset_dataset("a", 30, 6);
        let mut tree = RandomTree::new(0, params(8), standard_factory());
        tree.grow(&Sampler::new(vec![dataset.clone()])).unwrap();

        let grids = dataset.load().unwrap();
        let probabilities = tree.classify(&grids.sample).unwrap();
        for x in 0..30 {
            for y in 0..6 {
                assert_eq!(
                    probabilities.pixel(x, y),
                    tree.classify_pixel(&grids.sample, x, y).unwrap()
                );
            }
        }
    }

    #[test]
    fn test_save_and_load() {
        let mut tree = RandomTree::new(4, params(21), standard_factory());
        let sampler = Sampler::new(vec![onset_dataset("a", 30, 6)]);
        tree.grow(&sampler).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.json");
        tree.save(&path).unwrap();
        let loaded = RandomTree::load(&path, params(21), standard_factory()).unwrap();
        assert_eq!(loaded.index(), 4);
        assert_eq!(loaded.root(), tree.root());
    }

    #[test]
    fn test_preclassify_fraction() {
        let dataset = onset_dataset("a", 10, 10);
        let grids = dataset.load().unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let classification = preclassify(&grids, |x| x < 5, 0.3, &mut rng);
        for x in 0..10 {
            let active = (0..10)
                .filter(|&y| classification[(x, y)] == tag::LEFT)
                .count();
            assert_eq!(active, if x < 5 { 3 } else { 0 });
        }
    }
}
