use serde::{Deserialize, Serialize};

use crate::data::grid::SampleGrid;
use crate::error::{ForestError, Result};
use crate::features::{Feature, FeatureDescriptor, FeatureFactory};

/// Decision tree node
#[derive(Debug)]
pub struct Node {
    id: u64,
    kind: NodeKind,
}

#[derive(Debug)]
pub enum NodeKind {
    /// Class probabilities of the training pixels that reached the node.
    Leaf(Vec<f32>),
    Split {
        feature: Box<dyn Feature>,
        threshold: f32,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    pub fn leaf(probabilities: Vec<f32>) -> Self {
        Self {
            id: 0,
            kind: NodeKind::Leaf(probabilities),
        }
    }

    pub fn split(feature: Box<dyn Feature>, threshold: f32, left: Node, right: Node) -> Self {
        Self {
            id: 0,
            kind: NodeKind::Split {
                feature,
                threshold,
                left: Box::new(left),
                right: Box::new(right),
            },
        }
    }

    /// A pixel goes left when its score is below the threshold.
    #[inline]
    pub fn routes_left(score: f32, threshold: f32) -> bool {
        score < threshold
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    pub fn probabilities(&self) -> Option<&[f32]> {
        match &self.kind {
            NodeKind::Leaf(probabilities) => Some(probabilities),
            NodeKind::Split { .. } => None,
        }
    }

    pub fn feature(&self) -> Option<&dyn Feature> {
        match &self.kind {
            NodeKind::Leaf(_) => None,
            NodeKind::Split { feature, .. } => Some(feature.as_ref()),
        }
    }

    /// Walks from this node to the leaf a pixel lands in.
    pub fn descend(&self, grid: &SampleGrid, x: usize, y: usize) -> &[f32] {
        let mut node = self;
        loop {
            match &node.kind {
                NodeKind::Leaf(probabilities) => return probabilities,
                NodeKind::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if Self::routes_left(feature.evaluate(grid, x, y), *threshold) {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    /// Depth of the subtree; a lone leaf has depth 0.
    pub fn depth(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(_) => 0,
            NodeKind::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    pub fn node_count(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(_) => 1,
            NodeKind::Split { left, right, .. } => 1 + left.node_count() + right.node_count(),
        }
    }

    pub fn leaf_count(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(_) => 1,
            NodeKind::Split { left, right, .. } => left.leaf_count() + right.leaf_count(),
        }
    }

    /// Numbers the subtree in pre-order starting from `first`; returns the next free id.
    pub fn assign_ids(&mut self, first: u64) -> u64 {
        self.id = first;
        match &mut self.kind {
            NodeKind::Leaf(_) => first + 1,
            NodeKind::Split { left, right, .. } => {
                let next = left.assign_ids(first + 1);
                right.assign_ids(next)
            }
        }
    }

    /// Flattens the subtree into pre-order records linked by node id.
    pub fn to_records(&self) -> Vec<SerializedNode> {
        let mut records = Vec::with_capacity(self.node_count());
        self.push_records(&mut records);
        records
    }

    fn push_records(&self, records: &mut Vec<SerializedNode>) {
        match &self.kind {
            NodeKind::Leaf(probabilities) => records.push(SerializedNode {
                id: self.id,
                feature: None,
                threshold: None,
                left: None,
                right: None,
                probabilities: Some(probabilities.clone()),
            }),
            NodeKind::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                records.push(SerializedNode {
                    id: self.id,
                    feature: Some(feature.descriptor()),
                    threshold: Some(*threshold),
                    left: Some(left.id),
                    right: Some(right.id),
                    probabilities: None,
                });
                left.push_records(records);
                right.push_records(records);
            }
        }
    }

    /// Rebuilds a tree from records written by [`Node::to_records`].
    ///
    /// Every record must be either a complete split or a leaf of `num_classes`
    /// probabilities summing to one, and children must follow their parent.
    pub fn from_records(
        records: &[SerializedNode],
        num_classes: usize,
        factory: &FeatureFactory,
    ) -> Result<Node> {
        let root = records.first().ok_or(ForestError::MalformedNode(0))?;
        Self::from_record(root, records, num_classes, factory)
    }

    fn from_record(
        record: &SerializedNode,
        records: &[SerializedNode],
        num_classes: usize,
        factory: &FeatureFactory,
    ) -> Result<Node> {
        let malformed = || ForestError::MalformedNode(record.id);

        let kind = match record {
            SerializedNode {
                feature: None,
                threshold: None,
                left: None,
                right: None,
                probabilities: Some(probabilities),
                ..
            } => {
                let sum: f32 = probabilities.iter().sum();
                if probabilities.len() != num_classes || (sum - 1.0).abs() > 1e-3 {
                    return Err(malformed());
                }
                NodeKind::Leaf(probabilities.clone())
            }
            SerializedNode {
                feature: Some(descriptor),
                threshold: Some(threshold),
                left: Some(left),
                right: Some(right),
                probabilities: None,
                ..
            } => {
                let left = find_child(records, record.id, *left)?;
                let right = find_child(records, record.id, *right)?;
                NodeKind::Split {
                    feature: factory.restore(descriptor)?,
                    threshold: *threshold,
                    left: Box::new(Self::from_record(left, records, num_classes, factory)?),
                    right: Box::new(Self::from_record(right, records, num_classes, factory)?),
                }
            }
            _ => return Err(malformed()),
        };
        Ok(Node {
            id: record.id,
            kind,
        })
    }
}

/// Children always come after their parent in pre-order.
fn find_child(records: &[SerializedNode], parent: u64, id: u64) -> Result<&SerializedNode> {
    if id <= parent {
        return Err(ForestError::MalformedNode(parent));
    }
    records
        .get(id as usize)
        .filter(|candidate| candidate.id == id)
        .or_else(|| records.iter().find(|candidate| candidate.id == id))
        .ok_or(ForestError::MalformedNode(parent))
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        if self.id != other.id {
            return false;
        }
        match (&self.kind, &other.kind) {
            (NodeKind::Leaf(a), NodeKind::Leaf(b)) => a == b,
            (
                NodeKind::Split {
                    feature: feature_a,
                    threshold: threshold_a,
                    left: left_a,
                    right: right_a,
                },
                NodeKind::Split {
                    feature: feature_b,
                    threshold: threshold_b,
                    left: left_b,
                    right: right_b,
                },
            ) => {
                feature_a.descriptor() == feature_b.descriptor()
                    && threshold_a == threshold_b
                    && left_a == left_b
                    && right_a == right_b
            }
            _ => false,
        }
    }
}

/// Stored form of one node; children are referenced by id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedNode {
    pub id: u64,
    pub feature: Option<FeatureDescriptor>,
    pub threshold: Option<f32>,
    pub left: Option<u64>,
    pub right: Option<u64>,
    pub probabilities: Option<Vec<f32>>,
}
