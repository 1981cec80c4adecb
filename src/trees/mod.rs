/// Tree nodes and their stored form
pub mod node;
/// Growth parameters
pub mod params;
/// Random tree growth and classification
pub mod random_tree;
/// Split statistics
pub mod split;

pub use node::{Node, NodeKind};
pub use params::TreeParams;
pub use random_tree::RandomTree;
