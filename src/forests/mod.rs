/// Forest growth, classification and persistence
pub mod forest;
/// Forest parameters
pub mod params;

pub use forest::Forest;
pub use params::ForestParams;
