/// Detection rates and threshold selection over classified grids
pub mod detection;
