pub mod dataset;
pub mod split;

pub use dataset::*;
pub use split::*;
