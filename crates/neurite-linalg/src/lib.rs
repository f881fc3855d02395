pub mod eigen;

pub use eigen::*;
