pub mod matrix;
pub mod error;

pub use matrix::Matrix;
pub use error::{NeuriteError, NeuriteResult};
