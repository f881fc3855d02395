pub mod scaler;
pub mod decorrelation;
pub mod preprocessor;

pub use scaler::*;
pub use decorrelation::*;
pub use preprocessor::*;
