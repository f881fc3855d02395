pub mod config;
pub mod info;
pub mod weights;
mod lines;

pub use config::*;
pub use info::*;
pub use weights::*;
