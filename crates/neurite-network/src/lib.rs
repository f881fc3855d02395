pub mod network;
pub mod param;

pub use network::*;
pub use param::*;
