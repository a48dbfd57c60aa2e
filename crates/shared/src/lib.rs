pub mod config;
pub mod ids;
pub mod topics;

pub use ids::*;
pub use topics::*;
