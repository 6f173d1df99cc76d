pub mod config;
pub mod rule;

pub use config::{KernelProps, MeshConfig};
pub use rule::*;
