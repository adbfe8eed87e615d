//! Configuration loading and the configuration types shared by the gateway crates.

mod environment;
mod load;
mod serde_utils;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
