//! Configuration types shared by the gateway crates.

mod base;
mod gateway;
mod log_level;

pub use base::ValidationError;
pub use gateway::GatewayConfig;
pub use log_level::LogLevel;
