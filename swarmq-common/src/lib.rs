//! SwarmQ Common Library
//!
//! Shared utilities and components used across SwarmQ components

pub mod config;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod validation;

pub use config::*;
pub use errors::*;
pub use logging::*;
pub use metrics::*;
pub use validation::*;

// Re-export swarmq-protocol for error conversion
pub use swarmq_protocol;
