//! Relay orchestration.
//!
//! - [`RelayConfig`] - Validated, read-only pipeline configuration
//! - [`DuplexPipeline`] - Owns the running streams and session wiring

pub mod config;
pub mod duplex;

pub use config::{Mode, RelayConfig};
pub use duplex::{DuplexPipeline, RelayStats};
