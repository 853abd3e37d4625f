//! assessor-store — in-memory repositories and configuration.
//!
//! Implements the storage ports from `assessor-core` over maps, so the
//! engine can run against fixtures without a database.

pub mod config;
pub mod memory;

pub use config::{load_config, load_config_from, AssessorConfig};
pub use memory::{InMemoryStore, RecordingPublisher};
