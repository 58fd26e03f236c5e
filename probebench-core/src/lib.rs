//! # probebench-core — shared plumbing
//!
//! Small, dependency-light helpers used by the ML and CLI crates:
//! - [`persistence`] — crash-safe file writes and JSON loading
//! - [`config`] — layered configuration loading (defaults, files, environment)

pub mod config;
pub mod persistence;

pub use config::{ConfigSources, load_config};
pub use persistence::{atomic_write, atomic_write_json, load_json};
