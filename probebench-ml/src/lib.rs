//! # probebench-ml — checkpoint-gated training and frozen-feature probing
//!
//! Stage 1 trains (or reuses) a base classifier under a fixed recipe with a
//! multi-step learning-rate schedule, keeping only the best validation state.
//! Stage 2 freezes that network, extracts penultimate features for both
//! splits, and compares a fixed set of classical classifiers on them.
//!
//! The stages only see capability traits ([`nn::Network`], [`nn::Optimizer`],
//! [`data::Dataset`], [`algorithms::Classifier`]); `nn` and `data` also carry
//! the reference implementations the CLI wires up.

// Foundation
pub mod config;
pub mod error;

// Collaborators
pub mod data;
pub mod nn;

// Stage 1
pub mod training;

// Stage 2
pub mod algorithms;
pub mod features;

// Orchestration
pub mod experiment;

// Re-exports
pub use config::BenchConfig;
pub use error::MlError;
pub use experiment::{ExperimentOrchestrator, ExperimentOutcome, RunFailure};
pub use training::{CheckpointGate, GateDecision};
