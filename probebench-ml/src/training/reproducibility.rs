//! Seed management for reproducible runs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Per-component seed derivation.
pub mod components {
    pub const NETWORK_INIT: &str = "network_init";
    pub const TRAIN_LOADER: &str = "train_loader";
    pub const VALIDATION_LOADER: &str = "validation_loader";
}

/// Derives a stable seed per named component from one global seed.
///
/// Seeds depend only on `(global_seed, component)`, never on call order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedManager {
    pub global_seed: u64,
    pub component_seeds: BTreeMap<String, u64>,
}

impl SeedManager {
    pub fn new(global_seed: u64) -> Self {
        Self {
            global_seed,
            component_seeds: BTreeMap::new(),
        }
    }

    pub fn get_seed(&mut self, component: &str) -> u64 {
        let global = self.global_seed;
        *self
            .component_seeds
            .entry(component.to_string())
            .or_insert_with(|| derive_seed(global, component))
    }
}

fn derive_seed(global: u64, component: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(global.to_le_bytes());
    hasher.update(b"/");
    hasher.update(component.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
