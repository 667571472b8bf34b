use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coords::ChunkShape;
use crate::persist::PersistTarget;
use crate::shape::Neighborhood;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub address: String,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:9999".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub destination: String,
    pub dataset: String,
    pub block_shape: ChunkShape,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            destination: String::new(),
            dataset: "volumes/labels".to_string(),
            block_shape: ChunkShape::default(),
        }
    }
}

impl PersistenceConfig {
    pub fn target(&self) -> PersistTarget {
        PersistTarget {
            destination: self.destination.clone(),
            dataset: self.dataset.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaintConfig {
    /// Chunk shape of the masks a stroke produces.
    pub chunk_shape: ChunkShape,
    pub neighborhood: Neighborhood,
    pub scheduler: SchedulerConfig,
    pub solver: SolverConfig,
    pub persistence: PersistenceConfig,
}

impl PaintConfig {
    /// Loads a YAML or JSON config, picked by file extension.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        common::load_file(path)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        common::save_file(self, path)
    }
}
