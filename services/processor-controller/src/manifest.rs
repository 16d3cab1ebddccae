//! Startup manifests for the standalone binary.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{Function, Processor, Stream};
use crate::store::MemoryStores;

/// Objects to load into the in-memory stores at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub functions: Vec<Function>,

    #[serde(default)]
    pub streams: Vec<Stream>,

    #[serde(default)]
    pub processors: Vec<Processor>,
}

impl Manifest {
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(json).context("invalid manifest JSON")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("failed to load manifest {}", path.display()))
    }

    /// Rejects processors that could never reconcile.
    pub fn validate(&self) -> Result<()> {
        for processor in &self.processors {
            processor.validate().with_context(|| {
                format!(
                    "invalid processor {}/{}",
                    processor.metadata.namespace, processor.metadata.name
                )
            })?;
        }
        Ok(())
    }

    /// Seeds every object. Dependencies go in first so the initial passes
    /// find them.
    pub fn load_into(self, stores: &MemoryStores) {
        for function in self.functions {
            stores.functions.seed(function);
        }
        for stream in self.streams {
            stores.streams.seed(stream);
        }
        for processor in self.processors {
            stores.processors.seed(processor);
        }
    }
}
