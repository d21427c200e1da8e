//! Object store configuration for artifact output.

use crate::config::OutputConfig;
use anyhow::{Context, Result};
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use std::sync::Arc;

/// Create the object store backing artifact output.
///
/// `memory: true` keeps artifacts in process memory; otherwise artifacts land
/// under `local_path`, which is created if missing.
pub fn create_output_store(config: &OutputConfig) -> Result<Arc<dyn ObjectStore>> {
    if config.memory {
        tracing::info!("Using in-memory artifact store");
        return Ok(Arc::new(InMemory::new()));
    }

    let path = config
        .local_path
        .as_deref()
        .context("output.local_path is required unless output.memory is set")?;

    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create output directory {}", path))?;

    tracing::info!("Writing artifacts to {}", path);
    Ok(Arc::new(LocalFileSystem::new_with_prefix(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let config = OutputConfig {
            local_path: None,
            memory: true,
            prefix: "batches".to_string(),
        };
        assert!(create_output_store(&config).is_ok());
    }

    #[test]
    fn test_local_store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        let config = OutputConfig {
            local_path: Some(path.to_string_lossy().into_owned()),
            memory: false,
            prefix: "batches".to_string(),
        };

        assert!(create_output_store(&config).is_ok());
        assert!(path.is_dir());
    }

    #[test]
    fn test_missing_destination_fails() {
        let config = OutputConfig {
            local_path: None,
            memory: false,
            prefix: "batches".to_string(),
        };
        assert!(create_output_store(&config).is_err());
    }
}
