use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::AppConfig;
use crate::error::{AppError, Result};

/// Configuration store backed by a TOML file
///
/// Uses `ArcSwap` for lock-free reads, providing high performance
/// for frequent configuration access in hot paths.
#[derive(Clone)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    /// Lock-free cache using ArcSwap for zero-cost reads
    cache: Arc<ArcSwap<AppConfig>>,
}

impl ConfigStore {
    /// Load configuration from `path`
    ///
    /// A missing file yields the defaults; a present but invalid file is an
    /// error.
    pub async fn load(path: &Path) -> Result<Self> {
        let config = match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let config: AppConfig = toml::from_str(&text)
                    .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No configuration at {}, using defaults", path.display());
                AppConfig::default()
            }
            Err(e) => return Err(e.into()),
        };

        config.validate().map_err(AppError::Config)?;

        Ok(Self {
            path: Some(path.to_path_buf()),
            cache: Arc::new(ArcSwap::from_pointee(config)),
        })
    }

    /// Create an in-memory store (nothing is persisted)
    pub fn in_memory(config: AppConfig) -> Result<Self> {
        config.validate().map_err(AppError::Config)?;
        Ok(Self {
            path: None,
            cache: Arc::new(ArcSwap::from_pointee(config)),
        })
    }

    /// Get current configuration (lock-free, zero-copy)
    pub fn get(&self) -> Arc<AppConfig> {
        self.cache.load_full()
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Update configuration with a closure
    ///
    /// The result is validated before it replaces the cached value. Last
    /// write wins.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig),
    {
        let current = self.cache.load();
        let mut config = (**current).clone();
        f(&mut config);
        config.validate().map_err(AppError::Config)?;
        self.cache.store(Arc::new(config));
        Ok(())
    }

    /// Write the current configuration to the backing file
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Err(AppError::Config("configuration has no backing file".to_string()));
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let text = toml::to_string_pretty(self.get().as_ref())
            .map_err(|e| AppError::Config(e.to_string()))?;
        tokio::fs::write(path, text).await?;
        info!("Saved configuration to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionModel;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_config_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("viewport-stream.toml");

        let store = ConfigStore::load(&path).await.unwrap();

        // Missing file means defaults
        let config = store.get();
        assert_eq!(config.web.port, 8088);

        // Update config
        store
            .update(|c| {
                c.web.port = 9000;
                c.stream.execution_model = ExecutionModel::Worker;
            })
            .unwrap();
        store.save().await.unwrap();

        // Create new store instance and verify persistence
        let store2 = ConfigStore::load(&path).await.unwrap();
        let config = store2.get();
        assert_eq!(config.web.port, 9000);
        assert_eq!(config.stream.execution_model, ExecutionModel::Worker);
    }

    #[tokio::test]
    async fn test_invalid_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        tokio::fs::write(&path, "[stream]\ntick_interval_ms = 0\n")
            .await
            .unwrap();
        assert!(matches!(
            ConfigStore::load(&path).await,
            Err(AppError::Config(_))
        ));

        tokio::fs::write(&path, "[web\nport = ").await.unwrap();
        assert!(matches!(
            ConfigStore::load(&path).await,
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_update_rejects_invalid() {
        let store = ConfigStore::in_memory(AppConfig::default()).unwrap();
        assert!(store.update(|c| c.stream.codec.clear()).is_err());
        assert_eq!(store.get().stream.codec, "mjpeg");
        assert!(store.path().is_none());
    }
}
