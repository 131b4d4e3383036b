use arc_swap::ArcSwap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::AppConfig;
use crate::error::{AppError, Result};

/// In-memory configuration store
///
/// Uses `ArcSwap` for lock-free reads. The store is read-only with respect to
/// disk; changes made through [`ConfigStore::set`] live for the process.
#[derive(Clone)]
pub struct ConfigStore {
    cache: Arc<ArcSwap<AppConfig>>,
    change_tx: broadcast::Sender<ConfigChange>,
}

/// Configuration change event
#[derive(Debug, Clone)]
pub struct ConfigChange {
    pub key: String,
}

impl ConfigStore {
    pub fn new(config: AppConfig) -> Self {
        let (change_tx, _) = broadcast::channel(16);
        Self {
            cache: Arc::new(ArcSwap::from_pointee(config)),
            change_tx,
        }
    }

    /// Load configuration from a JSON file; a missing file yields defaults
    pub async fn load(path: &Path) -> Result<Self> {
        let config = match tokio::fs::read_to_string(path).await {
            Ok(json) => {
                info!("Loading configuration from {}", path.display());
                serde_json::from_str(&json).map_err(|e| {
                    AppError::Config(format!("Invalid config {}: {}", path.display(), e))
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                AppConfig::default()
            }
            Err(e) => {
                return Err(AppError::Config(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self::new(config))
    }

    /// Get current configuration (lock-free)
    pub fn get(&self) -> Arc<AppConfig> {
        self.cache.load_full()
    }

    /// Replace the configuration
    pub fn set(&self, config: AppConfig) {
        self.cache.store(Arc::new(config));
        let _ = self.change_tx.send(ConfigChange {
            key: "app_config".to_string(),
        });
    }

    /// Update configuration with a closure (last write wins)
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = (**self.cache.load()).clone();
        f(&mut config);
        self.set(config);
    }

    /// Subscribe to configuration changes
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.change_tx.subscribe()
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_and_update() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{ "hid": { "keyboard_path": "/dev/hidg4" } }"#)
            .await
            .unwrap();

        let store = ConfigStore::load(&path).await.unwrap();
        assert_eq!(store.get().hid.keyboard_path, "/dev/hidg4");

        let mut rx = store.subscribe();
        store.update(|c| c.hid.loopback = true);

        assert!(store.get().hid.loopback);
        assert_eq!(rx.recv().await.unwrap().key, "app_config");

        // The file is never rewritten
        let on_disk = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(!on_disk.contains("loopback"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let store = tokio_test::block_on(ConfigStore::load(&dir.path().join("absent.json")))
            .unwrap();
        assert_eq!(*store.get(), AppConfig::default());
    }

    #[tokio::test]
    async fn test_invalid_json_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let err = ConfigStore::load(&path).await.err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }
}
