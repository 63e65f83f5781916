//! The running bot's configuration.
//!
//! Readers get lock-free `Arc` snapshots. Writers go through [`ConfigCache::update`],
//! which saves to the file the configuration was loaded from, when there is one,
//! before the new snapshot becomes visible.

use crate::error::ConfigError;
use crate::loader::ConfigLoader;
use crate::registry::ExtensionRegistry;
use crate::schema::Config;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Holds the active [`Config`] and where it is persisted.
#[derive(Debug)]
pub struct ConfigCache {
    config: ArcSwap<Config>,
    loader: Option<ConfigLoader>,
    writes: Mutex<()>,
}

impl ConfigCache {
    /// Keeps `config` in memory only.
    pub fn new(config: Config) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            loader: None,
            writes: Mutex::new(()),
        }
    }

    /// Keeps `config` and writes every update back through `loader`.
    pub fn persisted(config: Config, loader: ConfigLoader) -> Self {
        Self {
            loader: Some(loader),
            ..Self::new(config)
        }
    }

    /// Current snapshot.
    pub fn get(&self) -> Arc<Config> {
        self.config.load_full()
    }

    /// Whether updates survive a restart.
    pub const fn is_persisted(&self) -> bool {
        self.loader.is_some()
    }

    /// Replaces the configuration.
    ///
    /// When persisted, a failed save leaves the current snapshot untouched.
    pub async fn update(&self, config: Config) -> Result<(), ConfigError> {
        let _guard = self.writes.lock().await;
        self.store(config).await
    }

    /// Replaces the extension list with the entries of the registry returned by
    /// `snapshot`.
    ///
    /// `snapshot` runs once the write lock is held, so concurrent toggles are
    /// saved in the order they took their snapshots.
    pub async fn update_extensions<F>(&self, snapshot: F) -> Result<(), ConfigError>
    where
        F: FnOnce() -> ExtensionRegistry,
    {
        let _guard = self.writes.lock().await;
        let registry = snapshot();
        let mut config = Config::clone(&self.get());
        config.extensions = registry.entries().cloned().collect();
        self.store(config).await
    }

    async fn store(&self, config: Config) -> Result<(), ConfigError> {
        if let Some(loader) = &self.loader {
            loader.save(&config).await?;
        } else {
            config.validate()?;
            debug!("Configuration updated in memory only");
        }
        self.config.store(Arc::new(config));
        Ok(())
    }
}

impl Default for ConfigCache {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
