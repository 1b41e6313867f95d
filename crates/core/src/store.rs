//! Store configuration shared by paths
//!
//! Every [`S3Path`](crate::S3Path) carries an `Arc<StoreConfig>`: the client
//! to talk to, how to retry it and how to size transfers. A process-wide
//! default can be installed once at startup; it is never replaced afterwards.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};
use crate::multipart::TransferOptions;
use crate::retry::RetryPolicy;
use crate::traits::ObjectStore;

static DEFAULT_CONFIG: OnceLock<Arc<StoreConfig>> = OnceLock::new();

/// Client, retry policy and transfer sizing for a set of paths
pub struct StoreConfig {
    name: String,
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    transfer: TransferOptions,
}

impl StoreConfig {
    /// Create a config with default retry and transfer settings
    pub fn new(name: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            name: name.into(),
            store,
            retry: RetryPolicy::default(),
            transfer: TransferOptions::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_transfer(mut self, transfer: TransferOptions) -> Self {
        self.transfer = transfer;
        self
    }

    /// Wrap in an `Arc`, ready to hand to paths
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Label used in logs (usually the alias name)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn transfer(&self) -> &TransferOptions {
        &self.transfer
    }

    /// Install the process-wide default
    ///
    /// Fails if a default is already installed.
    pub fn install_default(config: Arc<StoreConfig>) -> Result<Arc<StoreConfig>> {
        let name = config.name.clone();
        DEFAULT_CONFIG.set(config).map_err(|_| {
            Error::Config(format!(
                "A default store configuration is already installed; refusing to replace it with '{name}'"
            ))
        })?;
        tracing::debug!(config = %name, "Installed default store configuration");
        Self::default_config()
    }

    /// The process-wide default, if one was installed
    pub fn default_config() -> Result<Arc<StoreConfig>> {
        DEFAULT_CONFIG.get().cloned().ok_or_else(|| {
            Error::Config("No default store configuration installed; pass one explicitly".into())
        })
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("name", &self.name)
            .field("retry", &self.retry)
            .field("transfer", &self.transfer)
            .finish_non_exhaustive()
    }
}
