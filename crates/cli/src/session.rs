//! Store setup shared by every remote command
//!
//! Resolves the alias, builds the S3 client and installs the resulting
//! store configuration as the process default.

use std::sync::Arc;

use anyhow::Context;
use bfs_core::{AliasManager, ConfigManager, S3Path, StoreConfig};
use bfs_s3::S3Client;

/// Connect to the alias named on the command line, or the default alias
pub async fn connect(alias: Option<&str>) -> anyhow::Result<Arc<StoreConfig>> {
    let manager = AliasManager::new()?;
    let config = manager.config_manager().load()?;
    let alias = manager.resolve(alias)?;

    let client = S3Client::new(&alias)
        .await
        .with_context(|| format!("Failed to create S3 client for alias '{}'", alias.name))?;

    let store = StoreConfig::new(&alias.name, Arc::new(client))
        .with_retry(alias.retry_policy())
        .with_transfer(config.transfer)
        .shared();
    Ok(StoreConfig::install_default(store)?)
}

/// Load the configuration file, mainly for output defaults
pub fn load_config() -> anyhow::Result<bfs_core::Config> {
    Ok(ConfigManager::new()?.load()?)
}

/// Whether an argument names a remote path rather than a local file
pub fn is_remote(arg: &str) -> bool {
    arg.starts_with("s3://")
}

/// Parse a remote argument against the command's store configuration
pub fn remote_path(arg: &str, config: &Arc<StoreConfig>) -> anyhow::Result<S3Path> {
    S3Path::parse_with(arg, config.clone()).with_context(|| format!("Invalid remote path '{arg}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bfs_core::MemoryStore;

    #[test]
    fn test_is_remote() {
        assert!(is_remote("s3://bucket/key"));
        assert!(!is_remote("./local/file"));
        assert!(!is_remote("bucket/key"));
    }

    #[test]
    fn test_remote_path() {
        let config = StoreConfig::new("mem", Arc::new(MemoryStore::new())).shared();
        let path = remote_path("s3://bucket/dir/file.txt", &config).unwrap();
        assert_eq!(path.bucket(), "bucket");
        assert_eq!(path.key(), "dir/file.txt");

        let err = remote_path("http://bucket/key", &config).unwrap_err();
        assert!(err.to_string().contains("Invalid remote path"));
    }
}
