//! Service configuration
//!
//! Settings come from the TOML file (`~/.config/catalog/catalog-ingest.toml`
//! by default) and are then overridden by command-line arguments or their
//! `CATALOG_*` environment variables. Anything left unset uses the compiled
//! defaults below.

use catalog_common::config::LoggingConfig;
use serde::Deserialize;
use std::path::PathBuf;

use crate::kinds::product::DEFAULT_PRODUCT_IMAGE;
use crate::pipeline::FailurePolicy;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5740;

/// Pipeline settings (`[ingest]` TOML section)
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Collection prefix expected in indexed field names (`products[0][name]`)
    pub collection: String,
    /// Policy used when a request does not choose one
    pub failure_policy: FailurePolicy,
    /// Concurrent inserts under continue-on-error
    pub max_concurrency: usize,
    /// Total time to retry an insert while SQLite reports a lock
    pub max_lock_wait_ms: u64,
    /// Image reference stored for products submitted without one
    pub placeholder_image: String,
    /// Accepted attachment MIME prefix; empty accepts any type
    pub allowed_content_prefix: String,
    /// Request body limit for multipart submissions
    pub max_body_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            collection: "products".to_string(),
            failure_policy: FailurePolicy::default(),
            max_concurrency: 4,
            max_lock_wait_ms: 5000,
            placeholder_image: DEFAULT_PRODUCT_IMAGE.to_string(),
            allowed_content_prefix: "image/".to_string(),
            max_body_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Complete service configuration as read from TOML
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// Root folder (database and uploads); see `RootFolderResolver`
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Database file; defaults to `<root>/catalog.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Attachment directory; defaults to `<root>/uploads`
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub ingest: IngestConfig,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: DEFAULT_PORT,
            database_path: None,
            upload_dir: None,
            logging: LoggingConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub database_path: Option<PathBuf>,
    pub upload_dir: Option<PathBuf>,
    pub collection: Option<String>,
    pub failure_policy: Option<FailurePolicy>,
    pub max_concurrency: Option<usize>,
    pub max_lock_wait_ms: Option<u64>,
    pub placeholder_image: Option<String>,
    pub allowed_content_prefix: Option<String>,
    pub max_body_bytes: Option<usize>,
    pub log_level: Option<String>,
}

impl ServiceConfig {
    /// Apply higher-priority overrides on top of the TOML values
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(path) = overrides.database_path {
            self.database_path = Some(path);
        }
        if let Some(dir) = overrides.upload_dir {
            self.upload_dir = Some(dir);
        }
        if let Some(collection) = overrides.collection {
            self.ingest.collection = collection;
        }
        if let Some(policy) = overrides.failure_policy {
            self.ingest.failure_policy = policy;
        }
        if let Some(max) = overrides.max_concurrency {
            self.ingest.max_concurrency = max;
        }
        if let Some(wait) = overrides.max_lock_wait_ms {
            self.ingest.max_lock_wait_ms = wait;
        }
        if let Some(image) = overrides.placeholder_image {
            self.ingest.placeholder_image = image;
        }
        if let Some(prefix) = overrides.allowed_content_prefix {
            self.ingest.allowed_content_prefix = prefix;
        }
        if let Some(bytes) = overrides.max_body_bytes {
            self.ingest.max_body_bytes = bytes;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        self
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> catalog_common::Result<()> {
        let collection = self.ingest.collection.trim();
        if collection.is_empty() || collection.contains(['[', ']']) {
            return Err(catalog_common::Error::Config(format!(
                "collection name `{}` must be non-empty and contain no brackets",
                self.ingest.collection
            )));
        }
        if self.ingest.max_concurrency == 0 {
            return Err(catalog_common::Error::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.port, 5740);
        assert_eq!(config.ingest.collection, "products");
        assert_eq!(config.ingest.failure_policy, FailurePolicy::ContinueOnError);
        assert_eq!(config.ingest.max_concurrency, 4);
        assert_eq!(config.ingest.placeholder_image, "default.png");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            port = 6000

            [ingest]
            failure_policy = "all-or-nothing"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 6000);
        assert_eq!(config.ingest.failure_policy, FailurePolicy::AllOrNothing);
        assert_eq!(config.ingest.collection, "products");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_overrides_win() {
        let config = ServiceConfig::default().with_overrides(ConfigOverrides {
            port: Some(7000),
            collection: Some("items".to_string()),
            failure_policy: Some(FailurePolicy::AllOrNothing),
            max_lock_wait_ms: Some(100),
            placeholder_image: Some("none.png".to_string()),
            allowed_content_prefix: Some(String::new()),
            max_body_bytes: Some(1024),
            ..Default::default()
        });

        assert_eq!(config.port, 7000);
        assert_eq!(config.ingest.collection, "items");
        assert_eq!(config.ingest.failure_policy, FailurePolicy::AllOrNothing);
        assert_eq!(config.ingest.max_lock_wait_ms, 100);
        assert_eq!(config.ingest.placeholder_image, "none.png");
        assert_eq!(config.ingest.allowed_content_prefix, "");
        assert_eq!(config.ingest.max_body_bytes, 1024);
        assert_eq!(config.ingest.max_concurrency, 4);
    }

    #[test]
    fn test_validate_rejects_bad_collection() {
        let mut config = ServiceConfig::default();
        config.ingest.collection = "items[0]".to_string();
        assert!(config.validate().is_err());

        config.ingest.collection = "items".to_string();
        config.ingest.max_concurrency = 0;
        assert!(config.validate().is_err());
    }
}
