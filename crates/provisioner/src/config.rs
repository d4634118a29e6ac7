//! Configuration for the index provisioner.

use crate::error::ProvisionError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_mongodb_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database_name() -> String {
    "karmabot".to_string()
}

fn default_collection_name() -> String {
    "karmabot".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_server_selection_timeout_secs() -> u64 {
    10
}

fn default_app_name() -> String {
    "karmabot-provisioner".to_string()
}

/// Where and how to reach the karmabot collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisionerConfig {
    /// MongoDB connection URI
    /// Example: "mongodb://localhost:27017"
    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,

    /// Database holding the records
    #[serde(default = "default_database_name")]
    pub database_name: String,

    /// Collection the indexes are declared on
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// MongoDB connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// MongoDB server selection timeout in seconds
    #[serde(default = "default_server_selection_timeout_secs")]
    pub server_selection_timeout_secs: u64,

    /// Application name reported to the server in the connection handshake
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            mongodb_uri: default_mongodb_uri(),
            database_name: default_database_name(),
            collection_name: default_collection_name(),
            connect_timeout_secs: default_connect_timeout_secs(),
            server_selection_timeout_secs: default_server_selection_timeout_secs(),
            app_name: default_app_name(),
        }
    }
}

impl ProvisionerConfig {
    /// Creates a config targeting the default database and collection on the given URI.
    pub fn new(mongodb_uri: impl Into<String>) -> Self {
        Self { mongodb_uri: mongodb_uri.into(), ..Default::default() }
    }

    /// Loads a YAML config file. Missing keys fall back to their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ProvisionError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProvisionError::ConfigFile { path: path.to_path_buf(), reason: e.to_string() })?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ProvisionError::ConfigFile { path: path.to_path_buf(), reason: e.to_string() })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn server_selection_timeout(&self) -> Duration {
        Duration::from_secs(self.server_selection_timeout_secs)
    }

    /// Rejects configs the driver would only fail on later with a less useful message.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        if self.mongodb_uri.trim().is_empty() {
            return Err(ProvisionError::InvalidConfig("mongodb_uri must not be empty".to_string()));
        }
        if self.database_name.trim().is_empty() {
            return Err(ProvisionError::InvalidConfig("database_name must not be empty".to_string()));
        }
        if self.collection_name.trim().is_empty() {
            return Err(ProvisionError::InvalidConfig("collection_name must not be empty".to_string()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ProvisionError::InvalidConfig("connect_timeout_secs must be greater than 0".to_string()));
        }
        if self.server_selection_timeout_secs == 0 {
            return Err(ProvisionError::InvalidConfig(
                "server_selection_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
