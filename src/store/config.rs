use crate::command::{KEYED_ENCRYPTION, NO_ENCRYPTION, is_known_encryption};
use crate::core::{Result, StoreError};
use crate::object::VersionScheme;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Encoding of the file-backed store's snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    #[default]
    Json,
    MessagePack,
}

/// Object store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of persistent ids fetched from the backend at a time
    pub serial_batch_size: usize,

    pub versioning: VersionScheme,

    /// Encryption type name applied to stored values
    pub encryption: String,

    pub encryption_key: Option<String>,

    /// Raise concurrency conflicts (true) or only log them
    pub concurrency_checking: bool,

    /// Snapshot file of the file-backed store
    pub data_file: Option<PathBuf>,

    pub snapshot_format: SnapshotFormat,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self {
            serial_batch_size: 10,
            versioning: VersionScheme::Serial,
            encryption: NO_ENCRYPTION.to_string(),
            encryption_key: None,
            concurrency_checking: true,
            data_file: None,
            snapshot_format: SnapshotFormat::Json,
        }
    }

    pub fn serial_batch_size(mut self, size: usize) -> Self {
        self.serial_batch_size = size;
        self
    }

    pub fn versioning(mut self, scheme: VersionScheme) -> Self {
        self.versioning = scheme;
        self
    }

    /// Use keyed encryption with the given key
    pub fn encrypted_with(mut self, key: &str) -> Self {
        self.encryption = KEYED_ENCRYPTION.to_string();
        self.encryption_key = Some(key.to_string());
        self
    }

    pub fn encryption(mut self, type_name: &str) -> Self {
        self.encryption = type_name.to_string();
        self
    }

    pub fn concurrency_checking(mut self, enabled: bool) -> Self {
        self.concurrency_checking = enabled;
        self
    }

    pub fn data_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_file = Some(path.into());
        self
    }

    pub fn snapshot_format(mut self, format: SnapshotFormat) -> Self {
        self.snapshot_format = format;
        self
    }

    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: StoreConfig = serde_json::from_str(json)
            .map_err(|e| StoreError::Storage(format!("Invalid store configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.serial_batch_size == 0 {
            return Err(StoreError::DomainModel(
                "serial_batch_size must be > 0".to_string(),
            ));
        }

        if !is_known_encryption(&self.encryption) {
            return Err(StoreError::DomainModel(format!(
                "Unknown encryption type '{}'",
                self.encryption
            )));
        }

        if self.encryption == KEYED_ENCRYPTION
            && self.encryption_key.as_deref().is_none_or(str::is_empty)
        {
            return Err(StoreError::DomainModel(
                "Keyed encryption requires encryption_key".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.serial_batch_size, 10);
        assert_eq!(config.versioning, VersionScheme::Serial);
        assert_eq!(config.encryption, "none");
        assert!(config.concurrency_checking);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = StoreConfig::new()
            .serial_batch_size(50)
            .versioning(VersionScheme::Timestamp)
            .encrypted_with("k3y")
            .data_file("/tmp/store.json")
            .snapshot_format(SnapshotFormat::MessagePack);

        assert_eq!(config.serial_batch_size, 50);
        assert_eq!(config.encryption, "key");
        assert_eq!(config.encryption_key.as_deref(), Some("k3y"));
        assert_eq!(config.snapshot_format, SnapshotFormat::MessagePack);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json() {
        let config = StoreConfig::from_json(
            r#"{"serial_batch_size": 25, "versioning": "Timestamp", "snapshot_format": "messagepack"}"#,
        )
        .unwrap();
        assert_eq!(config.serial_batch_size, 25);
        assert_eq!(config.versioning, VersionScheme::Timestamp);
        assert_eq!(config.snapshot_format, SnapshotFormat::MessagePack);
        assert_eq!(config.encryption, "none");

        assert!(StoreConfig::from_json(r#"{"serial_batch_size": 0}"#).is_err());
        assert!(StoreConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_validate() {
        assert!(StoreConfig::new().serial_batch_size(0).validate().is_err());
        assert!(StoreConfig::new().encryption("rot13").validate().is_err());
        assert!(StoreConfig::new().encryption("key").validate().is_err());
        assert!(StoreConfig::new().encrypted_with("").validate().is_err());
    }
}
