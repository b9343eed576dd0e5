//! Engine configuration.
//!
//! Loaded from YAML. Every field is optional and falls back to its default.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Engine-wide settings shared by every ACL handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// API version used as the prefix of usage URLs.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Project whose usage URLs carry no `?project=` suffix.
    #[serde(default = "default_project")]
    pub default_project: String,

    /// Network kinds synchronised with the SDN control plane.
    #[serde(default = "default_sdn_network_types")]
    pub sdn_network_types: Vec<String>,

    /// Network kinds that can carry ACLs.
    #[serde(default = "default_acl_network_types")]
    pub acl_network_types: Vec<String>,

    /// Config keys with this prefix are caller metadata and never validated.
    #[serde(default = "default_user_config_prefix")]
    pub user_config_prefix: String,
}

fn default_api_version() -> String {
    "1.0".to_string()
}

fn default_project() -> String {
    "default".to_string()
}

fn default_sdn_network_types() -> Vec<String> {
    vec!["ovn".to_string()]
}

fn default_acl_network_types() -> Vec<String> {
    vec!["bridge".to_string(), "ovn".to_string()]
}

fn default_user_config_prefix() -> String {
    "user.".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            default_project: default_project(),
            sdn_network_types: default_sdn_network_types(),
            acl_network_types: default_acl_network_types(),
            user_config_prefix: default_user_config_prefix(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        // An empty document means "all defaults".
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `path`, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_yaml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version.is_empty() {
            return Err(ConfigError::Invalid("api_version must not be empty".to_string()));
        }

        if self.default_project.is_empty() {
            return Err(ConfigError::Invalid(
                "default_project must not be empty".to_string(),
            ));
        }

        if self.user_config_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "user_config_prefix must not be empty".to_string(),
            ));
        }

        if let Some(kind) = self
            .sdn_network_types
            .iter()
            .find(|kind| !self.acl_network_types.contains(kind))
        {
            return Err(ConfigError::Invalid(format!(
                "sdn network type {:?} is not an ACL network type",
                kind
            )));
        }

        Ok(())
    }

    pub fn is_sdn_network(&self, network_type: &str) -> bool {
        self.sdn_network_types.iter().any(|t| t == network_type)
    }

    pub fn is_acl_network(&self, network_type: &str) -> bool {
        self.acl_network_types.iter().any(|t| t == network_type)
    }

    /// Returns the `?project=` suffix for usage URLs, empty for the default
    /// project.
    pub fn project_suffix(&self, project: &str) -> String {
        if project == self.default_project {
            String::new()
        } else {
            format!("?project={}", project)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.api_version, "1.0");
        assert_eq!(config.default_project, "default");
        assert!(config.is_sdn_network("ovn"));
        assert!(!config.is_sdn_network("bridge"));
        assert!(config.is_acl_network("bridge"));
        assert!(!config.is_acl_network("macvlan"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml_str("default_project: main\n").unwrap();
        assert_eq!(config.default_project, "main");
        assert_eq!(config.user_config_prefix, "user.");
        assert_eq!(config.project_suffix("main"), "");
        assert_eq!(config.project_suffix("tenant"), "?project=tenant");
    }

    #[test]
    fn test_sdn_types_must_carry_acls() {
        let err = EngineConfig::from_yaml_str("sdn_network_types: [ovn, physical]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api_version: \"2.0\"").unwrap();
        writeln!(file, "acl_network_types: [bridge, ovn, physical]").unwrap();

        let config = EngineConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.api_version, "2.0");
        assert_eq!(config.acl_network_types.len(), 3);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_or_default(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_malformed_yaml() {
        let err = EngineConfig::from_yaml_str("api_version: [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
