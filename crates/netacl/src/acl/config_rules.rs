//! Config key validator registry.
//!
//! The config map is closed-world: every key must either have a registered
//! validator or carry the user metadata prefix.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ValidationError;

/// Validates one config value. `None` means the key is absent.
pub type ConfigValidator = Arc<dyn Fn(Option<&str>) -> Result<(), String> + Send + Sync>;

/// Registry of config key validators.
#[derive(Clone, Default)]
pub struct ConfigRules {
    validators: BTreeMap<String, ConfigValidator>,
}

impl ConfigRules {
    /// Creates an empty registry. Every non-user key is rejected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a validator for `key`, replacing any previous one.
    pub fn with_rule<F>(mut self, key: impl Into<String>, validator: F) -> Self
    where
        F: Fn(Option<&str>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validators.insert(key.into(), Arc::new(validator));
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.validators.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.validators.keys().map(String::as_str)
    }

    /// Runs every registered validator, then rejects unregistered keys that
    /// do not start with `user_prefix`.
    pub fn validate(
        &self,
        config: &BTreeMap<String, String>,
        user_prefix: &str,
    ) -> Result<(), ValidationError> {
        for (key, validator) in &self.validators {
            validator(config.get(key).map(String::as_str)).map_err(|message| {
                ValidationError::ConfigValue {
                    key: key.clone(),
                    message,
                }
            })?;
        }

        match config
            .keys()
            .find(|key| !self.contains(key) && !key.starts_with(user_prefix))
        {
            Some(key) => Err(ValidationError::UnknownConfigKey { key: key.clone() }),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ConfigRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigRules")
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_registry_accepts_user_keys_only() {
        let rules = ConfigRules::new();
        assert!(rules.validate(&config(&[("user.owner", "ops")]), "user.").is_ok());

        let err = rules
            .validate(&config(&[("user.owner", "ops"), ("mtu", "1500")]), "user.")
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownConfigKey {
                key: "mtu".to_string()
            }
        );
    }

    #[test]
    fn test_registered_validator_runs_on_absent_key() {
        let rules = ConfigRules::new().with_rule("default.action", |value| match value {
            None | Some("allow") | Some("drop") => Ok(()),
            Some(other) => Err(format!("unsupported action {:?}", other)),
        });

        assert!(rules.validate(&BTreeMap::new(), "user.").is_ok());
        assert!(rules
            .validate(&config(&[("default.action", "drop")]), "user.")
            .is_ok());

        let err = rules
            .validate(&config(&[("default.action", "log")]), "user.")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"Invalid value for config option "default.action": unsupported action "log""#
        );
    }

    #[test]
    fn test_required_key() {
        let rules = ConfigRules::new().with_rule("owner", |value| match value {
            Some(v) if !v.is_empty() => Ok(()),
            _ => Err("required".to_string()),
        });

        let err = rules.validate(&BTreeMap::new(), "user.").unwrap_err();
        assert!(matches!(err, ValidationError::ConfigValue { ref key, .. } if key == "owner"));
    }
}
