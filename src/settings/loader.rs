//! Loader that merges settings sources and validates the result.

use super::{EnvSource, FileSource, RelaySettings, SettingsSource, Validate};
use crate::error::{RelayError, Result};
use std::path::PathBuf;
use tracing::{debug, info};

/// Default prefix for environment overrides.
pub const ENV_PREFIX: &str = "FLAG_RELAY";

/// Default separator for nested environment keys.
pub const ENV_SEPARATOR: &str = "__";

/// Loads [`RelaySettings`] from files, environment variables and custom sources.
///
/// Sources are merged in priority order (lowest first); a higher priority
/// source replaces top-level keys of lower ones. The merged settings are
/// validated before being returned.
///
/// # Examples
///
/// ```rust,no_run
/// use flag_relay::settings::SettingsLoader;
///
/// # fn example() -> flag_relay::error::Result<()> {
/// let settings = SettingsLoader::new()
///     .with_file("relay.yaml")
///     .with_env_overrides("FLAG_RELAY", "__")
///     .load()?;
/// # Ok(())
/// # }
/// ```
pub struct SettingsLoader {
    file_paths: Vec<PathBuf>,
    env: Option<(String, String)>,
    sources: Vec<Box<dyn SettingsSource>>,
}

impl SettingsLoader {
    /// Create a loader with no sources.
    pub fn new() -> Self {
        Self {
            file_paths: Vec::new(),
            env: None,
            sources: Vec::new(),
        }
    }

    /// Add a settings file. Later files take precedence over earlier ones.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_paths.push(path.into());
        self
    }

    /// Apply environment overrides with the given prefix and separator.
    pub fn with_env_overrides(mut self, prefix: &str, separator: &str) -> Self {
        self.env = Some((prefix.to_string(), separator.to_string()));
        self
    }

    /// Add a custom settings source.
    pub fn with_source<S: SettingsSource + 'static>(mut self, source: S) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Load, merge and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No source was configured
    /// - Any source fails to load
    /// - The merged values do not deserialize into `RelaySettings`
    /// - Validation fails
    pub fn load(self) -> Result<RelaySettings> {
        let mut sources = self.sources;
        for (index, path) in self.file_paths.into_iter().enumerate() {
            let priority = 100 + (index as i32 * 10);
            sources.push(Box::new(FileSource::new(path).with_priority(priority)));
        }
        if let Some((prefix, separator)) = self.env {
            sources.push(Box::new(EnvSource::new(prefix, separator)));
        }

        if sources.is_empty() {
            return Err(RelayError::Configuration(
                "No settings sources specified".to_string(),
            ));
        }

        sources.sort_by_key(|s| s.priority());

        let mut builder = config::Config::builder();
        for source in &sources {
            debug!(source = %source.name(), "Loading settings source");
            let values = source.load().map_err(|e| {
                RelayError::Configuration(format!("Failed to load source '{}': {}", source.name(), e))
            })?;

            for (key, value) in values {
                builder = builder.set_override(&key, value).map_err(|e| {
                    RelayError::Configuration(format!(
                        "Failed to merge source '{}': {}",
                        source.name(),
                        e
                    ))
                })?;
            }
        }

        let settings: RelaySettings = builder
            .build()
            .map_err(|e| RelayError::Configuration(format!("Failed to build settings: {}", e)))?
            .try_deserialize()
            .map_err(|e| RelayError::Configuration(format!("Failed to deserialize settings: {}", e)))?;

        settings.validate()?;

        info!(
            flagsets = settings.flagsets.len(),
            notifiers = settings.notifiers.len(),
            "Relay settings loaded"
        );
        Ok(settings)
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MockSource {
        name: String,
        priority: i32,
        values: HashMap<String, config::Value>,
    }

    impl MockSource {
        fn new(name: &str, priority: i32) -> Self {
            Self {
                name: name.to_string(),
                priority,
                values: HashMap::new(),
            }
        }

        fn with_value(mut self, key: &str, value: impl Into<config::Value>) -> Self {
            self.values.insert(key.to_string(), value.into());
            self
        }
    }

    impl SettingsSource for MockSource {
        fn load(&self) -> Result<HashMap<String, config::Value>> {
            Ok(self.values.clone())
        }

        fn name(&self) -> String {
            self.name.clone()
        }

        fn priority(&self) -> i32 {
            self.priority
        }
    }

    #[test]
    fn test_empty_loader() {
        assert!(SettingsLoader::new().load().is_err());
    }

    #[test]
    fn test_single_source() {
        let settings = SettingsLoader::new()
            .with_source(MockSource::new("mock", 100).with_value("poll_interval_ms", 2000i64))
            .load()
            .unwrap();

        assert_eq!(settings.poll_interval_ms, 2000);
        assert!(settings.flagsets.is_empty());
    }

    #[test]
    fn test_precedence() {
        let settings = SettingsLoader::new()
            .with_source(
                MockSource::new("default", 100)
                    .with_value("poll_interval_ms", 2000i64)
                    .with_value("connection_send_timeout_ms", 700i64),
            )
            .with_source(MockSource::new("override", 200).with_value("poll_interval_ms", 9000i64))
            .load()
            .unwrap();

        assert_eq!(settings.poll_interval_ms, 9000);
        assert_eq!(settings.connection_send_timeout_ms, 700);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let result = SettingsLoader::new()
            .with_source(MockSource::new("mock", 100).with_value("poll_interval_ms", 1i64))
            .load();

        assert!(matches!(result, Err(RelayError::Validation(_))));
    }
}
