//! Settings sources: files and environment variables.

use crate::error::{RelayError, Result};
use config::{Environment, File};
use std::collections::HashMap;
use std::path::PathBuf;

/// A source of raw settings values.
///
/// Implement this trait to feed settings from somewhere other than files or
/// the environment (a remote store, a test fixture, ...).
pub trait SettingsSource: Send + Sync {
    /// Load settings as a top-level key-value map.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be loaded or parsed.
    fn load(&self) -> Result<HashMap<String, config::Value>>;

    /// Get a human-readable name for this source (for logging/debugging).
    fn name(&self) -> String;

    /// Get the priority of this source (higher = takes precedence).
    ///
    /// Default priorities:
    /// - Environment variables: 300
    /// - Files: 100 and up, in the order they were added
    fn priority(&self) -> i32 {
        100
    }
}

/// Settings file in YAML, TOML or JSON, detected from the extension.
///
/// # Examples
///
/// ```rust,no_run
/// use flag_relay::settings::FileSource;
///
/// let source = FileSource::new("relay.yaml");
/// ```
pub struct FileSource {
    path: PathBuf,
    priority: i32,
}

impl FileSource {
    /// Create a new file source.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            priority: 100,
        }
    }

    /// Set the priority for this source.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn validate_extension(&self) -> Result<()> {
        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                RelayError::Configuration(format!(
                    "Unable to determine file format for: {}",
                    self.path.display()
                ))
            })?;

        match extension {
            "yaml" | "yml" | "toml" | "json" => Ok(()),
            _ => Err(RelayError::Configuration(format!(
                "Unsupported file extension: {}. Supported: .yaml, .yml, .toml, .json",
                extension
            ))),
        }
    }
}

impl SettingsSource for FileSource {
    fn load(&self) -> Result<HashMap<String, config::Value>> {
        self.validate_extension()?;

        if !self.path.exists() {
            return Err(RelayError::Configuration(format!(
                "Settings file not found: {}",
                self.path.display()
            )));
        }

        config::Config::builder()
            .add_source(File::from(self.path.clone()).required(true))
            .build()
            .map_err(|e| RelayError::Configuration(format!("Failed to load file: {}", e)))?
            .try_deserialize::<HashMap<String, config::Value>>()
            .map_err(|e| RelayError::Configuration(format!("Failed to parse file: {}", e)))
    }

    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// Environment variable overrides.
///
/// With prefix `FLAG_RELAY` and separator `__`, `FLAG_RELAY__POLL_INTERVAL_MS=5000`
/// sets `poll_interval_ms`.
pub struct EnvSource {
    prefix: String,
    separator: String,
    priority: i32,
}

impl EnvSource {
    /// Create a new environment variable source.
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            separator: separator.into(),
            priority: 300,
        }
    }

    /// Set the priority for this source.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl SettingsSource for EnvSource {
    fn load(&self) -> Result<HashMap<String, config::Value>> {
        let env_source = Environment::with_prefix(&self.prefix)
            .separator(&self.separator)
            .try_parsing(true);

        config::Config::builder()
            .add_source(env_source)
            .build()
            .map_err(|e| RelayError::Configuration(format!("Failed to load environment variables: {}", e)))?
            .try_deserialize::<HashMap<String, config::Value>>()
            .map_err(|e| RelayError::Configuration(format!("Failed to parse environment variables: {}", e)))
    }

    fn name(&self) -> String {
        format!("env:{}*", self.prefix)
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_validate_extension() {
        assert!(FileSource::new("relay.yaml").validate_extension().is_ok());
        assert!(FileSource::new("relay.yml").validate_extension().is_ok());
        assert!(FileSource::new("relay.toml").validate_extension().is_ok());
        assert!(FileSource::new("relay.json").validate_extension().is_ok());
        assert!(FileSource::new("relay.txt").validate_extension().is_err());
        assert!(FileSource::new("relay").validate_extension().is_err());
    }

    #[test]
    fn test_load_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("relay.yaml");
        fs::write(
            &path,
            r#"
api_keys: ["root-key"]
poll_interval_ms: 5000
"#,
        )
        .unwrap();

        let map = FileSource::new(&path).load().unwrap();
        assert!(map.contains_key("api_keys"));
        assert!(map.contains_key("poll_interval_ms"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        assert!(FileSource::new("/nonexistent/relay.yaml").load().is_err());
    }

    #[test]
    fn test_names_and_priorities() {
        let file = FileSource::new("relay.yaml").with_priority(150);
        assert_eq!(file.priority(), 150);
        assert!(file.name().contains("relay.yaml"));

        let env = EnvSource::new("FLAG_RELAY", "__");
        assert_eq!(env.priority(), 300);
        assert_eq!(env.name(), "env:FLAG_RELAY*");
        assert_eq!(env.with_priority(400).priority(), 400);
    }

    #[test]
    fn test_env_without_matches_is_empty() {
        let map = EnvSource::new("FLAG_RELAY_TEST_NOTHING_SET", "__").load().unwrap();
        assert!(map.is_empty());
    }
}
