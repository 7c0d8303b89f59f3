//! Configuration file management
//!
//! Handles finding, loading, and validating configuration files, and the
//! `RunSettings` layer shared by the file, environment, profiles and CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::profile::RunProfile;
use super::{Configuration, Continuation, RepetitionPolicy};
use crate::error::ConfigError;
use crate::events::abi;
use crate::planner::TestFilter;

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./test-conductor.yaml",
    "./test-conductor.yml",
    "./.test-conductor.yaml",
    "~/.config/test-conductor/config.yaml",
];

const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

/// Run settings; every layer fills in what it knows
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Run unrelated tests concurrently
    pub parallel: Option<bool>,
    /// Maximum concurrently running test functions
    pub max_concurrent: Option<usize>,
    /// Id patterns to include
    pub filter: Vec<String>,
    /// Id patterns to exclude
    pub skip: Vec<String>,
    /// Tags to include
    pub tags: Vec<String>,
    /// Tags to exclude
    pub exclude_tags: Vec<String>,
    pub include_hidden: Option<bool>,
    /// Default per-case time limit in seconds
    pub time_limit_secs: Option<f64>,
    pub iterations: Option<usize>,
    pub continuation: Option<Continuation>,
    pub abi_version: Option<u32>,
    /// Output format (console, junit, abi)
    pub format: Option<String>,
    pub junit_output: Option<PathBuf>,
    pub expectation_events: Option<bool>,
}

impl RunSettings {
    /// Overlay `other` on top of `self` (other takes precedence)
    pub fn merge(&mut self, other: RunSettings) {
        fn list(base: &mut Vec<String>, over: Vec<String>) {
            if !over.is_empty() {
                *base = over;
            }
        }

        self.parallel = other.parallel.or(self.parallel);
        self.max_concurrent = other.max_concurrent.or(self.max_concurrent);
        list(&mut self.filter, other.filter);
        list(&mut self.skip, other.skip);
        list(&mut self.tags, other.tags);
        list(&mut self.exclude_tags, other.exclude_tags);
        self.include_hidden = other.include_hidden.or(self.include_hidden);
        self.time_limit_secs = other.time_limit_secs.or(self.time_limit_secs);
        self.iterations = other.iterations.or(self.iterations);
        self.continuation = other.continuation.or(self.continuation);
        self.abi_version = other.abi_version.or(self.abi_version);
        self.format = other.format.or(self.format.take());
        self.junit_output = other.junit_output.or(self.junit_output.take());
        self.expectation_events = other.expectation_events.or(self.expectation_events);
    }

    /// Check every value without building anything
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.build_filter()?;
        self.repetition_policy()?;
        self.time_limit()?;
        if let Some(version) = self.abi_version {
            abi::check_version(version)?;
        }
        if self.max_concurrent == Some(0) {
            return Err(ConfigError::Invalid(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Combine the include and exclude lists into one filter
    pub fn build_filter(&self) -> Result<TestFilter, ConfigError> {
        let mut filter = TestFilter::all();
        if !self.filter.is_empty() {
            filter = filter.and(TestFilter::including_patterns(&self.filter)?);
        }
        if !self.tags.is_empty() {
            filter = filter.and(TestFilter::including_tags(self.tags.iter().cloned()));
        }
        if !self.skip.is_empty() {
            filter = filter.and(TestFilter::excluding_patterns(&self.skip)?);
        }
        if !self.exclude_tags.is_empty() {
            filter = filter.and(TestFilter::excluding_tags(self.exclude_tags.iter().cloned()));
        }
        if self.include_hidden.unwrap_or(false) {
            filter = filter.including_hidden();
        }
        Ok(filter)
    }

    pub fn repetition_policy(&self) -> Result<RepetitionPolicy, ConfigError> {
        RepetitionPolicy::new(
            self.iterations.unwrap_or(1),
            self.continuation.unwrap_or_default(),
        )
    }

    pub fn time_limit(&self) -> Result<Option<Duration>, ConfigError> {
        self.time_limit_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .ok()
                    .filter(|d| !d.is_zero())
                    .ok_or_else(|| ConfigError::Invalid(format!("Invalid time limit: {secs}")))
            })
            .transpose()
    }

    /// Build a runtime configuration (without an event handler)
    pub fn to_configuration(&self) -> Result<Configuration, ConfigError> {
        let defaults = Configuration::default();
        let mut config = Configuration::new()
            .with_filter(self.build_filter()?)
            .with_parallel(self.parallel.unwrap_or(defaults.parallel))
            .with_max_concurrent(self.max_concurrent.unwrap_or(defaults.max_concurrent))
            .with_repetition_policy(self.repetition_policy()?)
            .with_expectation_checked_events(self.expectation_events.unwrap_or(false));
        if let Some(limit) = self.time_limit()? {
            config = config.with_default_time_limit(limit);
        }
        Ok(config)
    }
}

/// Full configuration file structure
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Version of config file format
    #[serde(default = "default_version")]
    pub version: String,

    /// Settings applied to every run
    #[serde(default)]
    pub run: RunSettings,

    /// Named settings selectable with `--profile`
    #[serde(default)]
    pub profiles: Vec<RunProfile>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            run: RunSettings::default(),
            profiles: Vec::new(),
        }
    }
}

impl ConfigFile {
    /// Create a new config file with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Find configuration file in standard locations
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|location| expand_path(location))
            .find(|path| path.exists())
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        if let Some(path) = Self::find() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Unsupported config version: {}",
                self.version
            )));
        }
        self.run.validate()?;
        for profile in &self.profiles {
            profile.settings.validate().map_err(|e| {
                ConfigError::Invalid(format!("Profile '{}': {e}", profile.name))
            })?;
        }
        Ok(())
    }

    /// Generate example configuration
    pub fn example() -> Self {
        Self {
            version: "1.0".to_string(),
            run: RunSettings {
                parallel: Some(true),
                max_concurrent: Some(8),
                skip: vec!["Slow/".to_string()],
                time_limit_secs: Some(60.0),
                ..RunSettings::default()
            },
            profiles: RunProfile::predefined(),
        }
    }

    /// Profile by name, from this file first and then the predefined ones
    pub fn profile(&self, name: &str) -> Option<RunProfile> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .or_else(|| RunProfile::find(name))
    }
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_file_default() {
        let config = ConfigFile::default();
        assert_eq!(config.version, "1.0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_save_load() {
        let dir = tempdir().unwrap();

        for name in ["config.yaml", "config.json"] {
            let path = dir.path().join(name);
            let config = ConfigFile::example();
            config.save(&path).unwrap();

            let loaded = ConfigFile::load(&path).unwrap();
            assert_eq!(loaded.version, config.version);
            assert_eq!(loaded.run, config.run);
            assert_eq!(loaded.profiles.len(), config.profiles.len());
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ConfigFile::default();
        config.version = "9.9".to_string();
        assert!(config.validate().is_err());

        let mut config = ConfigFile::default();
        config.run.filter = vec!["[".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern { .. })
        ));

        let mut config = ConfigFile::default();
        config.run.iterations = Some(0);
        assert!(config.validate().is_err());

        let mut config = ConfigFile::default();
        config.run.abi_version = Some(42);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "version: \"1.0\"\nrun:\n  iterations: 0\n").unwrap();
        assert!(ConfigFile::load(&path).is_err());
    }

    #[test]
    fn test_settings_merge_precedence() {
        let mut base = RunSettings {
            parallel: Some(true),
            tags: vec!["a".to_string()],
            iterations: Some(2),
            ..RunSettings::default()
        };
        base.merge(RunSettings {
            parallel: Some(false),
            skip: vec!["x".to_string()],
            ..RunSettings::default()
        });

        assert_eq!(base.parallel, Some(false));
        assert_eq!(base.tags, vec!["a".to_string()]);
        assert_eq!(base.skip, vec!["x".to_string()]);
        assert_eq!(base.iterations, Some(2));
    }

    #[test]
    fn test_to_configuration() {
        let settings = RunSettings {
            parallel: Some(false),
            max_concurrent: Some(2),
            time_limit_secs: Some(1.5),
            iterations: Some(3),
            ..RunSettings::default()
        };
        let config = settings.to_configuration().unwrap();
        assert!(!config.parallel);
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.default_time_limit, Some(Duration::from_millis(1500)));
        assert_eq!(config.repetition_policy.maximum_iterations(), 3);
    }

    #[test]
    fn test_expand_path() {
        let path = expand_path("./test.yaml");
        assert_eq!(path, PathBuf::from("./test.yaml"));
    }
}
