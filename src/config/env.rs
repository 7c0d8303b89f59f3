//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

use super::file::RunSettings;
use super::Continuation;

/// Environment variable prefix
const ENV_PREFIX: &str = "TEST_CONDUCTOR";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Parallel from TEST_CONDUCTOR_PARALLEL
    pub parallel: Option<bool>,
    /// Concurrency from TEST_CONDUCTOR_MAX_CONCURRENT
    pub max_concurrent: Option<usize>,
    /// Comma-separated include patterns from TEST_CONDUCTOR_FILTER
    pub filter: Vec<String>,
    /// Comma-separated exclude patterns from TEST_CONDUCTOR_SKIP
    pub skip: Vec<String>,
    /// Comma-separated tags from TEST_CONDUCTOR_TAGS
    pub tags: Vec<String>,
    /// Output format from TEST_CONDUCTOR_FORMAT
    pub format: Option<String>,
    /// ABI version from TEST_CONDUCTOR_ABI_VERSION
    pub abi_version: Option<u32>,
    /// Iterations from TEST_CONDUCTOR_ITERATIONS
    pub iterations: Option<usize>,
    /// Continuation from TEST_CONDUCTOR_CONTINUATION
    pub continuation: Option<Continuation>,
    /// Config file from TEST_CONDUCTOR_CONFIG
    pub config_file: Option<String>,
    /// Profile from TEST_CONDUCTOR_PROFILE
    pub profile: Option<String>,
    /// Verbose from TEST_CONDUCTOR_VERBOSE
    pub verbose: Option<bool>,
    /// Log level from TEST_CONDUCTOR_LOG_LEVEL
    pub log_level: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            parallel: get_env_bool("PARALLEL"),
            max_concurrent: get_env_parse("MAX_CONCURRENT"),
            filter: get_env_list("FILTER"),
            skip: get_env_list("SKIP"),
            tags: get_env_list("TAGS"),
            format: get_env("FORMAT"),
            abi_version: get_env_parse("ABI_VERSION"),
            iterations: get_env_parse("ITERATIONS"),
            continuation: get_env("CONTINUATION").and_then(|v| Continuation::from_str(&v)),
            config_file: get_env("CONFIG"),
            profile: get_env("PROFILE"),
            verbose: get_env_bool("VERBOSE"),
            log_level: get_env("LOG_LEVEL"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.parallel.is_some()
            || self.max_concurrent.is_some()
            || !self.filter.is_empty()
            || !self.skip.is_empty()
            || !self.tags.is_empty()
            || self.format.is_some()
            || self.abi_version.is_some()
            || self.iterations.is_some()
            || self.continuation.is_some()
            || self.config_file.is_some()
            || self.profile.is_some()
            || self.verbose.is_some()
            || self.log_level.is_some()
    }

    /// The run settings these variables override
    pub fn to_settings(&self) -> RunSettings {
        RunSettings {
            parallel: self.parallel,
            max_concurrent: self.max_concurrent,
            filter: self.filter.clone(),
            skip: self.skip.clone(),
            tags: self.tags.clone(),
            format: self.format.clone(),
            abi_version: self.abi_version,
            iterations: self.iterations,
            continuation: self.continuation,
            ..RunSettings::default()
        }
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {ENV_PREFIX}_PARALLEL:       {:?}", self.parallel);
        println!("  {ENV_PREFIX}_MAX_CONCURRENT: {:?}", self.max_concurrent);
        println!("  {ENV_PREFIX}_FILTER:         {:?}", self.filter);
        println!("  {ENV_PREFIX}_SKIP:           {:?}", self.skip);
        println!("  {ENV_PREFIX}_TAGS:           {:?}", self.tags);
        println!("  {ENV_PREFIX}_FORMAT:         {:?}", self.format);
        println!("  {ENV_PREFIX}_ABI_VERSION:    {:?}", self.abi_version);
        println!("  {ENV_PREFIX}_ITERATIONS:     {:?}", self.iterations);
        println!("  {ENV_PREFIX}_CONTINUATION:   {:?}", self.continuation);
        println!("  {ENV_PREFIX}_CONFIG:         {:?}", self.config_file);
        println!("  {ENV_PREFIX}_PROFILE:        {:?}", self.profile);
        println!("  {ENV_PREFIX}_VERBOSE:        {:?}", self.verbose);
        println!("  {ENV_PREFIX}_LOG_LEVEL:      {:?}", self.log_level);
    }
}

/// Full name of a prefixed variable
pub fn var_name(name: &str) -> String {
    format!("{ENV_PREFIX}_{name}")
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(var_name(name)).ok().filter(|v| !v.is_empty())
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Get a comma-separated environment variable
fn get_env_list(name: &str) -> Vec<String> {
    get_env(name)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Builder for setting environment variables (useful for testing)
#[derive(Default)]
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    /// Create a new environment builder
    pub fn new() -> Self {
        Self::default()
    }

    fn set(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.push((var_name(name), value.into()));
        self
    }

    pub fn parallel(self, parallel: bool) -> Self {
        self.set("PARALLEL", parallel.to_string())
    }

    pub fn max_concurrent(self, max_concurrent: usize) -> Self {
        self.set("MAX_CONCURRENT", max_concurrent.to_string())
    }

    pub fn filter(self, patterns: &[&str]) -> Self {
        self.set("FILTER", patterns.join(","))
    }

    pub fn tags(self, tags: &[&str]) -> Self {
        self.set("TAGS", tags.join(","))
    }

    pub fn format(self, format: impl Into<String>) -> Self {
        self.set("FORMAT", format)
    }

    pub fn abi_version(self, version: u32) -> Self {
        self.set("ABI_VERSION", version.to_string())
    }

    pub fn iterations(self, iterations: usize) -> Self {
        self.set("ITERATIONS", iterations.to_string())
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all TEST_CONDUCTOR environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_PARALLEL        Run tests in parallel (true/false)");
    println!("  {ENV_PREFIX}_MAX_CONCURRENT  Maximum concurrently running tests");
    println!("  {ENV_PREFIX}_FILTER          Comma-separated id patterns to include");
    println!("  {ENV_PREFIX}_SKIP            Comma-separated id patterns to exclude");
    println!("  {ENV_PREFIX}_TAGS            Comma-separated tags to include");
    println!("  {ENV_PREFIX}_FORMAT          Output format (console, junit, abi)");
    println!("  {ENV_PREFIX}_ABI_VERSION     ABI record version for --format abi");
    println!("  {ENV_PREFIX}_ITERATIONS      Number of iterations");
    println!("  {ENV_PREFIX}_CONTINUATION    always, while-failing or until-failing");
    println!("  {ENV_PREFIX}_CONFIG          Path to configuration file");
    println!("  {ENV_PREFIX}_PROFILE         Run profile name");
    println!("  {ENV_PREFIX}_VERBOSE         Enable verbose logging (true/false)");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_TAGS=smoke");
    println!("  test-conductor run --format junit");
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::{const_mutex, Mutex, MutexGuard};

    static ENV: Mutex<()> = const_mutex(());

    /// Serializes tests that read or write process environment variables
    pub fn lock() -> MutexGuard<'static, ()> {
        ENV.lock()
    }
}
