//! Run profiles
//!
//! Named, predefined run settings selectable from the command line.

use serde::{Deserialize, Serialize};

use super::file::RunSettings;
use super::Continuation;

/// Named run settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunProfile {
    /// Profile name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Settings layered over the base settings
    #[serde(flatten)]
    pub settings: RunSettings,
}

impl RunProfile {
    /// Create a new, empty profile
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            settings: RunSettings::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Everything, hidden tests included
    pub fn all() -> Self {
        Self {
            settings: RunSettings {
                include_hidden: Some(true),
                ..RunSettings::default()
            },
            ..Self::new("all").with_description("Run every test, hidden ones included")
        }
    }

    /// Tests tagged `smoke`
    pub fn smoke() -> Self {
        Self {
            settings: RunSettings {
                tags: vec!["smoke".to_string()],
                ..RunSettings::default()
            },
            ..Self::new("smoke").with_description("Quick smoke tests")
        }
    }

    /// One test at a time
    pub fn serial() -> Self {
        Self {
            settings: RunSettings {
                parallel: Some(false),
                ..RunSettings::default()
            },
            ..Self::new("serial").with_description("Run every test sequentially")
        }
    }

    /// Repeat until something fails
    pub fn stress() -> Self {
        Self {
            settings: RunSettings {
                iterations: Some(10),
                continuation: Some(Continuation::UntilIssueRecorded),
                ..RunSettings::default()
            },
            ..Self::new("stress").with_description("Repeat up to 10 times until an issue is recorded")
        }
    }

    /// Get all predefined profiles
    pub fn predefined() -> Vec<RunProfile> {
        vec![Self::all(), Self::smoke(), Self::serial(), Self::stress()]
    }

    /// Find profile by name
    pub fn find(name: &str) -> Option<RunProfile> {
        Self::predefined().into_iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined_profiles_are_valid() {
        for profile in RunProfile::predefined() {
            assert!(profile.settings.validate().is_ok(), "{}", profile.name);
        }
    }

    #[test]
    fn test_find_profile() {
        assert_eq!(
            RunProfile::find("stress").and_then(|p| p.settings.iterations),
            Some(10)
        );
        assert!(RunProfile::find("missing").is_none());
    }

    #[test]
    fn test_profile_yaml_is_flat() {
        let profile: RunProfile =
            serde_yaml::from_str("name: nightly\niterations: 3\ntags: [slow]\n").unwrap();
        assert_eq!(profile.settings.iterations, Some(3));
        assert_eq!(profile.settings.tags, vec!["slow".to_string()]);
    }
}
