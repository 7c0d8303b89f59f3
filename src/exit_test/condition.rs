//! Exit conditions
//!
//! How a child process terminated, and the three ways of comparing that
//! against an expectation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::ExitStatus;

/// How an exit test's process terminated, or is expected to
#[derive(Clone, Copy, Debug, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ExitCondition {
    /// Exit code zero
    Success,
    /// Any nonzero exit code or any signal
    Failure,
    /// A specific exit code. Only the low 8 bits survive on most unix
    /// platforms, so codes above 255 are not portable.
    ExitCode(i32),
    /// Terminated by a signal
    Signal(i32),
}

impl ExitCondition {
    fn normalized(self) -> Self {
        match self {
            ExitCondition::Success => ExitCondition::ExitCode(0),
            other => other,
        }
    }

    /// Classify a child's exit status
    pub fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitCondition::Signal(signal);
            }
        }
        match status.code() {
            Some(0) => ExitCondition::Success,
            Some(code) => ExitCondition::ExitCode(code),
            None => ExitCondition::Failure,
        }
    }

    /// Strict comparison: same variant and payload, no normalization
    pub fn is_identical(&self, other: &Self) -> bool {
        match (self, other) {
            (ExitCondition::Success, ExitCondition::Success)
            | (ExitCondition::Failure, ExitCondition::Failure) => true,
            (ExitCondition::ExitCode(a), ExitCondition::ExitCode(b))
            | (ExitCondition::Signal(a), ExitCondition::Signal(b)) => a == b,
            _ => false,
        }
    }

    /// Whether an observed condition satisfies `self` as an expectation.
    ///
    /// `Failure` accepts every termination except exit code zero.
    pub fn matches(&self, observed: &Self) -> bool {
        match (self, observed.normalized()) {
            (ExitCondition::Failure, ExitCondition::ExitCode(code)) => code != 0,
            (ExitCondition::Failure, ExitCondition::Signal(_) | ExitCondition::Failure) => true,
            (expected, observed) => expected.normalized() == observed,
        }
    }

    pub fn is_success(&self) -> bool {
        ExitCondition::Success.matches(self)
    }
}

/// `Success` equals `ExitCode(0)`; nothing else is folded together
impl PartialEq for ExitCondition {
    fn eq(&self, other: &Self) -> bool {
        match (self.normalized(), other.normalized()) {
            (ExitCondition::ExitCode(a), ExitCondition::ExitCode(b))
            | (ExitCondition::Signal(a), ExitCondition::Signal(b)) => a == b,
            (ExitCondition::Failure, ExitCondition::Failure) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ExitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitCondition::Success => write!(f, ".success"),
            ExitCondition::Failure => write!(f, ".failure"),
            ExitCondition::ExitCode(code) => write!(f, ".exitCode({code})"),
            ExitCondition::Signal(signal) => write!(f, ".signal({signal})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_matches_failure_not_success() {
        let observed = ExitCondition::ExitCode(123);
        assert!(ExitCondition::Failure.matches(&observed));
        assert!(!ExitCondition::Success.matches(&observed));
        assert!(ExitCondition::ExitCode(123).matches(&observed));
        assert!(!ExitCondition::ExitCode(1).matches(&observed));
    }

    #[test]
    fn test_signal_matches_failure_only() {
        let observed = ExitCondition::Signal(6);
        assert!(ExitCondition::Failure.matches(&observed));
        assert!(!ExitCondition::Success.matches(&observed));
        assert!(!ExitCondition::ExitCode(6).matches(&observed));
        assert!(ExitCondition::Signal(6).matches(&observed));
    }

    #[test]
    fn test_equality_levels() {
        assert_eq!(ExitCondition::Success, ExitCondition::ExitCode(0));
        assert!(!ExitCondition::Success.is_identical(&ExitCondition::ExitCode(0)));
        assert_ne!(ExitCondition::Failure, ExitCondition::ExitCode(1));
        assert_ne!(ExitCondition::ExitCode(9), ExitCondition::Signal(9));
        assert!(ExitCondition::Signal(9).is_identical(&ExitCondition::Signal(9)));
    }

    #[test]
    fn test_success_matches_zero() {
        assert!(ExitCondition::Success.matches(&ExitCondition::ExitCode(0)));
        assert!(!ExitCondition::Failure.matches(&ExitCondition::Success));
        assert!(ExitCondition::ExitCode(0).is_success());
    }

    #[cfg(unix)]
    #[test]
    fn test_from_status() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(
            ExitCondition::from_status(ExitStatus::from_raw(0)),
            ExitCondition::Success
        );
        assert!(ExitCondition::from_status(ExitStatus::from_raw(123 << 8))
            .is_identical(&ExitCondition::ExitCode(123)));
        assert!(ExitCondition::from_status(ExitStatus::from_raw(9))
            .is_identical(&ExitCondition::Signal(9)));
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCondition::ExitCode(3).to_string(), ".exitCode(3)");
        assert_eq!(ExitCondition::Failure.to_string(), ".failure");
    }
}
