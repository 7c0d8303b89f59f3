//! Data models for the test engine
//!
//! Tests, traits, issues and result aggregates shared by every layer.

mod issue;
mod registry;
mod test;
mod test_result;
mod traits;

pub use issue::{Issue, IssueKind, Severity, SourceContext};
pub use registry::TestRegistry;
pub use test::{Case, CaseId, SkipInfo, SourceLocation, Test, TestBody, TestId, TestKind};
pub use test_result::{IssueCounts, RunSummary, TestRecord, TestStatus};
pub use traits::{ConditionTrait, CustomExecutionTrait, Tag, TestScoping, Trait};
