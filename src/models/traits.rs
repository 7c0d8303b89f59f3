//! Traits attached to tests and suites
//!
//! A trait is a closed union of capabilities. Resolution and scheduling code
//! asks for capabilities (`is_recursive`, `condition`, `is_serializing`,
//! `custom_execution`) rather than matching on concrete types.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::test::{Case, SourceLocation, Test};

/// Opaque label used for filtering
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.0)
    }
}

type SyncCondition = Arc<dyn Fn() -> anyhow::Result<bool> + Send + Sync>;
type AsyncCondition = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync>;

#[derive(Clone)]
enum ConditionBody {
    Disabled,
    Sync(SyncCondition),
    Async(AsyncCondition),
}

/// Decides whether a test runs.
///
/// `enabled_if` runs the test when its closure returns `true`;
/// `disabled_if` skips it when its closure returns `true`.
#[derive(Clone)]
pub struct ConditionTrait {
    body: ConditionBody,
    skips_when_true: bool,
    comment: Option<String>,
    source_location: SourceLocation,
}

impl ConditionTrait {
    /// Evaluate the condition; `Ok(true)` means the test is enabled
    pub async fn evaluate(&self) -> anyhow::Result<bool> {
        let value = match &self.body {
            ConditionBody::Disabled => return Ok(false),
            ConditionBody::Sync(condition) => condition()?,
            ConditionBody::Async(condition) => condition().await?,
        };
        Ok(value != self.skips_when_true)
    }

    /// True for an unconditional `.disabled`
    pub fn is_constant(&self) -> bool {
        matches!(self.body, ConditionBody::Disabled)
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn source_location(&self) -> &SourceLocation {
        &self.source_location
    }
}

impl fmt::Debug for ConditionTrait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.body {
            ConditionBody::Disabled => "disabled",
            ConditionBody::Sync(_) => "sync",
            ConditionBody::Async(_) => "async",
        };
        f.debug_struct("ConditionTrait")
            .field("kind", &kind)
            .field("comment", &self.comment)
            .field("source_location", &self.source_location)
            .finish()
    }
}

/// Wraps a test body (or a whole suite) with before/after logic
pub trait TestScoping: Send + Sync {
    /// Run `body` inside this scope. `case` is `None` when scoping a suite.
    fn provide_scope(
        &self,
        test: &Test,
        case: Option<&Case>,
        body: BoxFuture<'static, anyhow::Result<()>>,
    ) -> BoxFuture<'static, anyhow::Result<()>>;
}

/// Custom execution trait
#[derive(Clone)]
pub struct CustomExecutionTrait {
    name: String,
    recursive: bool,
    scoping: Arc<dyn TestScoping>,
}

impl CustomExecutionTrait {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scoping(&self) -> &Arc<dyn TestScoping> {
        &self.scoping
    }
}

impl fmt::Debug for CustomExecutionTrait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomExecutionTrait")
            .field("name", &self.name)
            .field("recursive", &self.recursive)
            .finish()
    }
}

/// Capability bag attached to a test or suite
#[derive(Clone, Debug)]
pub enum Trait {
    Condition(ConditionTrait),
    Tags(Vec<Tag>),
    Serialized,
    TimeLimit(Duration),
    Comment(String),
    CustomExecution(CustomExecutionTrait),
}

impl Trait {
    /// Unconditionally disable
    #[track_caller]
    pub fn disabled() -> Self {
        Self::make_condition(ConditionBody::Disabled, false, None)
    }

    /// Unconditionally disable, with a reason
    #[track_caller]
    pub fn disabled_because(comment: impl Into<String>) -> Self {
        Self::make_condition(ConditionBody::Disabled, false, Some(comment.into()))
    }

    /// Run only when `condition` returns `true`
    #[track_caller]
    pub fn enabled_if<F>(comment: impl Into<String>, condition: F) -> Self
    where
        F: Fn() -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self::make_condition(
            ConditionBody::Sync(Arc::new(condition)),
            false,
            Some(comment.into()),
        )
    }

    /// Skip when `condition` returns `true`
    #[track_caller]
    pub fn disabled_if<F>(comment: impl Into<String>, condition: F) -> Self
    where
        F: Fn() -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self::make_condition(
            ConditionBody::Sync(Arc::new(condition)),
            true,
            Some(comment.into()),
        )
    }

    /// Run only when the suspending `condition` resolves to `true`
    #[track_caller]
    pub fn enabled_if_async<F, Fut>(comment: impl Into<String>, condition: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        let condition: AsyncCondition = Arc::new(move || condition().boxed());
        Self::make_condition(ConditionBody::Async(condition), false, Some(comment.into()))
    }

    #[track_caller]
    fn make_condition(body: ConditionBody, skips_when_true: bool, comment: Option<String>) -> Self {
        Trait::Condition(ConditionTrait {
            body,
            skips_when_true,
            comment,
            source_location: SourceLocation::caller(),
        })
    }

    pub fn tags<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        Trait::Tags(tags.into_iter().map(Into::into).collect())
    }

    pub fn serialized() -> Self {
        Trait::Serialized
    }

    pub fn time_limit(limit: Duration) -> Self {
        Trait::TimeLimit(limit)
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Trait::Comment(text.into())
    }

    /// Wrap execution with `scoping`; recursive scopes wrap every descendant case
    pub fn custom_execution(
        name: impl Into<String>,
        recursive: bool,
        scoping: impl TestScoping + 'static,
    ) -> Self {
        Trait::CustomExecution(CustomExecutionTrait {
            name: name.into(),
            recursive,
            scoping: Arc::new(scoping),
        })
    }

    /// Whether a suite's trait also applies to all of its descendants
    pub fn is_recursive(&self) -> bool {
        match self {
            Trait::Tags(_) | Trait::Serialized | Trait::TimeLimit(_) => true,
            Trait::CustomExecution(custom) => custom.recursive,
            Trait::Condition(_) | Trait::Comment(_) => false,
        }
    }

    pub fn as_condition(&self) -> Option<&ConditionTrait> {
        match self {
            Trait::Condition(condition) => Some(condition),
            _ => None,
        }
    }

    pub fn is_serializing(&self) -> bool {
        matches!(self, Trait::Serialized)
    }

    pub fn as_custom_execution(&self) -> Option<&CustomExecutionTrait> {
        match self {
            Trait::CustomExecution(custom) => Some(custom),
            _ => None,
        }
    }

    pub fn as_tags(&self) -> Option<&[Tag]> {
        match self {
            Trait::Tags(tags) => Some(tags),
            _ => None,
        }
    }

    pub fn as_time_limit(&self) -> Option<Duration> {
        match self {
            Trait::TimeLimit(limit) => Some(*limit),
            _ => None,
        }
    }
}
