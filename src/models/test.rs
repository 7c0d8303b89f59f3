//! Test graph model
//!
//! Identity, source location, parameterisation and bodies of tests and suites.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::traits::{Tag, Trait};

/// Location of a declaration in source
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub file_id: String,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file_id: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file_id: file_id.into(),
            line,
            column,
        }
    }

    /// Location of the caller of the `#[track_caller]` function invoking this
    #[track_caller]
    pub fn caller() -> Self {
        let location = std::panic::Location::caller();
        Self::new(location.file(), location.line(), location.column())
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file_id, self.line, self.column)
    }
}

/// Hierarchical test identity.
///
/// Suites and functions are identified by their name path. Functions that
/// share a name path (overloads) are told apart by an optional source
/// location discriminator.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestId {
    name_path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_location: Option<SourceLocation>,
}

impl TestId {
    pub fn new<I, S>(name_path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name_path: name_path.into_iter().map(Into::into).collect(),
            source_location: None,
        }
    }

    /// Add a source location discriminator
    pub fn with_source_location(mut self, location: SourceLocation) -> Self {
        self.source_location = Some(location);
        self
    }

    /// Identity of a child named `name`
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut name_path = self.name_path.clone();
        name_path.push(name.into());
        Self {
            name_path,
            source_location: None,
        }
    }

    /// Identity of the containing suite, if any
    pub fn parent(&self) -> Option<Self> {
        if self.name_path.len() <= 1 {
            return None;
        }
        Some(Self::new(
            self.name_path[..self.name_path.len() - 1].iter().cloned(),
        ))
    }

    pub fn name_path(&self) -> &[String] {
        &self.name_path
    }

    pub fn source_location(&self) -> Option<&SourceLocation> {
        self.source_location.as_ref()
    }

    /// Last component of the name path
    pub fn name(&self) -> &str {
        self.name_path.last().map(String::as_str).unwrap_or_default()
    }

    /// True if `other` is nested (at any depth) inside `self`
    pub fn is_ancestor_of(&self, other: &TestId) -> bool {
        self.source_location.is_none()
            && other.name_path.len() > self.name_path.len()
            && other.name_path.starts_with(&self.name_path)
    }

    /// Keys used to place this identity in the step graph
    pub fn key_path(&self) -> Vec<String> {
        let mut keys = self.name_path.clone();
        if let (Some(location), Some(last)) = (&self.source_location, keys.last_mut()) {
            last.push_str(&format!("@{location}"));
        }
        keys
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name_path.join("/"))?;
        if let Some(location) = &self.source_location {
            write!(f, "@{location}")?;
        }
        Ok(())
    }
}

/// Identity of one case of a test
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseId(pub usize);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One concrete invocation of a test function
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub index: usize,
    pub argument: Option<serde_json::Value>,
}

impl Case {
    /// The single case of a non-parameterized function
    pub fn unparameterized() -> Self {
        Self {
            index: 0,
            argument: None,
        }
    }

    pub fn id(&self) -> CaseId {
        CaseId(self.index)
    }

    pub fn is_parameterized(&self) -> bool {
        self.argument.is_some()
    }

    /// Decode this case's argument
    pub fn argument<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        let value = self
            .argument
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Case {} has no argument", self.index))?;
        Ok(serde_json::from_value(value)?)
    }
}

impl fmt::Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.argument {
            Some(argument) => write!(f, "{argument}"),
            None => write!(f, "(no arguments)"),
        }
    }
}

/// Reason attached to a skip or a cancellation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
}

impl SkipInfo {
    pub fn new(comment: Option<String>, source_location: Option<SourceLocation>) -> Self {
        Self {
            comment,
            source_location,
        }
    }

    pub fn with_comment(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            source_location: None,
        }
    }
}

/// Body of a test function, invoked once per case
pub type TestBody = Arc<dyn Fn(Case) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Whether a test is a container or a runnable function
#[derive(Clone)]
pub enum TestKind {
    Suite,
    Function {
        body: TestBody,
        arguments: Option<Vec<serde_json::Value>>,
    },
}

/// An immutable description of a suite or test function
#[derive(Clone)]
pub struct Test {
    id: TestId,
    display_name: Option<String>,
    traits: Vec<Trait>,
    source_location: SourceLocation,
    kind: TestKind,
    containing_type: Option<String>,
    is_hidden: bool,
}

impl Test {
    /// Declare a suite
    #[track_caller]
    pub fn suite(id: TestId) -> Self {
        Self {
            id,
            display_name: None,
            traits: Vec::new(),
            source_location: SourceLocation::caller(),
            kind: TestKind::Suite,
            containing_type: None,
            is_hidden: false,
        }
    }

    /// Declare a non-parameterized test function
    #[track_caller]
    pub fn function<F, Fut>(id: TestId, body: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let body: TestBody = Arc::new(move |_case| body().boxed());
        Self::with_body(id, body, None, SourceLocation::caller())
    }

    /// Declare a test function run once per argument
    #[track_caller]
    pub fn parameterized<A, V, F, Fut>(id: TestId, arguments: A, body: F) -> Self
    where
        A: IntoIterator<Item = V>,
        V: Into<serde_json::Value>,
        F: Fn(Case) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let body: TestBody = Arc::new(move |case| body(case).boxed());
        let arguments = arguments.into_iter().map(Into::into).collect();
        Self::with_body(id, body, Some(arguments), SourceLocation::caller())
    }

    fn with_body(
        id: TestId,
        body: TestBody,
        arguments: Option<Vec<serde_json::Value>>,
        source_location: SourceLocation,
    ) -> Self {
        Self {
            id,
            display_name: None,
            traits: Vec::new(),
            source_location,
            kind: TestKind::Function { body, arguments },
            containing_type: None,
            is_hidden: false,
        }
    }

    pub fn with_trait(mut self, t: Trait) -> Self {
        self.traits.push(t);
        self
    }

    pub fn with_traits(mut self, traits: impl IntoIterator<Item = Trait>) -> Self {
        self.traits.extend(traits);
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Override the declaration location
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.source_location = location;
        self
    }

    pub fn in_type(mut self, type_name: impl Into<String>) -> Self {
        self.containing_type = Some(type_name.into());
        self
    }

    /// Hide from runs that do not ask for hidden tests
    pub fn hidden(mut self) -> Self {
        self.is_hidden = true;
        self
    }

    pub fn id(&self) -> &TestId {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.id.name()
    }

    /// Display name if set, otherwise the name
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or_else(|| self.name())
    }

    pub fn traits(&self) -> &[Trait] {
        &self.traits
    }

    pub fn source_location(&self) -> &SourceLocation {
        &self.source_location
    }

    pub fn kind(&self) -> &TestKind {
        &self.kind
    }

    pub fn containing_type(&self) -> Option<&str> {
        self.containing_type.as_deref()
    }

    pub fn is_suite(&self) -> bool {
        matches!(self.kind, TestKind::Suite)
    }

    pub fn is_hidden(&self) -> bool {
        self.is_hidden
    }

    pub fn is_parameterized(&self) -> bool {
        matches!(
            self.kind,
            TestKind::Function {
                arguments: Some(_),
                ..
            }
        )
    }

    pub fn body(&self) -> Option<&TestBody> {
        match &self.kind {
            TestKind::Function { body, .. } => Some(body),
            TestKind::Suite => None,
        }
    }

    /// Cases this test runs; empty for suites
    pub fn cases(&self) -> Vec<Case> {
        match &self.kind {
            TestKind::Suite => Vec::new(),
            TestKind::Function {
                arguments: None, ..
            } => vec![Case::unparameterized()],
            TestKind::Function {
                arguments: Some(arguments),
                ..
            } => arguments
                .iter()
                .enumerate()
                .map(|(index, argument)| Case {
                    index,
                    argument: Some(argument.clone()),
                })
                .collect(),
        }
    }

    /// All tags carried by this test's traits
    pub fn tags(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self
            .traits
            .iter()
            .filter_map(Trait::as_tags)
            .flatten()
            .cloned()
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }

    pub fn is_serialized(&self) -> bool {
        self.traits.iter().any(Trait::is_serializing)
    }

    /// Smallest time limit among this test's traits
    pub fn time_limit(&self) -> Option<Duration> {
        self.traits.iter().filter_map(Trait::as_time_limit).min()
    }

    /// Copy of this test carrying the resolved (merged) trait list
    pub(crate) fn with_resolved_traits(&self, traits: Vec<Trait>) -> Self {
        Self {
            traits,
            ..self.clone()
        }
    }
}

impl fmt::Debug for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Test")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("traits", &self.traits)
            .field("source_location", &self.source_location)
            .field("is_suite", &self.is_suite())
            .field("is_hidden", &self.is_hidden)
            .finish()
    }
}

impl fmt::Display for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_suite() {
            write!(f, "Suite \"{}\"", self.display_name())
        } else {
            write!(f, "Test \"{}\"", self.display_name())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_hierarchy() {
        let suite = TestId::new(["Parsing"]);
        let nested = suite.child("Numbers").child("integers");

        assert_eq!(nested.to_string(), "Parsing/Numbers/integers");
        assert_eq!(nested.name(), "integers");
        assert!(suite.is_ancestor_of(&nested));
        assert!(!nested.is_ancestor_of(&suite));
        assert!(!suite.is_ancestor_of(&suite));
        assert_eq!(nested.parent(), Some(suite.child("Numbers")));
        assert_eq!(suite.parent(), None);
    }

    #[test]
    fn test_id_discriminator() {
        let plain = TestId::new(["A", "f"]);
        let located = TestId::new(["A", "f"]).with_source_location(SourceLocation::new("a.rs", 3, 9));

        assert_ne!(plain, located);
        assert_eq!(located.to_string(), "A/f@a.rs:3:9");
        assert_eq!(located.key_path(), vec!["A".to_string(), "f@a.rs:3:9".to_string()]);
    }

    #[test]
    fn test_function_has_single_case() {
        let test = Test::function(TestId::new(["A", "f"]), || async { Ok(()) });
        let cases = test.cases();

        assert!(!test.is_suite());
        assert!(!test.is_parameterized());
        assert_eq!(cases, vec![Case::unparameterized()]);
    }

    #[test]
    fn test_parameterized_cases() {
        let test = Test::parameterized(TestId::new(["A", "g"]), [1, 2, 3], |case| async move {
            let value: i64 = case.argument()?;
            anyhow::ensure!(value > 0);
            Ok(())
        });
        let cases = test.cases();

        assert!(test.is_parameterized());
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[2].argument::<i64>().ok(), Some(3));
        assert_eq!(cases[1].id(), CaseId(1));
    }

    #[test]
    fn test_suite_has_no_cases() {
        let suite = Test::suite(TestId::new(["A"]));
        assert!(suite.is_suite());
        assert!(suite.cases().is_empty());
        assert_eq!(suite.to_string(), "Suite \"A\"");
    }

    #[test]
    fn test_source_location_caller() {
        let location = SourceLocation::caller();
        assert!(location.file_id.ends_with("test.rs"));
        assert!(location.line > 0);
    }

    #[test]
    fn test_tags_are_deduplicated() {
        let test = Test::suite(TestId::new(["A"]))
            .with_trait(Trait::tags(["slow", "io"]))
            .with_trait(Trait::tags(["io"]));
        assert_eq!(test.tags(), vec![Tag::from("io"), Tag::from("slow")]);
    }
}
