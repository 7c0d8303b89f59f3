//! Test selection
//!
//! A `TestFilter` is a tree of include/exclude leaves over ids, id patterns
//! and tags. Every leaf carries its own hidden-test flag, so `and` is exactly
//! the intersection of its operands and `or` exactly their union.

use regex::Regex;
use std::collections::BTreeSet;

use crate::error::ConfigError;
use crate::models::{Tag, Test, TestId};

use super::resolve;

/// Whether a leaf keeps or drops what it matches
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Membership {
    Including,
    Excluding,
}

#[derive(Clone, Debug)]
enum Criterion {
    Everything,
    Ids(Vec<TestId>),
    Patterns(Vec<Regex>),
    Tags(Vec<Tag>),
}

#[derive(Clone, Debug)]
struct Leaf {
    criterion: Criterion,
    membership: Membership,
    include_hidden: bool,
}

#[derive(Clone, Debug)]
enum Node {
    Leaf(Leaf),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

/// What a filter looks at when deciding on a test function
#[derive(Clone, Copy, Debug)]
pub struct FilterSubject<'a> {
    pub id: &'a TestId,
    /// Tags after recursive suite tags have been merged in
    pub tags: &'a [Tag],
    /// True if the test or any containing suite is hidden
    pub is_hidden: bool,
}

/// Selection predicate over test functions
#[derive(Clone, Debug)]
pub struct TestFilter {
    root: Node,
}

impl Default for TestFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl TestFilter {
    fn leaf(criterion: Criterion, membership: Membership) -> Self {
        Self {
            root: Node::Leaf(Leaf {
                criterion,
                membership,
                include_hidden: false,
            }),
        }
    }

    /// Every visible test
    pub fn all() -> Self {
        Self::leaf(Criterion::Everything, Membership::Including)
    }

    /// Tests with one of `ids`, or nested inside one of them
    pub fn including_ids(ids: impl IntoIterator<Item = TestId>) -> Self {
        Self::leaf(Criterion::Ids(ids.into_iter().collect()), Membership::Including)
    }

    pub fn excluding_ids(ids: impl IntoIterator<Item = TestId>) -> Self {
        Self::leaf(Criterion::Ids(ids.into_iter().collect()), Membership::Excluding)
    }

    /// Tests whose id (or a containing suite's id) matches one of `patterns`
    pub fn including_patterns<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::leaf(
            Criterion::Patterns(compile(patterns)?),
            Membership::Including,
        ))
    }

    pub fn excluding_patterns<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::leaf(
            Criterion::Patterns(compile(patterns)?),
            Membership::Excluding,
        ))
    }

    /// Tests carrying any of `tags`
    pub fn including_tags<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        Self::leaf(
            Criterion::Tags(tags.into_iter().map(Into::into).collect()),
            Membership::Including,
        )
    }

    pub fn excluding_tags<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        Self::leaf(
            Criterion::Tags(tags.into_iter().map(Into::into).collect()),
            Membership::Excluding,
        )
    }

    /// Admit hidden tests in every leaf of this filter
    pub fn including_hidden(mut self) -> Self {
        fn mark(node: &mut Node) {
            match node {
                Node::Leaf(leaf) => leaf.include_hidden = true,
                Node::And(a, b) | Node::Or(a, b) => {
                    mark(a);
                    mark(b);
                }
            }
        }
        mark(&mut self.root);
        self
    }

    pub fn and(self, other: TestFilter) -> Self {
        Self {
            root: Node::And(Box::new(self.root), Box::new(other.root)),
        }
    }

    pub fn or(self, other: TestFilter) -> Self {
        Self {
            root: Node::Or(Box::new(self.root), Box::new(other.root)),
        }
    }

    pub fn matches(&self, subject: &FilterSubject<'_>) -> bool {
        evaluate(&self.root, subject)
    }

    /// Ids of the test functions in `tests` this filter admits
    pub fn apply(&self, tests: &[Test]) -> BTreeSet<TestId> {
        let tree = resolve::ResolvedNode::build(tests.iter().cloned());
        tree.functions()
            .into_iter()
            .filter_map(resolve::ResolvedNode::subject)
            .filter(|subject| self.matches(subject))
            .map(|subject| subject.id.clone())
            .collect()
    }
}

fn compile<I, S>(patterns: I) -> Result<Vec<Regex>, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|pattern| {
            let pattern = pattern.as_ref();
            Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
        })
        .collect()
}

fn evaluate(node: &Node, subject: &FilterSubject<'_>) -> bool {
    match node {
        Node::Leaf(leaf) => {
            if subject.is_hidden && !leaf.include_hidden {
                return false;
            }
            let hit = criterion_matches(&leaf.criterion, subject);
            match (&leaf.criterion, leaf.membership) {
                (Criterion::Everything, Membership::Including) => true,
                (Criterion::Everything, Membership::Excluding) => false,
                (_, Membership::Including) => hit,
                (_, Membership::Excluding) => !hit,
            }
        }
        Node::And(a, b) => evaluate(a, subject) && evaluate(b, subject),
        Node::Or(a, b) => evaluate(a, subject) || evaluate(b, subject),
    }
}

/// True if the subject or one of its containing suites matches
fn criterion_matches(criterion: &Criterion, subject: &FilterSubject<'_>) -> bool {
    let id = subject.id;
    match criterion {
        Criterion::Everything => true,
        Criterion::Ids(ids) => ids.iter().any(|selected| selects(selected, id)),
        Criterion::Patterns(patterns) => {
            let full = id.to_string();
            let path = id.name_path();
            patterns.iter().any(|pattern| {
                pattern.is_match(&full)
                    || (1..=path.len()).any(|len| pattern.is_match(&path[..len].join("/")))
            })
        }
        Criterion::Tags(tags) => tags.iter().any(|tag| subject.tags.contains(tag)),
    }
}

fn selects(selected: &TestId, id: &TestId) -> bool {
    if selected.is_ancestor_of(id) {
        return true;
    }
    selected.name_path() == id.name_path()
        && (selected.source_location().is_none()
            || selected.source_location() == id.source_location())
}
