//! Trait resolution
//!
//! Merges recursive suite traits into descendants and evaluates condition
//! traits to decide each test's action.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{Issue, SkipInfo, SourceLocation, Tag, Test, Trait};

use super::filter::FilterSubject;
use super::plan::Action;

/// `test` with every ancestor's recursive traits prepended, outermost first
pub fn resolve_traits(test: &Test, ancestry: &[&Test]) -> Test {
    let inherited: Vec<Trait> = ancestry
        .iter()
        .flat_map(|suite| suite.traits().iter().filter(|t| t.is_recursive()))
        .cloned()
        .collect();
    test.with_resolved_traits(merge_traits(&inherited, test.traits()))
}

fn merge_traits(inherited: &[Trait], own: &[Trait]) -> Vec<Trait> {
    inherited.iter().chain(own.iter()).cloned().collect()
}

/// Decide what to do with `test` given its parent's action.
///
/// A parent that is not run hands its outcome down and the test's own
/// conditions are never evaluated. Otherwise conditions are evaluated in
/// order and the first one that disables or fails decides.
pub async fn resolve_action(test: &Test, parent: Option<&Action>) -> Action {
    match parent {
        Some(Action::Skip(info)) => return Action::Skip(info.clone()),
        Some(Action::RecordIssue(issue)) => {
            return Action::Skip(SkipInfo::new(
                Some(format!("Containing suite failed: {}", issue.description())),
                issue.source_location().cloned(),
            ))
        }
        Some(Action::Run) | None => {}
    }

    for condition in test.traits().iter().filter_map(Trait::as_condition) {
        match condition.evaluate().await {
            Ok(true) => {}
            Ok(false) => {
                return Action::Skip(SkipInfo::new(
                    condition.comment().map(str::to_string),
                    Some(condition.source_location().clone()),
                ))
            }
            Err(error) => {
                warn!("Condition of {} failed: {error:#}", test.id());
                return Action::RecordIssue(Issue::error_caught(
                    &error,
                    Some(condition.source_location().clone()),
                ));
            }
        }
    }
    Action::Run
}

/// A node of the declaration tree after trait inheritance
#[derive(Debug)]
pub(crate) struct ResolvedNode {
    pub key: String,
    pub key_path: Vec<String>,
    /// Declared test with merged traits; `None` for undeclared containers
    pub test: Option<Arc<Test>>,
    /// Declaration index used as the last ordering tie-break
    pub order: usize,
    pub is_hidden: bool,
    pub tags: Vec<Tag>,
    pub children: Vec<ResolvedNode>,
}

impl ResolvedNode {
    fn empty(key: String, key_path: Vec<String>) -> Self {
        Self {
            key,
            key_path,
            test: None,
            order: usize::MAX,
            is_hidden: false,
            tags: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Build the tree from `tests`, dropping duplicate ids (first wins)
    pub fn build(tests: impl IntoIterator<Item = Test>) -> Self {
        let mut root = Self::empty(String::new(), Vec::new());
        let mut seen = HashSet::new();
        for (order, test) in tests.into_iter().enumerate() {
            if test.id().name_path().is_empty() {
                warn!("Ignoring test with an empty name path");
                continue;
            }
            if !seen.insert(test.id().clone()) {
                debug!("Collapsing duplicate test {}", test.id());
                continue;
            }
            root.insert(test, order);
        }
        root.inherit(&[], false);
        root
    }

    fn insert(&mut self, test: Test, order: usize) {
        let key_path = test.id().key_path();
        let mut node = self;
        for (depth, key) in key_path.iter().enumerate() {
            let position = match node.children.iter().position(|c| &c.key == key) {
                Some(position) => position,
                None => {
                    node.children
                        .push(Self::empty(key.clone(), key_path[..=depth].to_vec()));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[position];
        }
        node.order = order;
        node.test = Some(Arc::new(test));
    }

    fn inherit(&mut self, inherited: &[Trait], hidden: bool) {
        let mut passed_down = inherited.to_vec();
        let mut hidden = hidden;
        if let Some(test) = self.test.take() {
            hidden |= test.is_hidden();
            passed_down.extend(test.traits().iter().filter(|t| t.is_recursive()).cloned());
            let resolved = test.with_resolved_traits(merge_traits(inherited, test.traits()));
            self.tags = resolved.tags();
            self.test = Some(Arc::new(resolved));
        }
        self.is_hidden = hidden;
        for child in &mut self.children {
            child.inherit(&passed_down, hidden);
        }
    }

    pub fn is_function(&self) -> bool {
        self.test.as_ref().is_some_and(|t| !t.is_suite())
    }

    /// Every function node, depth first
    pub fn functions(&self) -> Vec<&ResolvedNode> {
        let mut out = Vec::new();
        fn walk<'a>(node: &'a ResolvedNode, out: &mut Vec<&'a ResolvedNode>) {
            if node.is_function() {
                out.push(node);
            }
            for child in &node.children {
                walk(child, out);
            }
        }
        walk(self, &mut out);
        out
    }

    pub fn subject(&self) -> Option<FilterSubject<'_>> {
        self.test.as_ref().map(|test| FilterSubject {
            id: test.id(),
            tags: &self.tags,
            is_hidden: self.is_hidden,
        })
    }

    /// Drop function nodes `admit` rejects and containers left empty
    pub fn prune(mut self, admit: &dyn Fn(&ResolvedNode) -> bool) -> Option<Self> {
        let is_function = self.is_function();
        let admitted = is_function && admit(&self);
        self.children = std::mem::take(&mut self.children)
            .into_iter()
            .filter_map(|child| child.prune(admit))
            .collect();
        (admitted || !self.children.is_empty()).then_some(self)
    }

    fn sort_key(&self) -> (SourceLocation, usize) {
        match &self.test {
            Some(test) => (test.source_location().clone(), self.order),
            None => self
                .children
                .iter()
                .map(Self::sort_key)
                .min()
                .unwrap_or_else(|| (SourceLocation::new("", 0, 0), usize::MAX)),
        }
    }

    /// Order children by file, line, column, then declaration order
    pub fn sort(&mut self) {
        for child in &mut self.children {
            child.sort();
        }
        self.children.sort_by_cached_key(Self::sort_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestId;
    use std::time::Duration;

    #[test]
    fn test_recursive_traits_outermost_first() {
        let outer = Test::suite(TestId::new(["A"]))
            .with_trait(Trait::tags(["outer"]))
            .with_trait(Trait::comment("not inherited"));
        let inner = Test::suite(TestId::new(["A", "B"])).with_trait(Trait::serialized());
        let test = Test::function(TestId::new(["A", "B", "f"]), || async { Ok(()) })
            .with_trait(Trait::time_limit(Duration::from_secs(1)));

        let resolved = resolve_traits(&test, &[&outer, &inner]);
        let traits = resolved.traits();

        assert_eq!(traits.len(), 3);
        assert!(traits[0].as_tags().is_some());
        assert!(traits[1].is_serializing());
        assert!(traits[2].as_time_limit().is_some());
    }

    #[tokio::test]
    async fn test_first_disabling_condition_wins() {
        let test = Test::function(TestId::new(["f"]), || async { Ok(()) })
            .with_trait(Trait::enabled_if("yes", || Ok(true)))
            .with_trait(Trait::disabled_because("first"))
            .with_trait(Trait::enabled_if("never evaluated", || {
                panic!("evaluated past a disabling condition")
            }));

        match resolve_action(&test, None).await {
            Action::Skip(info) => assert_eq!(info.comment.as_deref(), Some("first")),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_throwing_condition_records_issue() {
        let test = Test::function(TestId::new(["f"]), || async { Ok(()) })
            .with_trait(Trait::enabled_if("env", || anyhow::bail!("no env")));

        match resolve_action(&test, None).await {
            Action::RecordIssue(issue) => assert!(issue.description().contains("no env")),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_parent_skip_is_inherited_without_evaluation() {
        let test = Test::function(TestId::new(["S", "f"]), || async { Ok(()) })
            .with_trait(Trait::enabled_if("crash", || panic!("must not run")));
        let parent = Action::Skip(SkipInfo::with_comment("suite disabled"));

        match resolve_action(&test, Some(&parent)).await {
            Action::Skip(info) => assert_eq!(info.comment.as_deref(), Some("suite disabled")),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_build_collapses_duplicates() {
        let tree = ResolvedNode::build([
            Test::function(TestId::new(["A", "f"]), || async { Ok(()) }),
            Test::function(TestId::new(["A", "f"]), || async { Ok(()) }),
            Test::function(TestId::new(["A", "g"]), || async { Ok(()) }),
        ]);
        assert_eq!(tree.functions().len(), 2);
        assert_eq!(tree.children.len(), 1);
        assert!(tree.children[0].test.is_none());
    }
}
