//! Execution plan
//!
//! A `Plan` is the filtered, ordered step graph the runner walks.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::{Issue, SkipInfo, Test, TestId};

use super::filter::TestFilter;
use super::resolve::{self, ResolvedNode};

/// What the runner does with a step
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Run,
    Skip(SkipInfo),
    RecordIssue(Issue),
}

impl Action {
    pub fn is_run(&self) -> bool {
        matches!(self, Action::Run)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Run => write!(f, "run"),
            Action::Skip(info) => match &info.comment {
                Some(comment) => write!(f, "skip ({comment})"),
                None => write!(f, "skip"),
            },
            Action::RecordIssue(issue) => write!(f, "record issue ({})", issue.description()),
        }
    }
}

/// A test paired with its action
#[derive(Clone, Debug)]
pub struct Step {
    pub test: Arc<Test>,
    pub action: Action,
}

/// A node of the step graph, keyed by name path
#[derive(Debug)]
pub struct StepNode {
    pub key: String,
    pub key_path: Vec<String>,
    /// `None` for containers that were never declared as suites
    pub step: Option<Step>,
    pub children: Vec<Arc<StepNode>>,
}

impl StepNode {
    /// Steps of this subtree in pre-order
    pub fn steps(&self) -> Vec<Step> {
        let mut out = Vec::new();
        self.collect_steps(&mut out);
        out
    }

    fn collect_steps(&self, out: &mut Vec<Step>) {
        if let Some(step) = &self.step {
            out.push(step.clone());
        }
        for child in &self.children {
            child.collect_steps(out);
        }
    }

    /// Whether this node or one of its descendants is a function step
    pub fn is_executable(&self) -> bool {
        self.step.as_ref().is_some_and(|s| !s.test.is_suite())
            || self.children.iter().any(|c| c.is_executable())
    }
}

/// The filtered, resolved and ordered plan of a run
#[derive(Debug)]
pub struct Plan {
    root: Arc<StepNode>,
    steps: Vec<Step>,
}

impl Plan {
    /// Build a plan from discovered tests.
    ///
    /// Duplicate ids collapse to the first declaration, recursive traits are
    /// merged top-down, function tests are filtered, containers without an
    /// admitted function are pruned, siblings are ordered by source location
    /// and every step gets an action.
    pub async fn build(tests: impl IntoIterator<Item = Test>, filter: &TestFilter) -> Self {
        let tree = ResolvedNode::build(tests);
        let total = tree.functions().len();

        let admit = |node: &ResolvedNode| node.subject().is_some_and(|s| filter.matches(&s));
        let mut tree = match tree.prune(&admit) {
            Some(tree) => tree,
            None => {
                info!("No tests matched the filter ({total} discovered)");
                return Self::empty();
            }
        };
        tree.sort();

        let root = assign(tree, None).await;
        let plan = Self {
            steps: root.steps(),
            root,
        };
        info!(
            "Planned {} steps ({} of {total} tests selected)",
            plan.steps.len(),
            plan.independently_runnable_steps().len()
        );
        plan
    }

    fn empty() -> Self {
        Self {
            root: Arc::new(StepNode {
                key: String::new(),
                key_path: Vec::new(),
                step: None,
                children: Vec::new(),
            }),
            steps: Vec::new(),
        }
    }

    /// All steps in pre-order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Hierarchical view of the same steps
    pub fn step_graph(&self) -> &Arc<StepNode> {
        &self.root
    }

    pub fn step(&self, id: &TestId) -> Option<&Step> {
        self.steps.iter().find(|s| s.test.id() == id)
    }

    /// Function steps, which the runner dispatches as separate units
    pub fn independently_runnable_steps(&self) -> Vec<&Step> {
        self.steps.iter().filter(|s| !s.test.is_suite()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Deterministic, diffable rendering of the step tree
    pub fn dump(&self) -> String {
        let mut out = String::new();
        fn walk(node: &StepNode, depth: usize, out: &mut String) {
            for child in &node.children {
                let indent = "  ".repeat(depth);
                match &child.step {
                    Some(step) => {
                        let marker = if step.test.is_suite() { "+" } else { "-" };
                        out.push_str(&format!(
                            "{indent}{marker} {} [{}]\n",
                            step.test.display_name(),
                            step.action
                        ));
                    }
                    None => out.push_str(&format!("{indent}+ {}\n", child.key)),
                }
                walk(child, depth + 1, out);
            }
        }
        walk(&self.root, 0, &mut out);
        out
    }
}

fn assign(node: ResolvedNode, parent: Option<Action>) -> BoxFuture<'static, Arc<StepNode>> {
    async move {
        let step = match node.test {
            Some(test) => {
                let action = resolve::resolve_action(&test, parent.as_ref()).await;
                debug!("Step {} -> {action}", test.id());
                Some(Step { test, action })
            }
            None => None,
        };
        let inherited = step.as_ref().map(|s| s.action.clone()).or(parent);

        let mut children = Vec::with_capacity(node.children.len());
        for child in node.children {
            children.push(assign(child, inherited.clone()).await);
        }
        Arc::new(StepNode {
            key: node.key,
            key_path: node.key_path,
            step,
            children,
        })
    }
    .boxed()
}
