//! Test planning
//!
//! Selection, trait resolution and step-graph construction.

mod filter;
mod plan;
mod resolve;

pub use filter::{FilterSubject, Membership, TestFilter};
pub use plan::{Action, Plan, Step, StepNode};
pub use resolve::{resolve_action, resolve_traits};
