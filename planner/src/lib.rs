//! Plan-space refinement search with hierarchical task decomposition.
//!
//! A plan here is not a sequence of actions but a partial plan: a set of
//! partially instantiated steps, causal links, orderings and variable
//! bindings together with its outstanding flaws. The search repairs one
//! flaw at a time, producing child plans, until a plan with no flaws
//! remains.

pub mod bindings;
pub mod context;
pub mod decomposition;
pub mod flaws;
pub mod fmt;
pub mod graph;
pub mod heuristics;
pub mod links;
pub mod orderings;
pub mod params;
pub mod plan;
pub mod search;
pub mod selection;
pub mod worlds;

/// Id of the goal step of every plan. The initial step has id 0; ordinary
/// steps take 1..=num_steps.
pub const GOAL_ID: usize = usize::MAX;

pub use bindings::{Binding, Bindings};
pub use context::SearchContext;
pub use flaws::{Flaw, MutexThreat, OpenCondition, OpenGoal, UnexpandedStep, Unsafe};
pub use heuristics::Heuristic;
pub use links::Link;
pub use orderings::{Ordering, Orderings};
pub use params::{Parameters, SearchAlgorithm};
pub use plan::{Plan, Step};
pub use search::{solve, PlanningResult, Stats};
pub use selection::{FlawSelectionOrder, SelectionCriterion, SelectionOrder};
