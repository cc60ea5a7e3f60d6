//! Domain and problem model for the weaver planner: typed terms,
//! polymorphic formulas, actions with conditional timed effects, and
//! decomposition schemas for composite actions.

pub mod actions;
pub mod decompositions;
pub mod effects;
pub mod formulas;
pub mod predicates;
pub mod problem;
pub mod terms;
pub mod types;

pub use actions::Action;
pub use decompositions::Decomposition;
pub use effects::{Effect, EffectTime};
pub use formulas::{Atom, BindingLiteral, Formula, FormulaTime, Literal, StepTime, SubstMap};
pub use predicates::{Predicate, PredicateTable};
pub use problem::{Domain, Problem, Requirements};
pub use terms::{Object, Term, TermTable, Variable};
pub use types::{TypeId, TypeTable};
