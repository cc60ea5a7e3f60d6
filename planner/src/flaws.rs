use std::rc::Rc;

use weaver_model::{Action, Formula, FormulaTime, Literal, Problem, Term, Variable};

use crate::links::Link;

/// A pending requirement of a step: a literal to achieve, a disjunction to
/// commit to, or an inequality to settle.
#[derive(Clone, PartialEq, Debug)]
pub enum OpenGoal {
    Literal {
        literal: Literal,
        when: FormulaTime,
    },
    Disjunction(Vec<Formula>),
    Inequality {
        variable: Variable,
        var_id: usize,
        term: Term,
        term_id: usize,
    },
}

/// An open condition flaw, scoped to the step requiring it.
#[derive(Clone, PartialEq, Debug)]
pub struct OpenCondition {
    pub step_id: usize,
    pub goal: OpenGoal,
}

impl OpenCondition {
    pub fn literal(&self) -> Option<(&Literal, FormulaTime)> {
        match &self.goal {
            OpenGoal::Literal { literal, when } => Some((literal, *when)),
            _ => None,
        }
    }

    pub fn disjunction(&self) -> Option<&[Formula]> {
        match &self.goal {
            OpenGoal::Disjunction(ds) => Some(ds),
            _ => None,
        }
    }

    /// The time at which the condition is required to start holding.
    pub fn when(&self) -> FormulaTime {
        match &self.goal {
            OpenGoal::Literal { when, .. } => *when,
            _ => FormulaTime::AtStart,
        }
    }

    /// True for a literal open condition on a static predicate.
    pub fn is_static(&self, problem: &Problem) -> bool {
        match &self.goal {
            OpenGoal::Literal { literal, .. } => problem.static_predicate(literal.predicate()),
            _ => false,
        }
    }
}

/// A threatened causal link: `step_id`'s effect may clobber the link's
/// condition while ordered between its endpoints.
#[derive(Clone, PartialEq, Debug)]
pub struct Unsafe {
    pub link: Link,
    pub step_id: usize,
    /// Index of the threatening effect in the step's action.
    pub effect: usize,
}

/// Two possibly concurrent effects writing the same atom.
///
/// The `Recheck` placeholder seeds the initial plan; resolving it rescans
/// every step pair and reissues the plan with the found threats.
#[derive(Clone, PartialEq, Debug)]
pub enum MutexThreat {
    Recheck,
    Threat {
        step_id1: usize,
        effect1: usize,
        step_id2: usize,
        effect2: usize,
    },
}

/// A composite step that has not been refined by a decomposition yet.
#[derive(Clone, Debug)]
pub struct UnexpandedStep {
    pub step_id: usize,
    pub action: Rc<Action>,
}

impl PartialEq for UnexpandedStep {
    fn eq(&self, other: &Self) -> bool {
        self.step_id == other.step_id
    }
}

/// A defect of a partial plan selected for repair.
#[derive(Clone, Debug)]
pub enum Flaw {
    Unsafe(Unsafe),
    OpenCondition(OpenCondition),
    MutexThreat(MutexThreat),
    Unexpanded(UnexpandedStep),
}
