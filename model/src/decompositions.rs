use std::rc::Rc;

use crate::actions::Action;
use crate::formulas::Literal;
use crate::terms::{Term, Variable};

/// A step of a decomposition schema, identified by a schema-local id.
#[derive(Clone, Debug)]
pub struct PseudoStep {
    pub local_id: usize,
    pub action: Rc<Action>,
}

/// A binding constraint between variables of two pseudo-steps.
#[derive(Clone, Debug)]
pub struct SchemaBinding {
    pub variable: Variable,
    pub var_local_id: usize,
    pub term: Term,
    pub term_local_id: usize,
    pub is_equality: bool,
}

/// An ordering constraint between two pseudo-steps: `before` finishes no
/// later than `after` starts.
#[derive(Clone, Debug)]
pub struct SchemaOrdering {
    pub before: usize,
    pub after: usize,
}

/// A causal link between two pseudo-steps.
#[derive(Clone, Debug)]
pub struct SchemaLink {
    pub from: usize,
    pub condition: Literal,
    pub to: usize,
}

/// A decomposition schema: the recipe refining one composite action into a
/// sub-plan bracketed by two dummy pseudo-steps.
///
/// Local id [`Decomposition::DUMMY_INITIAL`] carries the composite's
/// effects and [`Decomposition::DUMMY_FINAL`] its precondition; body steps
/// get ids from 2 upward. Expansion maps local ids to fresh plan step ids.
#[derive(Clone, Debug)]
pub struct Decomposition {
    pub name: String,
    pub composite_action: String,
    pub pseudo_steps: Vec<PseudoStep>,
    pub bindings: Vec<SchemaBinding>,
    pub orderings: Vec<SchemaOrdering>,
    pub links: Vec<SchemaLink>,
}

impl Decomposition {
    pub const DUMMY_INITIAL: usize = 0;
    pub const DUMMY_FINAL: usize = 1;

    /// Creates the schema for `composite`, with the two dummy pseudo-steps
    /// built from the composite's effects and precondition.
    pub fn new(name: impl Into<String>, composite: &Action) -> Decomposition {
        let name = name.into();
        let begin = Action {
            name: format!("<begin-{name}>"),
            parameters: composite.parameters.clone(),
            condition: crate::formulas::Formula::Tautology,
            effects: composite.effects.clone(),
            composite: false,
            durative: false,
            min_duration: 0.0,
            max_duration: 0.0,
        };
        let end = Action {
            name: format!("<end-{name}>"),
            parameters: composite.parameters.clone(),
            condition: composite.condition.clone(),
            effects: Vec::new(),
            composite: false,
            durative: false,
            min_duration: 0.0,
            max_duration: 0.0,
        };
        Decomposition {
            name,
            composite_action: composite.name.clone(),
            pseudo_steps: vec![
                PseudoStep {
                    local_id: Self::DUMMY_INITIAL,
                    action: Rc::new(begin),
                },
                PseudoStep {
                    local_id: Self::DUMMY_FINAL,
                    action: Rc::new(end),
                },
            ],
            bindings: Vec::new(),
            orderings: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Adds a body step and returns its local id.
    pub fn add_step(&mut self, action: Rc<Action>) -> usize {
        let local_id = self.pseudo_steps.len();
        self.pseudo_steps.push(PseudoStep { local_id, action });
        local_id
    }

    /// Equates (or disequates) a variable of one pseudo-step with a term
    /// of another.
    pub fn add_binding(
        &mut self,
        variable: Variable,
        var_local_id: usize,
        term: Term,
        term_local_id: usize,
        is_equality: bool,
    ) {
        self.bindings.push(SchemaBinding {
            variable,
            var_local_id,
            term,
            term_local_id,
            is_equality,
        });
    }

    pub fn add_ordering(&mut self, before: usize, after: usize) {
        self.orderings.push(SchemaOrdering { before, after });
    }

    pub fn add_link(&mut self, from: usize, condition: Literal, to: usize) {
        self.links.push(SchemaLink { from, condition, to });
    }
}
