use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use crate::actions::Action;
use crate::decompositions::Decomposition;
use crate::effects::Effect;
use crate::formulas::{Formula, Literal};
use crate::predicates::{Predicate, PredicateTable};
use crate::terms::{Object, TermTable};
use crate::types::{TypeId, TypeTable};

/// The requirement flags relevant to the refinement core.
#[derive(Copy, Clone, Default, Debug)]
pub struct Requirements {
    pub typing: bool,
    pub durative_actions: bool,
    pub decompositions: bool,
}

/// A planning domain: types, predicates, constants, action schemas and
/// decomposition schemas.
#[derive(Clone, Debug)]
pub struct Domain {
    pub name: String,
    pub requirements: Requirements,
    pub types: TypeTable,
    pub predicates: PredicateTable,
    pub terms: TermTable,
    actions: BTreeMap<String, Rc<Action>>,
    decompositions: Vec<Rc<Decomposition>>,
}

impl Domain {
    pub fn new(name: impl Into<String>) -> Domain {
        Domain {
            name: name.into(),
            requirements: Requirements::default(),
            types: TypeTable::new(),
            predicates: PredicateTable::new(),
            terms: TermTable::new(),
            actions: BTreeMap::new(),
            decompositions: Vec::new(),
        }
    }

    /// Registers an action schema, marking the predicates of its effects
    /// as achievable.
    pub fn add_action(&mut self, action: Action) -> Rc<Action> {
        for effect in &action.effects {
            self.predicates.mark_achievable(effect.literal.predicate());
        }
        if action.durative {
            self.requirements.durative_actions = true;
        }
        if action.composite {
            self.requirements.decompositions = true;
        }
        let rc = Rc::new(action);
        self.actions.insert(rc.name.clone(), rc.clone());
        rc
    }

    pub fn add_decomposition(&mut self, decomposition: Decomposition) -> Rc<Decomposition> {
        self.requirements.decompositions = true;
        let rc = Rc::new(decomposition);
        self.decompositions.push(rc.clone());
        rc
    }

    pub fn find_action(&self, name: &str) -> Option<&Rc<Action>> {
        self.actions.get(name)
    }

    /// Action schemas in deterministic (name) order.
    pub fn actions(&self) -> impl Iterator<Item = &Rc<Action>> {
        self.actions.values()
    }

    pub fn decompositions(&self) -> &[Rc<Decomposition>] {
        &self.decompositions
    }
}

/// A planning problem over a domain: objects, initial state, goal, and
/// timed initial literals.
#[derive(Clone, Debug)]
pub struct Problem {
    pub name: String,
    pub domain: Rc<Domain>,
    /// The domain's terms extended with the problem's objects.
    pub terms: TermTable,
    init: Action,
    goal: Formula,
    timed: Vec<(f32, Action)>,
    timed_predicates: HashSet<Predicate>,
}

impl Problem {
    pub fn new(name: impl Into<String>, domain: Rc<Domain>) -> Problem {
        let terms = domain.terms.clone();
        Problem {
            name: name.into(),
            domain,
            terms,
            init: Action::new("<init>"),
            goal: Formula::Tautology,
            timed: Vec::new(),
            timed_predicates: HashSet::new(),
        }
    }

    pub fn add_object(&mut self, name: impl Into<String>, tpe: TypeId) -> Object {
        self.terms.add_object(name, tpe)
    }

    /// Asserts a literal in the initial state.
    pub fn add_init(&mut self, literal: Literal) {
        self.init.effects.push(Effect::at_end(literal));
    }

    pub fn set_goal(&mut self, goal: Formula) {
        self.goal = goal;
    }

    /// Asserts a literal holding from the given absolute time on.
    pub fn add_timed_literal(&mut self, time: f32, literal: Literal) {
        self.timed_predicates.insert(literal.predicate());
        let action = Action {
            name: format!("<timed-{}>", self.timed.len()),
            parameters: Vec::new(),
            condition: Formula::Tautology,
            effects: vec![Effect::at_end(literal)],
            composite: false,
            durative: false,
            min_duration: 0.0,
            max_duration: 0.0,
        };
        self.timed.push((time, action));
    }

    pub fn init_action(&self) -> &Action {
        &self.init
    }

    pub fn goal(&self) -> &Formula {
        &self.goal
    }

    pub fn timed_actions(&self) -> &[(f32, Action)] {
        &self.timed
    }

    /// A predicate is static for the problem when no action effect and no
    /// timed initial literal can change it.
    pub fn static_predicate(&self, p: Predicate) -> bool {
        self.domain.predicates.static_predicate(p) && !self.timed_predicates.contains(&p)
    }

    pub fn compatible_objects(&self, tpe: TypeId) -> Vec<Object> {
        self.terms.compatible_objects(tpe, &self.domain.types)
    }
}
