use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use weaver_model::{
    Action, Atom, Decomposition, Literal, Predicate, Problem, TermTable, TypeId, TypeTable,
    Variable,
};

use crate::bindings::{Binding, BindingList, Bindings};
use crate::graph::{ActionEffectMap, PlanningGraph};
use crate::params::Parameters;

/// Everything one `solve` invocation shares across all plans: the problem,
/// the achiever maps, the planning graph, the goal pseudo-action, the term
/// table extended with search-allocated variables, and the
/// last-flaw-was-static signal.
///
/// Built at `solve` entry and dropped at exit; the core is single-threaded
/// and not re-entrant, so the mutable parts are interior cells.
pub struct SearchContext<'a> {
    pub params: &'a Parameters,
    pub problem: &'a Problem,
    pub graph: Option<PlanningGraph>,
    pub init_action: Rc<Action>,
    pub goal_action: Rc<Action>,
    pub timed_actions: Vec<(f32, Rc<Action>)>,
    achieves_pred: HashMap<Predicate, ActionEffectMap>,
    achieves_neg_pred: HashMap<Predicate, ActionEffectMap>,
    achieves_composite: HashMap<String, Vec<Rc<Decomposition>>>,
    pub terms: RefCell<TermTable>,
    pub last_flaw_static: Cell<bool>,
    pub rng: RefCell<StdRng>,
}

impl<'a> SearchContext<'a> {
    pub fn new(problem: &'a Problem, params: &'a Parameters) -> SearchContext<'a> {
        let domain = &problem.domain;
        let init_action = Rc::new(problem.init_action().clone());
        let timed_actions: Vec<(f32, Rc<Action>)> = problem
            .timed_actions()
            .iter()
            .map(|(t, a)| (*t, Rc::new(a.clone())))
            .collect();

        let mut goal = Action::new("");
        goal.condition = if params.ground_actions {
            problem
                .goal()
                .expand_quantifiers(&problem.terms, &domain.types)
        } else {
            problem.goal().clone()
        };
        let goal_action = Rc::new(goal);

        let need_graph = params.ground_actions
            || params.domain_constraints
            || params.heuristic.needs_planning_graph()
            || params.flaw_orders.iter().any(|o| o.needs_planning_graph());
        let graph = if need_graph {
            Some(PlanningGraph::new(problem, &init_action, &timed_actions))
        } else {
            None
        };

        let mut achieves_pred: HashMap<Predicate, ActionEffectMap> = HashMap::new();
        let mut achieves_neg_pred: HashMap<Predicate, ActionEffectMap> = HashMap::new();
        if !params.ground_actions {
            let mut record = |action: &Rc<Action>| {
                for (ei, effect) in action.effects.iter().enumerate() {
                    let map = if effect.literal.is_negative() {
                        &mut achieves_neg_pred
                    } else {
                        &mut achieves_pred
                    };
                    map.entry(effect.literal.predicate())
                        .or_default()
                        .push(action.clone(), ei);
                }
            };
            for schema in domain.actions() {
                record(schema);
            }
            record(&init_action);
            for (_, action) in &timed_actions {
                record(action);
            }
        }

        let mut achieves_composite: HashMap<String, Vec<Rc<Decomposition>>> = HashMap::new();
        if domain.requirements.decompositions {
            for decomposition in domain.decompositions() {
                let applies = domain
                    .find_action(&decomposition.composite_action)
                    .map_or(false, |a| a.composite);
                if applies {
                    achieves_composite
                        .entry(decomposition.composite_action.clone())
                        .or_default()
                        .push(decomposition.clone());
                }
            }
        }

        SearchContext {
            params,
            problem,
            graph,
            init_action,
            goal_action,
            timed_actions,
            achieves_pred,
            achieves_neg_pred,
            achieves_composite,
            terms: RefCell::new(problem.terms.clone()),
            last_flaw_static: Cell::new(false),
            rng: RefCell::new(StdRng::seed_from_u64(params.random_seed)),
        }
    }

    pub fn types(&self) -> &TypeTable {
        &self.problem.domain.types
    }

    pub fn durative(&self) -> bool {
        self.problem.domain.requirements.durative_actions
    }

    /// Allocates a variable that exists only for this search.
    pub fn fresh_variable(&self, tpe: TypeId) -> Variable {
        self.terms.borrow_mut().add_variable(tpe)
    }

    pub fn variable_type(&self, v: Variable) -> TypeId {
        self.terms.borrow().variable_type(v)
    }

    pub fn static_predicate(&self, p: Predicate) -> bool {
        self.problem.static_predicate(p)
    }

    /// The achievers to consider for a literal open condition: the ground
    /// reachability graph when planning over ground actions, the
    /// predicate-keyed schema maps otherwise.
    pub fn literal_achievers(&self, literal: &Literal) -> Option<&ActionEffectMap> {
        if self.params.ground_actions {
            self.graph.as_ref()?.literal_achievers(literal)
        } else if literal.is_negative() {
            self.achieves_neg_pred.get(&literal.predicate())
        } else {
            self.achieves_pred.get(&literal.predicate())
        }
    }

    /// Decomposition schemas applicable to a composite action.
    pub fn decompositions_of(&self, action_name: &str) -> &[Rc<Decomposition>] {
        self.achieves_composite
            .get(action_name)
            .map_or(&[], |v| v.as_slice())
    }

    // Binding-engine entry points, with the term table threaded in.

    pub fn unify(
        &self,
        bindings: &Bindings,
        mgu: &mut BindingList,
        l1: &Literal,
        id1: usize,
        l2: &Literal,
        id2: usize,
    ) -> bool {
        let terms = self.terms.borrow();
        bindings.unify(mgu, l1, id1, l2, id2, &terms, self.types())
    }

    pub fn unify_atoms(
        &self,
        bindings: &Bindings,
        mgu: &mut BindingList,
        a1: &Atom,
        id1: usize,
        a2: &Atom,
        id2: usize,
    ) -> bool {
        let terms = self.terms.borrow();
        bindings.unify_atoms(mgu, a1, id1, a2, id2, &terms, self.types())
    }

    pub fn affects(
        &self,
        bindings: &Bindings,
        mgu: &mut BindingList,
        effect_literal: &Literal,
        effect_id: usize,
        condition: &Literal,
        condition_id: usize,
    ) -> bool {
        let terms = self.terms.borrow();
        bindings.affects(
            mgu,
            effect_literal,
            effect_id,
            condition,
            condition_id,
            &terms,
            self.types(),
        )
    }

    pub fn add_bindings(&self, base: &Bindings, new: &[Binding]) -> Option<Bindings> {
        let terms = self.terms.borrow();
        base.add(new, &terms, self.types())
    }

    pub fn domain_of(
        &self,
        bindings: &Bindings,
        v: Variable,
        step_id: usize,
    ) -> std::collections::BTreeSet<weaver_model::Object> {
        let terms = self.terms.borrow();
        bindings.domain(v, step_id, &terms, self.types())
    }
}
