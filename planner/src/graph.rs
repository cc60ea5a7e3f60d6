use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use itertools::Itertools;
use weaver_model::{Action, Atom, Formula, Literal, Object, Predicate, Problem};

use crate::bindings::Bindings;

/// Achievers of a literal: pairs of an action and the index of the
/// achieving effect within it.
#[derive(Clone, Debug, Default)]
pub struct ActionEffectMap {
    entries: Vec<(Rc<Action>, usize)>,
}

impl ActionEffectMap {
    pub fn new() -> ActionEffectMap {
        ActionEffectMap::default()
    }

    pub fn push(&mut self, action: Rc<Action>, effect: usize) {
        self.entries.push((action, effect));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Rc<Action>, usize)> {
        self.entries.iter()
    }

    /// The achieving effect indices contributed by one specific action
    /// instance (compared by identity, as steps share their action).
    pub fn achievers_of<'a>(&'a self, action: &'a Rc<Action>) -> impl Iterator<Item = usize> + 'a {
        self.entries
            .iter()
            .filter(move |(a, _)| Rc::ptr_eq(a, action))
            .map(|&(_, e)| e)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// An additive cost estimate for reaching a condition, with the relaxed
/// makespan used to bound temporal orderings.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct HeuristicValue {
    pub cost: f32,
    pub makespan: f32,
}

impl HeuristicValue {
    pub const ZERO: HeuristicValue = HeuristicValue {
        cost: 0.0,
        makespan: 0.0,
    };
    pub const INFINITE: HeuristicValue = HeuristicValue {
        cost: f32::INFINITY,
        makespan: f32::INFINITY,
    };

    pub fn is_infinite(&self) -> bool {
        self.cost.is_infinite()
    }
}

struct GroundInstance {
    schema: String,
    args: Vec<Object>,
    action: Rc<Action>,
}

/// Ground relaxed reachability over the problem: every schema is
/// instantiated over compatible objects and a delete-free cost fixpoint is
/// run from the initial state.
///
/// Serves three consumers: literal achievers when planning over ground
/// actions, additive heuristic costs, and per-parameter domain restriction
/// for `domain_constraints`.
pub struct PlanningGraph {
    atom_costs: HashMap<Atom, HeuristicValue>,
    achievers: HashMap<(Predicate, bool), ActionEffectMap>,
    parameter_domains: HashMap<String, Vec<BTreeSet<Object>>>,
}

impl PlanningGraph {
    pub fn new(problem: &Problem, init_action: &Rc<Action>, timed: &[(f32, Rc<Action>)]) -> PlanningGraph {
        let domain = &problem.domain;
        let mut instances = Vec::new();
        for schema in domain.actions() {
            let arg_domains: Vec<Vec<Object>> = schema
                .parameters
                .iter()
                .map(|&v| problem.compatible_objects(problem.terms.variable_type(v)))
                .collect();
            if arg_domains.is_empty() {
                instances.push(GroundInstance {
                    schema: schema.name.clone(),
                    args: Vec::new(),
                    action: Rc::new(schema.instantiate(&[], &problem.terms)),
                });
            } else {
                for args in arg_domains.into_iter().multi_cartesian_product() {
                    instances.push(GroundInstance {
                        schema: schema.name.clone(),
                        args: args.clone(),
                        action: Rc::new(schema.instantiate(&args, &problem.terms)),
                    });
                }
            }
        }

        let mut atom_costs: HashMap<Atom, HeuristicValue> = HashMap::new();
        for effect in &init_action.effects {
            if let Literal::Positive(atom) = &effect.literal {
                atom_costs.insert(atom.clone(), HeuristicValue::ZERO);
            }
        }
        for (time, action) in timed {
            for effect in &action.effects {
                if let Literal::Positive(atom) = &effect.literal {
                    atom_costs.insert(
                        atom.clone(),
                        HeuristicValue {
                            cost: 0.0,
                            makespan: *time,
                        },
                    );
                }
            }
        }

        // delete-free fixpoint over the ground instances
        let mut reachable = vec![false; instances.len()];
        let mut changed = true;
        while changed {
            changed = false;
            for (i, inst) in instances.iter().enumerate() {
                let pre = match ground_cost(&atom_costs, &inst.action.condition) {
                    Some(v) => v,
                    None => continue,
                };
                reachable[i] = true;
                let duration = if inst.action.durative {
                    inst.action.min_duration
                } else {
                    0.0
                };
                for effect in &inst.action.effects {
                    let guard = match ground_cost(&atom_costs, &effect.condition) {
                        Some(v) => v,
                        None => continue,
                    };
                    if let Literal::Positive(atom) = &effect.literal {
                        let candidate = HeuristicValue {
                            cost: pre.cost + guard.cost + 1.0,
                            makespan: pre.makespan.max(guard.makespan) + duration,
                        };
                        let entry = atom_costs.get(atom);
                        let better = match entry {
                            None => true,
                            Some(old) => {
                                candidate.cost < old.cost
                                    || (candidate.cost == old.cost && candidate.makespan < old.makespan)
                            }
                        };
                        if better {
                            atom_costs.insert(atom.clone(), candidate);
                            changed = true;
                        }
                    }
                }
            }
        }

        let mut achievers: HashMap<(Predicate, bool), ActionEffectMap> = HashMap::new();
        let mut record = |action: &Rc<Action>| {
            for (ei, effect) in action.effects.iter().enumerate() {
                achievers
                    .entry((effect.literal.predicate(), effect.literal.is_negative()))
                    .or_default()
                    .push(action.clone(), ei);
            }
        };
        record(init_action);
        for (_, action) in timed {
            record(action);
        }
        let mut parameter_domains: HashMap<String, Vec<BTreeSet<Object>>> = HashMap::new();
        for (i, inst) in instances.iter().enumerate() {
            if !reachable[i] {
                continue;
            }
            record(&inst.action);
            let entry = parameter_domains
                .entry(inst.schema.clone())
                .or_insert_with(|| vec![BTreeSet::new(); inst.args.len()]);
            for (slot, &arg) in entry.iter_mut().zip(&inst.args) {
                slot.insert(arg);
            }
        }

        PlanningGraph {
            atom_costs,
            achievers,
            parameter_domains,
        }
    }

    /// Achievers of the literal among the reachable ground actions.
    pub fn literal_achievers(&self, literal: &Literal) -> Option<&ActionEffectMap> {
        self.achievers
            .get(&(literal.predicate(), literal.is_negative()))
    }

    /// The objects observed for each parameter of the schema over all its
    /// reachable groundings; `None` when no grounding is reachable.
    pub fn parameter_domains(&self, schema: &str) -> Option<&Vec<BTreeSet<Object>>> {
        self.parameter_domains.get(schema)
    }

    /// Cost estimate of a (possibly lifted) condition under the plan's
    /// bindings. Negations are optimistic (closed world): they cost
    /// nothing.
    pub fn heuristic_value(
        &self,
        formula: &Formula,
        step_id: usize,
        bindings: Option<&Bindings>,
    ) -> HeuristicValue {
        match formula {
            Formula::Tautology => HeuristicValue::ZERO,
            Formula::Contradiction => HeuristicValue::INFINITE,
            Formula::Literal(l) | Formula::Timed { literal: l, .. } => {
                self.literal_value(l, step_id, bindings)
            }
            Formula::Conj(fs) => {
                let mut cost = 0.0;
                let mut makespan = 0.0f32;
                for f in fs {
                    let v = self.heuristic_value(f, step_id, bindings);
                    cost += v.cost;
                    makespan = makespan.max(v.makespan);
                }
                HeuristicValue { cost, makespan }
            }
            Formula::Disj(fs) => fs
                .iter()
                .map(|f| self.heuristic_value(f, step_id, bindings))
                .fold(HeuristicValue::INFINITE, |best, v| {
                    if v.cost < best.cost {
                        v
                    } else {
                        best
                    }
                }),
            Formula::Equality(_) | Formula::Inequality(_) => HeuristicValue::ZERO,
            Formula::Exists { body, .. } | Formula::Forall { body, .. } => {
                self.heuristic_value(body, step_id, bindings)
            }
        }
    }

    fn literal_value(&self, literal: &Literal, step_id: usize, bindings: Option<&Bindings>) -> HeuristicValue {
        if literal.is_negative() {
            return HeuristicValue::ZERO;
        }
        let atom = literal.atom();
        let resolved: Vec<_> = atom
            .terms
            .iter()
            .map(|&t| bindings.map_or(t, |b| b.binding(t, step_id)))
            .collect();
        let mut best = HeuristicValue::INFINITE;
        for (candidate, &value) in &self.atom_costs {
            if candidate.predicate != atom.predicate || candidate.terms.len() != resolved.len() {
                continue;
            }
            let matches = candidate.terms.iter().zip(&resolved).all(|(&c, &r)| match r {
                weaver_model::Term::Object(_) => c == r,
                weaver_model::Term::Variable(_) => true,
            });
            if matches && value.cost < best.cost {
                best = value;
            }
        }
        best
    }
}

/// Cost of a ground formula under the current atom costs; `None` when
/// unreachable.
fn ground_cost(costs: &HashMap<Atom, HeuristicValue>, formula: &Formula) -> Option<HeuristicValue> {
    match formula {
        Formula::Tautology => Some(HeuristicValue::ZERO),
        Formula::Contradiction => None,
        Formula::Literal(l) | Formula::Timed { literal: l, .. } => {
            if l.is_negative() {
                Some(HeuristicValue::ZERO)
            } else {
                costs.get(l.atom()).copied()
            }
        }
        Formula::Conj(fs) => {
            let mut cost = 0.0;
            let mut makespan = 0.0f32;
            for f in fs {
                let v = ground_cost(costs, f)?;
                cost += v.cost;
                makespan = makespan.max(v.makespan);
            }
            Some(HeuristicValue { cost, makespan })
        }
        Formula::Disj(fs) => fs
            .iter()
            .filter_map(|f| ground_cost(costs, f))
            .min_by(|a, b| a.cost.total_cmp(&b.cost)),
        Formula::Equality(_) | Formula::Inequality(_) => Some(HeuristicValue::ZERO),
        Formula::Exists { body, .. } | Formula::Forall { body, .. } => ground_cost(costs, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worlds;

    #[test]
    fn additive_costs_and_achievers() {
        let problem = worlds::threatened_link();
        let init = Rc::new(problem.init_action().clone());
        let graph = PlanningGraph::new(&problem, &init, &[]);
        let p = problem.domain.predicates.id_of("p").unwrap();
        let done = problem.domain.predicates.id_of("done").unwrap();

        let achievers = graph
            .literal_achievers(&Literal::Positive(Atom::new(p, vec![])))
            .unwrap();
        assert_eq!(achievers.len(), 1, "only a adds p");

        let cost_of = |pred| {
            graph
                .heuristic_value(
                    &Formula::Literal(Literal::Positive(Atom::new(pred, vec![]))),
                    0,
                    None,
                )
                .cost
        };
        assert_eq!(cost_of(p), 1.0);
        // done needs p first, then one more action application
        assert_eq!(cost_of(done), 2.0);
    }

    #[test]
    fn unreachable_atoms_cost_infinity() {
        let problem = worlds::unsolvable();
        let init = Rc::new(problem.init_action().clone());
        let graph = PlanningGraph::new(&problem, &init, &[]);
        let p = problem.domain.predicates.id_of("p").unwrap();
        let hv = graph.heuristic_value(
            &Formula::Literal(Literal::Positive(Atom::new(p, vec![]))),
            0,
            None,
        );
        assert!(hv.is_infinite());
    }
}
