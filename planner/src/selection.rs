use rand::Rng;

use crate::context::SearchContext;
use crate::flaws::{Flaw, MutexThreat};
use crate::plan::Plan;

/// How a criterion picks among the flaws it matches. Flaw chains iterate
/// newest-first, so `Lifo` prefers the most recently introduced flaw.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SelectionOrder {
    Lifo,
    Fifo,
    Random,
    /// Fewest refinements first (least-cost flaw repair).
    LeastRefined,
    MostRefined,
}

/// One entry of a flaw-selection order: which flaw kinds it applies to,
/// an optional bound on their refinement count, and the pick order.
#[derive(Clone, Debug)]
pub struct SelectionCriterion {
    pub unsafes: bool,
    /// For threats: select only separable (`Some(true)`) or only
    /// non-separable (`Some(false)`) ones.
    pub separable_filter: Option<bool>,
    pub mutex_threats: bool,
    pub open_conds: bool,
    pub static_open_conds: bool,
    /// Open conditions of the most recently added step.
    pub local_open_conds: bool,
    pub unexpanded_steps: bool,
    pub max_refinements: Option<usize>,
    pub order: SelectionOrder,
}

impl Default for SelectionCriterion {
    fn default() -> SelectionCriterion {
        SelectionCriterion {
            unsafes: false,
            separable_filter: None,
            mutex_threats: false,
            open_conds: false,
            static_open_conds: false,
            local_open_conds: false,
            unexpanded_steps: false,
            max_refinements: None,
            order: SelectionOrder::Lifo,
        }
    }
}

/// An ordered list of selection criteria; the first criterion matched by
/// any flaw of the plan decides which flaw the search repairs next.
#[derive(Clone, Debug)]
pub struct FlawSelectionOrder {
    criteria: Vec<SelectionCriterion>,
}

impl FlawSelectionOrder {
    pub fn new(criteria: Vec<SelectionCriterion>) -> FlawSelectionOrder {
        FlawSelectionOrder { criteria }
    }

    /// Threats first, then unexpanded composite steps, then open
    /// conditions, newest first throughout. Mutex threats come last so
    /// the recomputation pass runs once the step set has settled.
    pub fn ucpop() -> FlawSelectionOrder {
        FlawSelectionOrder::new(vec![
            SelectionCriterion {
                unsafes: true,
                ..SelectionCriterion::default()
            },
            SelectionCriterion {
                unexpanded_steps: true,
                ..SelectionCriterion::default()
            },
            SelectionCriterion {
                open_conds: true,
                ..SelectionCriterion::default()
            },
            SelectionCriterion {
                mutex_threats: true,
                ..SelectionCriterion::default()
            },
        ])
    }

    /// Like `ucpop` but separable threats are delayed until after the
    /// open conditions, when separation is usually cheaper to decide.
    pub fn dsep() -> FlawSelectionOrder {
        FlawSelectionOrder::new(vec![
            SelectionCriterion {
                unsafes: true,
                separable_filter: Some(false),
                ..SelectionCriterion::default()
            },
            SelectionCriterion {
                unexpanded_steps: true,
                ..SelectionCriterion::default()
            },
            SelectionCriterion {
                open_conds: true,
                ..SelectionCriterion::default()
            },
            SelectionCriterion {
                unsafes: true,
                separable_filter: Some(true),
                ..SelectionCriterion::default()
            },
            SelectionCriterion {
                mutex_threats: true,
                ..SelectionCriterion::default()
            },
        ])
    }

    /// Resolves open conditions on static predicates before anything
    /// else; they are settled entirely by the initial state.
    pub fn static_first() -> FlawSelectionOrder {
        let mut criteria = vec![SelectionCriterion {
            static_open_conds: true,
            ..SelectionCriterion::default()
        }];
        criteria.extend(FlawSelectionOrder::ucpop().criteria);
        FlawSelectionOrder::new(criteria)
    }

    /// Least-cost flaw repair: any flaw kind, fewest refinements first.
    pub fn lcfr() -> FlawSelectionOrder {
        FlawSelectionOrder::new(vec![SelectionCriterion {
            unsafes: true,
            mutex_threats: true,
            open_conds: true,
            unexpanded_steps: true,
            order: SelectionOrder::LeastRefined,
            ..SelectionCriterion::default()
        }])
    }

    /// None of the built-in orders ranks flaws by heuristic cost, so the
    /// planning graph is never required just for selection.
    pub fn needs_planning_graph(&self) -> bool {
        false
    }

    /// Picks the flaw to repair on `plan`.
    pub fn select(&self, plan: &Plan, ctx: &SearchContext) -> Flaw {
        let local_step = plan.steps().head().map(|s| s.id);
        for criterion in &self.criteria {
            let needs_count = criterion.max_refinements.is_some()
                || matches!(
                    criterion.order,
                    SelectionOrder::LeastRefined | SelectionOrder::MostRefined
                );
            let bound = criterion.max_refinements.unwrap_or(usize::MAX);
            let mut candidates: Vec<(Flaw, usize)> = Vec::new();

            if criterion.unsafes {
                for u in plan.unsafes().iter() {
                    if let Some(want_separable) = criterion.separable_filter {
                        let separable = plan.separable(ctx, u) > 0;
                        if separable != want_separable {
                            continue;
                        }
                    }
                    let count = if needs_count {
                        let mut refinements = None;
                        let mut separable = None;
                        let mut promotable = None;
                        let mut demotable = None;
                        plan.unsafe_refinements(
                            ctx,
                            &mut refinements,
                            &mut separable,
                            &mut promotable,
                            &mut demotable,
                            u,
                            bound,
                        );
                        refinements.unwrap_or(usize::MAX)
                    } else {
                        0
                    };
                    if count <= bound {
                        candidates.push((Flaw::Unsafe(u.clone()), count));
                    }
                }
            }
            if criterion.mutex_threats {
                for m in plan.mutex_threats().iter() {
                    let count = match m {
                        MutexThreat::Recheck => 1,
                        MutexThreat::Threat { .. } => 3,
                    };
                    if count <= bound {
                        candidates.push((Flaw::MutexThreat(m.clone()), count));
                    }
                }
            }
            if criterion.open_conds || criterion.static_open_conds || criterion.local_open_conds {
                for oc in plan.open_conds().iter() {
                    let applies = criterion.open_conds
                        || (criterion.static_open_conds && oc.is_static(ctx.problem))
                        || (criterion.local_open_conds && Some(oc.step_id) == local_step);
                    if !applies {
                        continue;
                    }
                    let count = if needs_count {
                        let mut refinements = None;
                        let mut addable = None;
                        let mut reusable = None;
                        plan.open_cond_refinements(
                            ctx,
                            &mut refinements,
                            &mut addable,
                            &mut reusable,
                            oc,
                            bound,
                        );
                        refinements.unwrap_or(usize::MAX)
                    } else {
                        0
                    };
                    if count <= bound {
                        candidates.push((Flaw::OpenCondition(oc.clone()), count));
                    }
                }
            }
            if criterion.unexpanded_steps {
                for u in plan.unexpanded_steps().iter() {
                    let count = if needs_count {
                        let mut refinements = None;
                        plan.unexpanded_step_refinements(ctx, &mut refinements, u, bound);
                        refinements.unwrap_or(usize::MAX)
                    } else {
                        0
                    };
                    if count <= bound {
                        candidates.push((Flaw::Unexpanded(u.clone()), count));
                    }
                }
            }

            if candidates.is_empty() {
                continue;
            }
            let picked = match criterion.order {
                SelectionOrder::Lifo => 0,
                SelectionOrder::Fifo => candidates.len() - 1,
                SelectionOrder::Random => ctx.rng.borrow_mut().gen_range(0..candidates.len()),
                SelectionOrder::LeastRefined => candidates
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, (_, c))| *c)
                    .map(|(i, _)| i)
                    .unwrap_or(0),
                SelectionOrder::MostRefined => candidates
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, (_, c))| *c)
                    .map(|(i, _)| i)
                    .unwrap_or(0),
            };
            return candidates.swap_remove(picked).0;
        }

        // incomplete selection orders fall back to any outstanding flaw
        if let Some(u) = plan.unsafes().head() {
            return Flaw::Unsafe(u.clone());
        }
        if let Some(oc) = plan.open_conds().head() {
            return Flaw::OpenCondition(oc.clone());
        }
        if let Some(u) = plan.unexpanded_steps().head() {
            return Flaw::Unexpanded(u.clone());
        }
        if let Some(m) = plan.mutex_threats().head() {
            return Flaw::MutexThreat(m.clone());
        }
        unreachable!("flaw selection on a complete plan")
    }
}
