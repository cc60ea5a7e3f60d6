use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use log::debug;
use weaver_model::{Problem, Term};

use crate::bindings::{Binding, Bindings};
use crate::context::SearchContext;
use crate::fmt;
use crate::params::{Parameters, SearchAlgorithm};
use crate::plan::{Plan, Step};
use crate::selection::FlawSelectionOrder;

/// Search statistics, reported on stderr at verbosity >= 1.
#[derive(Clone, Copy, Default, Debug)]
pub struct Stats {
    /// Plans generated, including the initial plan.
    pub generated: usize,
    /// Plans whose refinements were computed.
    pub visited: usize,
    /// Visited plans none of whose children survived.
    pub dead_ends: usize,
    /// Visits whose selected flaw was a static open condition; subtracted
    /// from the reported counts.
    pub num_static: usize,
}

/// The outcome of one `solve` invocation. The context is returned with the
/// plan because formatting a plan needs the search's term table.
pub struct PlanningResult<'a> {
    pub plan: Option<Rc<Plan>>,
    pub ctx: SearchContext<'a>,
    pub stats: Stats,
}

/// Heap entry ordered by rank vector; the best (lowest) rank is the
/// greatest entry so `BinaryHeap::pop` yields it first.
struct RankedPlan(Rc<Plan>);

impl RankedPlan {
    fn rank(&self) -> &[f32] {
        self.0
            .cached_rank()
            .expect("plans are ranked before queueing")
    }
}

fn compare_ranks(a: &[f32], b: &[f32]) -> CmpOrdering {
    for (x, y) in a.iter().zip(b) {
        match x.total_cmp(y) {
            CmpOrdering::Equal => {}
            CmpOrdering::Less => return CmpOrdering::Greater,
            CmpOrdering::Greater => return CmpOrdering::Less,
        }
    }
    CmpOrdering::Equal
}

impl PartialEq for RankedPlan {
    fn eq(&self, other: &Self) -> bool {
        compare_ranks(self.rank(), other.rank()) == CmpOrdering::Equal
    }
}
impl Eq for RankedPlan {}
impl PartialOrd for RankedPlan {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for RankedPlan {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        compare_ranks(self.rank(), other.rank())
    }
}

/// Searches plan space for a complete plan of the problem.
///
/// One best-first queue per flaw-selection strategy, used round-robin with
/// quota-based switching; iterative deepening on rank under
/// [`SearchAlgorithm::IdaStar`]. Returns the complete plan (with ground
/// actions when every schema variable could be bound) or nothing.
pub fn solve<'a>(problem: &'a Problem, params: &'a Parameters) -> PlanningResult<'a> {
    let ctx = SearchContext::new(problem, params);
    let mut stats = Stats::default();

    let flaw_orders: Vec<FlawSelectionOrder> = if params.flaw_orders.is_empty() {
        vec![FlawSelectionOrder::ucpop()]
    } else {
        params.flaw_orders.clone()
    };
    let n = flaw_orders.len();
    let mut generated_plans = vec![0usize; n];
    let mut queues: Vec<BinaryHeap<RankedPlan>> = (0..n).map(|_| BinaryHeap::new()).collect();
    let mut dead_queues: Vec<BinaryHeap<RankedPlan>> = Vec::new();
    let mut current_flaw_order = 0;
    let mut flaw_orders_left = n;
    let mut next_switch = 1000usize;

    let initial = Plan::initial(&ctx);
    if let Some(p) = &initial {
        p.set_serial_no(0);
    }
    let mut current = initial.clone();
    generated_plans[current_flaw_order] += 1;
    stats.generated += 1;

    let mut f_limit = match (&current, params.search_algorithm) {
        (Some(p), SearchAlgorithm::IdaStar) => p.primary_rank(&ctx),
        _ => f32::INFINITY,
    };
    let mut last_dot = 0usize;
    let mut interrupted = false;

    loop {
        let mut next_f_limit = f32::INFINITY;

        loop {
            let plan = match &current {
                Some(p) if !p.complete() => p.clone(),
                _ => break,
            };
            if params.interrupted() {
                interrupted = true;
                current = None;
                break;
            }

            // a little amortized cleanup of retired queues
            for _ in 0..4 {
                match dead_queues.last_mut() {
                    Some(queue) => {
                        queue.pop();
                        if queue.is_empty() {
                            dead_queues.pop();
                        }
                    }
                    None => break,
                }
            }

            stats.visited += 1;
            if params.verbosity == 1 {
                while stats.generated.saturating_sub(stats.num_static) >= last_dot + 1000 {
                    eprint!(".");
                    last_dot += 1000;
                }
            }
            if params.verbosity > 1 {
                eprintln!(
                    "\n{}: current plan (id {}) with rank {:?}",
                    stats.visited - stats.num_static,
                    plan.serial_no(),
                    plan.rank(&ctx),
                );
                eprintln!("{}", fmt::display(&plan, &ctx, 2));
            }

            let children = plan.refinements(&ctx, &flaw_orders[current_flaw_order]);
            let mut added = false;
            for child in children {
                // the serial number must be set before the rank is
                // computed, as tie-breaking may read it
                child.set_serial_no(stats.generated);
                let rank = child.primary_rank(&ctx);
                if rank.is_infinite()
                    || generated_plans[current_flaw_order] >= params.search_limit(current_flaw_order)
                {
                    continue;
                }
                if params.search_algorithm == SearchAlgorithm::IdaStar && rank > f_limit {
                    next_f_limit = next_f_limit.min(rank);
                    continue;
                }
                if !added && ctx.last_flaw_static.get() {
                    stats.num_static += 1;
                }
                added = true;
                if params.verbosity > 2 {
                    eprintln!(
                        "\nchild (id {}) with rank {:?}:\n{}",
                        child.serial_no(),
                        child.rank(&ctx),
                        fmt::display(&child, &ctx, 2)
                    );
                }
                queues[current_flaw_order].push(RankedPlan(child));
                generated_plans[current_flaw_order] += 1;
                stats.generated += 1;
            }
            if !added {
                stats.dead_ends += 1;
            }

            // quota bookkeeping and round-robin strategy switching
            let limit_reached =
                generated_plans[current_flaw_order] >= params.search_limit(current_flaw_order);
            if limit_reached || generated_plans[current_flaw_order] >= next_switch {
                if limit_reached {
                    flaw_orders_left -= 1;
                    dead_queues.push(std::mem::take(&mut queues[current_flaw_order]));
                }
                if flaw_orders_left > 0 {
                    loop {
                        current_flaw_order += 1;
                        if current_flaw_order >= n {
                            current_flaw_order = 0;
                            next_switch *= 2;
                        }
                        if generated_plans[current_flaw_order]
                            < params.search_limit(current_flaw_order)
                        {
                            break;
                        }
                    }
                    debug!("switching to flaw order {current_flaw_order}");
                }
            }

            if flaw_orders_left == 0 {
                if next_f_limit.is_finite() {
                    current = None;
                }
                break;
            }
            if generated_plans[current_flaw_order] == 0 {
                // a strategy visited for the first time starts over from
                // the initial plan
                current = initial.clone();
                generated_plans[current_flaw_order] += 1;
                stats.generated += 1;
            } else {
                current = queues[current_flaw_order].pop().map(|r| r.0);
                // a complete plan must be fully instantiated before it is
                // a solution
                let mut instantiated = params.ground_actions;
                while let Some(p) = &current {
                    if !p.complete() || instantiated {
                        break;
                    }
                    match instantiate_plan(p, &ctx) {
                        Some(grounded) => {
                            current = Some(grounded);
                            instantiated = true;
                        }
                        None => {
                            current = queues[current_flaw_order].pop().map(|r| r.0);
                        }
                    }
                }
            }
        }

        if current.as_ref().map_or(false, |p| p.complete()) {
            break;
        }
        if interrupted {
            break;
        }
        f_limit = next_f_limit;
        if f_limit.is_finite() {
            // iterative deepening: restart with the relaxed rank limit
            current = initial.clone();
        } else {
            break;
        }
    }

    if params.verbosity > 0 {
        eprintln!();
        eprint!("Plans generated: {}", stats.generated);
        if stats.num_static > 0 {
            eprint!(" [{}]", stats.generated - stats.num_static);
        }
        eprintln!();
        eprint!("Plans visited: {}", stats.visited);
        if stats.num_static > 0 {
            eprint!(" [{}]", stats.visited - stats.num_static);
        }
        eprintln!();
        eprintln!("Dead ends encountered: {}", stats.dead_ends);
    }

    let plan = current.filter(|p| p.complete());
    PlanningResult { plan, ctx, stats }
}

/// Binds every remaining schema variable of a complete plan to a
/// compatible object; `None` when no consistent full instantiation
/// exists. Returns the plan unchanged when it is already ground.
fn instantiate_plan(plan: &Rc<Plan>, ctx: &SearchContext) -> Option<Rc<Plan>> {
    let steps: Vec<Step> = plan.steps().iter().cloned().collect();
    let (bindings, changed) =
        instantiate_steps(&steps, 0, 0, (*plan.bindings()).clone(), false, ctx)?;
    if !changed {
        return Some(plan.clone());
    }
    let mut grounded = plan.successor();
    grounded.bindings = Rc::new(bindings);
    Some(grounded.build())
}

fn instantiate_steps(
    steps: &[Step],
    index: usize,
    param: usize,
    bindings: Bindings,
    changed: bool,
    ctx: &SearchContext,
) -> Option<(Bindings, bool)> {
    let step = match steps.get(index) {
        Some(s) => s,
        None => return Some((bindings, changed)),
    };
    let parameters = &step.action.parameters;
    if param >= parameters.len() {
        return instantiate_steps(steps, index + 1, 0, bindings, changed, ctx);
    }
    let v = parameters[param];
    if bindings.binding(v.into(), step.id) != Term::Variable(v) {
        return instantiate_steps(steps, index, param + 1, bindings, changed, ctx);
    }
    let objects = {
        let terms = ctx.terms.borrow();
        terms.compatible_objects(terms.variable_type(v), ctx.types())
    };
    for object in objects {
        if let Some(extended) =
            ctx.add_bindings(&bindings, &[Binding::eq(v, step.id, object.into(), 0)])
        {
            if let Some(result) = instantiate_steps(steps, index, param + 1, extended, true, ctx) {
                return Some(result);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_comparison_is_lexicographic() {
        // lower ranks are better, i.e. greater in the heap order
        assert_eq!(compare_ranks(&[1.0, 5.0], &[2.0, 0.0]), CmpOrdering::Greater);
        assert_eq!(compare_ranks(&[2.0, 0.0], &[2.0, 1.0]), CmpOrdering::Greater);
        assert_eq!(compare_ranks(&[2.0, 1.0], &[2.0, 1.0]), CmpOrdering::Equal);
        assert_eq!(
            compare_ranks(&[f32::INFINITY, 0.0], &[3.0, 9.0]),
            CmpOrdering::Less
        );
    }
}
