use weaver_model::Formula;

use crate::context::SearchContext;
use crate::flaws::OpenGoal;
use crate::graph::HeuristicValue;
use crate::plan::Plan;

/// The plan ranking function. Lower ranks are better; the comparator uses
/// the first differing component of the rank vector.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Heuristic {
    /// Flaw count: steps + open conditions + threats + unexpanded steps.
    Ucpop,
    /// Steps plus weighted open conditions.
    Soc,
    /// Steps plus the weighted additive cost of the open conditions,
    /// estimated on the relaxed reachability graph.
    Add,
    /// Weighted makespan of the current schedule.
    Makespan,
}

impl Heuristic {
    pub fn needs_planning_graph(self) -> bool {
        matches!(self, Heuristic::Add)
    }

    /// Fills the lexicographic rank vector for a plan.
    pub fn plan_rank(self, rank: &mut Vec<f32>, plan: &Plan, weight: f32, ctx: &SearchContext) {
        let steps = plan.num_steps() as f32;
        let open_conds = plan.num_open_conds() as f32;
        match self {
            Heuristic::Ucpop => {
                let flaws = open_conds
                    + plan.num_unsafes() as f32
                    + plan.num_unexpanded_steps() as f32;
                rank.push(steps + flaws);
                rank.push(open_conds);
            }
            Heuristic::Soc => {
                rank.push(steps + weight * open_conds);
                rank.push(open_conds);
            }
            Heuristic::Add => {
                let h = open_conditions_cost(plan, ctx);
                rank.push(steps + weight * h.cost);
                rank.push(h.cost);
            }
            Heuristic::Makespan => {
                let (_, _, makespan) = plan.orderings().schedule();
                rank.push(weight * makespan);
                rank.push(open_conds);
            }
        }
    }
}

/// Additive cost of all open conditions under the plan's bindings.
fn open_conditions_cost(plan: &Plan, ctx: &SearchContext) -> HeuristicValue {
    let graph = match &ctx.graph {
        Some(g) => g,
        None => return HeuristicValue::ZERO,
    };
    let bindings = Some(plan.bindings());
    let mut cost = 0.0;
    let mut makespan = 0.0f32;
    for oc in plan.open_conds().iter() {
        let value = match &oc.goal {
            OpenGoal::Literal { literal, .. } => graph.heuristic_value(
                &Formula::Literal(literal.clone()),
                oc.step_id,
                bindings,
            ),
            OpenGoal::Disjunction(disjuncts) => disjuncts
                .iter()
                .map(|d| graph.heuristic_value(d, oc.step_id, bindings))
                .fold(HeuristicValue::INFINITE, |best, v| {
                    if v.cost < best.cost {
                        v
                    } else {
                        best
                    }
                }),
            OpenGoal::Inequality { .. } => HeuristicValue::ZERO,
        };
        cost += value.cost;
        makespan = makespan.max(value.makespan);
    }
    HeuristicValue { cost, makespan }
}
