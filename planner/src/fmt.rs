//! Formatting of (partial) plans: the scheduled step listing at low
//! verbosity, the framed diagnostic dump at high verbosity.

use std::fmt::{self, Display, Formatter};

use weaver_model::{Formula, Literal, Term};

use crate::bindings::Bindings;
use crate::context::SearchContext;
use crate::flaws::OpenGoal;
use crate::plan::{Plan, Step};
use crate::GOAL_ID;

/// A plan bound to the context it was produced in, ready for display.
pub struct PlanDisplay<'a> {
    plan: &'a Plan,
    ctx: &'a SearchContext<'a>,
    verbosity: u32,
}

pub fn display<'a>(plan: &'a Plan, ctx: &'a SearchContext<'a>, verbosity: u32) -> PlanDisplay<'a> {
    PlanDisplay {
        plan,
        ctx,
        verbosity,
    }
}

/// Resolves a term through the bindings and renders it: the object's name
/// when bound, the variable otherwise.
pub fn format_term(term: Term, step_id: usize, bindings: &Bindings, ctx: &SearchContext) -> String {
    match bindings.binding(term, step_id) {
        Term::Object(o) => ctx.terms.borrow().object_name(o).to_string(),
        Term::Variable(v) => v.to_string(),
    }
}

/// Renders a step's action with its arguments resolved.
pub fn format_action(step: &Step, bindings: &Bindings, ctx: &SearchContext) -> String {
    let action = &step.action;
    if action.parameters.is_empty() {
        format!("({})", action.name)
    } else {
        let args: Vec<String> = action
            .parameters
            .iter()
            .map(|&v| format_term(v.into(), step.id, bindings, ctx))
            .collect();
        format!("({} {})", action.name, args.join(" "))
    }
}

pub fn format_literal(
    literal: &Literal,
    step_id: usize,
    bindings: &Bindings,
    ctx: &SearchContext,
) -> String {
    let atom = literal.atom();
    let name = ctx.problem.domain.predicates.name(atom.predicate);
    let inner = if atom.terms.is_empty() {
        format!("({name})")
    } else {
        let args: Vec<String> = atom
            .terms
            .iter()
            .map(|&t| format_term(t, step_id, bindings, ctx))
            .collect();
        format!("({} {})", name, args.join(" "))
    };
    if literal.is_negative() {
        format!("(not {inner})")
    } else {
        inner
    }
}

pub fn format_formula(
    formula: &Formula,
    step_id: usize,
    bindings: &Bindings,
    ctx: &SearchContext,
) -> String {
    match formula {
        Formula::Tautology => "(and)".to_string(),
        Formula::Contradiction => "(or)".to_string(),
        Formula::Literal(l) | Formula::Timed { literal: l, .. } => {
            format_literal(l, step_id, bindings, ctx)
        }
        Formula::Conj(fs) => {
            let parts: Vec<String> = fs
                .iter()
                .map(|f| format_formula(f, step_id, bindings, ctx))
                .collect();
            format!("(and {})", parts.join(" "))
        }
        Formula::Disj(fs) => {
            let parts: Vec<String> = fs
                .iter()
                .map(|f| format_formula(f, step_id, bindings, ctx))
                .collect();
            format!("(or {})", parts.join(" "))
        }
        Formula::Equality(bl) => format!(
            "(= {} {})",
            format_term(bl.variable.into(), bl.var_step_id(step_id), bindings, ctx),
            format_term(bl.term, bl.term_step_id(step_id), bindings, ctx)
        ),
        Formula::Inequality(bl) => format!(
            "(not (= {} {}))",
            format_term(bl.variable.into(), bl.var_step_id(step_id), bindings, ctx),
            format_term(bl.term, bl.term_step_id(step_id), bindings, ctx)
        ),
        Formula::Exists { body, .. } => {
            format!("(exists {})", format_formula(body, step_id, bindings, ctx))
        }
        Formula::Forall { body, .. } => {
            format!("(forall {})", format_formula(body, step_id, bindings, ctx))
        }
    }
}

fn format_open_goal(oc_step: usize, goal: &OpenGoal, bindings: &Bindings, ctx: &SearchContext) -> String {
    match goal {
        OpenGoal::Literal { literal, .. } => format_literal(literal, oc_step, bindings, ctx),
        OpenGoal::Disjunction(fs) => {
            let parts: Vec<String> = fs
                .iter()
                .map(|f| format_formula(f, oc_step, bindings, ctx))
                .collect();
            format!("(or {})", parts.join(" "))
        }
        OpenGoal::Inequality {
            variable,
            var_id,
            term,
            term_id,
        } => format!(
            "(not (= {} {}))",
            format_term((*variable).into(), *var_id, bindings, ctx),
            format_term(*term, *term_id, bindings, ctx)
        ),
    }
}

impl Display for PlanDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let plan = self.plan;
        let ctx = self.ctx;
        let bindings = plan.bindings();
        let (starts, ends, makespan) = plan.orderings().schedule();

        let mut init = None;
        let mut goal = None;
        let mut ordered: Vec<&Step> = Vec::new();
        for step in plan.steps().iter() {
            if step.id == 0 {
                init = Some(step);
            } else if step.id == GOAL_ID {
                goal = Some(step);
            } else {
                ordered.push(step);
            }
        }
        ordered.sort_by(|a, b| {
            let ta = starts.get(&a.id).copied().unwrap_or(0.0);
            let tb = starts.get(&b.id).copied().unwrap_or(0.0);
            ta.total_cmp(&tb).then(a.id.cmp(&b.id))
        });

        if self.verbosity < 2 {
            write!(f, "Makespan: {makespan}")?;
            for step in &ordered {
                if step.action.is_dummy() {
                    continue;
                }
                let start = starts.get(&step.id).copied().unwrap_or(0.0);
                write!(f, "\n{}:{}", start, format_action(step, bindings, ctx))?;
                if step.action.durative {
                    let end = ends.get(&step.id).copied().unwrap_or(start);
                    write!(f, "[{}]", end - start)?;
                }
            }
            return Ok(());
        }

        // framed diagnostic listing
        write!(f, "Initial  :")?;
        if let Some(init) = init {
            for effect in &init.action.effects {
                write!(f, " {}", format_literal(&effect.literal, 0, bindings, ctx))?;
            }
        }
        let mut with_goal = ordered.clone();
        if let Some(goal) = goal {
            with_goal.push(goal);
        }
        for step in with_goal {
            if step.id == GOAL_ID {
                write!(f, "\n\nGoal     :")?;
            } else {
                write!(
                    f,
                    "\n\nStep {:<4}: {}",
                    step.id,
                    format_action(step, bindings, ctx)
                )?;
                for threat in plan.mutex_threats().iter() {
                    if let crate::flaws::MutexThreat::Threat {
                        step_id1, step_id2, ..
                    } = threat
                    {
                        if *step_id1 == step.id {
                            write!(f, " <{step_id2}>")?;
                        } else if *step_id2 == step.id {
                            write!(f, " <{step_id1}>")?;
                        }
                    }
                }
            }
            for link in plan.links().iter() {
                if link.to_id != step.id {
                    continue;
                }
                write!(
                    f,
                    "\n          {:<4} -> {}",
                    link.from_id,
                    format_literal(&link.condition, link.to_id, bindings, ctx)
                )?;
                for unsafe_ in plan.unsafes().iter() {
                    if unsafe_.link == *link {
                        write!(f, " <{}>", unsafe_.step_id)?;
                    }
                }
            }
            for oc in plan.open_conds().iter() {
                if oc.step_id == step.id {
                    write!(
                        f,
                        "\n            ?? -> {}",
                        format_open_goal(oc.step_id, &oc.goal, bindings, ctx)
                    )?;
                }
            }
        }
        write!(f, "\nmakespan = {makespan}")?;
        write!(f, "\nbindings =")?;
        for step in plan.steps().iter() {
            if step.id == 0 || step.id == GOAL_ID || step.action.parameters.is_empty() {
                continue;
            }
            let args: Vec<String> = step
                .action
                .parameters
                .iter()
                .map(|&v| {
                    format!(
                        "{}={}",
                        v,
                        format_term(v.into(), step.id, bindings, ctx)
                    )
                })
                .collect();
            write!(f, "\n  step {}: {}", step.id, args.join(" "))?;
        }
        Ok(())
    }
}
