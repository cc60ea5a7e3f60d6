use std::cell::{Cell, OnceCell};
use std::rc::Rc;

use rand::Rng;
use weaver_collections::Chain;
use weaver_model::{
    Action, BindingLiteral, Effect, Formula, StepTime, SubstMap, Term,
};

use crate::bindings::{Binding, BindingList, Bindings};
use crate::context::SearchContext;
use crate::decomposition::{DecompositionFrame, DecompositionLink};
use crate::flaws::{Flaw, MutexThreat, OpenCondition, OpenGoal, UnexpandedStep, Unsafe};
use crate::links::Link;
use crate::orderings::{BinaryOrderings, Ordering, Orderings, TemporalOrderings};
use crate::selection::FlawSelectionOrder;
use crate::GOAL_ID;

/// A plan step: an id and the (possibly lifted) action it performs.
/// Several plans share the same action value through the `Rc`.
#[derive(Clone, Debug)]
pub struct Step {
    pub id: usize,
    pub action: Rc<Action>,
}

impl PartialEq for Step {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// An immutable partial plan: shared chains of steps, causal links and
/// flaws, plus reference-counted orderings and bindings.
///
/// Plans are constructed only by the refinement generators (and
/// [`Plan::initial`]); the lazily computed rank vector and the serial
/// number are the sole mutable fields.
pub struct Plan {
    steps: Chain<Step>,
    num_steps: usize,
    links: Chain<Link>,
    num_links: usize,
    orderings: Rc<Orderings>,
    bindings: Rc<Bindings>,
    decomposition_frames: Chain<DecompositionFrame>,
    num_decomposition_frames: usize,
    decomposition_links: Chain<DecompositionLink>,
    num_decomposition_links: usize,
    unsafes: Chain<Unsafe>,
    num_unsafes: usize,
    open_conds: Chain<OpenCondition>,
    num_open_conds: usize,
    unexpanded_steps: Chain<UnexpandedStep>,
    num_unexpanded_steps: usize,
    mutex_threats: Chain<MutexThreat>,
    rank: OnceCell<Vec<f32>>,
    serial_no: Cell<usize>,
}

/// All fields of a child plan under construction. Starts as a copy of the
/// parent (sharing every chain) and is edited by the generator before
/// `build`.
pub(crate) struct PlanBuilder {
    pub steps: Chain<Step>,
    pub num_steps: usize,
    pub links: Chain<Link>,
    pub num_links: usize,
    pub orderings: Rc<Orderings>,
    pub bindings: Rc<Bindings>,
    pub decomposition_frames: Chain<DecompositionFrame>,
    pub num_decomposition_frames: usize,
    pub decomposition_links: Chain<DecompositionLink>,
    pub num_decomposition_links: usize,
    pub unsafes: Chain<Unsafe>,
    pub num_unsafes: usize,
    pub open_conds: Chain<OpenCondition>,
    pub num_open_conds: usize,
    pub unexpanded_steps: Chain<UnexpandedStep>,
    pub num_unexpanded_steps: usize,
    pub mutex_threats: Chain<MutexThreat>,
}

impl PlanBuilder {
    pub fn build(self) -> Rc<Plan> {
        debug_assert_eq!(self.num_links, self.links.len());
        debug_assert_eq!(self.num_unsafes, self.unsafes.len());
        debug_assert_eq!(self.num_unexpanded_steps, self.unexpanded_steps.len());
        Rc::new(Plan {
            steps: self.steps,
            num_steps: self.num_steps,
            links: self.links,
            num_links: self.num_links,
            orderings: self.orderings,
            bindings: self.bindings,
            decomposition_frames: self.decomposition_frames,
            num_decomposition_frames: self.num_decomposition_frames,
            decomposition_links: self.decomposition_links,
            num_decomposition_links: self.num_decomposition_links,
            unsafes: self.unsafes,
            num_unsafes: self.num_unsafes,
            open_conds: self.open_conds,
            num_open_conds: self.num_open_conds,
            unexpanded_steps: self.unexpanded_steps,
            num_unexpanded_steps: self.num_unexpanded_steps,
            mutex_threats: self.mutex_threats,
            rank: OnceCell::new(),
            serial_no: Cell::new(0),
        })
    }
}

/// Unrolls a goal formula into open conditions and binding constraints.
/// Returns false iff the goal is inconsistent.
///
/// Conjunctions are worked through a stack; with `random_open_conditions`
/// each subgoal is inserted at a uniformly random stack position.
pub(crate) fn add_goal(
    ctx: &SearchContext,
    open_conds: &mut Chain<OpenCondition>,
    num_open_conds: &mut usize,
    new_bindings: &mut BindingList,
    goal: &Formula,
    step_id: usize,
    test_only: bool,
) -> bool {
    fn push_goal(ctx: &SearchContext, stack: &mut Vec<Formula>, f: Formula) {
        if ctx.params.random_open_conditions {
            let pos = ctx.rng.borrow_mut().gen_range(0..=stack.len());
            if pos == stack.len() {
                stack.push(f);
            } else {
                let displaced = std::mem::replace(&mut stack[pos], f);
                stack.push(displaced);
            }
        } else {
            stack.push(f);
        }
    }

    if goal.is_tautology() {
        return true;
    }
    if goal.is_contradiction() {
        return false;
    }
    let mut stack = vec![goal.clone()];
    while let Some(f) = stack.pop() {
        match f {
            Formula::Tautology => {}
            Formula::Contradiction => return false,
            Formula::Literal(literal) => {
                let stripped = ctx.params.strip_static_preconditions
                    && ctx.static_predicate(literal.predicate());
                if !test_only && !stripped {
                    *open_conds = open_conds.cons(OpenCondition {
                        step_id,
                        goal: OpenGoal::Literal {
                            literal,
                            when: weaver_model::FormulaTime::AtStart,
                        },
                    });
                }
                *num_open_conds += 1;
            }
            Formula::Timed { when, literal } => {
                let stripped = ctx.params.strip_static_preconditions
                    && ctx.static_predicate(literal.predicate());
                if !test_only && !stripped {
                    *open_conds = open_conds.cons(OpenCondition {
                        step_id,
                        goal: OpenGoal::Literal { literal, when },
                    });
                }
                *num_open_conds += 1;
            }
            Formula::Conj(fs) => {
                for g in fs {
                    push_goal(ctx, &mut stack, g);
                }
            }
            Formula::Disj(fs) => {
                if !test_only {
                    *open_conds = open_conds.cons(OpenCondition {
                        step_id,
                        goal: OpenGoal::Disjunction(fs),
                    });
                }
                *num_open_conds += 1;
            }
            Formula::Equality(bl) => {
                new_bindings.push(Binding::eq(
                    bl.variable,
                    bl.var_step_id(step_id),
                    bl.term,
                    bl.term_step_id(step_id),
                ));
            }
            Formula::Inequality(bl) => {
                if ctx.params.branch_on_inequality && bl.term.is_variable() {
                    if !test_only {
                        *open_conds = open_conds.cons(OpenCondition {
                            step_id,
                            goal: OpenGoal::Inequality {
                                variable: bl.variable,
                                var_id: bl.var_step_id(step_id),
                                term: bl.term,
                                term_id: bl.term_step_id(step_id),
                            },
                        });
                    }
                    *num_open_conds += 1;
                } else {
                    new_bindings.push(Binding::neq(
                        bl.variable,
                        bl.var_step_id(step_id),
                        bl.term,
                        bl.term_step_id(step_id),
                    ));
                }
            }
            Formula::Exists { body, .. } => push_goal(ctx, &mut stack, *body),
            Formula::Forall { ref params, ref body } => {
                let expanded = {
                    let terms = ctx.terms.borrow();
                    Formula::universal_base(params, body, &terms, ctx.types())
                };
                push_goal(ctx, &mut stack, expanded);
            }
        }
    }
    true
}

/// Finds threats to one link among all steps.
pub(crate) fn link_threats(
    ctx: &SearchContext,
    unsafes: &mut Chain<Unsafe>,
    num_unsafes: &mut usize,
    link: &Link,
    steps: &Chain<Step>,
    orderings: &Orderings,
    bindings: &Bindings,
) {
    let lt1 = link.effect_time;
    let lt2 = link.condition_time.end_time();
    for s in steps.iter() {
        if !orderings.possibly_not_after(link.from_id, lt1, s.id, StepTime::End)
            || !orderings.possibly_not_before(link.to_id, lt2, s.id, StepTime::Start)
        {
            continue;
        }
        for (ei, e) in s.action.effects.iter().enumerate() {
            if !ctx.durative() && e.link_condition.is_contradiction() {
                continue;
            }
            let et = e.end_time();
            if (s.id == link.to_id && et >= lt2)
                || !orderings.possibly_not_after(link.from_id, lt1, s.id, et)
                || !orderings.possibly_not_before(link.to_id, lt2, s.id, et)
            {
                continue;
            }
            if !link.condition.is_negative() && link.from_id == s.id && lt1 == et {
                // a step does not threaten its own positive contribution
                continue;
            }
            let mut mgu = BindingList::new();
            if ctx.affects(bindings, &mut mgu, &e.literal, s.id, &link.condition, link.to_id) {
                *unsafes = unsafes.cons(Unsafe {
                    link: link.clone(),
                    step_id: s.id,
                    effect: ei,
                });
                *num_unsafes += 1;
            }
        }
    }
}

/// Finds links threatened by one step, the converse scan.
pub(crate) fn step_threats(
    ctx: &SearchContext,
    unsafes: &mut Chain<Unsafe>,
    num_unsafes: &mut usize,
    step: &Step,
    links: &Chain<Link>,
    orderings: &Orderings,
    bindings: &Bindings,
) {
    for link in links.iter() {
        let lt1 = link.effect_time;
        let lt2 = link.condition_time.end_time();
        if !orderings.possibly_not_after(link.from_id, lt1, step.id, StepTime::End)
            || !orderings.possibly_not_before(link.to_id, lt2, step.id, StepTime::Start)
        {
            continue;
        }
        for (ei, e) in step.action.effects.iter().enumerate() {
            if !ctx.durative() && e.link_condition.is_contradiction() {
                continue;
            }
            let et = e.end_time();
            if (step.id == link.to_id && et >= lt2)
                || !orderings.possibly_not_after(link.from_id, lt1, step.id, et)
                || !orderings.possibly_not_before(link.to_id, lt2, step.id, et)
            {
                continue;
            }
            if !link.condition.is_negative() && link.from_id == step.id && lt1 == et {
                continue;
            }
            let mut mgu = BindingList::new();
            if ctx.affects(bindings, &mut mgu, &e.literal, step.id, &link.condition, link.to_id) {
                *unsafes = unsafes.cons(Unsafe {
                    link: link.clone(),
                    step_id: step.id,
                    effect: ei,
                });
                *num_unsafes += 1;
            }
        }
    }
}

/// Finds mutex threats between one step and all others: pairs of possibly
/// concurrent effects whose atoms unify.
pub(crate) fn mutex_scan(
    ctx: &SearchContext,
    threats: &mut Chain<MutexThreat>,
    step: &Step,
    steps: &Chain<Step>,
    orderings: &Orderings,
    bindings: &Bindings,
) {
    use weaver_model::EffectTime;
    for s in steps.iter() {
        let (ss, se, es, ee) = match orderings.possibly_concurrent(step.id, s.id) {
            Some(flags) => flags,
            None => continue,
        };
        for (i, e) in step.action.effects.iter().enumerate() {
            match e.when {
                EffectTime::AtStart if !ss && !se => continue,
                EffectTime::AtEnd if !es && !ee => continue,
                _ => {}
            }
            for (j, e2) in s.action.effects.iter().enumerate() {
                let applicable = match (e.when, e2.when) {
                    (EffectTime::AtStart, EffectTime::AtStart) => ss,
                    (EffectTime::AtStart, EffectTime::AtEnd) => se,
                    (EffectTime::AtEnd, EffectTime::AtStart) => es,
                    (EffectTime::AtEnd, EffectTime::AtEnd) => ee,
                };
                if !applicable {
                    continue;
                }
                let mut mgu = BindingList::new();
                if ctx.unify_atoms(bindings, &mut mgu, e.literal.atom(), step.id, e2.literal.atom(), s.id) {
                    *threats = threats.cons(MutexThreat::Threat {
                        step_id1: step.id,
                        effect1: i,
                        step_id2: s.id,
                        effect2: j,
                    });
                }
            }
        }
    }
}

impl Plan {
    /// The initial plan for the problem in the context, or `None` when the
    /// goal itself is inconsistent.
    pub fn initial(ctx: &SearchContext) -> Option<Rc<Plan>> {
        let mut open_conds = Chain::new();
        let mut num_open_conds = 0;
        let mut goal_bindings = BindingList::new();
        if !add_goal(
            ctx,
            &mut open_conds,
            &mut num_open_conds,
            &mut goal_bindings,
            &ctx.goal_action.condition.clone(),
            GOAL_ID,
            false,
        ) {
            return None;
        }
        let bindings = ctx.add_bindings(&Bindings::new(), &goal_bindings)?;

        let mut steps = Chain::new()
            .cons(Step {
                id: GOAL_ID,
                action: ctx.goal_action.clone(),
            })
            .cons(Step {
                id: 0,
                action: ctx.init_action.clone(),
            });
        let mut num_steps = 0;

        let orderings = if ctx.durative() {
            let mut temporal = TemporalOrderings::new();
            for (time, action) in &ctx.timed_actions {
                num_steps += 1;
                let step = Step {
                    id: num_steps,
                    action: action.clone(),
                };
                temporal = temporal.add_step(&step)?.pin_step(num_steps, *time)?;
                steps = steps.cons(step);
            }
            Orderings::Temporal(temporal)
        } else {
            Orderings::Binary(BinaryOrderings::new())
        };

        let mutex_threats = Chain::new().cons(MutexThreat::Recheck);

        Some(
            PlanBuilder {
                steps,
                num_steps,
                links: Chain::new(),
                num_links: 0,
                orderings: Rc::new(orderings),
                bindings: Rc::new(bindings),
                decomposition_frames: Chain::new(),
                num_decomposition_frames: 0,
                decomposition_links: Chain::new(),
                num_decomposition_links: 0,
                unsafes: Chain::new(),
                num_unsafes: 0,
                open_conds,
                num_open_conds,
                unexpanded_steps: Chain::new(),
                num_unexpanded_steps: 0,
                mutex_threats,
            }
            .build(),
        )
    }

    // Read-only accessors.

    pub fn steps(&self) -> &Chain<Step> {
        &self.steps
    }
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }
    pub fn links(&self) -> &Chain<Link> {
        &self.links
    }
    pub fn num_links(&self) -> usize {
        self.num_links
    }
    pub fn orderings(&self) -> &Orderings {
        &self.orderings
    }
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }
    pub fn decomposition_frames(&self) -> &Chain<DecompositionFrame> {
        &self.decomposition_frames
    }
    pub fn num_decomposition_frames(&self) -> usize {
        self.num_decomposition_frames
    }
    pub fn decomposition_links(&self) -> &Chain<DecompositionLink> {
        &self.decomposition_links
    }
    pub fn num_decomposition_links(&self) -> usize {
        self.num_decomposition_links
    }
    pub fn unsafes(&self) -> &Chain<Unsafe> {
        &self.unsafes
    }
    pub fn num_unsafes(&self) -> usize {
        self.num_unsafes
    }
    pub fn open_conds(&self) -> &Chain<OpenCondition> {
        &self.open_conds
    }
    pub fn num_open_conds(&self) -> usize {
        self.num_open_conds
    }
    pub fn unexpanded_steps(&self) -> &Chain<UnexpandedStep> {
        &self.unexpanded_steps
    }
    pub fn num_unexpanded_steps(&self) -> usize {
        self.num_unexpanded_steps
    }
    pub fn mutex_threats(&self) -> &Chain<MutexThreat> {
        &self.mutex_threats
    }

    /// The step with the given id.
    pub fn step(&self, id: usize) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    fn effect(&self, step_id: usize, index: usize) -> &Effect {
        let step = self.step(step_id).expect("flaw references unknown step");
        &step.action.effects[index]
    }

    /// A plan is complete iff it has no flaw of any kind left.
    pub fn complete(&self) -> bool {
        self.unsafes.is_empty()
            && self.open_conds.is_empty()
            && self.mutex_threats.is_empty()
            && self.unexpanded_steps.is_empty()
    }

    /// The primary rank; lower is better. Computed lazily, cached for the
    /// plan's lifetime.
    pub fn primary_rank(&self, ctx: &SearchContext) -> f32 {
        self.rank(ctx)[0]
    }

    pub fn rank(&self, ctx: &SearchContext) -> &[f32] {
        self.rank.get_or_init(|| {
            let mut rank = Vec::with_capacity(2);
            ctx.params
                .heuristic
                .plan_rank(&mut rank, self, ctx.params.weight, ctx);
            rank
        })
    }

    /// The cached rank vector; only available once `rank` has run.
    pub fn cached_rank(&self) -> Option<&[f32]> {
        self.rank.get().map(|r| r.as_slice())
    }

    pub fn serial_no(&self) -> usize {
        self.serial_no.get()
    }

    pub fn set_serial_no(&self, serial: usize) {
        self.serial_no.set(serial);
    }

    pub(crate) fn successor(&self) -> PlanBuilder {
        PlanBuilder {
            steps: self.steps.clone(),
            num_steps: self.num_steps,
            links: self.links.clone(),
            num_links: self.num_links,
            orderings: self.orderings.clone(),
            bindings: self.bindings.clone(),
            decomposition_frames: self.decomposition_frames.clone(),
            num_decomposition_frames: self.num_decomposition_frames,
            decomposition_links: self.decomposition_links.clone(),
            num_decomposition_links: self.num_decomposition_links,
            unsafes: self.unsafes.clone(),
            num_unsafes: self.num_unsafes,
            open_conds: self.open_conds.clone(),
            num_open_conds: self.num_open_conds,
            unexpanded_steps: self.unexpanded_steps.clone(),
            num_unexpanded_steps: self.num_unexpanded_steps,
            mutex_threats: self.mutex_threats.clone(),
        }
    }

    /// Picks the next flaw to repair and records whether it was a static
    /// open condition.
    pub fn get_flaw(&self, ctx: &SearchContext, order: &FlawSelectionOrder) -> Flaw {
        let flaw = order.select(self, ctx);
        if !ctx.params.ground_actions {
            let is_static = matches!(
                &flaw,
                Flaw::OpenCondition(oc) if oc.is_static(ctx.problem)
            );
            ctx.last_flaw_static.set(is_static);
        }
        flaw
    }

    /// All children repairing the flaw selected by `order`.
    pub fn refinements(&self, ctx: &SearchContext, order: &FlawSelectionOrder) -> Vec<Rc<Plan>> {
        let flaw = self.get_flaw(ctx, order);
        let mut plans = Vec::new();
        match flaw {
            Flaw::Unsafe(u) => self.handle_unsafe(ctx, &mut plans, &u),
            Flaw::OpenCondition(oc) => self.handle_open_condition(ctx, &mut plans, &oc),
            Flaw::Unexpanded(u) => self.handle_unexpanded(ctx, &mut plans, &u),
            Flaw::MutexThreat(m) => self.handle_mutex_threat(ctx, &mut plans, &m),
        }
        plans
    }

    // ------------------------------------------------------------------
    // Threatened links

    fn handle_unsafe(&self, ctx: &SearchContext, plans: &mut Vec<Rc<Plan>>, u: &Unsafe) {
        let link = &u.link;
        let lt1 = link.effect_time;
        let lt2 = link.condition_time.end_time();
        let effect = self.effect(u.step_id, u.effect);
        let et = effect.end_time();
        let mut unifier = BindingList::new();
        if self.orderings.possibly_not_after(link.from_id, lt1, u.step_id, et)
            && self.orderings.possibly_not_before(link.to_id, lt2, u.step_id, et)
            && ctx.affects(
                &self.bindings,
                &mut unifier,
                &effect.literal,
                u.step_id,
                &link.condition,
                link.to_id,
            )
        {
            self.separate_unsafe(ctx, plans, u, &unifier, false);
            self.promote_unsafe(ctx, plans, u, false);
            self.demote_unsafe(ctx, plans, u, false);
        } else {
            // bogus flaw: it cannot fire under the current constraints
            let mut child = self.successor();
            child.unsafes = self.unsafes.remove(u);
            child.num_unsafes -= 1;
            plans.push(child.build());
        }
    }

    /// The number of ways the threat could be separated, without
    /// materializing plans.
    pub fn separable(&self, ctx: &SearchContext, u: &Unsafe) -> usize {
        let link = &u.link;
        let lt1 = link.effect_time;
        let lt2 = link.condition_time.end_time();
        let effect = self.effect(u.step_id, u.effect);
        let et = effect.end_time();
        let mut unifier = BindingList::new();
        if self.orderings.possibly_not_after(link.from_id, lt1, u.step_id, et)
            && self.orderings.possibly_not_before(link.to_id, lt2, u.step_id, et)
            && ctx.affects(
                &self.bindings,
                &mut unifier,
                &effect.literal,
                u.step_id,
                &link.condition,
                link.to_id,
            )
        {
            let mut scratch = Vec::new();
            self.separate_unsafe(ctx, &mut scratch, u, &unifier, true)
        } else {
            0
        }
    }

    /// Counts the refinements of a threat; true iff they do not exceed
    /// `limit`. Partial counts are cached in the `Option` slots.
    #[allow(clippy::too_many_arguments)]
    pub fn unsafe_refinements(
        &self,
        ctx: &SearchContext,
        refinements: &mut Option<usize>,
        separable: &mut Option<usize>,
        promotable: &mut Option<usize>,
        demotable: &mut Option<usize>,
        u: &Unsafe,
        limit: usize,
    ) -> bool {
        if let Some(r) = *refinements {
            return r <= limit;
        }
        let link = &u.link;
        let lt1 = link.effect_time;
        let lt2 = link.condition_time.end_time();
        let effect = self.effect(u.step_id, u.effect);
        let et = effect.end_time();
        let mut unifier = BindingList::new();
        if self.orderings.possibly_not_after(link.from_id, lt1, u.step_id, et)
            && self.orderings.possibly_not_before(link.to_id, lt2, u.step_id, et)
            && ctx.affects(
                &self.bindings,
                &mut unifier,
                &effect.literal,
                u.step_id,
                &link.condition,
                link.to_id,
            )
        {
            let mut scratch = Vec::new();
            let mut count = 0;
            if separable.is_none() {
                *separable = Some(self.separate_unsafe(ctx, &mut scratch, u, &unifier, true));
            }
            count += separable.unwrap();
            if count <= limit {
                if promotable.is_none() {
                    *promotable = Some(self.promote_unsafe(ctx, &mut scratch, u, true));
                }
                count += promotable.unwrap();
                if count <= limit {
                    if demotable.is_none() {
                        *demotable = Some(self.demote_unsafe(ctx, &mut scratch, u, true));
                    }
                    let total = count + demotable.unwrap();
                    *refinements = Some(total);
                    return total <= limit;
                }
            }
            false
        } else {
            *separable = Some(0);
            *promotable = Some(0);
            *demotable = Some(0);
            *refinements = Some(1);
            1 <= limit
        }
    }

    /// Repairs a threat by constraining the threatening effect away from
    /// the link: a disjunction of unifier inequalities and the negated
    /// effect condition becomes a new goal.
    fn separate_unsafe(
        &self,
        ctx: &SearchContext,
        plans: &mut Vec<Rc<Plan>>,
        u: &Unsafe,
        unifier: &BindingList,
        test_only: bool,
    ) -> usize {
        let effect = self.effect(u.step_id, u.effect).clone();
        let mut disjuncts = Vec::new();
        for subst in unifier.iter() {
            if effect.quantifies(subst.variable) {
                continue;
            }
            if self.bindings.consistent_with_inequality(
                subst.variable,
                subst.var_id,
                subst.term,
                subst.term_id,
            ) {
                disjuncts.push(Formula::Inequality(BindingLiteral {
                    variable: subst.variable,
                    var_step: Some(subst.var_id),
                    term: subst.term,
                    term_step: Some(subst.term_id),
                }));
            }
        }
        if !effect.condition.is_tautology() {
            let negated = effect.condition.negated();
            let quantified = if effect.parameters.is_empty() {
                negated
            } else if test_only {
                Formula::Forall {
                    params: effect.parameters.clone(),
                    body: Box::new(negated),
                }
            } else {
                let mut subst = SubstMap::new();
                let mut fresh = Vec::with_capacity(effect.parameters.len());
                for &vi in &effect.parameters {
                    let v = ctx.fresh_variable(ctx.variable_type(vi));
                    subst.insert(vi, v.into());
                    fresh.push(v);
                }
                let body = negated.substitute(&subst);
                if body.is_tautology() || body.is_contradiction() {
                    body
                } else {
                    Formula::Forall {
                        params: fresh,
                        body: Box::new(body),
                    }
                }
            };
            disjuncts.push(quantified);
        }
        let goal = Formula::or(disjuncts);

        let mut new_open_conds = if test_only { Chain::new() } else { self.open_conds.clone() };
        let mut new_num_open_conds = if test_only { 0 } else { self.num_open_conds };
        let mut new_bindings = BindingList::new();
        let added = add_goal(
            ctx,
            &mut new_open_conds,
            &mut new_num_open_conds,
            &mut new_bindings,
            &goal,
            u.step_id,
            test_only,
        );
        let mut count = 0;
        if added {
            if let Some(bindings) = ctx.add_bindings(&self.bindings, &new_bindings) {
                if !test_only {
                    let mut orderings = (*self.orderings).clone();
                    let mut consistent = true;
                    if !goal.is_tautology() && self.orderings.is_temporal() {
                        if let Some(graph) = &ctx.graph {
                            let bound = if ctx.params.ground_actions { None } else { Some(&bindings) };
                            let hv = graph.heuristic_value(&goal, u.step_id, bound);
                            match orderings.refine_bounds(u.step_id, hv.makespan, hv.makespan) {
                                Some(o) => orderings = o,
                                None => consistent = false,
                            }
                        }
                    }
                    if consistent {
                        let mut child = self.successor();
                        child.orderings = Rc::new(orderings);
                        child.bindings = Rc::new(bindings);
                        child.unsafes = self.unsafes.remove(u);
                        child.num_unsafes -= 1;
                        child.open_conds = new_open_conds;
                        child.num_open_conds = new_num_open_conds;
                        plans.push(child.build());
                    }
                }
                count += 1;
            }
        }
        count
    }

    /// Repairs a threat by ordering the threatening step before the link's
    /// producer.
    fn demote_unsafe(
        &self,
        ctx: &SearchContext,
        plans: &mut Vec<Rc<Plan>>,
        u: &Unsafe,
        test_only: bool,
    ) -> usize {
        let link = &u.link;
        let lt1 = link.effect_time;
        let et = self.effect(u.step_id, u.effect).end_time();
        if self.orderings.possibly_before(u.step_id, et, link.from_id, lt1) {
            if !test_only {
                self.new_ordering_for_unsafe(ctx, plans, u.step_id, et, link.from_id, lt1, u);
            }
            1
        } else {
            0
        }
    }

    /// Repairs a threat by ordering the threatening step after the link's
    /// consumer.
    fn promote_unsafe(
        &self,
        ctx: &SearchContext,
        plans: &mut Vec<Rc<Plan>>,
        u: &Unsafe,
        test_only: bool,
    ) -> usize {
        let link = &u.link;
        let lt2 = link.condition_time.end_time();
        let et = self.effect(u.step_id, u.effect).end_time();
        if self.orderings.possibly_before(link.to_id, lt2, u.step_id, et) {
            if !test_only {
                self.new_ordering_for_unsafe(ctx, plans, link.to_id, lt2, u.step_id, et, u);
            }
            1
        } else {
            0
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn new_ordering_for_unsafe(
        &self,
        _ctx: &SearchContext,
        plans: &mut Vec<Rc<Plan>>,
        before_id: usize,
        t1: StepTime,
        after_id: usize,
        t2: StepTime,
        u: &Unsafe,
    ) {
        if let Some(orderings) = self.orderings.refine(Ordering::new(before_id, t1, after_id, t2)) {
            let mut child = self.successor();
            child.orderings = Rc::new(orderings);
            child.unsafes = self.unsafes.remove(u);
            child.num_unsafes -= 1;
            plans.push(child.build());
        }
    }

    // ------------------------------------------------------------------
    // Mutex threats

    fn handle_mutex_threat(&self, ctx: &SearchContext, plans: &mut Vec<Rc<Plan>>, m: &MutexThreat) {
        let (step_id1, effect1, step_id2, effect2) = match m {
            MutexThreat::Recheck => {
                // recomputation pass: reissue the plan with a freshly
                // scanned mutex chain
                let mut threats = Chain::new();
                for s in self.steps.iter() {
                    mutex_scan(ctx, &mut threats, s, &self.steps, &self.orderings, &self.bindings);
                }
                let mut child = self.successor();
                child.mutex_threats = threats;
                plans.push(child.build());
                return;
            }
            MutexThreat::Threat {
                step_id1,
                effect1,
                step_id2,
                effect2,
            } => (*step_id1, *effect1, *step_id2, *effect2),
        };
        let e1 = self.effect(step_id1, effect1);
        let e2 = self.effect(step_id2, effect2);
        let et1 = e1.end_time();
        let et2 = e2.end_time();
        let mut unifier = BindingList::new();
        if self.orderings.possibly_not_before(step_id1, et1, step_id2, et2)
            && self.orderings.possibly_not_after(step_id1, et1, step_id2, et2)
            && ctx.unify_atoms(
                &self.bindings,
                &mut unifier,
                e1.literal.atom(),
                step_id1,
                e2.literal.atom(),
                step_id2,
            )
        {
            self.separate_mutex(ctx, plans, m, step_id1, effect1, step_id2, effect2, &unifier);
            self.promote_mutex(ctx, plans, m, step_id1, effect1, step_id2, effect2);
            self.demote_mutex(ctx, plans, m, step_id1, effect1, step_id2, effect2);
        } else {
            // bogus flaw
            let mut child = self.successor();
            child.mutex_threats = self.mutex_threats.remove(m);
            plans.push(child.build());
        }
    }

    /// Repairs a mutex threat by separating the two effects: inequalities
    /// over their unifier, or the negation of either effect's condition.
    #[allow(clippy::too_many_arguments)]
    fn separate_mutex(
        &self,
        ctx: &SearchContext,
        plans: &mut Vec<Rc<Plan>>,
        m: &MutexThreat,
        step_id1: usize,
        effect1: usize,
        step_id2: usize,
        effect2: usize,
        unifier: &BindingList,
    ) {
        let e1 = self.effect(step_id1, effect1).clone();
        let e2 = self.effect(step_id2, effect2).clone();
        if !unifier.is_empty() {
            let mut disjuncts = Vec::new();
            for subst in unifier.iter() {
                if e1.quantifies(subst.variable) || e2.quantifies(subst.variable) {
                    continue;
                }
                if self.bindings.consistent_with_inequality(
                    subst.variable,
                    subst.var_id,
                    subst.term,
                    subst.term_id,
                ) {
                    disjuncts.push(Formula::Inequality(BindingLiteral {
                        variable: subst.variable,
                        var_step: Some(subst.var_id),
                        term: subst.term,
                        term_step: Some(subst.term_id),
                    }));
                }
            }
            let goal = Formula::or(disjuncts);
            let mut new_open_conds = self.open_conds.clone();
            let mut new_num_open_conds = self.num_open_conds;
            let mut new_bindings = BindingList::new();
            if add_goal(
                ctx,
                &mut new_open_conds,
                &mut new_num_open_conds,
                &mut new_bindings,
                &goal,
                0,
                false,
            ) {
                if let Some(bindings) = ctx.add_bindings(&self.bindings, &new_bindings) {
                    let mut child = self.successor();
                    child.bindings = Rc::new(bindings);
                    child.open_conds = new_open_conds;
                    child.num_open_conds = new_num_open_conds;
                    child.mutex_threats = self.mutex_threats.remove(m);
                    plans.push(child.build());
                }
            }
        }
        for (step_id, effect) in [(step_id1, &e1), (step_id2, &e2)] {
            if effect.condition.is_tautology() {
                continue;
            }
            let negated = effect.condition.negated();
            let goal = if effect.parameters.is_empty() {
                negated
            } else {
                let mut subst = SubstMap::new();
                let mut fresh = Vec::with_capacity(effect.parameters.len());
                for &vi in &effect.parameters {
                    let v = ctx.fresh_variable(ctx.variable_type(vi));
                    subst.insert(vi, v.into());
                    fresh.push(v);
                }
                let body = negated.substitute(&subst);
                if body.is_tautology() || body.is_contradiction() {
                    body
                } else {
                    Formula::Forall {
                        params: fresh,
                        body: Box::new(body),
                    }
                }
            };
            let mut new_open_conds = self.open_conds.clone();
            let mut new_num_open_conds = self.num_open_conds;
            let mut new_bindings = BindingList::new();
            if !add_goal(
                ctx,
                &mut new_open_conds,
                &mut new_num_open_conds,
                &mut new_bindings,
                &goal,
                step_id,
                false,
            ) {
                continue;
            }
            let bindings = match ctx.add_bindings(&self.bindings, &new_bindings) {
                Some(b) => b,
                None => continue,
            };
            let mut orderings = (*self.orderings).clone();
            if !goal.is_tautology() && self.orderings.is_temporal() {
                if let Some(graph) = &ctx.graph {
                    let bound = if ctx.params.ground_actions { None } else { Some(&bindings) };
                    let hv = graph.heuristic_value(&goal, step_id, bound);
                    match orderings.refine_bounds(step_id, hv.makespan, hv.makespan) {
                        Some(o) => orderings = o,
                        None => continue,
                    }
                }
            }
            let mut child = self.successor();
            child.orderings = Rc::new(orderings);
            child.bindings = Rc::new(bindings);
            child.open_conds = new_open_conds;
            child.num_open_conds = new_num_open_conds;
            child.mutex_threats = self.mutex_threats.remove(m);
            plans.push(child.build());
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn demote_mutex(
        &self,
        _ctx: &SearchContext,
        plans: &mut Vec<Rc<Plan>>,
        m: &MutexThreat,
        step_id1: usize,
        effect1: usize,
        step_id2: usize,
        effect2: usize,
    ) {
        let et1 = self.effect(step_id1, effect1).end_time();
        let et2 = self.effect(step_id2, effect2).end_time();
        if self.orderings.possibly_before(step_id1, et1, step_id2, et2) {
            self.new_ordering_for_mutex(plans, step_id1, et1, step_id2, et2, m);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn promote_mutex(
        &self,
        _ctx: &SearchContext,
        plans: &mut Vec<Rc<Plan>>,
        m: &MutexThreat,
        step_id1: usize,
        effect1: usize,
        step_id2: usize,
        effect2: usize,
    ) {
        let et1 = self.effect(step_id1, effect1).end_time();
        let et2 = self.effect(step_id2, effect2).end_time();
        if self.orderings.possibly_before(step_id2, et2, step_id1, et1) {
            self.new_ordering_for_mutex(plans, step_id2, et2, step_id1, et1, m);
        }
    }

    fn new_ordering_for_mutex(
        &self,
        plans: &mut Vec<Rc<Plan>>,
        before_id: usize,
        t1: StepTime,
        after_id: usize,
        t2: StepTime,
        m: &MutexThreat,
    ) {
        if let Some(orderings) = self.orderings.refine(Ordering::new(before_id, t1, after_id, t2)) {
            let mut child = self.successor();
            child.orderings = Rc::new(orderings);
            child.mutex_threats = self.mutex_threats.remove(m);
            plans.push(child.build());
        }
    }

    // ------------------------------------------------------------------
    // Open conditions

    /// True iff some step's effect could clobber the open condition.
    pub fn unsafe_open_condition(&self, ctx: &SearchContext, oc: &OpenCondition) -> bool {
        let (literal, when) = match oc.literal() {
            Some(pair) => pair,
            None => return false,
        };
        let gt = when.end_time();
        for s in self.steps.iter() {
            if !self
                .orderings
                .possibly_not_before(oc.step_id, gt, s.id, StepTime::Start)
            {
                continue;
            }
            for e in &s.action.effects {
                let et = e.end_time();
                let mut mgu = BindingList::new();
                if self.orderings.possibly_not_before(oc.step_id, gt, s.id, et)
                    && ctx.affects(&self.bindings, &mut mgu, &e.literal, s.id, literal, oc.step_id)
                {
                    return true;
                }
            }
        }
        false
    }

    fn handle_open_condition(&self, ctx: &SearchContext, plans: &mut Vec<Rc<Plan>>, oc: &OpenCondition) {
        match &oc.goal {
            OpenGoal::Literal { literal, .. } => {
                let literal = literal.clone();
                if let Some(achievers) = ctx.literal_achievers(&literal) {
                    self.add_step(ctx, plans, &literal, oc, achievers);
                    self.reuse_step(ctx, plans, &literal, oc, achievers);
                }
                if literal.is_negative() {
                    self.new_cw_link(ctx, plans, &literal, oc, false);
                }
            }
            OpenGoal::Disjunction(disjuncts) => {
                self.handle_disjunction(ctx, plans, &disjuncts.clone(), oc, false);
            }
            OpenGoal::Inequality { .. } => {
                self.handle_inequality(ctx, plans, oc, false);
            }
        }
    }

    /// Counts the refinements of an open condition; true iff they do not
    /// exceed `limit`.
    #[allow(clippy::too_many_arguments)]
    pub fn open_cond_refinements(
        &self,
        ctx: &SearchContext,
        refinements: &mut Option<usize>,
        addable: &mut Option<usize>,
        reusable: &mut Option<usize>,
        oc: &OpenCondition,
        limit: usize,
    ) -> bool {
        if let Some(r) = *refinements {
            return r <= limit;
        }
        match &oc.goal {
            OpenGoal::Literal { literal, .. } => {
                let literal = literal.clone();
                if addable.is_none() {
                    if !self.addable_steps(ctx, addable, &literal, oc, limit) {
                        return false;
                    }
                }
                let count = addable.unwrap();
                if count <= limit {
                    if reusable.is_none() {
                        if !self.reusable_steps(ctx, reusable, &literal, oc, limit) {
                            return false;
                        }
                    }
                    let total = count + reusable.unwrap();
                    *refinements = Some(total);
                    return total <= limit;
                }
                false
            }
            OpenGoal::Disjunction(disjuncts) => {
                let mut scratch = Vec::new();
                let count = self.handle_disjunction(ctx, &mut scratch, &disjuncts.clone(), oc, true);
                *refinements = Some(count);
                count <= limit
            }
            OpenGoal::Inequality { .. } => {
                let mut scratch = Vec::new();
                let count = self.handle_inequality(ctx, &mut scratch, oc, true);
                *refinements = Some(count);
                count <= limit
            }
        }
    }

    fn handle_disjunction(
        &self,
        ctx: &SearchContext,
        plans: &mut Vec<Rc<Plan>>,
        disjuncts: &[Formula],
        oc: &OpenCondition,
        test_only: bool,
    ) -> usize {
        let mut count = 0;
        for disjunct in disjuncts {
            let mut new_open_conds = if test_only { Chain::new() } else { self.open_conds.remove(oc) };
            let mut new_num_open_conds = if test_only { 0 } else { self.num_open_conds - 1 };
            let mut new_bindings = BindingList::new();
            let added = add_goal(
                ctx,
                &mut new_open_conds,
                &mut new_num_open_conds,
                &mut new_bindings,
                disjunct,
                oc.step_id,
                test_only,
            );
            if added {
                if let Some(bindings) = ctx.add_bindings(&self.bindings, &new_bindings) {
                    if !test_only {
                        let mut child = self.successor();
                        child.bindings = Rc::new(bindings);
                        child.open_conds = new_open_conds;
                        child.num_open_conds = new_num_open_conds;
                        plans.push(child.build());
                    }
                    count += 1;
                }
            }
        }
        count
    }

    /// Branches an inequality open condition on the variable with the
    /// smaller domain: each object yields a child equating one side and
    /// disequating the other.
    fn handle_inequality(
        &self,
        ctx: &SearchContext,
        plans: &mut Vec<Rc<Plan>>,
        oc: &OpenCondition,
        test_only: bool,
    ) -> usize {
        let (variable, var_id, term, term_id) = match &oc.goal {
            OpenGoal::Inequality {
                variable,
                var_id,
                term,
                term_id,
            } => (*variable, *var_id, *term, *term_id),
            _ => return 0,
        };
        let var2 = match term {
            Term::Variable(v) => v,
            // inequalities between a variable and an object become binding
            // constraints in the goal unroller, never open conditions
            Term::Object(_) => return 0,
        };
        let d1 = ctx.domain_of(&self.bindings, variable, var_id);
        let d2 = ctx.domain_of(&self.bindings, var2, term_id);
        let (va, ia, vb, ib, domain) = if d1.len() < d2.len() {
            (variable, var_id, var2, term_id, d1)
        } else {
            (var2, term_id, variable, var_id, d2)
        };
        let mut count = 0;
        for name in domain {
            let new_bindings = [
                Binding::eq(va, ia, name.into(), 0),
                Binding::neq(vb, ib, name.into(), 0),
            ];
            if let Some(bindings) = ctx.add_bindings(&self.bindings, &new_bindings) {
                if !test_only {
                    let mut child = self.successor();
                    child.bindings = Rc::new(bindings);
                    child.open_conds = self.open_conds.remove(oc);
                    child.num_open_conds -= 1;
                    plans.push(child.build());
                }
                count += 1;
            }
        }
        count
    }

    /// Counts add-step refinements; true iff within `limit`.
    pub fn addable_steps(
        &self,
        ctx: &SearchContext,
        refinements: &mut Option<usize>,
        literal: &weaver_model::Literal,
        oc: &OpenCondition,
        limit: usize,
    ) -> bool {
        let mut count = 0;
        let mut scratch = Vec::new();
        if let Some(achievers) = ctx.literal_achievers(literal) {
            for (action, ei) in achievers.iter() {
                if action.is_dummy() {
                    continue;
                }
                let step = Step {
                    id: self.num_steps + 1,
                    action: action.clone(),
                };
                count += self.new_link(ctx, &mut scratch, &step, *ei, literal, oc, true);
                if count > limit {
                    return false;
                }
            }
        }
        *refinements = Some(count);
        count <= limit
    }

    /// Repairs a literal open condition by adding a fresh achieving step.
    fn add_step(
        &self,
        ctx: &SearchContext,
        plans: &mut Vec<Rc<Plan>>,
        literal: &weaver_model::Literal,
        oc: &OpenCondition,
        achievers: &crate::graph::ActionEffectMap,
    ) {
        for (action, ei) in achievers.iter() {
            if action.is_dummy() {
                continue;
            }
            let step = Step {
                id: self.num_steps + 1,
                action: action.clone(),
            };
            self.new_link(ctx, plans, &step, *ei, literal, oc, false);
        }
    }

    /// Counts reuse-step refinements; true iff within `limit`.
    pub fn reusable_steps(
        &self,
        ctx: &SearchContext,
        refinements: &mut Option<usize>,
        literal: &weaver_model::Literal,
        oc: &OpenCondition,
        limit: usize,
    ) -> bool {
        let mut count = 0;
        let mut scratch = Vec::new();
        let gt = oc.when().start_time();
        if let Some(achievers) = ctx.literal_achievers(literal) {
            for step in self.steps.iter() {
                if !self
                    .orderings
                    .possibly_before(step.id, StepTime::Start, oc.step_id, gt)
                {
                    continue;
                }
                for ei in achievers.achievers_of(&step.action) {
                    let et = step.action.effects[ei].end_time();
                    if self.orderings.possibly_before(step.id, et, oc.step_id, gt) {
                        count += self.new_link(ctx, &mut scratch, &step.clone(), ei, literal, oc, true);
                        if count > limit {
                            return false;
                        }
                    }
                }
            }
        }
        if literal.is_negative() {
            count += self.new_cw_link(ctx, &mut scratch, literal, oc, true);
        }
        *refinements = Some(count);
        count <= limit
    }

    /// Repairs a literal open condition by linking from an existing step.
    fn reuse_step(
        &self,
        ctx: &SearchContext,
        plans: &mut Vec<Rc<Plan>>,
        literal: &weaver_model::Literal,
        oc: &OpenCondition,
        achievers: &crate::graph::ActionEffectMap,
    ) {
        let gt = oc.when().start_time();
        for step in self.steps.iter() {
            if !self
                .orderings
                .possibly_before(step.id, StepTime::Start, oc.step_id, gt)
            {
                continue;
            }
            let step = step.clone();
            for ei in achievers.achievers_of(&step.action) {
                let et = step.action.effects[ei].end_time();
                if self.orderings.possibly_before(step.id, et, oc.step_id, gt) {
                    self.new_link(ctx, plans, &step, ei, literal, oc, false);
                }
            }
        }
    }

    /// Links a step's effect to an open condition when they unify.
    fn new_link(
        &self,
        ctx: &SearchContext,
        plans: &mut Vec<Rc<Plan>>,
        step: &Step,
        effect_index: usize,
        literal: &weaver_model::Literal,
        oc: &OpenCondition,
        test_only: bool,
    ) -> usize {
        let effect = &step.action.effects[effect_index];
        let mut mgu = BindingList::new();
        if ctx.unify(
            &self.bindings,
            &mut mgu,
            &effect.literal,
            step.id,
            literal,
            oc.step_id,
        ) {
            self.make_link(ctx, plans, step, effect_index, oc, &mgu, test_only)
        } else {
            0
        }
    }

    /// Links a negated open condition to the initial step under the closed
    /// world assumption: every initial effect that unifies with the goal
    /// atom must be separated by an inequality.
    fn new_cw_link(
        &self,
        ctx: &SearchContext,
        plans: &mut Vec<Rc<Plan>>,
        negation: &weaver_model::Literal,
        oc: &OpenCondition,
        test_only: bool,
    ) -> usize {
        let goal_atom = negation.atom();
        let mut conjuncts = Vec::new();
        for effect in &ctx.init_action.effects {
            let mut mgu = BindingList::new();
            if ctx.unify_atoms(
                &self.bindings,
                &mut mgu,
                effect.literal.atom(),
                0,
                goal_atom,
                oc.step_id,
            ) {
                if mgu.is_empty() {
                    // the goal atom is identical to an initial condition
                    return 0;
                }
                let disjuncts = mgu
                    .iter()
                    .map(|subst| {
                        Formula::Inequality(BindingLiteral {
                            variable: subst.variable,
                            var_step: Some(subst.var_id),
                            term: subst.term,
                            term_step: Some(subst.term_id),
                        })
                    })
                    .collect();
                conjuncts.push(Formula::or(disjuncts));
            }
        }
        let goals = Formula::and(conjuncts);
        let mut new_open_conds = if test_only { Chain::new() } else { self.open_conds.remove(oc) };
        let mut new_num_open_conds = if test_only { 0 } else { self.num_open_conds - 1 };
        let mut new_bindings = BindingList::new();
        let added = add_goal(
            ctx,
            &mut new_open_conds,
            &mut new_num_open_conds,
            &mut new_bindings,
            &goals,
            0,
            test_only,
        );
        let mut count = 0;
        if added {
            if let Some(bindings) = ctx.add_bindings(&self.bindings, &new_bindings) {
                if !test_only {
                    let link = Link::new(0, StepTime::End, oc);
                    let new_links = self.links.cons(link.clone());
                    let mut new_unsafes = self.unsafes.clone();
                    let mut new_num_unsafes = self.num_unsafes;
                    link_threats(
                        ctx,
                        &mut new_unsafes,
                        &mut new_num_unsafes,
                        &link,
                        &self.steps,
                        &self.orderings,
                        &bindings,
                    );
                    let mut child = self.successor();
                    child.links = new_links;
                    child.num_links += 1;
                    child.bindings = Rc::new(bindings);
                    child.unsafes = new_unsafes;
                    child.num_unsafes = new_num_unsafes;
                    child.open_conds = new_open_conds;
                    child.num_open_conds = new_num_open_conds;
                    plans.push(child.build());
                }
                count += 1;
            }
        }
        count
    }

    /// The central link constructor: unifier commitment, conditional-effect
    /// goals, new-step bookkeeping, ordering refinement, threat scans.
    #[allow(clippy::too_many_arguments)]
    fn make_link(
        &self,
        ctx: &SearchContext,
        plans: &mut Vec<Rc<Plan>>,
        step: &Step,
        effect_index: usize,
        oc: &OpenCondition,
        unifier: &BindingList,
        test_only: bool,
    ) -> usize {
        let effect = step.action.effects[effect_index].clone();

        // bindings that commit the unifier, with fresh variables standing
        // in for universally quantified effect parameters
        let mut new_bindings = BindingList::new();
        let mut forall_subst = SubstMap::new();
        if test_only {
            new_bindings.extend(unifier.iter().cloned());
        } else {
            for subst in unifier.iter() {
                if effect.quantifies(subst.variable) {
                    let v = ctx.fresh_variable(ctx.variable_type(subst.variable));
                    forall_subst.insert(subst.variable, v.into());
                    new_bindings.push(Binding::eq(v, subst.var_id, subst.term, subst.term_id));
                } else {
                    new_bindings.push(subst.clone());
                }
            }
        }

        let mut new_open_conds = if test_only { Chain::new() } else { self.open_conds.remove(oc) };
        let mut new_num_open_conds = if test_only { 0 } else { self.num_open_conds - 1 };

        // a conditional effect contributes its condition as a new goal
        let mut cond_goal = Formula::and(vec![
            effect.condition.clone(),
            effect.link_condition.clone(),
        ]);
        if !cond_goal.is_tautology() {
            if !test_only && !effect.parameters.is_empty() {
                for &vi in &effect.parameters {
                    if !forall_subst.contains_key(&vi) {
                        let v = ctx.fresh_variable(ctx.variable_type(vi));
                        forall_subst.insert(vi, v.into());
                    }
                }
                cond_goal = cond_goal.substitute(&forall_subst);
            }
            if !add_goal(
                ctx,
                &mut new_open_conds,
                &mut new_num_open_conds,
                &mut new_bindings,
                &cond_goal,
                step.id,
                test_only,
            ) {
                return 0;
            }
        }

        // a new step brings its own precondition and domain constraints
        let new_step = step.id > self.num_steps;
        let mut bindings = (*self.bindings).clone();
        if new_step {
            if !add_goal(
                ctx,
                &mut new_open_conds,
                &mut new_num_open_conds,
                &mut new_bindings,
                &step.action.condition,
                step.id,
                test_only,
            ) {
                return 0;
            }
            if ctx.params.domain_constraints {
                let graph = ctx
                    .graph
                    .as_ref()
                    .expect("domain constraints require the planning graph");
                bindings = match bindings.add_step_domains(step.id, &step.action, graph) {
                    Some(b) => b,
                    None => return 0,
                };
            }
        }
        let bindings = match ctx.add_bindings(&bindings, &new_bindings) {
            Some(b) => b,
            None => return 0,
        };
        if test_only {
            return 1;
        }

        let et = effect.end_time();
        let gt = oc.when().start_time();
        let mut orderings = (*self.orderings).clone();
        if new_step {
            orderings = match orderings.refine_step(step) {
                Some(o) => o,
                None => return 0,
            };
        }
        orderings = match orderings.refine(Ordering::new(step.id, et, oc.step_id, gt)) {
            Some(o) => o,
            None => return 0,
        };
        if !cond_goal.is_tautology() && orderings.is_temporal() {
            if let Some(graph) = &ctx.graph {
                let bound = if ctx.params.ground_actions { None } else { Some(&bindings) };
                let hv = graph.heuristic_value(&cond_goal, step.id, bound);
                orderings = match orderings.refine_bounds(step.id, hv.makespan, hv.makespan) {
                    Some(o) => o,
                    None => return 0,
                };
            }
        }

        let (new_steps, new_num_steps) = if new_step {
            (self.steps.cons(step.clone()), self.num_steps + 1)
        } else {
            (self.steps.clone(), self.num_steps)
        };

        let link = Link::new(step.id, et, oc);
        let new_links = self.links.cons(link.clone());

        let mut new_unsafes = self.unsafes.clone();
        let mut new_num_unsafes = self.num_unsafes;
        link_threats(
            ctx,
            &mut new_unsafes,
            &mut new_num_unsafes,
            &link,
            &new_steps,
            &orderings,
            &bindings,
        );
        let mut new_unexpanded = self.unexpanded_steps.clone();
        let mut new_num_unexpanded = self.num_unexpanded_steps;
        if new_step {
            step_threats(
                ctx,
                &mut new_unsafes,
                &mut new_num_unsafes,
                step,
                &self.links,
                &orderings,
                &bindings,
            );
            if step.action.composite {
                new_unexpanded = new_unexpanded.cons(UnexpandedStep {
                    step_id: step.id,
                    action: step.action.clone(),
                });
                new_num_unexpanded += 1;
            }
        }

        let mut child = self.successor();
        child.steps = new_steps;
        child.num_steps = new_num_steps;
        child.links = new_links;
        child.num_links += 1;
        child.orderings = Rc::new(orderings);
        child.bindings = Rc::new(bindings);
        child.unsafes = new_unsafes;
        child.num_unsafes = new_num_unsafes;
        child.open_conds = new_open_conds;
        child.num_open_conds = new_num_open_conds;
        child.unexpanded_steps = new_unexpanded;
        child.num_unexpanded_steps = new_num_unexpanded;
        plans.push(child.build());
        1
    }
}
