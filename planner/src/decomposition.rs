use std::rc::Rc;

use weaver_model::{Decomposition, FormulaTime, StepTime};

use crate::bindings::{Binding, BindingList};
use crate::context::SearchContext;
use crate::flaws::UnexpandedStep;
use crate::links::Link;
use crate::orderings::Ordering;
use crate::plan::{add_goal, link_threats, mutex_scan, Plan, Step};

/// An instantiated decomposition: the schema together with the plan steps
/// its pseudo-steps became.
///
/// Index 0 of `steps` is the dummy initial, index 1 the dummy final.
#[derive(Clone, Debug)]
pub struct DecompositionFrame {
    pub id: usize,
    pub schema: Rc<Decomposition>,
    pub steps: Vec<Step>,
}

impl DecompositionFrame {
    pub fn dummy_initial(&self) -> &Step {
        &self.steps[Decomposition::DUMMY_INITIAL]
    }

    pub fn dummy_final(&self) -> &Step {
        &self.steps[Decomposition::DUMMY_FINAL]
    }
}

impl PartialEq for DecompositionFrame {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Records that a composite step is realized by a decomposition frame.
#[derive(Clone, PartialEq, Debug)]
pub struct DecompositionLink {
    pub composite_id: usize,
    pub frame_id: usize,
}

impl Plan {
    /// Repairs an unexpanded composite step: one child per applicable
    /// decomposition schema. No applicable schema means a dead end.
    pub(crate) fn handle_unexpanded(
        &self,
        ctx: &SearchContext,
        plans: &mut Vec<Rc<Plan>>,
        unexpanded: &UnexpandedStep,
    ) {
        for schema in ctx.decompositions_of(&unexpanded.action.name) {
            self.add_decomposition_frame(ctx, plans, unexpanded, schema);
        }
    }

    /// Counts the refinements of an unexpanded composite step; true iff
    /// they do not exceed `limit`.
    pub fn unexpanded_step_refinements(
        &self,
        ctx: &SearchContext,
        refinements: &mut Option<usize>,
        unexpanded: &UnexpandedStep,
        limit: usize,
    ) -> bool {
        if refinements.is_none() {
            let mut scratch = Vec::new();
            self.handle_unexpanded(ctx, &mut scratch, unexpanded);
            *refinements = Some(scratch.len());
        }
        refinements.unwrap() <= limit
    }

    /// Splices one instantiated decomposition frame into the plan:
    /// fresh step ids, preconditions as open conditions, schema bindings,
    /// ancestry and explicit orderings, the frame's links with their
    /// threat scan, and the frame bookkeeping.
    fn add_decomposition_frame(
        &self,
        ctx: &SearchContext,
        plans: &mut Vec<Rc<Plan>>,
        unexpanded: &UnexpandedStep,
        schema: &Rc<Decomposition>,
    ) -> bool {
        // explicit map from schema-local ids to fresh plan step ids
        let id_map: Vec<usize> = (0..schema.pseudo_steps.len())
            .map(|i| self.num_steps() + 1 + i)
            .collect();

        let mut new_steps = self.steps().clone();
        let mut new_num_steps = self.num_steps();
        let mut new_orderings = (*self.orderings()).clone();
        let mut new_open_conds = self.open_conds().clone();
        let mut new_num_open_conds = self.num_open_conds();
        let mut new_unexpanded = self.unexpanded_steps().clone();
        let mut new_num_unexpanded = self.num_unexpanded_steps();
        let mut bindings = (*self.bindings()).clone();
        let mut frame_steps = Vec::with_capacity(schema.pseudo_steps.len());

        for pseudo in &schema.pseudo_steps {
            let step = Step {
                id: id_map[pseudo.local_id],
                action: pseudo.action.clone(),
            };
            new_orderings = match new_orderings.refine_step(&step) {
                Some(o) => o,
                None => return false,
            };
            new_steps = new_steps.cons(step.clone());
            new_num_steps += 1;
            if step.action.composite {
                new_unexpanded = new_unexpanded.cons(UnexpandedStep {
                    step_id: step.id,
                    action: step.action.clone(),
                });
                new_num_unexpanded += 1;
            }
            let mut step_bindings = BindingList::new();
            if !add_goal(
                ctx,
                &mut new_open_conds,
                &mut new_num_open_conds,
                &mut step_bindings,
                &step.action.condition,
                step.id,
                false,
            ) {
                return false;
            }
            bindings = match ctx.add_bindings(&bindings, &step_bindings) {
                Some(b) => b,
                None => return false,
            };
            frame_steps.push(step);
        }

        // the dummies carry the composite's formulas; tie their copies of
        // each composite parameter to the composite step's instantiation
        let mut ties = BindingList::new();
        for &param in &unexpanded.action.parameters {
            ties.push(Binding::eq(
                param,
                id_map[Decomposition::DUMMY_INITIAL],
                param.into(),
                unexpanded.step_id,
            ));
            ties.push(Binding::eq(
                param,
                id_map[Decomposition::DUMMY_FINAL],
                param.into(),
                unexpanded.step_id,
            ));
        }
        bindings = match ctx.add_bindings(&bindings, &ties) {
            Some(b) => b,
            None => return false,
        };

        let schema_bindings: BindingList = schema
            .bindings
            .iter()
            .map(|sb| Binding {
                variable: sb.variable,
                var_id: id_map[sb.var_local_id],
                term: sb.term,
                term_id: id_map[sb.term_local_id],
                is_equality: sb.is_equality,
            })
            .collect();
        bindings = match ctx.add_bindings(&bindings, &schema_bindings) {
            Some(b) => b,
            None => return false,
        };

        // the dummy final precedes every step the composite contributes to
        for link in self.links().iter() {
            if link.from_id == unexpanded.step_id {
                new_orderings = match new_orderings.refine(Ordering::new(
                    id_map[Decomposition::DUMMY_FINAL],
                    StepTime::End,
                    link.to_id,
                    StepTime::Start,
                )) {
                    Some(o) => o,
                    None => return false,
                };
            }
        }
        // causal ancestry inside the frame
        for sl in &schema.links {
            new_orderings = match new_orderings.refine(Ordering::new(
                id_map[sl.from],
                StepTime::End,
                id_map[sl.to],
                StepTime::Start,
            )) {
                Some(o) => o,
                None => return false,
            };
        }
        // orderings stated explicitly by the schema
        for so in &schema.orderings {
            new_orderings = match new_orderings.refine(Ordering::new(
                id_map[so.before],
                StepTime::End,
                id_map[so.after],
                StepTime::Start,
            )) {
                Some(o) => o,
                None => return false,
            };
        }

        // splice the frame's links, scanning each for threats
        let mut new_links = self.links().clone();
        let mut new_num_links = self.num_links();
        let mut new_unsafes = self.unsafes().clone();
        let mut new_num_unsafes = self.num_unsafes();
        for sl in &schema.links {
            let link = Link {
                from_id: id_map[sl.from],
                effect_time: StepTime::End,
                to_id: id_map[sl.to],
                condition: sl.condition.clone(),
                condition_time: FormulaTime::AtStart,
            };
            new_links = new_links.cons(link.clone());
            new_num_links += 1;
            link_threats(
                ctx,
                &mut new_unsafes,
                &mut new_num_unsafes,
                &link,
                &new_steps,
                &new_orderings,
                &bindings,
            );
        }

        // mutexes only arise between possibly concurrent steps
        let mut new_mutex_threats = self.mutex_threats().clone();
        if ctx.durative() {
            for step in &frame_steps {
                mutex_scan(
                    ctx,
                    &mut new_mutex_threats,
                    step,
                    &new_steps,
                    &new_orderings,
                    &bindings,
                );
            }
        }

        new_unexpanded = new_unexpanded.remove(unexpanded);
        new_num_unexpanded -= 1;

        let frame = DecompositionFrame {
            id: self.num_decomposition_frames() + 1,
            schema: schema.clone(),
            steps: frame_steps,
        };
        let frame_id = frame.id;

        let mut child = self.successor();
        child.steps = new_steps;
        child.num_steps = new_num_steps;
        child.links = new_links;
        child.num_links = new_num_links;
        child.orderings = Rc::new(new_orderings);
        child.bindings = Rc::new(bindings);
        child.decomposition_frames = self.decomposition_frames().cons(frame);
        child.num_decomposition_frames += 1;
        child.decomposition_links = self.decomposition_links().cons(DecompositionLink {
            composite_id: unexpanded.step_id,
            frame_id,
        });
        child.num_decomposition_links += 1;
        child.unsafes = new_unsafes;
        child.num_unsafes = new_num_unsafes;
        child.open_conds = new_open_conds;
        child.num_open_conds = new_num_open_conds;
        child.unexpanded_steps = new_unexpanded;
        child.num_unexpanded_steps = new_num_unexpanded;
        child.mutex_threats = new_mutex_threats;
        plans.push(child.build());
        true
    }
}
