use crate::formulas::{Formula, Literal, StepTime, SubstMap};
use crate::terms::Variable;

/// When an effect takes place relative to its step.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum EffectTime {
    AtStart,
    AtEnd,
}

impl EffectTime {
    pub fn step_time(self) -> StepTime {
        match self {
            EffectTime::AtStart => StepTime::Start,
            EffectTime::AtEnd => StepTime::End,
        }
    }
}

/// An action effect: a literal guarded by a condition, with universally
/// quantified parameters.
///
/// The link condition is the antecedent that must not be contradicted for
/// the effect to interact with a causal link; it is only non-trivial for
/// durative actions.
#[derive(Clone, PartialEq, Debug)]
pub struct Effect {
    pub literal: Literal,
    pub condition: Formula,
    pub link_condition: Formula,
    pub parameters: Vec<Variable>,
    pub when: EffectTime,
}

impl Effect {
    /// An unconditional effect.
    pub fn new(literal: Literal, when: EffectTime) -> Effect {
        Effect {
            literal,
            condition: Formula::Tautology,
            link_condition: Formula::Tautology,
            parameters: Vec::new(),
            when,
        }
    }

    pub fn at_end(literal: Literal) -> Effect {
        Effect::new(literal, EffectTime::AtEnd)
    }

    pub fn at_start(literal: Literal) -> Effect {
        Effect::new(literal, EffectTime::AtStart)
    }

    pub fn with_condition(mut self, condition: Formula) -> Effect {
        self.condition = condition;
        self
    }

    pub fn with_link_condition(mut self, link_condition: Formula) -> Effect {
        self.link_condition = link_condition;
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<Variable>) -> Effect {
        self.parameters = parameters;
        self
    }

    /// True iff `v` is universally quantified by this effect.
    pub fn quantifies(&self, v: Variable) -> bool {
        self.parameters.contains(&v)
    }

    /// The step time at which the effect takes place.
    pub fn end_time(&self) -> StepTime {
        self.when.step_time()
    }

    pub fn substitute(&self, subst: &SubstMap) -> Effect {
        Effect {
            literal: self.literal.substitute(subst),
            condition: self.condition.substitute(subst),
            link_condition: self.link_condition.substitute(subst),
            parameters: self.parameters.clone(),
            when: self.when,
        }
    }
}
