use crate::effects::Effect;
use crate::formulas::{Formula, SubstMap};
use crate::terms::{Object, TermTable, Variable};

/// An action schema, or a ground action when `parameters` is empty and all
/// formulas are variable-free.
///
/// Names beginning with `<` denote dummy actions (the initial step, the
/// goal step, decomposition pseudo-steps); they are hidden from plan output
/// and never proposed by the add-step generator.
#[derive(Clone, Debug)]
pub struct Action {
    pub name: String,
    pub parameters: Vec<Variable>,
    pub condition: Formula,
    pub effects: Vec<Effect>,
    pub composite: bool,
    pub durative: bool,
    pub min_duration: f32,
    pub max_duration: f32,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Action {
        Action {
            name: name.into(),
            parameters: Vec::new(),
            condition: Formula::Tautology,
            effects: Vec::new(),
            composite: false,
            durative: false,
            min_duration: 0.0,
            max_duration: 0.0,
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<Variable>) -> Action {
        self.parameters = parameters;
        self
    }

    pub fn with_condition(mut self, condition: Formula) -> Action {
        self.condition = condition;
        self
    }

    pub fn with_effect(mut self, effect: Effect) -> Action {
        self.effects.push(effect);
        self
    }

    pub fn composite(mut self) -> Action {
        self.composite = true;
        self
    }

    pub fn durative(mut self, min_duration: f32, max_duration: f32) -> Action {
        self.durative = true;
        self.min_duration = min_duration;
        self.max_duration = max_duration;
        self
    }

    pub fn is_dummy(&self) -> bool {
        self.name.starts_with('<')
    }

    /// The fully instantiated copy of this schema with `args` substituted
    /// for its parameters. The argument names are folded into the name so
    /// a ground instance prints as `(name arg...)`.
    pub fn instantiate(&self, args: &[Object], terms: &TermTable) -> Action {
        debug_assert_eq!(args.len(), self.parameters.len());
        let subst: SubstMap = self
            .parameters
            .iter()
            .copied()
            .zip(args.iter().map(|&o| o.into()))
            .collect();
        let mut name = self.name.clone();
        for &arg in args {
            name.push(' ');
            name.push_str(terms.object_name(arg));
        }
        Action {
            name,
            parameters: Vec::new(),
            condition: self.condition.substitute(&subst),
            effects: self.effects.iter().map(|e| e.substitute(&subst)).collect(),
            composite: self.composite,
            durative: self.durative,
            min_duration: self.min_duration,
            max_duration: self.max_duration,
        }
    }
}
