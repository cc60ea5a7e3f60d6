use weaver_model::{FormulaTime, Literal, StepTime};

use crate::flaws::OpenCondition;

/// A causal link: a commitment that the effect of `from_id` establishes
/// `condition` for `to_id`, and that the condition holds in between.
#[derive(Clone, PartialEq, Debug)]
pub struct Link {
    pub from_id: usize,
    pub effect_time: StepTime,
    pub to_id: usize,
    pub condition: Literal,
    pub condition_time: FormulaTime,
}

impl Link {
    /// The link establishing the open condition from the given producer.
    pub fn new(from_id: usize, effect_time: StepTime, open_cond: &OpenCondition) -> Link {
        let (literal, when) = open_cond
            .literal()
            .expect("causal links support literal conditions only");
        Link {
            from_id,
            effect_time,
            to_id: open_cond.step_id,
            condition: literal.clone(),
            condition_time: when,
        }
    }
}
