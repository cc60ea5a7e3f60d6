use std::collections::HashMap;

use itertools::Itertools;

use crate::predicates::Predicate;
use crate::terms::{Term, TermTable, Variable};
use crate::types::TypeTable;

/// One of the two time points of a step.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum StepTime {
    Start,
    End,
}

/// When a condition formula must hold relative to its step.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum FormulaTime {
    AtStart,
    OverAll,
    AtEnd,
}

impl FormulaTime {
    /// The step time at which the condition begins to be required.
    pub fn start_time(self) -> StepTime {
        match self {
            FormulaTime::AtStart | FormulaTime::OverAll => StepTime::Start,
            FormulaTime::AtEnd => StepTime::End,
        }
    }

    /// The step time at which the condition stops being required.
    pub fn end_time(self) -> StepTime {
        match self {
            FormulaTime::AtStart => StepTime::Start,
            FormulaTime::OverAll | FormulaTime::AtEnd => StepTime::End,
        }
    }
}

/// An applied predicate.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Atom {
    pub predicate: Predicate,
    pub terms: Vec<Term>,
}

impl Atom {
    pub fn new(predicate: Predicate, terms: Vec<Term>) -> Atom {
        Atom { predicate, terms }
    }

    pub fn substitute(&self, subst: &SubstMap) -> Atom {
        Atom {
            predicate: self.predicate,
            terms: self.terms.iter().map(|t| subst_term(*t, subst)).collect(),
        }
    }

    pub fn is_ground(&self) -> bool {
        self.terms.iter().all(|t| !t.is_variable())
    }
}

/// An atom or its negation.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Literal {
    Positive(Atom),
    Negative(Atom),
}

impl Literal {
    pub fn atom(&self) -> &Atom {
        match self {
            Literal::Positive(a) | Literal::Negative(a) => a,
        }
    }

    pub fn predicate(&self) -> Predicate {
        self.atom().predicate
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, Literal::Negative(_))
    }

    pub fn complement(&self) -> Literal {
        match self {
            Literal::Positive(a) => Literal::Negative(a.clone()),
            Literal::Negative(a) => Literal::Positive(a.clone()),
        }
    }

    pub fn substitute(&self, subst: &SubstMap) -> Literal {
        match self {
            Literal::Positive(a) => Literal::Positive(a.substitute(subst)),
            Literal::Negative(a) => Literal::Negative(a.substitute(subst)),
        }
    }
}

/// An equality or inequality between a variable and a term.
///
/// Each side carries an optional step scope; `None` means the step whose
/// condition contains the formula. Explicit scopes are produced by the
/// planner when it separates steps that belong to different plan steps.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct BindingLiteral {
    pub variable: Variable,
    pub var_step: Option<usize>,
    pub term: Term,
    pub term_step: Option<usize>,
}

impl BindingLiteral {
    /// The scope of the variable side, given the ambient step.
    pub fn var_step_id(&self, ambient: usize) -> usize {
        self.var_step.unwrap_or(ambient)
    }

    /// The scope of the term side, given the ambient step.
    pub fn term_step_id(&self, ambient: usize) -> usize {
        self.term_step.unwrap_or(ambient)
    }
}

/// Substitution of variables by terms.
pub type SubstMap = HashMap<Variable, Term>;

fn subst_term(t: Term, subst: &SubstMap) -> Term {
    match t {
        Term::Variable(v) => subst.get(&v).copied().unwrap_or(t),
        Term::Object(_) => t,
    }
}

/// A goal formula.
///
/// Conjunction and disjunction are built through [`Formula::and`] and
/// [`Formula::or`], which fold tautologies and contradictions away so the
/// invariants `Conj`/`Disj` never contain trivial members hold by
/// construction.
#[derive(Clone, PartialEq, Debug)]
pub enum Formula {
    Tautology,
    Contradiction,
    Literal(Literal),
    Timed { when: FormulaTime, literal: Literal },
    Conj(Vec<Formula>),
    Disj(Vec<Formula>),
    Equality(BindingLiteral),
    Inequality(BindingLiteral),
    Exists { params: Vec<Variable>, body: Box<Formula> },
    Forall { params: Vec<Variable>, body: Box<Formula> },
}

impl Formula {
    pub fn atom(predicate: Predicate, terms: Vec<Term>) -> Formula {
        Formula::Literal(Literal::Positive(Atom::new(predicate, terms)))
    }

    pub fn negation(predicate: Predicate, terms: Vec<Term>) -> Formula {
        Formula::Literal(Literal::Negative(Atom::new(predicate, terms)))
    }

    /// Equality of two terms in ambient scope, simplified when both are
    /// objects.
    pub fn equality(a: Term, b: Term) -> Formula {
        Formula::scoped_equality(a, None, b, None)
    }

    /// Inequality of two terms in ambient scope, simplified when both are
    /// objects.
    pub fn inequality(a: Term, b: Term) -> Formula {
        Formula::scoped_inequality(a, None, b, None)
    }

    pub fn scoped_equality(a: Term, a_step: Option<usize>, b: Term, b_step: Option<usize>) -> Formula {
        match Self::binding_literal(a, a_step, b, b_step) {
            Ok(bl) => Formula::Equality(bl),
            Err(equal) => {
                if equal {
                    Formula::Tautology
                } else {
                    Formula::Contradiction
                }
            }
        }
    }

    pub fn scoped_inequality(a: Term, a_step: Option<usize>, b: Term, b_step: Option<usize>) -> Formula {
        match Self::binding_literal(a, a_step, b, b_step) {
            Ok(bl) => Formula::Inequality(bl),
            Err(equal) => {
                if equal {
                    Formula::Contradiction
                } else {
                    Formula::Tautology
                }
            }
        }
    }

    /// Normalizes a pair of scoped terms into a binding literal, or
    /// `Err(equal)` when both sides are objects.
    fn binding_literal(
        a: Term,
        a_step: Option<usize>,
        b: Term,
        b_step: Option<usize>,
    ) -> Result<BindingLiteral, bool> {
        match (a, b) {
            (Term::Variable(v), t) => Ok(BindingLiteral {
                variable: v,
                var_step: a_step,
                term: t,
                term_step: b_step,
            }),
            (t, Term::Variable(v)) => Ok(BindingLiteral {
                variable: v,
                var_step: b_step,
                term: t,
                term_step: a_step,
            }),
            (Term::Object(x), Term::Object(y)) => Err(x == y),
        }
    }

    /// Conjunction with simplification.
    pub fn and(conjuncts: Vec<Formula>) -> Formula {
        let mut kept = Vec::new();
        for f in conjuncts {
            match f {
                Formula::Tautology => {}
                Formula::Contradiction => return Formula::Contradiction,
                Formula::Conj(inner) => kept.extend(inner),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Formula::Tautology,
            1 => kept.into_iter().next().unwrap(),
            _ => Formula::Conj(kept),
        }
    }

    /// Disjunction with simplification.
    pub fn or(disjuncts: Vec<Formula>) -> Formula {
        let mut kept = Vec::new();
        for f in disjuncts {
            match f {
                Formula::Contradiction => {}
                Formula::Tautology => return Formula::Tautology,
                Formula::Disj(inner) => kept.extend(inner),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Formula::Contradiction,
            1 => kept.into_iter().next().unwrap(),
            _ => Formula::Disj(kept),
        }
    }

    pub fn is_tautology(&self) -> bool {
        matches!(self, Formula::Tautology)
    }

    pub fn is_contradiction(&self) -> bool {
        matches!(self, Formula::Contradiction)
    }

    /// The negation, with negations pushed down to literals.
    pub fn negated(&self) -> Formula {
        match self {
            Formula::Tautology => Formula::Contradiction,
            Formula::Contradiction => Formula::Tautology,
            Formula::Literal(l) => Formula::Literal(l.complement()),
            Formula::Timed { when, literal } => Formula::Timed {
                when: *when,
                literal: literal.complement(),
            },
            Formula::Conj(fs) => Formula::or(fs.iter().map(|f| f.negated()).collect()),
            Formula::Disj(fs) => Formula::and(fs.iter().map(|f| f.negated()).collect()),
            Formula::Equality(bl) => Formula::Inequality(bl.clone()),
            Formula::Inequality(bl) => Formula::Equality(bl.clone()),
            Formula::Exists { params, body } => Formula::Forall {
                params: params.clone(),
                body: Box::new(body.negated()),
            },
            Formula::Forall { params, body } => Formula::Exists {
                params: params.clone(),
                body: Box::new(body.negated()),
            },
        }
    }

    /// Applies a substitution. Quantified variables are assumed distinct
    /// from the substituted ones (variables are never reused).
    pub fn substitute(&self, subst: &SubstMap) -> Formula {
        match self {
            Formula::Tautology => Formula::Tautology,
            Formula::Contradiction => Formula::Contradiction,
            Formula::Literal(l) => Formula::Literal(l.substitute(subst)),
            Formula::Timed { when, literal } => Formula::Timed {
                when: *when,
                literal: literal.substitute(subst),
            },
            Formula::Conj(fs) => Formula::and(fs.iter().map(|f| f.substitute(subst)).collect()),
            Formula::Disj(fs) => Formula::or(fs.iter().map(|f| f.substitute(subst)).collect()),
            Formula::Equality(bl) => Formula::scoped_equality(
                subst_term(bl.variable.into(), subst),
                bl.var_step,
                subst_term(bl.term, subst),
                bl.term_step,
            ),
            Formula::Inequality(bl) => Formula::scoped_inequality(
                subst_term(bl.variable.into(), subst),
                bl.var_step,
                subst_term(bl.term, subst),
                bl.term_step,
            ),
            Formula::Exists { params, body } => Formula::Exists {
                params: params.clone(),
                body: Box::new(body.substitute(subst)),
            },
            Formula::Forall { params, body } => Formula::Forall {
                params: params.clone(),
                body: Box::new(body.substitute(subst)),
            },
        }
    }

    /// Expansion of a universal quantifier into the conjunction of its
    /// instances over all compatible objects.
    pub fn universal_base(
        params: &[Variable],
        body: &Formula,
        terms: &TermTable,
        types: &TypeTable,
    ) -> Formula {
        let domains: Vec<Vec<Term>> = params
            .iter()
            .map(|&v| {
                terms
                    .compatible_objects(terms.variable_type(v), types)
                    .into_iter()
                    .map(Term::from)
                    .collect()
            })
            .collect();
        let conjuncts = domains
            .into_iter()
            .multi_cartesian_product()
            .map(|combo| {
                let subst: SubstMap = params.iter().copied().zip(combo).collect();
                body.substitute(&subst)
            })
            .collect();
        Formula::and(conjuncts)
    }

    /// Replaces every quantifier by its expansion over the object table.
    pub fn expand_quantifiers(&self, terms: &TermTable, types: &TypeTable) -> Formula {
        match self {
            Formula::Conj(fs) => {
                Formula::and(fs.iter().map(|f| f.expand_quantifiers(terms, types)).collect())
            }
            Formula::Disj(fs) => {
                Formula::or(fs.iter().map(|f| f.expand_quantifiers(terms, types)).collect())
            }
            Formula::Forall { params, body } => {
                let body = body.expand_quantifiers(terms, types);
                Formula::universal_base(params, &body, terms, types)
            }
            Formula::Exists { params, body } => {
                let body = body.expand_quantifiers(terms, types);
                Formula::universal_base(params, &body.negated(), terms, types).negated()
            }
            other => other.clone(),
        }
    }

    pub fn is_ground(&self) -> bool {
        match self {
            Formula::Tautology | Formula::Contradiction => true,
            Formula::Literal(l) | Formula::Timed { literal: l, .. } => l.atom().is_ground(),
            Formula::Conj(fs) | Formula::Disj(fs) => fs.iter().all(|f| f.is_ground()),
            Formula::Equality(_) | Formula::Inequality(_) => false,
            Formula::Exists { .. } | Formula::Forall { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicates::PredicateTable;
    use crate::types::TypeId;

    fn setup() -> (TypeTable, TermTable, PredicateTable) {
        let types = TypeTable::new();
        let terms = TermTable::new();
        let preds = PredicateTable::new();
        (types, terms, preds)
    }

    #[test]
    fn and_simplifies() {
        let (_, _, mut preds) = setup();
        let p = preds.add("p", vec![]);
        let lit = Formula::atom(p, vec![]);
        assert_eq!(Formula::and(vec![]), Formula::Tautology);
        assert_eq!(Formula::and(vec![Formula::Tautology, lit.clone()]), lit);
        assert_eq!(
            Formula::and(vec![lit, Formula::Contradiction]),
            Formula::Contradiction
        );
    }

    #[test]
    fn negation_pushes_down() {
        let (_, _, mut preds) = setup();
        let p = preds.add("p", vec![]);
        let q = preds.add("q", vec![]);
        let f = Formula::and(vec![Formula::atom(p, vec![]), Formula::atom(q, vec![])]);
        let neg = f.negated();
        match neg {
            Formula::Disj(ref fs) => {
                assert_eq!(fs.len(), 2);
                assert!(matches!(&fs[0], Formula::Literal(Literal::Negative(_))));
            }
            other => panic!("expected disjunction, got {other:?}"),
        }
        assert_eq!(neg.negated(), f);
    }

    #[test]
    fn universal_base_expands_over_objects() {
        let (mut types, mut terms, mut preds) = setup();
        let room = types.add("room", TypeId::OBJECT);
        let r1 = terms.add_object("room1", room);
        let r2 = terms.add_object("room2", room);
        let clean = preds.add("clean", vec![room]);
        let x = terms.add_variable(room);
        let body = Formula::atom(clean, vec![x.into()]);
        let base = Formula::universal_base(&[x], &body, &terms, &types);
        assert_eq!(
            base,
            Formula::and(vec![
                Formula::atom(clean, vec![r1.into()]),
                Formula::atom(clean, vec![r2.into()]),
            ])
        );
    }
}
