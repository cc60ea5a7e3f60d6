use std::collections::{BTreeSet, HashMap};

use smallvec::SmallVec;
use weaver_model::{Action, Atom, Literal, Object, Term, TermTable, TypeTable, Variable};

use crate::graph::PlanningGraph;

/// A variable scoped to the plan step it occurs in. The same schema
/// variable names distinct planning variables in distinct steps.
pub type StepVar = (Variable, usize);

/// One equality or inequality constraint between a scoped variable and a
/// scoped term.
#[derive(Clone, PartialEq, Debug)]
pub struct Binding {
    pub variable: Variable,
    pub var_id: usize,
    pub term: Term,
    pub term_id: usize,
    pub is_equality: bool,
}

impl Binding {
    pub fn eq(variable: Variable, var_id: usize, term: Term, term_id: usize) -> Binding {
        Binding {
            variable,
            var_id,
            term,
            term_id,
            is_equality: true,
        }
    }

    pub fn neq(variable: Variable, var_id: usize, term: Term, term_id: usize) -> Binding {
        Binding {
            variable,
            var_id,
            term,
            term_id,
            is_equality: false,
        }
    }
}

/// Short binding lists built during unification.
pub type BindingList = SmallVec<[Binding; 4]>;

/// A term a variable class must stay different from.
#[derive(Clone, Copy, PartialEq, Debug)]
enum NeqTerm {
    Var(StepVar),
    Object(Object),
}

#[derive(Clone, Debug, Default)]
struct VarClass {
    constant: Option<Object>,
    members: Vec<StepVar>,
    distinct: Vec<NeqTerm>,
    /// Restricted object domain, when narrower than the variable's type.
    domain: Option<BTreeSet<Object>>,
}

/// The binding constraint set of a plan: equalities and inequalities over
/// step-scoped variables, maintained as a union-find of variable classes.
///
/// All operations are persistent: `add` returns a new set (or `None` on
/// inconsistency) and leaves the receiver untouched, so many plans can
/// share one set.
#[derive(Clone, Debug, Default)]
pub struct Bindings {
    assign: HashMap<StepVar, usize>,
    classes: Vec<VarClass>,
}

impl Bindings {
    pub fn new() -> Bindings {
        Bindings::default()
    }

    fn class_of(&self, sv: StepVar) -> Option<usize> {
        self.assign.get(&sv).copied()
    }

    fn ensure_class(&mut self, sv: StepVar) -> usize {
        if let Some(c) = self.class_of(sv) {
            return c;
        }
        let c = self.classes.len();
        self.classes.push(VarClass {
            constant: None,
            members: vec![sv],
            distinct: Vec::new(),
            domain: None,
        });
        self.assign.insert(sv, c);
        c
    }

    /// The value a scoped term resolves to: its bound object, or the term
    /// itself when unbound.
    pub fn binding(&self, term: Term, step_id: usize) -> Term {
        match term {
            Term::Object(_) => term,
            Term::Variable(v) => match self.class_of((v, step_id)).and_then(|c| self.classes[c].constant) {
                Some(o) => Term::Object(o),
                None => term,
            },
        }
    }

    /// Unifies two literals of the same polarity; on success the most
    /// general unifier is appended to `mgu`.
    pub fn unify(
        &self,
        mgu: &mut BindingList,
        l1: &Literal,
        id1: usize,
        l2: &Literal,
        id2: usize,
        terms: &TermTable,
        types: &TypeTable,
    ) -> bool {
        if l1.is_negative() != l2.is_negative() {
            return false;
        }
        self.unify_atoms(mgu, l1.atom(), id1, l2.atom(), id2, terms, types)
    }

    /// Unifies two atoms regardless of polarity.
    pub fn unify_atoms(
        &self,
        mgu: &mut BindingList,
        a1: &Atom,
        id1: usize,
        a2: &Atom,
        id2: usize,
        terms: &TermTable,
        types: &TypeTable,
    ) -> bool {
        if a1.predicate != a2.predicate || a1.terms.len() != a2.terms.len() {
            return false;
        }
        let mut tentative = BindingList::new();
        for (&t1, &t2) in a1.terms.iter().zip(&a2.terms) {
            let r1 = self.binding(t1, id1);
            let r2 = self.binding(t2, id2);
            match (r1, r2) {
                (Term::Object(x), Term::Object(y)) => {
                    if x != y {
                        return false;
                    }
                }
                (Term::Variable(v), other) => {
                    tentative.push(Binding::eq(v, id1, other, id2));
                }
                (other, Term::Variable(v)) => {
                    tentative.push(Binding::eq(v, id2, other, id1));
                }
            }
        }
        if self.add(&tentative, terms, types).is_some() {
            mgu.extend(tentative);
            true
        } else {
            false
        }
    }

    /// The threat test: true iff the effect literal can falsify the
    /// condition, i.e. it unifies with the condition's complement.
    pub fn affects(
        &self,
        mgu: &mut BindingList,
        effect_literal: &Literal,
        effect_id: usize,
        condition: &Literal,
        condition_id: usize,
        terms: &TermTable,
        types: &TypeTable,
    ) -> bool {
        if effect_literal.is_negative() == condition.is_negative() {
            return false;
        }
        self.unify_atoms(
            mgu,
            effect_literal.atom(),
            effect_id,
            condition.atom(),
            condition_id,
            terms,
            types,
        )
    }

    /// Returns the constraint set extended with `new`, or `None` when the
    /// result would be inconsistent.
    pub fn add(&self, new: &[Binding], terms: &TermTable, types: &TypeTable) -> Option<Bindings> {
        let mut work = self.clone();
        for b in new {
            let ok = if b.is_equality {
                work.merge((b.variable, b.var_id), b.term, b.term_id, terms, types)
            } else {
                work.separate((b.variable, b.var_id), b.term, b.term_id)
            };
            if !ok {
                return None;
            }
        }
        Some(work)
    }

    /// Intersects each parameter's class domain with the planning graph's
    /// observed domain for the action, or `None` when a domain empties.
    pub fn add_step_domains(
        &self,
        step_id: usize,
        action: &Action,
        graph: &PlanningGraph,
    ) -> Option<Bindings> {
        if action.parameters.is_empty() {
            return Some(self.clone());
        }
        let domains = graph.parameter_domains(&action.name)?;
        let mut work = self.clone();
        for (&param, dom) in action.parameters.iter().zip(domains) {
            let c = work.ensure_class((param, step_id));
            if let Some(o) = work.classes[c].constant {
                if !dom.contains(&o) {
                    return None;
                }
                continue;
            }
            let narrowed: BTreeSet<Object> = match &work.classes[c].domain {
                Some(existing) => existing.intersection(dom).copied().collect(),
                None => dom.clone(),
            };
            if narrowed.is_empty() {
                return None;
            }
            work.classes[c].domain = Some(narrowed);
        }
        Some(work)
    }

    /// True iff the inequality between the two scoped terms does not
    /// contradict the current constraints.
    pub fn consistent_with_inequality(
        &self,
        variable: Variable,
        var_id: usize,
        term: Term,
        term_id: usize,
    ) -> bool {
        let lhs = self.class_of((variable, var_id));
        match term {
            Term::Object(o) => lhs.map_or(true, |c| self.classes[c].constant != Some(o)),
            Term::Variable(v) => {
                let rhs = self.class_of((v, term_id));
                match (lhs, rhs) {
                    (Some(c1), Some(c2)) => {
                        c1 != c2
                            && !(self.classes[c1].constant.is_some()
                                && self.classes[c1].constant == self.classes[c2].constant)
                    }
                    _ => (variable, var_id) != (v, term_id),
                }
            }
        }
    }

    /// The set of objects the scoped variable can still denote.
    pub fn domain(
        &self,
        v: Variable,
        step_id: usize,
        terms: &TermTable,
        types: &TypeTable,
    ) -> BTreeSet<Object> {
        let class = self.class_of((v, step_id)).map(|c| &self.classes[c]);
        if let Some(o) = class.and_then(|c| c.constant) {
            return std::iter::once(o).collect();
        }
        let mut base: BTreeSet<Object> = match class.and_then(|c| c.domain.as_ref()) {
            Some(dom) => dom.clone(),
            None => terms
                .compatible_objects(terms.variable_type(v), types)
                .into_iter()
                .collect(),
        };
        if let Some(class) = class {
            for neq in &class.distinct {
                match neq {
                    NeqTerm::Object(o) => {
                        base.remove(o);
                    }
                    NeqTerm::Var(sv) => {
                        if let Some(o) = self.class_of(*sv).and_then(|c| self.classes[c].constant) {
                            base.remove(&o);
                        }
                    }
                }
            }
        }
        base
    }

    fn merge(
        &mut self,
        sv: StepVar,
        term: Term,
        term_id: usize,
        terms: &TermTable,
        types: &TypeTable,
    ) -> bool {
        match term {
            Term::Object(o) => self.bind_object(sv, o, terms, types),
            Term::Variable(v2) => self.union(sv, (v2, term_id), terms, types),
        }
    }

    fn bind_object(&mut self, sv: StepVar, o: Object, terms: &TermTable, types: &TypeTable) -> bool {
        if !types.is_subtype(terms.object_type(o), terms.variable_type(sv.0)) {
            return false;
        }
        let c = self.ensure_class(sv);
        if let Some(existing) = self.classes[c].constant {
            return existing == o;
        }
        if self.violates_distinct(c, o) {
            return false;
        }
        if let Some(dom) = &self.classes[c].domain {
            if !dom.contains(&o) {
                return false;
            }
        }
        self.classes[c].constant = Some(o);
        true
    }

    fn union(&mut self, a: StepVar, b: StepVar, terms: &TermTable, types: &TypeTable) -> bool {
        if !types.compatible(terms.variable_type(a.0), terms.variable_type(b.0)) {
            return false;
        }
        let c1 = self.ensure_class(a);
        let c2 = self.ensure_class(b);
        if c1 == c2 {
            return true;
        }
        if self.classes_distinct(c1, c2) {
            return false;
        }
        let constant = match (self.classes[c1].constant, self.classes[c2].constant) {
            (Some(x), Some(y)) if x != y => return false,
            (x, y) => x.or(y),
        };
        let domain = match (self.classes[c1].domain.take(), self.classes[c2].domain.take()) {
            (Some(d1), Some(d2)) => {
                let inter: BTreeSet<Object> = d1.intersection(&d2).copied().collect();
                if inter.is_empty() {
                    return false;
                }
                Some(inter)
            }
            (d1, d2) => d1.or(d2),
        };
        if let (Some(o), Some(dom)) = (constant, &domain) {
            if !dom.contains(&o) {
                return false;
            }
        }
        // absorb c2 into c1
        let moved_members = std::mem::take(&mut self.classes[c2].members);
        for &member in &moved_members {
            self.assign.insert(member, c1);
        }
        self.classes[c1].members.extend(moved_members);
        let moved_distinct = std::mem::take(&mut self.classes[c2].distinct);
        self.classes[c1].distinct.extend(moved_distinct);
        self.classes[c2].constant = None;
        self.classes[c1].constant = constant;
        self.classes[c1].domain = domain;
        if let Some(o) = constant {
            if self.violates_distinct(c1, o) {
                return false;
            }
        }
        true
    }

    fn separate(&mut self, sv: StepVar, term: Term, term_id: usize) -> bool {
        match term {
            Term::Object(o) => {
                let c = self.ensure_class(sv);
                if self.classes[c].constant == Some(o) {
                    return false;
                }
                self.classes[c].distinct.push(NeqTerm::Object(o));
                true
            }
            Term::Variable(v2) => {
                let other = (v2, term_id);
                if sv == other {
                    return false;
                }
                let c1 = self.ensure_class(sv);
                let c2 = self.ensure_class(other);
                if c1 == c2 {
                    return false;
                }
                if let (Some(x), Some(y)) = (self.classes[c1].constant, self.classes[c2].constant) {
                    if x == y {
                        return false;
                    }
                }
                self.classes[c1].distinct.push(NeqTerm::Var(other));
                self.classes[c2].distinct.push(NeqTerm::Var(sv));
                true
            }
        }
    }

    /// True iff binding class `c` to `o` violates one of its inequalities.
    fn violates_distinct(&self, c: usize, o: Object) -> bool {
        self.classes[c].distinct.iter().any(|neq| match neq {
            NeqTerm::Object(o2) => *o2 == o,
            NeqTerm::Var(sv) => {
                self.class_of(*sv).and_then(|c2| self.classes[c2].constant) == Some(o)
            }
        })
    }

    /// True iff the two classes are constrained to be different.
    fn classes_distinct(&self, c1: usize, c2: usize) -> bool {
        self.classes[c1].distinct.iter().any(|neq| match neq {
            NeqTerm::Var(sv) => self.class_of(*sv) == Some(c2),
            NeqTerm::Object(_) => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weaver_model::{PredicateTable, TypeId};

    struct Fixture {
        types: TypeTable,
        terms: TermTable,
        preds: PredicateTable,
    }

    fn fixture() -> Fixture {
        let types = TypeTable::new();
        let terms = TermTable::new();
        let preds = PredicateTable::new();
        Fixture { types, terms, preds }
    }

    #[test]
    fn unify_binds_variable_to_object() {
        let mut f = fixture();
        let at = f.preds.add("at", vec![TypeId::OBJECT]);
        let home = f.terms.add_object("home", TypeId::OBJECT);
        let x = f.terms.add_variable(TypeId::OBJECT);
        let bindings = Bindings::new();
        let mut mgu = BindingList::new();
        let a1 = Atom::new(at, vec![x.into()]);
        let a2 = Atom::new(at, vec![home.into()]);
        assert!(bindings.unify_atoms(&mut mgu, &a1, 1, &a2, 2, &f.terms, &f.types));
        assert_eq!(mgu.len(), 1);
        let committed = bindings.add(&mgu, &f.terms, &f.types).unwrap();
        assert_eq!(committed.binding(x.into(), 1), Term::Object(home));
    }

    #[test]
    fn inequality_blocks_equality() {
        let mut f = fixture();
        let bob = f.terms.add_object("bob", TypeId::OBJECT);
        let x = f.terms.add_variable(TypeId::OBJECT);
        let bindings = Bindings::new()
            .add(&[Binding::neq(x, 1, bob.into(), 0)], &f.terms, &f.types)
            .unwrap();
        assert!(bindings
            .add(&[Binding::eq(x, 1, bob.into(), 0)], &f.terms, &f.types)
            .is_none());
    }

    #[test]
    fn transitive_conflict_detected() {
        let mut f = fixture();
        let a = f.terms.add_object("a", TypeId::OBJECT);
        let b = f.terms.add_object("b", TypeId::OBJECT);
        let x = f.terms.add_variable(TypeId::OBJECT);
        let y = f.terms.add_variable(TypeId::OBJECT);
        // x@1 == a, y@2 == b, then x@1 == y@2 must fail
        let bindings = Bindings::new()
            .add(
                &[
                    Binding::eq(x, 1, a.into(), 0),
                    Binding::eq(y, 2, b.into(), 0),
                ],
                &f.terms,
                &f.types,
            )
            .unwrap();
        assert!(bindings
            .add(&[Binding::eq(x, 1, y.into(), 2)], &f.terms, &f.types)
            .is_none());
    }

    #[test]
    fn same_variable_different_steps_is_distinct() {
        let mut f = fixture();
        let a = f.terms.add_object("a", TypeId::OBJECT);
        let b = f.terms.add_object("b", TypeId::OBJECT);
        let x = f.terms.add_variable(TypeId::OBJECT);
        let bindings = Bindings::new()
            .add(
                &[
                    Binding::eq(x, 1, a.into(), 0),
                    Binding::eq(x, 2, b.into(), 0),
                ],
                &f.terms,
                &f.types,
            )
            .unwrap();
        assert_eq!(bindings.binding(x.into(), 1), Term::Object(a));
        assert_eq!(bindings.binding(x.into(), 2), Term::Object(b));
    }

    #[test]
    fn domain_excludes_distinct_objects() {
        let mut f = fixture();
        let bob = f.terms.add_object("bob", TypeId::OBJECT);
        let alice = f.terms.add_object("alice", TypeId::OBJECT);
        let x = f.terms.add_variable(TypeId::OBJECT);
        let bindings = Bindings::new()
            .add(&[Binding::neq(x, 1, bob.into(), 0)], &f.terms, &f.types)
            .unwrap();
        let dom = bindings.domain(x, 1, &f.terms, &f.types);
        assert!(dom.contains(&alice));
        assert!(!dom.contains(&bob));
    }

    #[test]
    fn affects_requires_opposite_polarity() {
        let mut f = fixture();
        let p = f.preds.add("p", vec![]);
        let bindings = Bindings::new();
        let atom = Atom::new(p, vec![]);
        let mut mgu = BindingList::new();
        assert!(bindings.affects(
            &mut mgu,
            &Literal::Negative(atom.clone()),
            1,
            &Literal::Positive(atom.clone()),
            2,
            &f.terms,
            &f.types,
        ));
        assert!(!bindings.affects(
            &mut mgu,
            &Literal::Positive(atom.clone()),
            1,
            &Literal::Positive(atom),
            2,
            &f.terms,
            &f.types,
        ));
    }
}
