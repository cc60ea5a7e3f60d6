use crate::types::{TypeId, TypeTable};

/// A typed constant.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Object(u32);

/// A typed variable. Variables are allocated monotonically; the search
/// allocates fresh ones while refining plans.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Variable(u32);

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "?v{}", self.0)
    }
}

/// Either an object or a variable.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Term {
    Object(Object),
    Variable(Variable),
}

impl Term {
    pub fn as_variable(self) -> Option<Variable> {
        match self {
            Term::Variable(v) => Some(v),
            Term::Object(_) => None,
        }
    }

    pub fn as_object(self) -> Option<Object> {
        match self {
            Term::Object(o) => Some(o),
            Term::Variable(_) => None,
        }
    }

    pub fn is_variable(self) -> bool {
        matches!(self, Term::Variable(_))
    }
}

impl From<Object> for Term {
    fn from(o: Object) -> Term {
        Term::Object(o)
    }
}

impl From<Variable> for Term {
    fn from(v: Variable) -> Term {
        Term::Variable(v)
    }
}

/// Table of objects and variables.
///
/// A domain seeds the table with its constants and schema variables; a
/// problem extends a clone with its objects; the search extends a further
/// clone with the fresh variables created during refinement.
#[derive(Clone, Debug, Default)]
pub struct TermTable {
    object_names: Vec<String>,
    object_types: Vec<TypeId>,
    variable_types: Vec<TypeId>,
}

impl TermTable {
    pub fn new() -> TermTable {
        TermTable::default()
    }

    pub fn add_object(&mut self, name: impl Into<String>, tpe: TypeId) -> Object {
        let id = Object(self.object_names.len() as u32);
        self.object_names.push(name.into());
        self.object_types.push(tpe);
        id
    }

    pub fn add_variable(&mut self, tpe: TypeId) -> Variable {
        let id = Variable(self.variable_types.len() as u32);
        self.variable_types.push(tpe);
        id
    }

    pub fn object_name(&self, o: Object) -> &str {
        &self.object_names[o.0 as usize]
    }

    pub fn object_named(&self, name: &str) -> Option<Object> {
        self.object_names
            .iter()
            .position(|n| n == name)
            .map(|i| Object(i as u32))
    }

    pub fn object_type(&self, o: Object) -> TypeId {
        self.object_types[o.0 as usize]
    }

    pub fn variable_type(&self, v: Variable) -> TypeId {
        self.variable_types[v.0 as usize]
    }

    pub fn type_of(&self, t: Term) -> TypeId {
        match t {
            Term::Object(o) => self.object_type(o),
            Term::Variable(v) => self.variable_type(v),
        }
    }

    pub fn objects(&self) -> impl Iterator<Item = Object> + '_ {
        (0..self.object_names.len()).map(|i| Object(i as u32))
    }

    /// All objects whose type is a subtype of `tpe`.
    pub fn compatible_objects(&self, tpe: TypeId, types: &TypeTable) -> Vec<Object> {
        self.objects()
            .filter(|&o| types.is_subtype(self.object_type(o), tpe))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_object_lookup() {
        let mut types = TypeTable::new();
        let room = types.add("room", TypeId::OBJECT);
        let ball = types.add("ball", TypeId::OBJECT);
        let mut terms = TermTable::new();
        let r1 = terms.add_object("room1", room);
        let r2 = terms.add_object("room2", room);
        let b = terms.add_object("ball1", ball);
        assert_eq!(terms.object_named("room2"), Some(r2));
        assert_eq!(terms.compatible_objects(room, &types), vec![r1, r2]);
        assert_eq!(terms.compatible_objects(TypeId::OBJECT, &types), vec![r1, r2, b]);
    }
}
