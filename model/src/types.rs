/// Identifier of a type in a [`TypeTable`].
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TypeId(u32);

impl TypeId {
    /// The root type every object belongs to.
    pub const OBJECT: TypeId = TypeId(0);
}

/// Table of object types with single inheritance.
#[derive(Clone, Debug)]
pub struct TypeTable {
    names: Vec<String>,
    parents: Vec<Option<TypeId>>,
}

impl TypeTable {
    pub fn new() -> TypeTable {
        TypeTable {
            names: vec!["object".to_string()],
            parents: vec![None],
        }
    }

    /// Declares a new type deriving from `parent`.
    pub fn add(&mut self, name: impl Into<String>, parent: TypeId) -> TypeId {
        let id = TypeId(self.names.len() as u32);
        self.names.push(name.into());
        self.parents.push(Some(parent));
        id
    }

    pub fn id_of(&self, name: &str) -> Option<TypeId> {
        self.names.iter().position(|n| n == name).map(|i| TypeId(i as u32))
    }

    pub fn name(&self, t: TypeId) -> &str {
        &self.names[t.0 as usize]
    }

    /// True iff `sub` is `sup` or derives from it.
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        let mut cur = Some(sub);
        while let Some(t) = cur {
            if t == sup {
                return true;
            }
            cur = self.parents[t.0 as usize];
        }
        false
    }

    /// True iff a value of one type could denote a value of the other.
    pub fn compatible(&self, a: TypeId, b: TypeId) -> bool {
        self.is_subtype(a, b) || self.is_subtype(b, a)
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        TypeTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtyping() {
        let mut types = TypeTable::new();
        let vehicle = types.add("vehicle", TypeId::OBJECT);
        let car = types.add("car", vehicle);
        let person = types.add("person", TypeId::OBJECT);
        assert!(types.is_subtype(car, vehicle));
        assert!(types.is_subtype(car, TypeId::OBJECT));
        assert!(!types.is_subtype(vehicle, car));
        assert!(!types.compatible(car, person));
        assert!(types.compatible(vehicle, car));
        assert_eq!(types.id_of("car"), Some(car));
    }
}
