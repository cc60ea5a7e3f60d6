use std::marker::PhantomData;

/// A set of values that can be converted into small unsigned integers,
/// backed by a bitset.
///
/// Used by the ordering engine to keep one predecessor/successor set per
/// step; `union_with` is the workhorse of transitive-closure maintenance.
#[derive(Clone, PartialEq, Eq)]
pub struct IdSet<K> {
    set: bit_set::BitSet,
    _phantom: PhantomData<K>,
}

impl<K: Into<usize> + From<usize>> IdSet<K> {
    pub fn new() -> IdSet<K> {
        IdSet {
            set: Default::default(),
            _phantom: Default::default(),
        }
    }

    pub fn insert(&mut self, k: K) {
        self.set.insert(k.into());
    }

    pub fn remove(&mut self, k: K) {
        self.set.remove(k.into());
    }

    pub fn contains(&self, k: K) -> bool {
        self.set.contains(k.into())
    }

    pub fn union_with(&mut self, other: &IdSet<K>) {
        self.set.union_with(&other.set);
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = K> + '_ {
        self.set.iter().map(K::from)
    }
}

impl<K: Into<usize> + From<usize>> Default for IdSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<usize> + From<usize> + std::fmt::Debug> std::fmt::Debug for IdSet<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_union() {
        let mut a: IdSet<usize> = IdSet::new();
        a.insert(1);
        a.insert(4);
        let mut b: IdSet<usize> = IdSet::new();
        b.insert(2);
        b.union_with(&a);
        assert!(b.contains(1));
        assert!(b.contains(2));
        assert!(b.contains(4));
        assert_eq!(b.iter().collect::<Vec<_>>(), vec![1, 2, 4]);
    }
}
