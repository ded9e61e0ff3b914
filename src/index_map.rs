//! Element → position lookup shared by the collection and the table updator.
use indexmap::IndexMap;

use crate::Element;

/// Hash map from an element to the slot (or row) currently holding it.
#[derive(Debug, Clone)]
pub struct ElementIndex<T: Element> {
    positions: IndexMap<T, usize>,
}

impl<T: Element> Default for ElementIndex<T> {
    fn default() -> Self {
        Self {
            positions: IndexMap::new(),
        }
    }
}

impl<T: Element> ElementIndex<T> {
    /// Creates an empty index sized for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: IndexMap::with_capacity(capacity),
        }
    }

    /// Position of `element`, if indexed.
    #[inline]
    pub fn get(&self, element: &T) -> Option<usize> {
        self.positions.get(element).copied()
    }

    /// Records `element` at `position`, returning its previous position.
    #[inline]
    pub fn insert(&mut self, element: T, position: usize) -> Option<usize> {
        self.positions.insert(element, position)
    }

    /// Forgets `element`, returning the position it had.
    #[inline]
    pub fn remove(&mut self, element: &T) -> Option<usize> {
        self.positions.swap_remove(element)
    }

    /// Number of indexed elements.
    #[cfg(any(test, feature = "verify"))]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.positions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut index = ElementIndex::with_capacity(4);
        assert_eq!(index.insert("a", 1), None);
        assert_eq!(index.insert("b", 2), None);
        assert_eq!(index.insert("a", 3), Some(1));
        assert_eq!(index.get(&"a"), Some(3));
        assert_eq!(index.len(), 2);
        assert_eq!(index.remove(&"a"), Some(3));
        assert_eq!(index.remove(&"a"), None);
        assert_eq!(index.get(&"a"), None);
        assert_eq!(index.get(&"b"), Some(2));
        index.clear();
        assert_eq!(index.len(), 0);
    }
}
