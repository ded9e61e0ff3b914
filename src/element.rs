//! Element bound plus the swappable sort order and filter handles.
use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Anything the engine can sort and display.
///
/// Elements are compared for identity through `Eq`/`Hash` and are never mutated.
/// Cheap clones matter: use `Arc<Row>` or small ids for heavy rows.
pub trait Element: Clone + Eq + Hash + Send + Sync + 'static {}

impl<T: Clone + Eq + Hash + Send + Sync + 'static> Element for T {}

type CompareFn<T> = dyn Fn(&T, &T) -> Ordering + Send + Sync;
type PredicateFn<T> = dyn Fn(&T) -> bool + Send + Sync;

/// A comparator shared between the caller and the worker thread.
///
/// Two orders are the same only if they were cloned from the same value, so
/// installing a freshly built order always triggers a re-sort.
pub struct SortOrder<T> {
    compare: Arc<CompareFn<T>>,
}

impl<T> Clone for SortOrder<T> {
    fn clone(&self) -> Self {
        Self {
            compare: self.compare.clone(),
        }
    }
}

impl<T> fmt::Debug for SortOrder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SortOrder({:p})", Arc::as_ptr(&self.compare))
    }
}

impl<T> SortOrder<T> {
    /// Wraps a comparator closure.
    pub fn new<F>(compare: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        Self {
            compare: Arc::new(compare),
        }
    }

    /// Compares two elements.
    #[inline]
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        (self.compare)(a, b)
    }

    /// Returns true if both handles share the same comparator.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.compare, &other.compare)
    }

    /// The same comparator with its result reversed.
    pub fn reversed(&self) -> Self
    where
        T: 'static,
    {
        let inner = self.compare.clone();
        Self {
            compare: Arc::new(move |a: &T, b: &T| inner(b, a)),
        }
    }
}

impl<T: Ord + 'static> SortOrder<T> {
    /// Natural ascending order.
    pub fn natural() -> Self {
        Self::new(T::cmp)
    }
}

/// A predicate deciding which elements are shown.
pub struct Filter<T> {
    accept: Arc<PredicateFn<T>>,
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            accept: self.accept.clone(),
        }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Filter({:p})", Arc::as_ptr(&self.accept))
    }
}

impl<T> Default for Filter<T> {
    fn default() -> Self {
        Self::accept_all()
    }
}

impl<T> Filter<T> {
    /// Wraps a predicate closure.
    pub fn new<F>(accept: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            accept: Arc::new(accept),
        }
    }

    /// A filter letting everything through.
    pub fn accept_all() -> Self {
        Self::new(|_| true)
    }

    /// Returns true if `element` should be shown.
    #[inline]
    pub fn accepts(&self, element: &T) -> bool {
        (self.accept)(element)
    }

    /// Returns true if both handles share the same predicate.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.accept, &other.accept)
    }
}
