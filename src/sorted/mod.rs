//! A lazily sorted collection answering windowed range queries.
//!
//! The collection is an unbalanced binary search tree stored in an arena. Every node
//! holds a pivot, a left subtree (elements smaller than the pivot), a right subtree
//! (elements not smaller than the pivot) and a chain of *unsorted* children whose
//! relation to the pivot is not known yet.
//!
//! Insertion appends to the unsorted chain of the root without comparing anything.
//! When a query needs to know which elements sit in one of the subtrees, the node is
//! *partitioned*: each unsorted child is compared once against the pivot and moved to
//! the left or right subtree. Queries only partition the nodes on the path to the
//! requested window, so elements that are never displayed are never compared.
//!
//! ```text
//!                 ┌───────┐
//!                 │ pivot │──unsorted──▶ u1 ──▶ u2 ──▶ u3
//!                 └───────┘
//!                  │     │
//!            left ─┘     └─ right
//!         (< pivot)       (>= pivot)
//! ```
//!
//! Removing a node with children only flags it (tombstone); the next partition of that
//! node splices it out for real.
use std::cmp::Ordering;
use std::mem;

use crate::Element;
use crate::cancel::{CancelToken, Canceled};
use crate::element::SortOrder;
use crate::index_map::ElementIndex;

#[cfg(test)]
mod proptests;

const MIN_CAPACITY: usize = 8;

type NodeId = usize;

#[derive(Debug, Clone)]
enum Slot<T> {
    /// On the freelist
    Free,
    /// Lazily removed: still linked in the tree but not counted
    Removed,
    Live(T),
}

impl<T> Slot<T> {
    fn is_live(&self) -> bool {
        matches!(self, Slot::Live(_))
    }

    fn is_free(&self) -> bool {
        matches!(self, Slot::Free)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Node {
    left: Option<NodeId>,
    right: Option<NodeId>,
    next_unsorted: Option<NodeId>,
    parent: Option<NodeId>,
    /// Live nodes in this subtree, unsorted chain included. For unsorted and free
    /// nodes this is the length of the chain starting here.
    size: usize,
}

/// Edge hanging off a node, used to graft elements below it.
#[derive(Debug, Clone, Copy)]
enum Link {
    Left(NodeId),
    Right(NodeId),
}

/// Collection of elements kept in an order given by a [`SortOrder`], sorted only as
/// far as queries require.
pub struct LazySortedCollection<T: Element> {
    contents: Vec<Slot<T>>,
    nodes: Vec<Node>,
    root: Option<NodeId>,
    first_unused: Option<NodeId>,
    /// Built on first lookup, dropped when the arena is compacted
    index: Option<ElementIndex<T>>,
    order: SortOrder<T>,
    counter: usize,
    verify: bool,
}

impl<T: Element> LazySortedCollection<T> {
    /// Creates an empty collection sorted by `order`.
    pub fn new(order: SortOrder<T>) -> Self {
        Self::with_capacity(order, MIN_CAPACITY)
    }

    /// Creates an empty collection with room for `capacity` elements.
    pub fn with_capacity(order: SortOrder<T>, capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        Self {
            contents: Vec::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            root: None,
            first_unused: None,
            index: None,
            order,
            counter: 0,
            verify: false,
        }
    }

    /// Enables the invariant walker after every mutating call and disables the
    /// pseudo-random pivot promotion, making the tree shape deterministic.
    ///
    /// Very slow; meant for test suites.
    #[cfg(any(test, feature = "verify"))]
    pub fn set_verify(&mut self, verify: bool) {
        self.verify = verify;
    }

    /// The order this collection sorts by.
    pub fn sort_order(&self) -> &SortOrder<T> {
        &self.order
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.size_of(self.root)
    }

    /// True if the collection holds no element.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserves room for `capacity` elements. Never shrinks.
    pub fn set_capacity(&mut self, capacity: usize) {
        if capacity > self.nodes.capacity() {
            let additional = capacity - self.nodes.len();
            self.nodes.reserve_exact(additional);
            self.contents.reserve_exact(additional);
        }
    }

    /// Adds an element in O(1) amortized time, without comparing it to anything.
    pub fn add(&mut self, value: T) {
        let node = self.create_node(value);
        let root = self.add_unsorted(self.root, node);
        self.set_root(Some(root));
        self.verify_invariants();
    }

    /// Adds every element of `values`.
    pub fn add_all<I: IntoIterator<Item = T>>(&mut self, values: I) {
        let values = values.into_iter();
        self.set_capacity(self.nodes.len() + values.size_hint().0);
        for value in values {
            self.add(value);
        }
    }

    /// Removes `value`. Unknown elements are ignored.
    pub fn remove(&mut self, value: &T) {
        self.remove_one(value);
        self.pack();
        self.verify_invariants();
    }

    /// Removes every element of `values`, compacting at most once.
    pub fn remove_all(&mut self, values: &[T]) {
        for value in values {
            self.remove_one(value);
        }
        self.pack();
        self.verify_invariants();
    }

    /// Returns true if `value` is in the collection.
    pub fn contains(&mut self, value: &T) -> bool {
        self.index_of(value).is_some()
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.contents = Vec::with_capacity(MIN_CAPACITY);
        self.nodes = Vec::with_capacity(MIN_CAPACITY);
        self.root = None;
        self.first_unused = None;
        self.index = None;
        self.verify_invariants();
    }

    /// Keeps the `n` smallest elements and drops the rest.
    ///
    /// Only the part of the tree holding the boundary gets partitioned.
    pub fn retain_first(&mut self, n: usize, cancel: &mut CancelToken) -> Result<(), Canceled> {
        let size = self.len();
        if n >= size {
            return Ok(());
        }
        self.remove_range(n, size - n, cancel)
    }

    /// Uncancelable [`LazySortedCollection::retain_first`].
    pub fn retain(&mut self, n: usize) {
        let _ = self.retain_first(n, &mut CancelToken::new());
    }

    /// Removes the elements at sorted positions `[start, start + len)`.
    ///
    /// Subtrees entirely covered by the range are pruned without comparing their
    /// elements.
    pub fn remove_range(&mut self, start: usize, len: usize, cancel: &mut CancelToken) -> Result<(), Canceled> {
        let outcome = self.remove_range_at(self.root, start, len, cancel);
        self.pack();
        self.verify_invariants();
        outcome
    }

    /// Uncancelable [`LazySortedCollection::remove_range`].
    pub fn remove_range_now(&mut self, start: usize, len: usize) {
        let _ = self.remove_range(start, len, &mut CancelToken::new());
    }

    /// Returns the elements at sorted positions `[start, start + len)`.
    ///
    /// The result always holds exactly the elements a fully sorted collection would
    /// have in that window. With `sorted == false` they may come in any order, which
    /// is cheaper.
    pub fn get_range(
        &mut self,
        start: usize,
        len: usize,
        sorted: bool,
        cancel: &mut CancelToken,
    ) -> Result<Vec<T>, Canceled> {
        let limit = len.min(self.len().saturating_sub(start));
        let mut out = Vec::with_capacity(limit);
        let outcome = self.collect_range(&mut out, limit, start, self.root, sorted, cancel);
        self.verify_invariants();
        outcome.map(|_| out)
    }

    /// Uncancelable [`LazySortedCollection::get_range`].
    pub fn range(&mut self, start: usize, len: usize, sorted: bool) -> Vec<T> {
        self.get_range(start, len, sorted, &mut CancelToken::new())
            .unwrap_or_default()
    }

    /// The `n` smallest elements.
    pub fn first(&mut self, n: usize, sorted: bool) -> Vec<T> {
        self.range(0, n, sorted)
    }

    /// Every element, in sorted order if requested.
    pub fn items(&mut self, sorted: bool) -> Vec<T> {
        let len = self.len();
        self.range(0, len, sorted)
    }

    /// The element at sorted position `index`.
    pub fn get_item(&mut self, index: usize) -> Option<T> {
        self.range(index, 1, false).pop()
    }

    //--------------------------------------------------------------------------
    // tree plumbing

    #[inline]
    fn size_of(&self, node: Option<NodeId>) -> usize {
        node.map_or(0, |n| self.nodes[n].size)
    }

    fn set_root(&mut self, node: Option<NodeId>) {
        self.root = node;
        if let Some(node) = node {
            self.nodes[node].parent = None;
        }
    }

    fn is_less(&self, a: NodeId, b: NodeId) -> bool {
        match (&self.contents[a], &self.contents[b]) {
            (Slot::Live(a), Slot::Live(b)) => self.order.compare(a, b) == Ordering::Less,
            _ => {
                debug_assert!(false, "comparing a node without element");
                false
            }
        }
    }

    fn link_target(&self, link: Link) -> Option<NodeId> {
        match link {
            Link::Left(owner) => self.nodes[owner].left,
            Link::Right(owner) => self.nodes[owner].right,
        }
    }

    fn set_link(&mut self, link: Link, target: Option<NodeId>) {
        let owner = match link {
            Link::Left(owner) => {
                self.nodes[owner].left = target;
                owner
            }
            Link::Right(owner) => {
                self.nodes[owner].right = target;
                owner
            }
        };
        if let Some(target) = target {
            self.nodes[target].parent = Some(owner);
        }
    }

    fn create_node(&mut self, value: T) -> NodeId {
        let node = Node {
            size: 1,
            ..Node::default()
        };
        let id = match self.first_unused {
            Some(id) => {
                self.first_unused = self.nodes[id].next_unsorted;
                self.nodes[id] = node;
                self.contents[id] = Slot::Live(value);
                id
            }
            None => {
                self.nodes.push(node);
                self.contents.push(Slot::Live(value));
                self.nodes.len() - 1
            }
        };
        if let (Some(index), Slot::Live(value)) = (&mut self.index, &self.contents[id]) {
            index.insert(value.clone(), id);
        }
        id
    }

    /// Slot holding `value`, building the index on first use.
    fn index_of(&mut self, value: &T) -> Option<NodeId> {
        let contents = &self.contents;
        let index = self.index.get_or_insert_with(|| {
            let mut index = ElementIndex::with_capacity(contents.len());
            for (id, slot) in contents.iter().enumerate() {
                if let Slot::Live(element) = slot {
                    index.insert(element.clone(), id);
                }
            }
            index
        });
        index.get(value)
    }

    /// Puts the freed slot on the freelist.
    fn destroy_node(&mut self, id: NodeId) {
        if let Slot::Live(value) = mem::replace(&mut self.contents[id], Slot::Free)
            && let Some(index) = &mut self.index
        {
            index.remove(&value);
        }
        let size = self.size_of(self.first_unused) + 1;
        self.nodes[id] = Node {
            next_unsorted: self.first_unused,
            size,
            ..Node::default()
        };
        if let Some(head) = self.first_unused {
            self.nodes[head].parent = Some(id);
        }
        self.first_unused = Some(id);
    }

    /// Points whatever referenced `node` at `replacement` instead.
    fn replace_node(&mut self, node: NodeId, replacement: Option<NodeId>) {
        match self.nodes[node].parent {
            None => {
                if self.root == Some(node) {
                    self.set_root(replacement);
                }
            }
            Some(parent) => {
                let p = &mut self.nodes[parent];
                if p.left == Some(node) {
                    p.left = replacement;
                } else if p.right == Some(node) {
                    p.right = replacement;
                } else if p.next_unsorted == Some(node) {
                    p.next_unsorted = replacement;
                }
                if let Some(replacement) = replacement {
                    self.nodes[replacement].parent = Some(parent);
                }
            }
        }
    }

    fn recompute_size(&mut self, node: NodeId) {
        let n = self.nodes[node];
        self.nodes[node].size = self.size_of(n.left)
            + self.size_of(n.right)
            + self.size_of(n.next_unsorted)
            + usize::from(self.contents[node].is_live());
    }

    /// Walks toward the root until a size stops changing.
    fn recompute_ancestor_sizes(&mut self, mut node: Option<NodeId>) {
        while let Some(n) = node {
            let old = self.nodes[n].size;
            self.recompute_size(n);
            if self.nodes[n].size == old {
                break;
            }
            node = self.nodes[n].parent;
        }
    }

    /// Recomputes sizes from `node` up to, but excluding, `stop`.
    fn force_recompute_sizes(&mut self, mut node: Option<NodeId>, stop: NodeId) {
        while let Some(n) = node {
            if n == stop {
                break;
            }
            self.recompute_size(n);
            node = self.nodes[n].parent;
        }
    }

    /// Appends the unsorted chain starting at `chain` to the chain of `node`.
    fn append_unsorted(&mut self, node: NodeId, chain: Option<NodeId>) {
        let Some(chain) = chain else { return };
        let extra = self.nodes[chain].size;
        let mut tail = node;
        loop {
            self.nodes[tail].size += extra;
            match self.nodes[tail].next_unsorted {
                Some(next) => tail = next,
                None => break,
            }
        }
        self.nodes[tail].next_unsorted = Some(chain);
        self.nodes[chain].parent = Some(tail);
    }

    /// Hangs `element` below `subtree` without comparing it. Returns the new root of
    /// the subtree, which is `element` itself when it got promoted to pivot.
    fn add_unsorted(&mut self, subtree: Option<NodeId>, element: NodeId) -> NodeId {
        let Some(subtree) = subtree else {
            self.nodes[element].next_unsorted = None;
            self.nodes[element].size = 1;
            return element;
        };

        // only tombstones left: drop them
        if self.nodes[subtree].size == 0 {
            self.remove_subtree(subtree);
            self.nodes[element].next_unsorted = None;
            self.nodes[element].size = 1;
            return element;
        }

        let target = self.nodes[subtree];
        let added = self.nodes[element];
        // A counter stands in for a random generator: sometimes the newcomer becomes
        // the pivot so that insertion order does not dictate the tree shape.
        if !self.verify
            && target.left.is_none()
            && target.right.is_none()
            && added.left.is_none()
            && added.right.is_none()
            && self.contents[subtree].is_live()
        {
            self.counter = self.counter.wrapping_add(1);
            if self.counter % target.size == 0 {
                self.nodes[element].next_unsorted = Some(subtree);
                self.nodes[element].parent = target.parent;
                self.nodes[element].size = target.size + 1;
                self.nodes[subtree].parent = Some(element);
                return element;
            }
        }

        self.nodes[element].next_unsorted = target.next_unsorted;
        self.nodes[element].size = match target.next_unsorted {
            Some(next) => {
                self.nodes[next].parent = Some(element);
                self.nodes[next].size + 1
            }
            None => 1,
        };
        self.nodes[element].parent = Some(subtree);
        self.nodes[subtree].next_unsorted = Some(element);
        self.nodes[subtree].size += 1;
        subtree
    }

    /// Moves every unsorted child of `subtree` into its left or right subtree.
    ///
    /// The tree is consistent after every step, so cancellation can stop it anywhere.
    fn partition(&mut self, subtree: NodeId, cancel: &mut CancelToken) -> Result<(), Canceled> {
        while self.partition_step(subtree) {
            cancel.check()?;
        }
        Ok(())
    }

    /// Moves the first unsorted child of `subtree` to its side. Returns false once
    /// the chain is empty.
    fn partition_step(&mut self, subtree: NodeId) -> bool {
        let Some(child) = self.nodes[subtree].next_unsorted else {
            return false;
        };
        let next = self.nodes[child].next_unsorted;
        let link = if self.is_less(child, subtree) {
            Link::Left(subtree)
        } else {
            Link::Right(subtree)
        };
        let grafted = self.add_unsorted(self.link_target(link), child);
        self.set_link(link, Some(grafted));

        self.nodes[subtree].next_unsorted = next;
        if let Some(next) = next {
            self.nodes[next].parent = Some(subtree);
        }
        true
    }

    /// Physically removes lazily removed pivots until one holding an element takes
    /// the place of `node`. Returns that node, `node` itself if it was live.
    fn resolve(&mut self, mut node: NodeId) -> Option<NodeId> {
        while !self.contents[node].is_live() {
            node = self.remove_node(node)?;
        }
        Some(node)
    }

    fn remove_one(&mut self, value: &T) {
        let Some(id) = self.index_of(value) else { return };
        let parent = self.nodes[id].parent;
        self.lazy_remove_node(id);
        self.recompute_ancestor_sizes(parent);
    }

    /// Removes a leaf right away, flags anything else for later.
    fn lazy_remove_node(&mut self, id: NodeId) {
        let node = self.nodes[id];
        if node.left.is_none() && node.right.is_none() {
            self.replace_node(id, node.next_unsorted);
            self.destroy_node(id);
            return;
        }

        if let Slot::Live(value) = mem::replace(&mut self.contents[id], Slot::Removed)
            && let Some(index) = &mut self.index
        {
            index.remove(&value);
        }
        self.nodes[id].size -= 1;
    }

    /// Prunes `subtree` with all its children, sorted or not. Sizes of the ancestors
    /// are left to the caller.
    fn remove_subtree(&mut self, subtree: NodeId) {
        self.replace_node(subtree, None);
        let mut pending = vec![subtree];
        while let Some(node) = pending.pop() {
            let Node {
                left,
                right,
                next_unsorted,
                ..
            } = self.nodes[node];
            let mut cursor = next_unsorted;
            while let Some(unsorted) = cursor {
                cursor = self.nodes[unsorted].next_unsorted;
                self.destroy_node(unsorted);
            }
            pending.extend(left);
            pending.extend(right);
            self.destroy_node(node);
        }
    }

    /// Removes the pivot of `subtree`. Returns the root of what is left.
    fn remove_node(&mut self, subtree: NodeId) -> Option<NodeId> {
        'retry: loop {
            let Node {
                left,
                right,
                next_unsorted,
                ..
            } = self.nodes[subtree];

            let (Some(left), Some(right)) = (left, right) else {
                // At most one child: it takes the place of the node and inherits the
                // unsorted chain.
                let replacement = match left.or(right) {
                    None => next_unsorted,
                    Some(child) => {
                        self.append_unsorted(child, next_unsorted);
                        Some(child)
                    }
                };
                self.replace_node(subtree, replacement);
                self.destroy_node(subtree);
                return replacement;
            };

            // Two children: swap with the in-order neighbour from the larger side. Every
            // node on the way down to it gets partitioned first, otherwise an unsorted
            // child met on the way could fall between the old pivot and the neighbour.
            let take_left = self.nodes[left].size > self.nodes[right].size;
            let mut node = if take_left { left } else { right };
            let replacement = loop {
                if !self.contents[node].is_live() {
                    let parent = self.nodes[node].parent;
                    self.remove_node(node);
                    self.force_recompute_sizes(parent, subtree);
                    self.recompute_size(subtree);
                    continue 'retry;
                }
                while self.partition_step(node) {}
                let next = if take_left {
                    self.nodes[node].right
                } else {
                    self.nodes[node].left
                };
                match next {
                    Some(next) => node = next,
                    None => break node,
                }
            };

            self.contents.swap(replacement, subtree);
            if let (Some(index), Slot::Live(value)) = (&mut self.index, &self.contents[subtree]) {
                index.insert(value.clone(), subtree);
            }

            let parent = self.nodes[replacement].parent;
            self.remove_node(replacement);
            self.force_recompute_sizes(parent, subtree);
            self.recompute_size(subtree);
            return Some(subtree);
        }
    }

    fn remove_range_at(
        &mut self,
        node: Option<NodeId>,
        start: usize,
        len: usize,
        cancel: &mut CancelToken,
    ) -> Result<(), Canceled> {
        if len == 0 {
            return Ok(());
        }
        let Some(node) = node else { return Ok(()) };
        let size = self.nodes[node].size;
        if size <= start {
            return Ok(());
        }
        if start == 0 && len >= size {
            self.remove_subtree(node);
            return Ok(());
        }

        let Some(node) = self.resolve(node) else { return Ok(()) };
        let outcome = self.remove_range_split(node, start, len, cancel);
        // sizes must be right on the way out, cancelled or not
        if !self.contents[node].is_free() {
            self.recompute_size(node);
        }
        outcome
    }

    fn remove_range_split(
        &mut self,
        node: NodeId,
        start: usize,
        len: usize,
        cancel: &mut CancelToken,
    ) -> Result<(), Canceled> {
        self.partition(node, cancel)?;

        let left = self.nodes[node].left;
        let left_size = self.size_of(left);
        if start <= left_size {
            self.remove_range_at(left, start, (left_size - start).min(len), cancel)?;
            if start + len > left_size {
                let right = self.nodes[node].right;
                self.remove_range_at(right, 0, start + len - left_size - 1, cancel)?;
                // the range straddles the pivot
                self.remove_node(node);
            }
        } else {
            let right = self.nodes[node].right;
            self.remove_range_at(right, start - left_size - 1, len, cancel)?;
        }
        Ok(())
    }

    fn collect_range(
        &mut self,
        out: &mut Vec<T>,
        limit: usize,
        start: usize,
        node: Option<NodeId>,
        sorted: bool,
        cancel: &mut CancelToken,
    ) -> Result<(), Canceled> {
        let Some(node) = node else { return Ok(()) };
        let size = self.nodes[node].size;
        if start >= size {
            return Ok(());
        }
        if start == 0 && size <= limit - out.len() {
            return self.collect_children(out, limit, Some(node), sorted, cancel);
        }

        let Some(node) = self.resolve(node) else { return Ok(()) };
        self.partition(node, cancel)?;

        let left = self.nodes[node].left;
        let before = self.size_of(left);
        if start < before {
            self.collect_range(out, limit, start, left, sorted, cancel)?;
        }
        if start <= before
            && out.len() < limit
            && let Slot::Live(value) = &self.contents[node]
        {
            out.push(value.clone());
        }
        if out.len() < limit {
            let right = self.nodes[node].right;
            self.collect_range(out, limit, start.saturating_sub(before + 1), right, sorted, cancel)?;
        }
        Ok(())
    }

    /// Flushes a whole subtree into `out`, sorting it only if asked to.
    fn collect_children(
        &mut self,
        out: &mut Vec<T>,
        limit: usize,
        node: Option<NodeId>,
        sorted: bool,
        cancel: &mut CancelToken,
    ) -> Result<(), Canceled> {
        let Some(mut node) = node else { return Ok(()) };
        if sorted {
            let Some(resolved) = self.resolve(node) else { return Ok(()) };
            node = resolved;
            self.partition(node, cancel)?;
        }

        if out.len() < limit {
            let left = self.nodes[node].left;
            self.collect_children(out, limit, left, sorted, cancel)?;
        }
        if out.len() < limit
            && let Slot::Live(value) = &self.contents[node]
        {
            out.push(value.clone());
        }
        if out.len() < limit {
            let right = self.nodes[node].right;
            self.collect_children(out, limit, right, sorted, cancel)?;
        }

        let mut cursor = self.nodes[node].next_unsorted;
        while let Some(unsorted) = cursor
            && out.len() < limit
        {
            if let Slot::Live(value) = &self.contents[unsorted] {
                out.push(value.clone());
            }
            cursor = self.nodes[unsorted].next_unsorted;
        }
        Ok(())
    }

    /// Compacts the arena once enough slots sit on the freelist.
    fn pack(&mut self) {
        let Some(first_unused) = self.first_unused else { return };
        let reusable = self.nodes[first_unused].size;
        if reusable < MIN_CAPACITY || reusable <= self.nodes.capacity() / 4 {
            return;
        }

        let mut remap = vec![None; self.nodes.len()];
        let mut live = 0;
        for (old, slot) in self.contents.iter().enumerate() {
            if !slot.is_free() {
                remap[old] = Some(live);
                live += 1;
            }
        }
        trace!("packing {} slots into {}", self.nodes.len(), live);

        let capacity = (live * 2).max(MIN_CAPACITY);
        let mut contents = Vec::with_capacity(capacity);
        let mut nodes = Vec::with_capacity(capacity);
        let moved = |id: Option<NodeId>| id.and_then(|id| remap[id]);
        for (old, slot) in mem::take(&mut self.contents).into_iter().enumerate() {
            if slot.is_free() {
                continue;
            }
            let node = self.nodes[old];
            nodes.push(Node {
                left: moved(node.left),
                right: moved(node.right),
                next_unsorted: moved(node.next_unsorted),
                parent: moved(node.parent),
                size: node.size,
            });
            contents.push(slot);
        }

        self.root = moved(self.root);
        self.contents = contents;
        self.nodes = nodes;
        self.first_unused = None;
        // cheaper to rebuild on demand than to remap
        self.index = None;
    }

    //--------------------------------------------------------------------------
    // verification

    #[cfg(any(test, feature = "verify"))]
    fn verify_invariants(&self) {
        if self.verify {
            self.check_invariants();
        }
    }

    #[cfg(not(any(test, feature = "verify")))]
    #[inline(always)]
    fn verify_invariants(&self) {}

    /// Walks the whole structure and panics on the first broken invariant.
    #[cfg(any(test, feature = "verify"))]
    pub fn check_invariants(&self) {
        assert_eq!(self.contents.len(), self.nodes.len(), "parallel arrays out of sync");

        let mut reachable = 0;
        if let Some(root) = self.root {
            assert_eq!(self.nodes[root].parent, None, "root has a parent");
            reachable = self.check_subtree(root, None, None);
        }

        let mut free = 0;
        let mut cursor = self.first_unused;
        while let Some(node) = cursor {
            assert!(self.contents[node].is_free(), "freelist holds a used slot");
            free += 1;
            cursor = self.nodes[node].next_unsorted;
        }
        if let Some(head) = self.first_unused {
            assert_eq!(self.nodes[head].size, free, "freelist length");
        }

        let live = self.contents.iter().filter(|slot| slot.is_live()).count();
        assert_eq!(reachable, live, "unreachable live slots");
        assert_eq!(
            self.contents.iter().filter(|slot| slot.is_free()).count(),
            free,
            "free slots off the freelist"
        );

        if let Some(index) = &self.index {
            assert_eq!(index.len(), live, "index size");
            for (id, slot) in self.contents.iter().enumerate() {
                if let Slot::Live(value) = slot {
                    assert_eq!(index.get(value), Some(id), "stale index entry");
                }
            }
        }
    }

    /// Checks `node` and returns the number of live elements below it. Live elements
    /// must lie in `[low, high)`.
    #[cfg(any(test, feature = "verify"))]
    fn check_subtree(&self, node: NodeId, low: Option<&T>, high: Option<&T>) -> usize {
        let within = |value: &T| {
            low.is_none_or(|low| self.order.compare(value, low) != Ordering::Less)
                && high.is_none_or(|high| self.order.compare(value, high) == Ordering::Less)
        };

        let n = self.nodes[node];
        let pivot = match &self.contents[node] {
            Slot::Free => panic!("free slot {node} linked in the tree"),
            Slot::Removed => None,
            Slot::Live(value) => {
                assert!(within(value), "pivot {node} out of order");
                Some(value)
            }
        };

        let mut size = usize::from(pivot.is_some());
        if let Some(left) = n.left {
            assert_eq!(self.nodes[left].parent, Some(node), "left node has invalid parent pointer");
            size += self.check_subtree(left, low, pivot.or(high));
        }
        if let Some(right) = n.right {
            assert_eq!(self.nodes[right].parent, Some(node), "right node has invalid parent pointer");
            size += self.check_subtree(right, pivot.or(low), high);
        }

        let mut chain = Vec::new();
        let mut previous = node;
        let mut cursor = n.next_unsorted;
        while let Some(unsorted) = cursor {
            let u = self.nodes[unsorted];
            assert_eq!(u.parent, Some(previous), "unsorted node has invalid parent pointer");
            assert!(u.left.is_none(), "unsorted nodes shouldn't have a left subtree");
            assert!(u.right.is_none(), "unsorted nodes shouldn't have a right subtree");
            match &self.contents[unsorted] {
                Slot::Live(value) => assert!(within(value), "unsorted node {unsorted} out of bounds"),
                _ => panic!("unsorted nodes should hold an element"),
            }
            chain.push(unsorted);
            previous = unsorted;
            cursor = u.next_unsorted;
        }
        for (i, unsorted) in chain.iter().enumerate() {
            assert_eq!(self.nodes[*unsorted].size, chain.len() - i, "invalid node size for unsorted node");
        }

        size += chain.len();
        assert_eq!(n.size, size, "invalid tree size at {node}");
        size
    }
}
