//! Buffer between the worker thread, which decides what goes in every row, and the
//! display thread, which only shows the rows on screen.
//!
//! The worker writes `known` rows through [`TableUpdator::replace`]. The display
//! thread pulls the part of `known` that is visible and not yet `sent`. Flushes
//! are coalesced: however many rows change, at most one callback waits in the
//! display queue.
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::Element;
use crate::display::VirtualTable;
use crate::index_map::ElementIndex;

/// Display calls computed under the lock, applied after releasing it.
enum DisplayOp<T> {
    SetItemCount(usize),
    Clear(usize),
    Replace(T, usize),
}

struct State<T: Element> {
    known: Vec<Option<T>>,
    sent: Vec<Option<T>>,
    index: ElementIndex<T>,
    pending_clears: Vec<usize>,
    last_range: Range<usize>,
    /// Top and height of the table when `include` was asked for
    view: (usize, usize),
    /// Row the display asked for through `check_visible_range`, kept until it scrolls
    include: Option<usize>,
    update_scheduled: bool,
    disposed: bool,
}

impl<T: Element> State<T> {
    fn resize(&mut self, total: usize) {
        if total < self.known.len() {
            for element in self.known.drain(total..).flatten() {
                self.index.remove(&element);
            }
            self.pending_clears.retain(|row| *row < total);
        }
        self.known.resize(total, None);
        self.sent.resize(total, None);
    }

    /// Queues a clear of `row`, unless the display never got anything there.
    fn push_clear(&mut self, row: usize) {
        if let Some(sent) = self.sent.get_mut(row)
            && sent.take().is_some()
        {
            self.pending_clears.push(row);
        }
    }

    /// Returns true if the caller must post a flush.
    fn claim_flush(&mut self) -> bool {
        if self.update_scheduled || self.disposed {
            return false;
        }
        self.update_scheduled = true;
        true
    }
}

/// Thread-safe row buffer in front of a [`VirtualTable`].
pub struct TableUpdator<T: Element> {
    table: Arc<dyn VirtualTable<T>>,
    state: Mutex<State<T>>,
    this: Weak<Self>,
}

/// Rows the display shows, stretched to cover `include`.
fn visible_window(top: usize, visible: usize, include: Option<usize>) -> Range<usize> {
    let mut start = top;
    let mut end = top.saturating_add(visible);
    if let Some(include) = include {
        start = start.min(include);
        end = end.max(include.saturating_add(1));
    }
    start..end
}

impl<T: Element> TableUpdator<T> {
    /// Creates an updator feeding `table`.
    pub fn new(table: Arc<dyn VirtualTable<T>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            table,
            state: Mutex::new(State {
                known: Vec::new(),
                sent: Vec::new(),
                index: ElementIndex::default(),
                pending_clears: Vec::new(),
                last_range: 0..0,
                view: (0, 0),
                include: None,
                update_scheduled: false,
                disposed: false,
            }),
            this: this.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    //--------------------------------------------------------------------------
    // worker side

    /// Records `element` as the content of `row`.
    ///
    /// A different element previously at `row` is forgotten. If `element` was known
    /// at another row, that row is cleared so it never shows twice.
    pub fn replace(&self, element: T, row: usize) {
        let schedule = {
            let mut guard = self.lock();
            let state = &mut *guard;
            if state.disposed {
                return;
            }
            if row >= state.known.len() {
                state.resize(row + 1);
            }
            if state.known[row].as_ref() == Some(&element) {
                return;
            }

            if let Some(previous) = state.known[row].take() {
                state.index.remove(&previous);
                state.push_clear(row);
            }
            if let Some(old_row) = state.index.insert(element.clone(), row)
                && old_row != row
            {
                state.known[old_row] = None;
                state.push_clear(old_row);
            }
            state.known[row] = Some(element);
            state.claim_flush()
        };
        if schedule {
            self.post_flush();
        }
    }

    /// Forgets `element` and blanks its row until the worker fills it again. Unknown
    /// elements are ignored.
    pub fn clear(&self, element: &T) {
        let schedule = {
            let mut state = self.lock();
            if state.disposed {
                return;
            }
            match state.index.remove(element) {
                Some(row) => {
                    state.known[row] = None;
                    state.push_clear(row);
                    state.claim_flush()
                }
                None => false,
            }
        };
        if schedule {
            self.post_flush();
        }
    }

    /// Sets the number of rows. Elements past the new end are forgotten.
    pub fn set_total_items(&self, total: usize) {
        let schedule = {
            let mut state = self.lock();
            if state.disposed || state.known.len() == total {
                return;
            }
            state.resize(total);
            state.claim_flush()
        };
        if schedule {
            self.post_flush();
        }
    }

    /// Number of rows the worker last asked for.
    pub fn total_items(&self) -> usize {
        self.lock().known.len()
    }

    /// The window the display showed at the last flush.
    pub fn visible_range(&self) -> Range<usize> {
        self.lock().last_range.clone()
    }

    /// Stops all further display updates and drops the bookkeeping.
    pub fn dispose(&self) {
        let mut state = self.lock();
        state.disposed = true;
        state.known.clear();
        state.sent.clear();
        state.index.clear();
        state.pending_clears.clear();
        state.include = None;
    }

    /// True once [`TableUpdator::dispose`] ran.
    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    fn post_flush(&self) {
        let this = self.this.clone();
        self.table.exec(Box::new(move || {
            if let Some(updator) = this.upgrade() {
                updator.update_table(None);
            }
        }));
    }

    //--------------------------------------------------------------------------
    // display side

    /// Display thread: called when row `include` is about to be shown. Flushes right
    /// away if the visible window moved.
    pub fn check_visible_range(&self, include: usize) {
        let window = visible_window(self.table.top_index(), self.table.visible_item_count(), Some(include));
        let moved = {
            let state = self.lock();
            !state.disposed && state.last_range != window
        };
        if moved {
            self.update_table(Some(include));
        }
    }

    /// Display thread: pushes pending clears and unsent visible rows to the table.
    ///
    /// Without `include`, the row last passed to [`TableUpdator::check_visible_range`]
    /// still counts as visible until the table scrolls or resizes.
    pub fn update_table(&self, include: Option<usize>) {
        let view = (self.table.top_index(), self.table.visible_item_count());
        let include = {
            let mut state = self.lock();
            if include.is_some() || state.view != view {
                state.view = view;
                state.include = include;
            }
            state.include
        };
        let window = visible_window(view.0, view.1, include);
        let item_count = self.table.item_count();

        let ops = {
            let mut guard = self.lock();
            let state = &mut *guard;
            state.update_scheduled = false;
            if state.disposed {
                return;
            }
            let total = state.known.len();
            let mut ops = Vec::new();
            if item_count != total {
                ops.push(DisplayOp::SetItemCount(total));
            }

            if window != state.last_range {
                // rows that scrolled away without content must ask again when back
                for row in state.last_range.clone() {
                    if row < total && !window.contains(&row) && state.sent[row].is_none() {
                        ops.push(DisplayOp::Clear(row));
                    }
                }
                trace!("visible window {:?} -> {:?}", state.last_range, window);
                state.last_range = window.clone();
            }

            ops.extend(state.pending_clears.drain(..).filter(|row| *row < total).map(DisplayOp::Clear));

            let end = window.end.min(total);
            for row in window.start.min(end)..end {
                if let Some(element) = &state.known[row]
                    && state.sent[row].as_ref() != Some(element)
                {
                    state.sent[row] = Some(element.clone());
                    ops.push(DisplayOp::Replace(element.clone(), row));
                }
            }
            ops
        };

        for op in ops {
            match op {
                DisplayOp::SetItemCount(count) => self.table.set_item_count(count),
                DisplayOp::Clear(row) => self.table.clear(row),
                DisplayOp::Replace(element, row) => self.table.replace(element, row),
            }
        }
    }
}
