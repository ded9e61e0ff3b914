//! Background sorting and filtering for a virtual table.
//!
//! The provider listens to a [`ConcurrentModel`], queues every change and hands it
//! to a single worker thread. The worker keeps a [`LazySortedCollection`] of the
//! accepted elements, sorts the visible window first and pushes rows to a
//! [`TableUpdator`]. Producers never sort on their own thread.
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;

use indexmap::IndexSet;

use crate::Element;
use crate::cancel::{CancelHandle, CancelToken, Canceled};
use crate::change_queue::{Change, ChangeQueue};
use crate::display::VirtualTable;
use crate::element::{Filter, SortOrder};
use crate::model::{ConcurrentModel, ListenerId, ModelListener};
use crate::options::ProviderOptions;
use crate::sorted::LazySortedCollection;
use crate::updator::TableUpdator;

fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg_attr(not(any(test, feature = "verify")), allow(unused_mut))]
fn new_collection<T: Element>(order: &SortOrder<T>, capacity: usize, options: &ProviderOptions) -> LazySortedCollection<T> {
    let mut collection = LazySortedCollection::with_capacity(order.clone(), capacity.max(options.capacity_hint));
    #[cfg(any(test, feature = "verify"))]
    collection.set_verify(options.verify);
    collection
}

#[derive(Default)]
struct Lifecycle {
    worker_running: bool,
    work_scheduled: bool,
}

/// What the caller asked for. Read by the worker at the top of every iteration.
struct Settings<T> {
    order: SortOrder<T>,
    filter: Filter<T>,
    limit: Option<usize>,
    cancel: Option<CancelHandle>,
    range: Range<usize>,
}

/// State owned by the worker thread.
struct Worker<T: Element> {
    collection: LazySortedCollection<T>,
    /// Everything the model reported, accepted by the filter or not
    known: IndexSet<T>,
    last_order: SortOrder<T>,
    last_filter: Filter<T>,
    last_limit: Option<usize>,
    /// `retain_first` dropped accepted elements from the collection
    trimmed: bool,
    dirty: bool,
}

struct Shared<T: Element> {
    model: Arc<dyn ConcurrentModel<T>>,
    updator: Arc<TableUpdator<T>>,
    changes: ChangeQueue<T>,
    lifecycle: Mutex<Lifecycle>,
    settings: Mutex<Settings<T>>,
    worker: Mutex<Worker<T>>,
    disposed: Arc<AtomicBool>,
    listener: Arc<dyn ModelListener<T>>,
    listener_id: Mutex<Option<ListenerId>>,
    options: ProviderOptions,
}

/// Forwards model callbacks to the provider without keeping it alive.
struct Listener<T: Element> {
    shared: Weak<Shared<T>>,
}

impl<T: Element> Listener<T> {
    fn enqueue(&self, change: Change<T>) {
        if let Some(shared) = self.shared.upgrade() {
            shared.enqueue(change);
        }
    }
}

impl<T: Element> ModelListener<T> for Listener<T> {
    fn add(&self, elements: &[T]) {
        self.enqueue(Change::Add(elements.to_vec()));
    }

    fn remove(&self, elements: &[T]) {
        self.enqueue(Change::Remove(elements.to_vec()));
    }

    fn update(&self, elements: &[T]) {
        self.enqueue(Change::Update(elements.to_vec()));
    }

    fn set_contents(&self, elements: &[T]) {
        self.enqueue(Change::Set(elements.to_vec()));
    }
}

/// Sorts, filters and limits the contents of a model in the background and feeds
/// the result to a virtual table.
///
/// Dropping the provider disposes it.
pub struct BackgroundContentProvider<T: Element> {
    shared: Arc<Shared<T>>,
}

impl<T: Element> BackgroundContentProvider<T> {
    /// Attaches to `model` and feeds `table`, sorting by `order`.
    ///
    /// Nothing is shown until the model reports elements; call
    /// [`BackgroundContentProvider::refresh`] to request its current contents.
    pub fn new(model: Arc<dyn ConcurrentModel<T>>, table: Arc<dyn VirtualTable<T>>, order: SortOrder<T>) -> Self {
        Self::with_options(model, table, order, ProviderOptions::default())
    }

    /// Like [`BackgroundContentProvider::new`] with explicit options.
    pub fn with_options(
        model: Arc<dyn ConcurrentModel<T>>,
        table: Arc<dyn VirtualTable<T>>,
        order: SortOrder<T>,
        options: ProviderOptions,
    ) -> Self {
        let filter = Filter::accept_all();
        let shared = Arc::new_cyclic(|weak| {
            let listener: Arc<dyn ModelListener<T>> = Arc::new(Listener { shared: weak.clone() });
            let collection = new_collection(&order, 0, &options);
            Shared {
                model,
                updator: TableUpdator::new(table),
                changes: ChangeQueue::new(),
                lifecycle: Mutex::new(Lifecycle::default()),
                settings: Mutex::new(Settings {
                    order: order.clone(),
                    filter: filter.clone(),
                    limit: options.limit,
                    cancel: None,
                    range: 0..0,
                }),
                worker: Mutex::new(Worker {
                    collection,
                    known: IndexSet::new(),
                    last_order: order,
                    last_filter: filter,
                    last_limit: options.limit,
                    trimmed: false,
                    dirty: false,
                }),
                disposed: Arc::new(AtomicBool::new(false)),
                listener,
                listener_id: Mutex::new(None),
                options,
            }
        });

        let id = shared.model.add_listener(shared.listener.clone());
        debug!("provider attached to model as {id:?}");
        *lock(&shared.listener_id) = Some(id);
        Self { shared }
    }

    //--------------------------------------------------------------------------
    // producer entry points

    /// Queues new elements. Elements already known are ignored.
    pub fn add(&self, elements: &[T]) {
        self.shared.enqueue(Change::Add(elements.to_vec()));
    }

    /// Queues the removal of elements. Unknown elements are ignored.
    pub fn remove(&self, elements: &[T]) {
        self.shared.enqueue(Change::Remove(elements.to_vec()));
    }

    /// Queues a re-sort of elements whose properties changed.
    pub fn update(&self, elements: &[T]) {
        self.shared.enqueue(Change::Update(elements.to_vec()));
    }

    /// Queues a replacement of the whole contents.
    pub fn set_contents(&self, elements: &[T]) {
        self.shared.enqueue(Change::Set(elements.to_vec()));
    }

    /// Asks the model to resend its full contents.
    pub fn refresh(&self) {
        if self.is_disposed() {
            return;
        }
        self.shared.model.request_update(&self.shared.listener);
    }

    //--------------------------------------------------------------------------
    // settings

    /// Installs a new sort order. Any sort in progress is abandoned.
    pub fn set_sort_order(&self, order: SortOrder<T>) {
        lock(&self.shared.settings).order = order;
        self.shared.restart();
    }

    /// The current sort order.
    pub fn sort_order(&self) -> SortOrder<T> {
        lock(&self.shared.settings).order.clone()
    }

    /// Installs a new filter. Any sort in progress is abandoned.
    pub fn set_filter(&self, filter: Filter<T>) {
        lock(&self.shared.settings).filter = filter;
        self.shared.restart();
    }

    /// The current filter.
    pub fn filter(&self) -> Filter<T> {
        lock(&self.shared.settings).filter.clone()
    }

    /// Shows at most `limit` elements, the smallest in sort order. `None` shows all.
    pub fn set_limit(&self, limit: Option<usize>) {
        lock(&self.shared.settings).limit = limit;
        self.shared.restart();
    }

    /// The current limit.
    pub fn limit(&self) -> Option<usize> {
        lock(&self.shared.settings).limit
    }

    //--------------------------------------------------------------------------
    // display

    /// Display thread: row `include` is about to be shown.
    ///
    /// If the visible window moved, the sort in progress is abandoned so the worker
    /// restarts on the new window.
    pub fn check_visible_range(&self, include: usize) {
        if self.is_disposed() {
            return;
        }
        let updator = &self.shared.updator;
        updator.check_visible_range(include);
        let range = updator.visible_range();

        let settings = lock(&self.shared.settings);
        if settings.range != range
            && let Some(cancel) = &settings.cancel
        {
            trace!("visible range moved to {range:?}, canceling sort");
            cancel.cancel();
        }
    }

    //--------------------------------------------------------------------------
    // lifecycle

    /// Returns true while a worker thread is alive.
    pub fn is_working(&self) -> bool {
        lock(&self.shared.lifecycle).worker_running
    }

    /// Detaches from the model and stops updating the table. Idempotent.
    pub fn dispose(&self) {
        self.shared.dispose();
    }

    /// True once [`BackgroundContentProvider::dispose`] ran.
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }
}

impl<T: Element> Drop for BackgroundContentProvider<T> {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

impl<T: Element> Shared<T> {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let cancel = lock(&self.settings).cancel.take();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        let id = lock(&self.listener_id).take();
        if let Some(id) = id {
            self.model.remove_listener(id);
        }
        self.updator.dispose();
        debug!("provider disposed");
    }

    fn enqueue(self: &Arc<Self>, change: Change<T>) {
        if self.is_disposed() {
            return;
        }
        self.changes.enqueue(change);
        self.make_dirty();
    }

    /// Cancels the sort in progress and makes sure a worker picks up the new settings.
    fn restart(self: &Arc<Self>) {
        if self.is_disposed() {
            return;
        }
        if let Some(cancel) = &lock(&self.settings).cancel {
            cancel.cancel();
        }
        self.make_dirty();
    }

    fn make_dirty(self: &Arc<Self>) {
        let start = {
            let mut lifecycle = lock(&self.lifecycle);
            lifecycle.work_scheduled = true;
            if lifecycle.worker_running {
                false
            } else {
                lifecycle.worker_running = true;
                true
            }
        };
        if start {
            self.spawn_worker();
        }
    }

    fn spawn_worker(self: &Arc<Self>) {
        let shared = self.clone();
        let spawned = thread::Builder::new()
            .name(self.options.worker_name.clone())
            .spawn(move || shared.run());
        if let Err(e) = spawned {
            warn!("failed to spawn worker thread: {e}");
            lock(&self.lifecycle).worker_running = false;
        }
    }

    /// Worker thread body.
    fn run(&self) {
        debug!("worker started");
        loop {
            lock(&self.lifecycle).work_scheduled = false;
            {
                let mut worker = lock(&self.worker);
                self.process(&mut worker);
            }

            let mut lifecycle = lock(&self.lifecycle);
            if lifecycle.work_scheduled && !self.is_disposed() {
                continue;
            }
            lifecycle.worker_running = false;
            break;
        }
        debug!("worker stopped");
    }

    /// Applies settings and queued changes until the table shows everything.
    fn process(&self, worker: &mut Worker<T>) {
        loop {
            if self.is_disposed() {
                return;
            }
            let (order, filter, limit) = {
                let settings = lock(&self.settings);
                (settings.order.clone(), settings.filter.clone(), settings.limit)
            };

            if !order.same_as(&worker.last_order) || limit != worker.last_limit {
                self.rebuild(worker, &order, &filter);
                worker.last_limit = limit;
            } else if !filter.same_as(&worker.last_filter) {
                self.refilter(worker, &filter);
            }

            // the table learns its new size after every change
            if let Some(change) = self.changes.dequeue() {
                self.apply(worker, change, &order, &filter);
                self.publish_total(worker, limit);
                if !self.changes.is_empty() {
                    trace!(
                        "{} changes with {} elements still queued",
                        self.changes.len(),
                        self.changes.workload()
                    );
                }
                continue;
            }

            let total = self.publish_total(worker, limit);

            if !worker.dirty {
                return;
            }

            let mut token = CancelToken::with_stop_signal(self.disposed.clone());
            let range = self.updator.visible_range();
            {
                let mut settings = lock(&self.settings);
                settings.cancel = Some(token.handle());
                settings.range = range.clone();
            }
            match self.sort(worker, range, limit, total, &mut token) {
                Ok(()) => worker.dirty = false,
                Err(Canceled) => debug!("sort canceled, restarting"),
            }
            lock(&self.settings).cancel = None;
        }
    }

    /// Tells the updator how many rows there are. Returns that number.
    fn publish_total(&self, worker: &Worker<T>, limit: Option<usize>) -> usize {
        let len = worker.collection.len();
        let total = limit.map_or(len, |limit| limit.min(len));
        self.updator.set_total_items(total);
        total
    }

    /// Rebuilds the collection from every known element.
    fn rebuild(&self, worker: &mut Worker<T>, order: &SortOrder<T>, filter: &Filter<T>) {
        trace!("rebuilding collection of {} known elements", worker.known.len());
        let mut collection = new_collection(order, worker.known.len(), &self.options);
        collection.add_all(worker.known.iter().filter(|e| filter.accepts(e)).cloned());
        worker.collection = collection;
        worker.last_order = order.clone();
        worker.last_filter = filter.clone();
        worker.trimmed = false;
        worker.dirty = true;
    }

    /// Drops elements the new filter rejects and admits the ones it now accepts.
    fn refilter(&self, worker: &mut Worker<T>, filter: &Filter<T>) {
        if worker.trimmed {
            let order = worker.last_order.clone();
            self.rebuild(worker, &order, filter);
            return;
        }
        let rejected: Vec<T> = worker
            .collection
            .items(false)
            .into_iter()
            .filter(|e| !filter.accepts(e))
            .collect();
        worker.collection.remove_all(&rejected);
        for element in &rejected {
            self.updator.clear(element);
        }

        let Worker { known, collection, .. } = worker;
        for element in known.iter() {
            if filter.accepts(element) && !collection.contains(element) {
                collection.add(element.clone());
            }
        }
        worker.last_filter = filter.clone();
        worker.dirty = true;
    }

    fn apply(&self, worker: &mut Worker<T>, change: Change<T>, order: &SortOrder<T>, filter: &Filter<T>) {
        match change {
            Change::Add(elements) => {
                for element in elements {
                    if worker.known.insert(element.clone()) && filter.accepts(&element) {
                        worker.collection.add(element);
                    }
                }
            }
            Change::Remove(elements) => {
                for element in &elements {
                    if worker.known.swap_remove(element) {
                        worker.collection.remove(element);
                        self.updator.clear(element);
                    }
                }
                if worker.trimmed {
                    // a trimmed element may now make the cut
                    self.rebuild(worker, order, filter);
                }
            }
            Change::Update(elements) => {
                for element in elements {
                    if !worker.known.contains(&element) {
                        continue;
                    }
                    worker.collection.remove(&element);
                    self.updator.clear(&element);
                    if filter.accepts(&element) {
                        worker.collection.add(element);
                    }
                }
                if worker.trimmed {
                    self.rebuild(worker, order, filter);
                }
            }
            Change::Set(elements) => {
                worker.known = elements.into_iter().collect();
                self.rebuild(worker, order, filter);
            }
        }
        worker.dirty = true;
    }

    /// Sorts the visible window first, then everything else.
    fn sort(
        &self,
        worker: &mut Worker<T>,
        window: Range<usize>,
        limit: Option<usize>,
        total: usize,
        token: &mut CancelToken,
    ) -> Result<(), Canceled> {
        if let Some(limit) = limit
            && worker.collection.len() > limit
        {
            worker.collection.retain_first(limit, token)?;
            worker.trimmed = true;
        }

        let start = window.start.min(total);
        let len = window.end.min(total) - start;
        let visible = worker.collection.get_range(start, len, true, token)?;
        trace!("publishing {} visible rows from {start}", visible.len());
        for (offset, element) in visible.into_iter().enumerate() {
            self.updator.replace(element, start + offset);
        }

        let rows = worker.collection.get_range(0, total, true, token)?;
        for (row, element) in rows.into_iter().enumerate() {
            self.updator.replace(element, row);
        }
        Ok(())
    }
}
