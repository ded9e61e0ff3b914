use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use deferred_table::display::DisplayTask;
use deferred_table::prelude::*;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).format_timestamp_nanos().try_init();
}

/// Unordered model backed by a plain vector, notifying listeners synchronously.
pub struct SetModel<T: Element> {
    contents: Mutex<Vec<T>>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ModelListener<T>>)>>,
}

impl<T: Element> SetModel<T> {
    pub fn new(contents: Vec<T>) -> Arc<Self> {
        Arc::new(Self {
            contents: Mutex::new(contents),
            listeners: Mutex::new(Vec::new()),
        })
    }

    fn listeners(&self) -> Vec<Arc<dyn ModelListener<T>>> {
        self.listeners.lock().unwrap().iter().map(|(_, l)| l.clone()).collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn add(&self, elements: &[T]) {
        self.contents.lock().unwrap().extend(elements.iter().cloned());
        for listener in self.listeners() {
            listener.add(elements);
        }
    }

    pub fn remove(&self, elements: &[T]) {
        self.contents.lock().unwrap().retain(|e| !elements.contains(e));
        for listener in self.listeners() {
            listener.remove(elements);
        }
    }

    pub fn update(&self, elements: &[T]) {
        for listener in self.listeners() {
            listener.update(elements);
        }
    }

    pub fn set(&self, elements: &[T]) {
        *self.contents.lock().unwrap() = elements.to_vec();
        for listener in self.listeners() {
            listener.set_contents(elements);
        }
    }
}

impl<T: Element> ConcurrentModel<T> for SetModel<T> {
    fn add_listener(&self, listener: Arc<dyn ModelListener<T>>) -> ListenerId {
        let id = ListenerId::next();
        self.listeners.lock().unwrap().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().unwrap().retain(|(other, _)| *other != id);
    }

    fn request_update(&self, listener: &Arc<dyn ModelListener<T>>) {
        let snapshot = self.contents.lock().unwrap().clone();
        listener.set_contents(&snapshot);
    }
}

/// Row level call received by a [`TestTable`].
#[derive(Debug, Clone, PartialEq)]
pub enum TableEvent<T> {
    Clear(usize),
    Replace(T, usize),
}

/// Virtual table keeping its rows in memory. Tasks run when the test calls
/// [`TestTable::tick`], which plays the part of the display thread.
pub struct TestTable<T> {
    rows: Mutex<Vec<Option<T>>>,
    events: Mutex<Vec<TableEvent<T>>>,
    top: AtomicUsize,
    visible: AtomicUsize,
    queue: DisplayQueue,
}

impl<T: Element> TestTable<T> {
    pub fn new(visible: usize) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            top: AtomicUsize::new(0),
            visible: AtomicUsize::new(visible),
            queue: DisplayQueue::new(),
        })
    }

    /// Runs the pending display tasks.
    pub fn tick(&self) -> usize {
        self.queue.run_pending()
    }

    /// Ticks until the provider is idle and nothing is left to display.
    pub fn settle(&self, provider: &BackgroundContentProvider<T>) {
        let started = Instant::now();
        loop {
            let idle = !provider.is_working();
            self.tick();
            if idle && self.queue.is_empty() {
                return;
            }
            assert!(started.elapsed() < SETTLE_TIMEOUT, "provider did not settle");
            thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn scroll_to(&self, top: usize) {
        self.top.store(top, Ordering::SeqCst);
    }

    /// Rows as the display shows them.
    pub fn rows(&self) -> Vec<Option<T>> {
        self.rows.lock().unwrap().clone()
    }

    /// Clears and replacements received since the last call.
    pub fn take_events(&self) -> Vec<TableEvent<T>> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    /// Shown rows, panicking on any blank one.
    pub fn shown(&self) -> Vec<T> {
        self.rows()
            .into_iter()
            .enumerate()
            .map(|(row, e)| e.unwrap_or_else(|| panic!("row {row} is blank")))
            .collect()
    }
}

impl<T: Element> VirtualTable<T> for TestTable<T> {
    fn clear(&self, row: usize) {
        self.events.lock().unwrap().push(TableEvent::Clear(row));
        if let Some(slot) = self.rows.lock().unwrap().get_mut(row) {
            *slot = None;
        }
    }

    fn replace(&self, element: T, row: usize) {
        self.events.lock().unwrap().push(TableEvent::Replace(element.clone(), row));
        let mut rows = self.rows.lock().unwrap();
        if row >= rows.len() {
            rows.resize(row + 1, None);
        }
        rows[row] = Some(element);
    }

    fn set_item_count(&self, count: usize) {
        self.rows.lock().unwrap().resize(count, None);
    }

    fn item_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn top_index(&self) -> usize {
        self.top.load(Ordering::SeqCst)
    }

    fn visible_item_count(&self) -> usize {
        self.visible.load(Ordering::SeqCst)
    }

    fn exec(&self, task: DisplayTask) {
        self.queue.post(task);
    }
}

/// A model, a table showing `visible` rows and a provider between them.
pub fn setup<T: Element>(
    contents: Vec<T>,
    visible: usize,
    order: SortOrder<T>,
    options: ProviderOptions,
) -> (Arc<SetModel<T>>, Arc<TestTable<T>>, BackgroundContentProvider<T>) {
    init_logger();
    let model = SetModel::new(contents);
    let table = TestTable::new(visible);
    let provider = BackgroundContentProvider::with_options(model.clone(), table.clone(), order, options);
    (model, table, provider)
}
