//! The display side: the virtual table contract and a queue for running callbacks on
//! the thread that owns it.
use kanal::{Receiver, Sender};

/// A callback to run on the display thread.
pub type DisplayTask = Box<dyn FnOnce() + Send + 'static>;

/// A windowed table widget that only materialises the rows it shows.
///
/// Everything but [`VirtualTable::exec`] is only ever called from inside a task
/// handed to `exec`, i.e. on the display thread.
pub trait VirtualTable<T>: Send + Sync {
    /// Blanks `row` until it is replaced.
    fn clear(&self, row: usize);

    /// Shows `element` at `row`.
    fn replace(&self, element: T, row: usize);

    /// Sets the number of rows the table scrolls over.
    fn set_item_count(&self, count: usize);

    /// Current number of rows.
    fn item_count(&self) -> usize;

    /// First visible row.
    fn top_index(&self) -> usize;

    /// Number of rows that fit on screen.
    fn visible_item_count(&self) -> usize;

    /// Runs `task` on the display thread, asynchronously.
    fn exec(&self, task: DisplayTask);
}

/// Channel backed task queue, drained by the display thread.
///
/// Cheap to clone; every clone posts to the same queue.
#[derive(Clone)]
pub struct DisplayQueue {
    tx: Sender<DisplayTask>,
    rx: Receiver<DisplayTask>,
}

impl Default for DisplayQueue {
    fn default() -> Self {
        let (tx, rx) = kanal::unbounded();
        Self { tx, rx }
    }
}

impl DisplayQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `task`. Tasks posted after every receiver is gone are dropped.
    pub fn post(&self, task: DisplayTask) {
        if self.tx.send(task).is_err() {
            debug!("display queue closed, dropping task");
        }
    }

    /// Runs every queued task, including those queued by the tasks themselves.
    /// Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(Some(task)) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// True if no task is waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
