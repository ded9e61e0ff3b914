//! End to end: a model handing 50k elements to a provider until the table is filled.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};

use deferred_table::display::DisplayTask;
use deferred_table::prelude::*;

const N: u32 = 50_000;

struct StaticModel {
    contents: Vec<u32>,
}

impl ConcurrentModel<u32> for StaticModel {
    fn add_listener(&self, _listener: Arc<dyn ModelListener<u32>>) -> ListenerId {
        ListenerId::next()
    }

    fn remove_listener(&self, _id: ListenerId) {}

    fn request_update(&self, listener: &Arc<dyn ModelListener<u32>>) {
        listener.set_contents(&self.contents);
    }
}

/// Remembers the item count and the first row, drops everything else.
struct CountingTable {
    count: AtomicUsize,
    queue: DisplayQueue,
    first_row: Mutex<Option<u32>>,
}

impl VirtualTable<u32> for CountingTable {
    fn clear(&self, _row: usize) {}

    fn replace(&self, element: u32, row: usize) {
        if row == 0 {
            *self.first_row.lock().unwrap() = Some(element);
        }
    }

    fn set_item_count(&self, count: usize) {
        self.count.store(count, Ordering::Relaxed);
    }

    fn item_count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    fn top_index(&self) -> usize {
        0
    }

    fn visible_item_count(&self) -> usize {
        40
    }

    fn exec(&self, task: DisplayTask) {
        self.queue.post(task);
    }
}

fn settle(table: &CountingTable, provider: &BackgroundContentProvider<u32>) {
    loop {
        let idle = !provider.is_working();
        table.queue.run_pending();
        if idle && table.queue.is_empty() {
            return;
        }
        thread::sleep(Duration::from_micros(100));
    }
}

fn bench_provider(c: &mut Criterion) {
    let _ = env_logger::builder().format_timestamp_nanos().try_init();
    let contents: Vec<u32> = (0..N).map(|i| (i * 7919) % N).collect();

    c.bench_function("provider_load_50k", |b| {
        b.iter(|| {
            let model = Arc::new(StaticModel {
                contents: contents.clone(),
            });
            let table = Arc::new(CountingTable {
                count: AtomicUsize::new(0),
                queue: DisplayQueue::new(),
                first_row: Mutex::new(None),
            });
            let provider = BackgroundContentProvider::new(model, table.clone(), SortOrder::natural());
            provider.refresh();
            settle(&table, &provider);
            assert_eq!(*table.first_row.lock().unwrap(), Some(0));
        });
    });

    c.bench_function("provider_resort_50k", |b| {
        let model = Arc::new(StaticModel {
            contents: contents.clone(),
        });
        let table = Arc::new(CountingTable {
            count: AtomicUsize::new(0),
            queue: DisplayQueue::new(),
            first_row: Mutex::new(None),
        });
        let provider = BackgroundContentProvider::new(model, table.clone(), SortOrder::natural());
        provider.refresh();
        settle(&table, &provider);

        let ascending = SortOrder::<u32>::natural();
        let descending = ascending.reversed();
        let mut flip = false;
        b.iter(|| {
            flip = !flip;
            provider.set_sort_order(if flip { descending.clone() } else { ascending.clone() });
            settle(&table, &provider);
        });
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_provider
);
criterion_main!(benches);
