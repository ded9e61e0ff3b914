//! The source model contract.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives the mutations of a [`ConcurrentModel`]. Callbacks may come from any
/// thread and must not block.
pub trait ModelListener<T>: Send + Sync {
    /// `elements` were added to the model.
    fn add(&self, elements: &[T]);

    /// `elements` were removed from the model.
    fn remove(&self, elements: &[T]);

    /// Properties of `elements` changed, possibly moving them in the sort order.
    fn update(&self, elements: &[T]);

    /// The model now holds exactly `elements`.
    fn set_contents(&self, elements: &[T]);
}

/// Handle identifying a registered listener, used to unregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocates an id never handed out before in this process.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A thread-safe, unordered source of elements.
pub trait ConcurrentModel<T>: Send + Sync {
    /// Registers `listener`. The model must not call it before this returns.
    fn add_listener(&self, listener: Arc<dyn ModelListener<T>>) -> ListenerId;

    /// Unregisters a listener. Unknown ids are ignored.
    fn remove_listener(&self, id: ListenerId);

    /// Asks the model to send its full contents to `listener`, eventually, through
    /// [`ModelListener::set_contents`].
    fn request_update(&self, listener: &Arc<dyn ModelListener<T>>);
}
