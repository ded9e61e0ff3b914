//! Deferred sorting and filtering for virtual tables.
//!
//! A [`BackgroundContentProvider`] listens to an unordered, concurrently changing
//! [`ConcurrentModel`] and keeps a [`VirtualTable`] showing its contents sorted,
//! filtered and optionally limited. All the sorting happens on a worker thread, and
//! only as far as the rows on screen require: the heavy lifting is done by
//! [`LazySortedCollection`], a tree that partitions itself lazily on range queries.
//!
//! # Examples
//!
//! ```
//! use deferred_table::prelude::*;
//!
//! let mut collection = LazySortedCollection::new(SortOrder::natural());
//! collection.add_all([5, 3, 8, 1]);
//!
//! // only what is needed to find the two smallest gets compared
//! assert_eq!(collection.first(2, true), vec![1, 3]);
//! assert_eq!(collection.len(), 4);
//! ```

#![warn(missing_docs)]

#[macro_use]
extern crate log;

pub mod cancel;
pub mod change_queue;
pub mod display;
pub mod element;
mod index_map;
pub mod model;
pub mod options;
pub mod prelude;
pub mod provider;
pub mod sorted;
pub mod updator;

pub use crate::cancel::{CancelHandle, CancelToken, Canceled};
pub use crate::display::{DisplayQueue, VirtualTable};
pub use crate::element::{Element, Filter, SortOrder};
pub use crate::model::{ConcurrentModel, ListenerId, ModelListener};
pub use crate::options::{ProviderOptions, ProviderOptionsBuilder};
pub use crate::provider::BackgroundContentProvider;
pub use crate::sorted::LazySortedCollection;
pub use crate::updator::TableUpdator;
