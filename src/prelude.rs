//! Convenience re-exports of commonly used types.
//!
//! `use deferred_table::prelude::*;` brings in everything needed to wire a model
//! and a table to a provider.

pub use crate::change_queue::{Change, ChangeQueue};
pub use crate::display::DisplayTask;
pub use crate::*;
pub use kanal::{Receiver, Sender, unbounded};
pub use std::sync::Arc;
