//! Configuration of a [`BackgroundContentProvider`](crate::provider::BackgroundContentProvider).
use derive_builder::Builder;

/// Provider settings, built with [`ProviderOptionsBuilder`].
///
/// ```
/// use deferred_table::options::ProviderOptionsBuilder;
///
/// let options = ProviderOptionsBuilder::default()
///     .limit(500)
///     .worker_name("contacts-sorter")
///     .build()
///     .unwrap();
/// assert_eq!(options.limit, Some(500));
/// ```
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
#[builder(build_fn(validate = "Self::validate"))]
#[builder(default)]
pub struct ProviderOptions {
    /// Show at most this many elements (the smallest ones in sort order)
    #[builder(setter(strip_option))]
    pub limit: Option<usize>,

    /// Expected number of elements, used to size the working collection up front
    pub capacity_hint: usize,

    /// Name given to the worker thread
    #[builder(setter(into))]
    pub worker_name: String,

    /// Run the collection invariant walker after every change.
    ///
    /// Only has an effect when the crate is built with the `verify` feature.
    pub verify: bool,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            limit: None,
            capacity_hint: 0,
            worker_name: String::from("deferred-table-worker"),
            verify: false,
        }
    }
}

impl ProviderOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.worker_name
            && name.is_empty()
        {
            return Err(String::from("worker_name must not be empty"));
        }
        Ok(())
    }
}
