//! Keyed cache of configured filters for callers that serve several policies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::error::Result;

/// Named filters, built on first use and shared afterwards.
///
/// Lookup and construction happen under one lock, so two threads asking for
/// the same key never build it twice. A failed construction leaves nothing
/// behind and the next call retries.
///
/// ```
/// use xss_guard::{FilterBuilder, FilterRegistry, Policy, TreeFilter};
///
/// let registry: FilterRegistry<TreeFilter> = FilterRegistry::new();
/// let first = registry.get_or_try_init("default", || {
///     Ok(FilterBuilder::new(Policy::baseline()).build_tree())
/// })?;
/// let again = registry.get_or_try_init("default", || unreachable!())?;
/// assert!(std::sync::Arc::ptr_eq(&first, &again));
/// # Ok::<(), xss_guard::Error>(())
/// ```
pub struct FilterRegistry<T> {
    entries: Mutex<HashMap<String, Arc<T>>>,
}

impl<T> FilterRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the filter stored under `key`, building it with `init` if absent.
    pub fn get_or_try_init(
        &self,
        key: &str,
        init: impl FnOnce() -> Result<T>,
    ) -> Result<Arc<T>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(key) {
            return Ok(Arc::clone(existing));
        }
        match init() {
            Ok(filter) => {
                let filter = Arc::new(filter);
                entries.insert(key.to_string(), Arc::clone(&filter));
                Ok(filter)
            }
            Err(e) => {
                warn!(key, error = %e, "failed to build filter");
                Err(e)
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for FilterRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for FilterRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn builds_once_per_key() {
        let registry: FilterRegistry<String> = FilterRegistry::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            registry
                .get_or_try_init("a", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("built".to_string())
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").as_deref().map(String::as_str), Some("built"));
    }

    #[test]
    fn failed_init_is_not_cached() {
        let registry: FilterRegistry<String> = FilterRegistry::new();
        let err = registry
            .get_or_try_init("bad", || Err(Error::UnknownListener("nope".into())))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownListener(_)));
        assert!(registry.is_empty());
        assert!(registry.get_or_try_init("bad", || Ok("ok".into())).is_ok());
    }

    #[test]
    fn concurrent_callers_share_one_instance() {
        let registry: Arc<FilterRegistry<usize>> = Arc::new(FilterRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    registry
                        .get_or_try_init("shared", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok(7)
                        })
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<Arc<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    }
}
