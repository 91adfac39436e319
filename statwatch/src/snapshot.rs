//! Copy-on-write snapshot stores.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

/// An atomically published, immutable value.
///
/// Readers call [`get`](Self::get) and receive an `Arc` to the latest
/// published value; they never block and never observe a partially
/// updated value. Writers build a complete new value and publish it with a
/// single atomic swap. A published value is never mutated in place.
///
/// Cloning a store yields another handle to the same published value.
///
/// # Example
///
/// ```rust
/// use statwatch::SnapshotStore;
///
/// let store = SnapshotStore::new(vec![1, 2]);
/// let before = store.get();
///
/// store.update(|v| v.push(3));
///
/// assert_eq!(*before, vec![1, 2]);
/// assert_eq!(*store.get(), vec![1, 2, 3]);
/// ```
pub struct SnapshotStore<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> SnapshotStore<T> {
    /// Create a store publishing the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(value)),
        }
    }

    /// The latest published value.
    pub fn get(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Publish a new value, replacing the current one.
    pub fn set(&self, value: T) {
        self.inner.store(Arc::new(value));
    }
}

impl<T: Clone> SnapshotStore<T> {
    /// Copy the latest value, apply `f` to the copy and publish it.
    ///
    /// Only safe as a read-modify-write when a single writer owns the store.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        let mut next = T::clone(&self.get());
        f(&mut next);
        self.set(next);
    }
}

impl<T: Default> Default for SnapshotStore<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Clone for SnapshotStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SnapshotStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SnapshotStore").field(&self.get()).finish()
    }
}
