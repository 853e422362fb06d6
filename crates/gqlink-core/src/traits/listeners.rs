//! Callback registry and subscription disposer.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::error;

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    callbacks: BTreeMap<u64, Callback<T>>,
}

/// A set of callbacks notified with a value of type `T`.
///
/// Credential sources use this to implement their change notifications.
/// Registering returns a [`Subscription`]; dropping it removes the callback.
///
/// A callback that panics is caught and logged; the remaining callbacks
/// still run and the notifier is unaffected.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use gqlink_core::Listeners;
///
/// let listeners = Listeners::<bool>::new();
/// let seen = Arc::new(AtomicUsize::new(0));
///
/// let counter = seen.clone();
/// let subscription = listeners.add(move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// listeners.notify(true);
/// drop(subscription);
/// listeners.notify(false);
///
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
pub struct Listeners<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: Clone + 'static> Listeners<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                callbacks: BTreeMap::new(),
            })),
        }
    }

    /// Register a callback.
    pub fn add<F>(&self, callback: F) -> Subscription
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.callbacks.insert(id, Arc::new(callback));
            id
        };

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = weak.upgrade() {
                lock(&registry).callbacks.remove(&id);
            }
        })
    }

    /// Invoke every registered callback with `value`.
    ///
    /// Returns the number of callbacks that completed without panicking.
    pub fn notify(&self, value: T) -> usize {
        // Snapshot first: callbacks may add or drop subscriptions.
        let callbacks: Vec<Callback<T>> =
            lock(&self.registry).callbacks.values().cloned().collect();

        callbacks
            .into_iter()
            .filter(|callback| {
                let value = value.clone();
                match catch_unwind(AssertUnwindSafe(|| callback(value))) {
                    Ok(()) => true,
                    Err(_) => {
                        error!("Listener panicked; notification swallowed");
                        false
                    }
                }
            })
            .count()
    }

    /// Returns the number of registered callbacks.
    pub fn len(&self) -> usize {
        lock(&self.registry).callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &lock(&self.registry).callbacks.len())
            .finish()
    }
}

fn lock<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Disposer for a registered callback.
///
/// Dropping the subscription (or calling [`unsubscribe`](Self::unsubscribe))
/// removes the callback so it can never act on torn-down state.
#[must_use = "dropping a Subscription unregisters its callback immediately"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Create a subscription that runs `dispose` when released.
    pub fn new<F>(dispose: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// A subscription with nothing to release.
    pub fn noop() -> Self {
        Self { dispose: None }
    }

    /// Remove the callback now.
    pub fn unsubscribe(mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }

    /// Keep the callback registered for the lifetime of the source.
    pub fn detach(mut self) {
        self.dispose = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}
