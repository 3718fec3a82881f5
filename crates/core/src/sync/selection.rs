use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::errors::CoreError;
use crate::models::month::MonthKey;

/// Callback invoked with `(previous, next)` on every month change.
pub type MonthListener = Arc<dyn Fn(MonthKey, MonthKey) + Send + Sync>;

/// Handle returned by [`MonthSelection::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct SelectionInner {
    current: MonthKey,
    next_id: u64,
    listeners: Vec<(SubscriptionId, MonthListener)>,
}

/// Which month the user is looking at.
///
/// Listeners run synchronously inside [`select`](Self::select), after the
/// value changes and before `select` returns, so they always observe a
/// change before any fetch for the new month starts.
pub struct MonthSelection {
    inner: Mutex<SelectionInner>,
}

impl std::fmt::Debug for MonthSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("MonthSelection")
            .field("current", &inner.current)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl MonthSelection {
    pub fn new(initial: MonthKey) -> Self {
        Self {
            inner: Mutex::new(SelectionInner {
                current: initial,
                next_id: 0,
                listeners: Vec::new(),
            }),
        }
    }

    pub fn current(&self) -> MonthKey {
        self.lock().current
    }

    /// Switch months. Returns `false` (and notifies nobody) when `key`
    /// is already selected.
    pub fn select(&self, key: MonthKey) -> bool {
        let (previous, listeners) = {
            let mut inner = self.lock();
            if inner.current == key {
                return false;
            }
            let previous = inner.current;
            inner.current = key;
            let listeners: Vec<MonthListener> =
                inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
            (previous, listeners)
        };
        debug!(from = %previous, to = %key, "month selected");
        // Called outside the lock so a listener may read `current()`.
        for listener in listeners {
            listener(previous, key);
        }
        true
    }

    /// [`select`](Self::select) from a raw index; out-of-range input fails
    /// with `InvalidMonth` and leaves the selection unchanged.
    pub fn select_index(&self, index: i64) -> Result<bool, CoreError> {
        let key = MonthKey::new(index)?;
        Ok(self.select(key))
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(MonthKey, MonthKey) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(lid, _)| *lid != id);
        inner.listeners.len() != before
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SelectionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MonthSelection {
    fn default() -> Self {
        Self::new(MonthKey::current())
    }
}
