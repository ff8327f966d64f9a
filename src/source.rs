//! Configuration source abstraction and change notification.

use crate::error::ConfigResult;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked by a source after its raw values changed.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`PropertySource::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A provider of name to raw-string configuration data.
///
/// Sources are owned by the host and shared with the engine; every method
/// takes `&self`, so reloadable sources keep their data behind a lock.
pub trait PropertySource: Send + Sync {
    /// Returns a human-readable description of this source.
    fn description(&self) -> String;

    /// Returns every property name this source currently defines.
    fn property_names(&self) -> Vec<String>;

    /// Gets the raw value of a property.
    fn raw_value(&self, name: &str) -> Option<String>;

    /// Returns a consistent copy of all names and raw values.
    ///
    /// Sources that can change concurrently should override this so the
    /// copy is taken under a single lock.
    fn snapshot(&self) -> HashMap<String, String> {
        self.property_names()
            .into_iter()
            .filter_map(|name| self.raw_value(&name).map(|value| (name, value)))
            .collect()
    }

    /// Whether `reload` can change the values of this source.
    fn is_reloadable(&self) -> bool {
        false
    }

    /// Re-reads the underlying data. Fails with [`crate::ConfigError::SourceIo`].
    fn reload(&self) -> ConfigResult<()> {
        Ok(())
    }

    /// Registers a callback fired after the source's values change.
    /// Returns `None` when the source never signals changes.
    fn subscribe(&self, _callback: ChangeCallback) -> Option<SubscriptionId> {
        None
    }

    /// Removes a callback registered with [`PropertySource::subscribe`].
    fn unsubscribe(&self, _id: SubscriptionId) -> bool {
        false
    }
}

/// Subscriber list that sources embed to implement change notification.
#[derive(Default)]
pub struct ChangeNotifier {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(SubscriptionId, ChangeCallback)>>,
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.callbacks.lock().len())
            .finish()
    }
}

impl ChangeNotifier {
    /// Creates a notifier with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a callback invoked on every `notify`.
    pub fn subscribe(&self, callback: ChangeCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.lock().push((id, callback));
        id
    }

    /// Removes a callback; returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    /// Number of registered callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.callbacks.lock().len()
    }

    /// Invokes every subscriber in subscription order.
    ///
    /// The list is copied first so callbacks may subscribe or unsubscribe.
    pub fn notify(&self) {
        let callbacks: Vec<ChangeCallback> = self
            .callbacks
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback();
        }
    }
}

/// In-memory source, mostly useful for tests and programmatic overrides.
///
/// Every mutation fires change notification, so engines bound to it
/// re-resolve immediately.
///
/// # Example
/// ```
/// use propbind::{MapSource, PropertySource};
///
/// let source = MapSource::new("overrides").with_value("db.host", "localhost");
/// assert_eq!(source.raw_value("db.host").as_deref(), Some("localhost"));
///
/// source.set("db.host", "db.internal");
/// assert_eq!(source.raw_value("db.host").as_deref(), Some("db.internal"));
/// ```
pub struct MapSource {
    description: String,
    data: RwLock<HashMap<String, String>>,
    notifier: ChangeNotifier,
}

impl fmt::Debug for MapSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapSource")
            .field("description", &self.description)
            .field("data", &*self.data.read())
            .finish()
    }
}

impl MapSource {
    /// Creates an empty source with the given description.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            data: RwLock::new(HashMap::new()),
            notifier: ChangeNotifier::new(),
        }
    }

    /// Builder-style insert that does not notify.
    pub fn with_value(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.write().insert(name.into(), value.into());
        self
    }

    /// Sets a value and notifies subscribers if it changed.
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        let previous = self.data.write().insert(name.into(), value.clone());
        if previous.as_deref() != Some(value.as_str()) {
            self.notifier.notify();
        }
    }

    /// Removes a value and notifies subscribers if it existed.
    pub fn remove(&self, name: &str) -> Option<String> {
        let removed = self.data.write().remove(name);
        if removed.is_some() {
            self.notifier.notify();
        }
        removed
    }

    /// Replaces every value at once and notifies subscribers.
    pub fn replace_all(&self, values: HashMap<String, String>) {
        *self.data.write() = values;
        self.notifier.notify();
    }

    /// Number of callbacks subscribed to this source.
    pub fn subscriber_count(&self) -> usize {
        self.notifier.subscriber_count()
    }
}

impl PropertySource for MapSource {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn property_names(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    fn raw_value(&self, name: &str) -> Option<String> {
        self.data.read().get(name).cloned()
    }

    fn snapshot(&self) -> HashMap<String, String> {
        self.data.read().clone()
    }

    fn is_reloadable(&self) -> bool {
        true
    }

    fn subscribe(&self, callback: ChangeCallback) -> Option<SubscriptionId> {
        Some(self.notifier.subscribe(callback))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct StaticSource;

    impl PropertySource for StaticSource {
        fn description(&self) -> String {
            "static".to_string()
        }

        fn property_names(&self) -> Vec<String> {
            vec!["a".to_string(), "ghost".to_string()]
        }

        fn raw_value(&self, name: &str) -> Option<String> {
            (name == "a").then(|| "1".to_string())
        }
    }

    #[test]
    fn test_default_snapshot_skips_names_without_values() {
        let snapshot = StaticSource.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("a").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_default_capabilities() {
        let source = StaticSource;
        assert!(!source.is_reloadable());
        assert!(source.reload().is_ok());
        assert!(source.subscribe(Arc::new(|| {})).is_none());
    }

    #[test]
    fn test_notifier_order_and_unsubscribe() {
        let notifier = ChangeNotifier::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let c1 = Arc::clone(&calls);
        let first = notifier.subscribe(Arc::new(move || c1.lock().push(1)));
        let c2 = Arc::clone(&calls);
        notifier.subscribe(Arc::new(move || c2.lock().push(2)));

        notifier.notify();
        assert_eq!(*calls.lock(), vec![1, 2]);

        assert!(notifier.unsubscribe(first));
        assert!(!notifier.unsubscribe(first));
        notifier.notify();
        assert_eq!(*calls.lock(), vec![1, 2, 2]);
        assert_eq!(notifier.subscriber_count(), 1);
    }

    #[test]
    fn test_notifier_allows_subscribe_during_notify() {
        let notifier = Arc::new(ChangeNotifier::new());
        let inner = Arc::clone(&notifier);
        notifier.subscribe(Arc::new(move || {
            inner.subscribe(Arc::new(|| {}));
        }));
        notifier.notify();
        assert_eq!(notifier.subscriber_count(), 2);
    }

    #[test]
    fn test_map_source_notifies_only_on_change() {
        let source = MapSource::new("memory").with_value("x", "1");
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        source.subscribe(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        source.set("x", "1");
        assert_eq!(count.load(Ordering::SeqCst), 0);

        source.set("x", "2");
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert_eq!(source.remove("missing"), None);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert_eq!(source.remove("x").as_deref(), Some("2"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(source.property_names().is_empty());
    }
}
