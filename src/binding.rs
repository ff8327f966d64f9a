//! Bound values handed out to providers.
//!
//! Every bound property owns a [`ValueCell`]: an atomically swappable
//! `(value, metadata)` pair plus an ordered listener list. [`Value`],
//! [`DynamicValue`] and [`AnyValue`] are cheap handles onto the same cell, so
//! a handle cached by a consumer observes every later update.

use crate::definition::{PropertyDefinition, ValueType};
use crate::error::{ConfigError, ConfigResult};
use crate::resolver::{ResolvedProperty, SourceRef};
use crate::value::{ConfigValue, FromConfigValue};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Result returned by change listeners. An error is reported as a
/// `ConfigError::ListenerNotification` and does not stop other listeners.
pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type ErasedListener = Arc<dyn Fn(&ConfigValue, &ConfigValue) -> ListenerResult + Send + Sync>;

/// Handle returned by [`DynamicValue::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Description of a bound property and where its current value came from.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyMetadata {
    name: String,
    value_type: ValueType,
    dynamic: bool,
    default_value: String,
    required: bool,
    source: Option<SourceRef>,
    loaded_from_default: bool,
}

impl PropertyMetadata {
    pub(crate) fn new(definition: &PropertyDefinition, resolved: &ResolvedProperty) -> Self {
        Self {
            name: definition.name().to_string(),
            value_type: definition.value_type().clone(),
            dynamic: definition.is_dynamic(),
            default_value: definition.default_value().to_string(),
            required: definition.required(),
            source: resolved.origin.clone(),
            loaded_from_default: resolved.used_default,
        }
    }

    /// Property name as declared.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared value type.
    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    /// Whether the property follows source changes.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Raw default declared for the property.
    pub fn default_value(&self) -> &str {
        &self.default_value
    }

    /// Whether the property must be defined by a source.
    pub fn required(&self) -> bool {
        self.required
    }

    /// Source that supplied the current value, `None` when the default was used.
    pub fn source(&self) -> Option<&SourceRef> {
        self.source.as_ref()
    }

    /// Description of the supplying source, if any.
    pub fn source_description(&self) -> Option<&str> {
        self.source.as_ref().map(SourceRef::description)
    }

    /// True when no source defined the property.
    pub fn loaded_from_default(&self) -> bool {
        self.loaded_from_default
    }
}

/// Value and metadata published together.
#[derive(Debug)]
pub(crate) struct ValueState {
    pub(crate) value: ConfigValue,
    pub(crate) metadata: PropertyMetadata,
}

impl ValueState {
    pub(crate) fn new(definition: &PropertyDefinition, resolved: ResolvedProperty) -> Self {
        let metadata = PropertyMetadata::new(definition, &resolved);
        Self {
            value: resolved.value,
            metadata,
        }
    }
}

pub(crate) struct ValueCell {
    state: ArcSwap<ValueState>,
    listeners: Mutex<Vec<(ListenerId, ErasedListener)>>,
    next_listener: AtomicU64,
}

impl fmt::Debug for ValueCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load();
        f.debug_struct("ValueCell")
            .field("name", &state.metadata.name)
            .field("value", &state.value)
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

impl ValueCell {
    pub(crate) fn new(state: ValueState) -> Self {
        Self {
            state: ArcSwap::from_pointee(state),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        }
    }

    pub(crate) fn load(&self) -> Arc<ValueState> {
        self.state.load_full()
    }

    /// Publishes a new state and returns the previous one.
    pub(crate) fn replace(&self, state: ValueState) -> Arc<ValueState> {
        self.state.swap(Arc::new(state))
    }

    fn add_listener(&self, listener: ErasedListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Invokes every listener in registration order with `(old, new)`.
    ///
    /// Listeners run on a copy of the list, outside the lock. Failures and
    /// panics are logged and returned; they never stop the remaining listeners.
    pub(crate) fn notify(&self, old: &ConfigValue, new: &ConfigValue) -> Vec<ConfigError> {
        let listeners: Vec<ErasedListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let mut errors = Vec::new();
        for listener in listeners {
            let message = match panic::catch_unwind(AssertUnwindSafe(|| listener(old, new))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(payload) => panic_message(payload.as_ref()),
            };
            let name = self.state.load().metadata.name.clone();
            warn!(property = %name, error = %message, "change listener failed");
            errors.push(ConfigError::listener(name, message));
        }
        errors
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("listener panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("listener panicked: {message}")
    } else {
        "listener panicked".to_string()
    }
}

/// Read-only typed view of a bound property.
pub struct Value<T> {
    cell: Arc<ValueCell>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Value<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Value").field(&self.cell).finish()
    }
}

impl<T: FromConfigValue> Value<T> {
    /// Returns the current value.
    pub fn current_value(&self) -> Option<T> {
        T::from_config_value(&self.cell.load().value)
    }

    /// Metadata of the current value.
    pub fn metadata(&self) -> PropertyMetadata {
        self.cell.load().metadata.clone()
    }

    /// Returns value and metadata read from the same published state.
    pub fn snapshot(&self) -> Option<(T, PropertyMetadata)> {
        let state = self.cell.load();
        T::from_config_value(&state.value).map(|value| (value, state.metadata.clone()))
    }
}

/// Typed view of a dynamic property that can change after binding and
/// notifies listeners when it does.
///
/// # Example
/// ```
/// use propbind::{EngineBuilder, MapSource, PropertyDefinition, ValueType};
/// use std::sync::Arc;
///
/// let overrides = Arc::new(MapSource::new("overrides").with_value("pool.size", "5"));
/// let engine = EngineBuilder::new()
///     .with_source(overrides.clone())
///     .build()
///     .unwrap();
/// let handle = engine
///     .register(
///         "pool",
///         vec![PropertyDefinition::new("pool.size", ValueType::integer()).dynamic()],
///     )
///     .unwrap();
///
/// let size = handle.dynamic_value::<i32>("pool.size").unwrap();
/// size.add_listener(|old, new| {
///     println!("pool size {old} -> {new}");
///     Ok(())
/// });
///
/// overrides.set("pool.size", "7");
/// assert_eq!(size.current_value(), Some(7));
/// ```
pub struct DynamicValue<T> {
    cell: Arc<ValueCell>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for DynamicValue<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for DynamicValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DynamicValue").field(&self.cell).finish()
    }
}

impl<T: FromConfigValue + 'static> DynamicValue<T> {
    /// Returns the current value.
    pub fn current_value(&self) -> Option<T> {
        T::from_config_value(&self.cell.load().value)
    }

    /// Metadata of the current value.
    pub fn metadata(&self) -> PropertyMetadata {
        self.cell.load().metadata.clone()
    }

    /// Returns value and metadata read from the same published state.
    pub fn snapshot(&self) -> Option<(T, PropertyMetadata)> {
        let state = self.cell.load();
        T::from_config_value(&state.value).map(|value| (value, state.metadata.clone()))
    }

    /// Registers a listener called with `(old, new)` after every change.
    ///
    /// A listener added while a notification is in flight is first called
    /// for the next change.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&T, &T) -> ListenerResult + Send + Sync + 'static,
    {
        self.cell.add_listener(Arc::new(move |old: &ConfigValue, new: &ConfigValue| {
            match (T::from_config_value(old), T::from_config_value(new)) {
                (Some(old), Some(new)) => listener(&old, &new),
                _ => Err(format!("changed value is not a {}", T::type_label()).into()),
            }
        }))
    }

    /// Removes a listener; returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.cell.remove_listener(id)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.cell.listener_count()
    }
}

/// Untyped handle onto a bound property.
#[derive(Clone)]
pub struct AnyValue {
    cell: Arc<ValueCell>,
}

impl fmt::Debug for AnyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnyValue").field(&self.cell).finish()
    }
}

impl AnyValue {
    pub(crate) fn new(cell: Arc<ValueCell>) -> Self {
        Self { cell }
    }

    #[cfg(test)]
    pub(crate) fn cell(&self) -> &Arc<ValueCell> {
        &self.cell
    }

    /// Property name as declared.
    pub fn name(&self) -> String {
        self.cell.load().metadata.name.clone()
    }

    /// Current converted value.
    pub fn value(&self) -> ConfigValue {
        self.cell.load().value.clone()
    }

    /// Metadata of the current value.
    pub fn metadata(&self) -> PropertyMetadata {
        self.cell.load().metadata.clone()
    }

    /// Whether the property follows source changes.
    pub fn is_dynamic(&self) -> bool {
        self.cell.load().metadata.dynamic
    }

    /// True when both handles refer to the same bound property.
    pub fn same_binding(&self, other: &AnyValue) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// Returns a typed read-only view.
    ///
    /// # Errors
    /// * `ConfigError::TypeMismatch` - If the bound value cannot be read as `T`
    pub fn typed<T: FromConfigValue>(&self) -> ConfigResult<Value<T>> {
        let state = self.cell.load();
        if T::from_config_value(&state.value).is_none() {
            return Err(ConfigError::type_mismatch(
                state.metadata.name.clone(),
                T::type_label(),
            ));
        }
        Ok(Value {
            cell: Arc::clone(&self.cell),
            _marker: PhantomData,
        })
    }

    /// Returns a typed dynamic view.
    ///
    /// # Errors
    /// * `ConfigError::TypeMismatch` - If the property is static or cannot be read as `T`
    pub fn dynamic<T: FromConfigValue + 'static>(&self) -> ConfigResult<DynamicValue<T>> {
        let state = self.cell.load();
        if !state.metadata.dynamic {
            return Err(ConfigError::type_mismatch(
                state.metadata.name.clone(),
                format!("DynamicValue<{}>", T::type_label()),
            ));
        }
        if T::from_config_value(&state.value).is_none() {
            return Err(ConfigError::type_mismatch(
                state.metadata.name.clone(),
                T::type_label(),
            ));
        }
        Ok(DynamicValue {
            cell: Arc::clone(&self.cell),
            _marker: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ValueType;

    fn cell(definition: &PropertyDefinition, value: ConfigValue) -> Arc<ValueCell> {
        let resolved = ResolvedProperty {
            raw_value: value.to_string(),
            origin: None,
            used_default: true,
            value,
        };
        Arc::new(ValueCell::new(ValueState::new(definition, resolved)))
    }

    fn state(definition: &PropertyDefinition, value: ConfigValue) -> ValueState {
        ValueState::new(
            definition,
            ResolvedProperty {
                raw_value: value.to_string(),
                origin: None,
                used_default: false,
                value,
            },
        )
    }

    #[test]
    fn test_metadata_from_definition() {
        let def = PropertyDefinition::new("port", ValueType::integer())
            .optional("80")
            .dynamic();
        let value = AnyValue::new(cell(&def, ConfigValue::Integer(80)));
        let metadata = value.metadata();
        assert_eq!(metadata.name(), "port");
        assert_eq!(metadata.value_type(), &ValueType::integer());
        assert!(metadata.is_dynamic());
        assert!(!metadata.required());
        assert_eq!(metadata.default_value(), "80");
        assert!(metadata.loaded_from_default());
        assert!(metadata.source().is_none());
    }

    #[test]
    fn test_typed_views() {
        let def = PropertyDefinition::new("port", ValueType::integer());
        let value = AnyValue::new(cell(&def, ConfigValue::Integer(3)));

        assert_eq!(value.typed::<i32>().unwrap().current_value(), Some(3));
        assert_eq!(value.typed::<i64>().unwrap().current_value(), Some(3));
        assert!(matches!(
            value.typed::<String>(),
            Err(ConfigError::TypeMismatch { .. })
        ));
        // static properties have no dynamic view
        assert!(value.dynamic::<i32>().is_err());
    }

    #[test]
    fn test_listeners_called_in_registration_order() {
        let def = PropertyDefinition::new("n", ValueType::integer()).dynamic();
        let any = AnyValue::new(cell(&def, ConfigValue::Integer(5)));
        let value = any.dynamic::<i32>().unwrap();

        let calls = Arc::new(Mutex::new(Vec::new()));
        for label in ["l1", "l2"] {
            let calls = Arc::clone(&calls);
            value.add_listener(move |old, new| {
                calls.lock().push((label, *old, *new));
                Ok(())
            });
        }

        let previous = any.cell().replace(state(&def, ConfigValue::Integer(7)));
        let errors = any
            .cell()
            .notify(&previous.value, &any.cell().load().value);

        assert!(errors.is_empty());
        assert_eq!(value.current_value(), Some(7));
        assert_eq!(*calls.lock(), vec![("l1", 5, 7), ("l2", 5, 7)]);
    }

    #[test]
    fn test_failing_listeners_are_isolated() {
        let def = PropertyDefinition::new("n", ValueType::integer()).dynamic();
        let any = AnyValue::new(cell(&def, ConfigValue::Integer(1)));
        let value = any.dynamic::<i32>().unwrap();

        let reached = Arc::new(Mutex::new(0));
        value.add_listener(|_, _| Err("boom".into()));
        value.add_listener(|_, _| panic!("listener exploded"));
        let counter = Arc::clone(&reached);
        value.add_listener(move |_, _| {
            *counter.lock() += 1;
            Ok(())
        });

        let errors = any
            .cell()
            .notify(&ConfigValue::Integer(1), &ConfigValue::Integer(2));
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(ConfigError::is_listener));
        assert!(errors[1].to_string().contains("listener exploded"));
        assert_eq!(*reached.lock(), 1);
    }

    #[test]
    fn test_remove_listener() {
        let def = PropertyDefinition::new("n", ValueType::string()).dynamic();
        let any = AnyValue::new(cell(&def, ConfigValue::from("a")));
        let value = any.dynamic::<String>().unwrap();

        let id = value.add_listener(|_, _| Ok(()));
        assert_eq!(value.listener_count(), 1);
        assert!(value.remove_listener(id));
        assert!(!value.remove_listener(id));
        assert_eq!(value.listener_count(), 0);
    }

    #[test]
    fn test_handles_share_state() {
        let def = PropertyDefinition::new("n", ValueType::boolean()).dynamic();
        let any = AnyValue::new(cell(&def, ConfigValue::Boolean(false)));
        let first = any.dynamic::<bool>().unwrap();
        let second = any.clone();

        any.cell().replace(state(&def, ConfigValue::Boolean(true)));
        assert_eq!(first.current_value(), Some(true));
        assert!(second.same_binding(&any));
        let (value, metadata) = first.snapshot().unwrap();
        assert!(value);
        assert!(!metadata.loaded_from_default());
    }
}
