//! Per-provider accessor tables.

use crate::binding::{AnyValue, DynamicValue, Value};
use crate::error::{ConfigError, ConfigResult};
use crate::value::FromConfigValue;
use std::collections::HashMap;
use std::fmt;

/// Lifecycle of one provider registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingState {
    /// Not registered with the engine
    Unbound,
    /// Registration in progress
    Resolving,
    /// All properties resolved; accessors are served
    Bound,
    /// Registration failed; terminal
    Failed,
}

impl fmt::Display for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BindingState::Unbound => "unbound",
            BindingState::Resolving => "resolving",
            BindingState::Bound => "bound",
            BindingState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Accessors of a bound provider, keyed by accessor key.
///
/// The key set is fixed when the provider is bound. Handles are cheap to
/// clone and share the underlying values with the engine.
#[derive(Clone)]
pub struct ProviderHandle {
    id: String,
    keys: Vec<String>,
    values: HashMap<String, AnyValue>,
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("id", &self.id)
            .field("keys", &self.keys)
            .finish()
    }
}

impl ProviderHandle {
    /// `entries` must already be free of duplicate keys.
    pub(crate) fn new(id: impl Into<String>, entries: Vec<(String, AnyValue)>) -> Self {
        let keys = entries.iter().map(|(key, _)| key.clone()).collect();
        Self {
            id: id.into(),
            keys,
            values: entries.into_iter().collect(),
        }
    }

    /// Provider identifier the handle was bound under.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the bound value for an accessor key.
    pub fn get(&self, key: &str) -> Option<AnyValue> {
        self.values.get(key).cloned()
    }

    /// Returns a typed read-only view of an accessor.
    ///
    /// # Errors
    /// * `ConfigError::UnknownAccessor` - If the provider has no such key
    /// * `ConfigError::TypeMismatch` - If the value cannot be read as `T`
    pub fn value<T: FromConfigValue>(&self, key: &str) -> ConfigResult<Value<T>> {
        self.lookup(key)?.typed()
    }

    /// Returns a typed dynamic view of an accessor.
    ///
    /// # Errors
    /// * `ConfigError::UnknownAccessor` - If the provider has no such key
    /// * `ConfigError::TypeMismatch` - If the property is static or not a `T`
    pub fn dynamic_value<T: FromConfigValue + 'static>(
        &self,
        key: &str,
    ) -> ConfigResult<DynamicValue<T>> {
        self.lookup(key)?.dynamic()
    }

    /// Accessor keys in declaration order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Values in declaration order.
    pub fn values(&self) -> impl Iterator<Item = &AnyValue> + '_ {
        self.keys.iter().filter_map(|key| self.values.get(key))
    }

    /// Number of accessors.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when the provider declared no properties.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn lookup(&self, key: &str) -> ConfigResult<&AnyValue> {
        self.values
            .get(key)
            .ok_or_else(|| ConfigError::UnknownAccessor {
                provider: self.id.clone(),
                key: key.to_string(),
            })
    }
}
