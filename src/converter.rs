//! Raw string to typed value conversion.

use crate::error::{ConfigError, ConfigResult};
use crate::value::ConfigValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identifiers of the built-in scalar types.
pub mod type_ids {
    pub const STRING: &str = "string";
    pub const INTEGER: &str = "integer";
    pub const LONG: &str = "long";
    pub const BOOLEAN: &str = "boolean";
}

/// Converts a raw string into a value of one scalar type.
///
/// # Example
/// ```
/// use propbind::{ConfigResult, ConfigValue, ConfigError, PropertyConverter};
///
/// struct PercentConverter;
///
/// impl PropertyConverter for PercentConverter {
///     fn value_type(&self) -> &str {
///         "percent"
///     }
///
///     fn convert(&self, raw: &str) -> ConfigResult<ConfigValue> {
///         let n: u8 = raw
///             .strip_suffix('%')
///             .and_then(|n| n.parse().ok())
///             .filter(|n| *n <= 100)
///             .ok_or_else(|| ConfigError::conversion("percent", raw, "expected 0% to 100%"))?;
///         Ok(ConfigValue::custom(n))
///     }
/// }
/// ```
pub trait PropertyConverter: Send + Sync {
    /// The type identifier this converter is registered under.
    fn value_type(&self) -> &str;

    /// Converts one raw string. Fails with [`ConfigError::Conversion`].
    fn convert(&self, raw: &str) -> ConfigResult<ConfigValue>;
}

/// Identity conversion.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringConverter;

impl PropertyConverter for StringConverter {
    fn value_type(&self) -> &str {
        type_ids::STRING
    }

    fn convert(&self, raw: &str) -> ConfigResult<ConfigValue> {
        Ok(ConfigValue::String(raw.to_string()))
    }
}

/// Strict base-10 parsing into a 32-bit integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerConverter;

impl PropertyConverter for IntegerConverter {
    fn value_type(&self) -> &str {
        type_ids::INTEGER
    }

    fn convert(&self, raw: &str) -> ConfigResult<ConfigValue> {
        raw.parse::<i32>()
            .map(ConfigValue::Integer)
            .map_err(|e| ConfigError::conversion(type_ids::INTEGER, raw, e.to_string()))
    }
}

/// Strict base-10 parsing into a 64-bit integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongConverter;

impl PropertyConverter for LongConverter {
    fn value_type(&self) -> &str {
        type_ids::LONG
    }

    fn convert(&self, raw: &str) -> ConfigResult<ConfigValue> {
        raw.parse::<i64>()
            .map(ConfigValue::Long)
            .map_err(|e| ConfigError::conversion(type_ids::LONG, raw, e.to_string()))
    }
}

/// Accepts only `true` / `false`, ignoring ASCII case.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanConverter;

impl PropertyConverter for BooleanConverter {
    fn value_type(&self) -> &str {
        type_ids::BOOLEAN
    }

    fn convert(&self, raw: &str) -> ConfigResult<ConfigValue> {
        if raw.eq_ignore_ascii_case("true") {
            Ok(ConfigValue::Boolean(true))
        } else if raw.eq_ignore_ascii_case("false") {
            Ok(ConfigValue::Boolean(false))
        } else {
            Err(ConfigError::conversion(
                type_ids::BOOLEAN,
                raw,
                "expected 'true' or 'false'",
            ))
        }
    }
}

/// Returns one instance of every built-in converter.
pub fn default_converters() -> Vec<Arc<dyn PropertyConverter>> {
    vec![
        Arc::new(StringConverter),
        Arc::new(IntegerConverter),
        Arc::new(LongConverter),
        Arc::new(BooleanConverter),
    ]
}

/// Maps type identifiers to converters. Owned by one engine.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<String, Arc<dyn PropertyConverter>>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.converters.keys().collect();
        types.sort();
        f.debug_struct("ConverterRegistry")
            .field("types", &types)
            .finish()
    }
}

impl ConverterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in converters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for converter in default_converters() {
            registry.register(converter);
        }
        registry
    }

    /// Registers a converter under its own type identifier, replacing any
    /// converter previously registered for that identifier.
    pub fn register(&mut self, converter: Arc<dyn PropertyConverter>) {
        self.converters
            .insert(converter.value_type().to_string(), converter);
    }

    /// Registers a converter under an explicit type identifier, e.g. to
    /// expose a built-in converter under an alias.
    pub fn register_as(&mut self, type_id: impl Into<String>, converter: Arc<dyn PropertyConverter>) {
        self.converters.insert(type_id.into(), converter);
    }

    /// True when a converter is registered for `type_id`.
    pub fn contains(&self, type_id: &str) -> bool {
        self.converters.contains_key(type_id)
    }

    /// Number of registered type identifiers.
    pub fn len(&self) -> usize {
        self.converters.len()
    }

    /// True when no converter is registered.
    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Converts `raw` with the converter registered for `type_id`.
    pub fn convert(&self, type_id: &str, raw: &str) -> ConfigResult<ConfigValue> {
        let converter =
            self.converters
                .get(type_id)
                .ok_or_else(|| ConfigError::UnknownValueType {
                    value_type: type_id.to_string(),
                })?;
        converter.convert(raw)
    }
}
