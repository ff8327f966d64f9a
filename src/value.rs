//! Converted property values and typed read-back.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A property value after conversion from its raw string form.
#[derive(Debug, Clone)]
pub enum ConfigValue {
    /// String value
    String(String),
    /// 32-bit integer value
    Integer(i32),
    /// 64-bit integer value
    Long(i64),
    /// Boolean value
    Boolean(bool),
    /// Ordered list of converted elements
    List(Vec<ConfigValue>),
    /// Value produced by a host-registered converter
    Custom(CustomValue),
}

impl ConfigValue {
    /// Wraps a host-defined value produced by a custom converter.
    pub fn custom<T>(value: T) -> Self
    where
        T: Any + fmt::Debug + PartialEq + Send + Sync,
    {
        ConfigValue::Custom(CustomValue(Arc::new(value)))
    }

    /// Returns the value as a string reference if it's a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an i32 if it's an integer.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            ConfigValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as an i64 if it's an integer or a long.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Long(l) => Some(*l),
            ConfigValue::Integer(i) => Some(i64::from(*i)),
            _ => None,
        }
    }

    /// Returns the value as a bool if it's a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the elements if the value is a list.
    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Downcasts a custom value to the host type that produced it.
    pub fn downcast_custom<T: Any>(&self) -> Option<&T> {
        match self {
            ConfigValue::Custom(custom) => custom.0.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Returns the type name of the ConfigValue variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::String(_) => "String",
            ConfigValue::Integer(_) => "Integer",
            ConfigValue::Long(_) => "Long",
            ConfigValue::Boolean(_) => "Boolean",
            ConfigValue::List(_) => "List",
            ConfigValue::Custom(custom) => custom.0.data_type_name(),
        }
    }
}

impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConfigValue::String(a), ConfigValue::String(b)) => a == b,
            (ConfigValue::Integer(a), ConfigValue::Integer(b)) => a == b,
            (ConfigValue::Long(a), ConfigValue::Long(b)) => a == b,
            (ConfigValue::Boolean(a), ConfigValue::Boolean(b)) => a == b,
            (ConfigValue::List(a), ConfigValue::List(b)) => a == b,
            (ConfigValue::Custom(a), ConfigValue::Custom(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::String(s) => write!(f, "{s}"),
            ConfigValue::Integer(i) => write!(f, "{i}"),
            ConfigValue::Long(l) => write!(f, "{l}"),
            ConfigValue::Boolean(b) => write!(f, "{b}"),
            ConfigValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            ConfigValue::Custom(custom) => write!(f, "{:?}", custom.0),
        }
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<i32> for ConfigValue {
    fn from(i: i32) -> Self {
        ConfigValue::Integer(i)
    }
}

impl From<i64> for ConfigValue {
    fn from(l: i64) -> Self {
        ConfigValue::Long(l)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Boolean(b)
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(items: Vec<T>) -> Self {
        ConfigValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Type-erased payload of a [`ConfigValue::Custom`].
#[derive(Clone)]
pub struct CustomValue(Arc<dyn CustomData>);

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl PartialEq for CustomValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_data(&*other.0)
    }
}

/// Object-safe view of a host value held inside [`CustomValue`].
pub trait CustomData: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_data(&self, other: &dyn CustomData) -> bool;
    fn data_type_name(&self) -> &'static str;
}

impl<T> CustomData for T
where
    T: Any + fmt::Debug + PartialEq + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_data(&self, other: &dyn CustomData) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn data_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Reads a Rust value back out of a converted [`ConfigValue`].
///
/// Implemented for the built-in property types. Hosts that register custom
/// converters implement it for their own types, usually through
/// [`ConfigValue::downcast_custom`].
pub trait FromConfigValue: Sized {
    /// Human-readable name used in type mismatch errors.
    fn type_label() -> String;

    /// Returns `None` when the value has a different shape.
    fn from_config_value(value: &ConfigValue) -> Option<Self>;
}

impl FromConfigValue for ConfigValue {
    fn type_label() -> String {
        "ConfigValue".to_string()
    }

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromConfigValue for String {
    fn type_label() -> String {
        "String".to_string()
    }

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromConfigValue for i32 {
    fn type_label() -> String {
        "i32".to_string()
    }

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        value.as_i32()
    }
}

impl FromConfigValue for i64 {
    fn type_label() -> String {
        "i64".to_string()
    }

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        value.as_i64()
    }
}

impl FromConfigValue for bool {
    fn type_label() -> String {
        "bool".to_string()
    }

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        value.as_bool()
    }
}

impl<T: FromConfigValue> FromConfigValue for Vec<T> {
    fn type_label() -> String {
        format!("Vec<{}>", T::type_label())
    }

    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        value
            .as_list()?
            .iter()
            .map(T::from_config_value)
            .collect()
    }
}
