//! Property definitions and provider manifests.
//!
//! A [`PropertyDefinition`] is the immutable descriptor of one expected
//! configuration property. Hosts build them in code with the builder methods
//! or load whole providers from a [`ProviderManifest`].

use crate::converter::type_ids;
use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Declared type of a property: a scalar type identifier or a list of one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueType {
    /// A single value converted by the converter registered for the identifier
    Scalar(String),
    /// A delimited list whose elements are converted independently
    List(String),
}

impl ValueType {
    pub fn string() -> Self {
        ValueType::Scalar(type_ids::STRING.to_string())
    }

    pub fn integer() -> Self {
        ValueType::Scalar(type_ids::INTEGER.to_string())
    }

    pub fn long() -> Self {
        ValueType::Scalar(type_ids::LONG.to_string())
    }

    pub fn boolean() -> Self {
        ValueType::Scalar(type_ids::BOOLEAN.to_string())
    }

    /// A scalar of an arbitrary (possibly host-registered) type identifier.
    pub fn scalar(type_id: impl Into<String>) -> Self {
        ValueType::Scalar(type_id.into())
    }

    /// A list whose elements have the given scalar type.
    pub fn list_of(element: ValueType) -> Self {
        match element {
            ValueType::Scalar(id) | ValueType::List(id) => ValueType::List(id),
        }
    }

    /// Returns the scalar type identifier (the element type for lists).
    pub fn type_id(&self) -> &str {
        match self {
            ValueType::Scalar(id) | ValueType::List(id) => id,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ValueType::List(_))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Scalar(id) => write!(f, "{id}"),
            ValueType::List(id) => write!(f, "list<{id}>"),
        }
    }
}

impl FromStr for ValueType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let inner = s
            .strip_prefix("list<")
            .and_then(|rest| rest.strip_suffix('>'));

        let (id, is_list) = match inner {
            Some(inner) => (inner.trim(), true),
            None => (s, false),
        };

        if id.is_empty() || id.contains(['<', '>']) {
            return Err(ConfigError::Manifest(format!("invalid value type '{s}'")));
        }

        Ok(if is_list {
            ValueType::List(id.to_string())
        } else {
            ValueType::Scalar(id.to_string())
        })
    }
}

impl TryFrom<String> for ValueType {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ValueType> for String {
    fn from(value: ValueType) -> Self {
        value.to_string()
    }
}

fn default_required() -> bool {
    true
}

/// Immutable descriptor of one configuration property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    name: String,
    #[serde(rename = "type")]
    value_type: ValueType,
    #[serde(default)]
    dynamic: bool,
    #[serde(default = "default_required")]
    required: bool,
    #[serde(default, rename = "default")]
    default_value: String,
    #[serde(default)]
    accessor: Option<String>,
}

impl PropertyDefinition {
    /// Creates a required, static definition.
    ///
    /// # Example
    /// ```
    /// use propbind::{PropertyDefinition, ValueType};
    ///
    /// let def = PropertyDefinition::new("server.port", ValueType::integer())
    ///     .optional("8080")
    ///     .dynamic();
    /// assert!(!def.required());
    /// assert!(def.is_dynamic());
    /// assert_eq!(def.default_value(), "8080");
    /// ```
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            dynamic: false,
            required: true,
            default_value: String::new(),
            accessor: None,
        }
    }

    /// Marks the property as dynamic (re-resolved on source changes).
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Makes the property optional, falling back to `default_value`.
    pub fn optional(mut self, default_value: impl Into<String>) -> Self {
        self.required = false;
        self.default_value = default_value.into();
        self
    }

    /// Binds the property under an accessor key other than its name.
    pub fn with_accessor(mut self, key: impl Into<String>) -> Self {
        self.accessor = Some(key.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn required(&self) -> bool {
        self.required
    }

    /// Raw default, only consulted when the property is not required.
    pub fn default_value(&self) -> &str {
        &self.default_value
    }

    /// Key the bound value is looked up by; defaults to the property name.
    pub fn accessor_key(&self) -> &str {
        self.accessor.as_deref().unwrap_or(&self.name)
    }
}

/// One provider declared in a manifest.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProviderDeclaration {
    pub id: String,
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
}

/// A declarative list of providers and their property definitions.
///
/// # Example
/// ```
/// use propbind::ProviderManifest;
///
/// let manifest = ProviderManifest::from_toml_str(r#"
///     [[providers]]
///     id = "http"
///
///     [[providers.properties]]
///     name = "http.port"
///     type = "integer"
///     required = false
///     default = "8080"
///
///     [[providers.properties]]
///     name = "http.hosts"
///     type = "list<string>"
///     dynamic = true
/// "#).unwrap();
///
/// assert_eq!(manifest.providers.len(), 1);
/// assert_eq!(manifest.providers[0].properties.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProviderManifest {
    #[serde(default)]
    pub providers: Vec<ProviderDeclaration>,
}

impl ProviderManifest {
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Loads a manifest file, choosing the format from its extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::from_toml_str(&content),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_str(&content),
            _ => Err(ConfigError::Manifest(format!(
                "unsupported manifest format: {}",
                path.display()
            ))),
        }
    }
}
