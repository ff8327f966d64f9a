//! Error types and utilities for property resolution and binding.

/// Result type alias for propbind operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while resolving, binding or reloading configuration properties.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A raw string could not be converted to the declared value type
    #[error("Conversion error: cannot convert '{raw}' to {value_type}: {message}")]
    Conversion {
        value_type: String,
        raw: String,
        message: String,
    },

    /// One or more required properties have no value in any source
    #[error("Missing required properties for provider '{provider}': {}", .names.join(", "))]
    MissingRequiredProperty {
        provider: String,
        names: Vec<String>,
    },

    /// A source failed to reload its underlying data
    #[error("Source error in {source_name}: {message}")]
    SourceIo {
        source_name: String,
        message: String,
    },

    /// A dynamic value listener failed while being notified
    #[error("Listener for property '{property}' failed: {message}")]
    ListenerNotification { property: String, message: String },

    /// No converter is registered for the requested value type
    #[error("No converter registered for value type '{value_type}'")]
    UnknownValueType { value_type: String },

    /// A provider with the same identifier is already bound
    #[error("Provider '{provider}' is already registered")]
    DuplicateProvider { provider: String },

    /// Two definitions of one provider share an accessor key
    #[error("Provider '{provider}' declares accessor '{key}' more than once")]
    DuplicateAccessor { provider: String, key: String },

    /// A provider handle has no accessor with this key
    #[error("Provider '{provider}' has no accessor '{key}'")]
    UnknownAccessor { provider: String, key: String },

    /// A previous registration of this provider failed
    #[error("Provider '{provider}' failed to bind and cannot be registered again")]
    ProviderFailed { provider: String },

    /// A typed accessor does not match the bound value
    #[error("Property '{key}' cannot be read as {expected}")]
    TypeMismatch { key: String, expected: String },

    /// Source content parsing failed
    #[error("Parse error in {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File watching operation failed
    #[error("File watching error: {0}")]
    FileWatch(String),

    /// Provider manifest could not be read
    #[error("Manifest error: {0}")]
    Manifest(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Manifest(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Manifest(err.to_string())
    }
}

impl ConfigError {
    /// Creates a new conversion error.
    pub fn conversion(
        value_type: impl Into<String>,
        raw: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Conversion {
            value_type: value_type.into(),
            raw: raw.into(),
            message: message.into(),
        }
    }

    /// Creates a new missing required property error.
    pub fn missing_required(provider: impl Into<String>, names: Vec<String>) -> Self {
        Self::MissingRequiredProperty {
            provider: provider.into(),
            names,
        }
    }

    /// Creates a new source IO error.
    pub fn source_io(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceIo {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Creates a new listener notification error.
    pub fn listener(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ListenerNotification {
            property: property.into(),
            message: message.into(),
        }
    }

    /// Creates a new parse error with context.
    pub fn parse_error(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Creates a new type mismatch error.
    pub fn type_mismatch(key: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::TypeMismatch {
            key: key.into(),
            expected: expected.into(),
        }
    }

    /// Creates a new file watch error.
    pub fn file_watch(message: impl Into<String>) -> Self {
        Self::FileWatch(message.into())
    }

    /// Returns true if this error is a conversion failure.
    pub fn is_conversion(&self) -> bool {
        matches!(self, ConfigError::Conversion { .. })
    }

    /// Returns true if this error reports missing required properties.
    pub fn is_missing_required(&self) -> bool {
        matches!(self, ConfigError::MissingRequiredProperty { .. })
    }

    /// Returns true if this error comes from a failed source reload.
    pub fn is_source_io(&self) -> bool {
        matches!(self, ConfigError::SourceIo { .. })
    }

    /// Returns true if this error was raised by a listener.
    pub fn is_listener(&self) -> bool {
        matches!(self, ConfigError::ListenerNotification { .. })
    }
}
