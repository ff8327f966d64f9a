//! # propbind
//!
//! Typed configuration resolution and binding for Rust applications.
//!
//! An application declares the properties each of its components (a
//! *provider*) needs: a name, a type, whether it is required, a default and
//! whether it is dynamic. The engine resolves those declarations against an
//! ordered list of sources, converts the raw strings into typed values and
//! hands each provider a table of bound values. Dynamic values follow their
//! sources: when a source reports a change, every dynamic property is
//! re-resolved and values that changed are swapped in place before their
//! listeners are called.
//!
//! It supports:
//!
//! - Ordered sources where the first source defining a name wins
//! - Defaults for optional properties, hard failures for missing required ones
//! - String, integer, long and boolean values, lists of them and custom types
//! - Reading from environment variables
//! - Reading from `.properties`, JSON, YAML, TOML and INI files
//! - Watching and re-reading of configuration files (live reload)
//! - Change listeners on dynamic values
//!
//! ## Architecture Overview
//!
//! Data flows downwards:
//!
//! 1. **Sources** - [`PropertySource`] implementations such as [`MapSource`],
//!    [`EnvSource`] and [`FileSource`]
//! 2. **Resolution** - name index, precedence, defaults and conversion through
//!    the [`ConverterRegistry`]
//! 3. **Bindings** - [`Value`], [`DynamicValue`] and [`AnyValue`] handles
//! 4. **Providers** - one [`ProviderHandle`] per registered provider
//!
//! Change notification flows back up: a source signals a change, the
//! [`Engine`] re-resolves and updates the affected dynamic values.
//!
//! ## Quick Start
//!
//! ```rust
//! use propbind::{EngineBuilder, MapSource, PropertyDefinition, ValueType};
//! use std::sync::Arc;
//!
//! let overrides = Arc::new(MapSource::new("overrides"));
//! let defaults = Arc::new(
//!     MapSource::new("defaults")
//!         .with_value("server.port", "8080")
//!         .with_value("server.hosts", "a.local,b.local"),
//! );
//!
//! let engine = EngineBuilder::new()
//!     .with_source(overrides.clone())
//!     .with_source(defaults)
//!     .build()
//!     .unwrap();
//!
//! let server = engine
//!     .register(
//!         "server",
//!         vec![
//!             PropertyDefinition::new("server.port", ValueType::integer()).dynamic(),
//!             PropertyDefinition::new("server.hosts", ValueType::list_of(ValueType::string())),
//!             PropertyDefinition::new("server.debug", ValueType::boolean()).optional("false"),
//!         ],
//!     )
//!     .unwrap();
//!
//! let port = server.dynamic_value::<i32>("server.port").unwrap();
//! assert_eq!(port.current_value(), Some(8080));
//!
//! overrides.set("server.port", "9090");
//! assert_eq!(port.current_value(), Some(9090));
//!
//! let hosts = server.value::<Vec<String>>("server.hosts").unwrap();
//! assert_eq!(hosts.current_value().unwrap(), vec!["a.local", "b.local"]);
//! ```
//!
//! ## Configuration File Formats
//!
//! [`FileSource`] picks a parser from the file extension. Nested tables are
//! flattened to dotted names and arrays are joined with `,`, so list-typed
//! properties resolve from them directly.
//!
//! ### Properties
//! ```properties
//! database.host=localhost
//! database.port=5432
//! ```
//!
//! ### YAML
//! ```yaml
//! database:
//!   host: localhost
//!   port: 5432
//! ```
//!
//! ### TOML
//! ```toml
//! [database]
//! host = "localhost"
//! port = 5432
//! ```
//!
//! ## Environment Variables
//!
//! With a prefix, environment variables are mapped to property names:
//!
//! ```bash
//! export MYAPP_DATABASE_HOST=localhost
//! export MYAPP_DATABASE_PORT=5432
//! ```
//!
//! `EnvSource::with_prefix("MYAPP")` exposes these as `database.host` and
//! `database.port`.
//!
//! ## File Watching
//!
//! ```rust,no_run
//! use propbind::{EngineBuilder, FileSource};
//! use std::sync::Arc;
//!
//! let file = Arc::new(FileSource::new("./config.yaml").unwrap());
//! let _watcher = file.watch().unwrap();
//! let engine = EngineBuilder::new().with_source(file).build().unwrap();
//! // dynamic values bound through `engine` now follow edits to config.yaml
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return `ConfigResult<T>`, an alias for
//! `Result<T, ConfigError>`:
//!
//! ```rust
//! use propbind::{ConfigError, EngineBuilder, PropertyDefinition, ValueType};
//!
//! let engine = EngineBuilder::new().build().unwrap();
//! match engine.register("db", vec![PropertyDefinition::new("db.url", ValueType::string())]) {
//!     Ok(_) => println!("bound"),
//!     Err(ConfigError::MissingRequiredProperty { names, .. }) => println!("missing: {names:?}"),
//!     Err(e) => println!("Error: {}", e),
//! }
//! ```

pub mod binding;
pub mod converter;
pub mod definition;
pub mod engine;
pub mod env_source;
pub mod error;
pub mod file_source;
pub mod parser;
pub mod provider;
pub mod resolver;
pub mod source;
pub mod value;
pub mod watcher;

// Re-export main types for convenience
pub use binding::{AnyValue, DynamicValue, ListenerId, ListenerResult, PropertyMetadata, Value};
pub use converter::{type_ids, ConverterRegistry, PropertyConverter};
pub use definition::{PropertyDefinition, ProviderDeclaration, ProviderManifest, ValueType};
pub use engine::{build_engine, Engine, EngineBuilder, ReloadReport};
pub use env_source::EnvSource;
pub use error::{ConfigError, ConfigResult};
pub use file_source::FileSource;
pub use provider::{BindingState, ProviderHandle};
pub use resolver::{ResolverOptions, SourceRef};
pub use source::{ChangeCallback, ChangeNotifier, MapSource, PropertySource, SubscriptionId};
pub use value::{ConfigValue, FromConfigValue};
pub use watcher::FileWatcher;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
