//! The engine: owns sources, converters and every bound provider.
//!
//! Registration resolves a provider's definitions against the current
//! sources and either binds all of them or none. After binding, any change
//! signalled by a source re-resolves every dynamic property of every
//! provider; values that changed are swapped in place and their listeners
//! notified.

use crate::binding::{AnyValue, ValueCell, ValueState};
use crate::converter::{ConverterRegistry, PropertyConverter};
use crate::definition::{PropertyDefinition, ProviderManifest};
use crate::error::{ConfigError, ConfigResult};
use crate::provider::{BindingState, ProviderHandle};
use crate::resolver::{ResolvedProperty, Resolver, ResolverOptions, SourceIndex};
use crate::source::{PropertySource, SubscriptionId};
use crate::value::ConfigValue;
use arc_swap::ArcSwap;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info};

/// Outcome of [`Engine::reload`] or [`Engine::refresh`].
#[derive(Debug, Default)]
pub struct ReloadReport {
    /// Names of dynamic properties whose value changed, in binding order
    pub changed: Vec<String>,
    /// Failures reported by change listeners
    pub listener_errors: Vec<ConfigError>,
}

impl ReloadReport {
    /// True when no value changed.
    pub fn is_unchanged(&self) -> bool {
        self.changed.is_empty()
    }
}

struct BoundProperty {
    definition: PropertyDefinition,
    cell: Arc<ValueCell>,
}

struct BoundProvider {
    id: String,
    properties: Vec<BoundProperty>,
    handle: ProviderHandle,
}

/// Pending listener notification for one changed value.
struct Notification {
    cell: Arc<ValueCell>,
    old: ConfigValue,
    new: ConfigValue,
}

struct EngineInner {
    /// Sources in precedence order
    sources: Vec<Arc<dyn PropertySource>>,
    converters: ConverterRegistry,
    options: ResolverOptions,
    /// Serializes registration and resolution passes. Reentrant so a
    /// listener may trigger another pass from the notifying thread.
    resolve_lock: ReentrantMutex<()>,
    providers: RwLock<Vec<BoundProvider>>,
    states: RwLock<HashMap<String, BindingState>>,
    all_values: ArcSwap<Vec<AnyValue>>,
    subscriptions: Mutex<Vec<(usize, SubscriptionId)>>,
    /// Non-zero while `Engine::reload` drives the sources itself
    explicit_reloads: AtomicUsize,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        for (position, id) in self.subscriptions.get_mut().drain(..) {
            if let Some(source) = self.sources.get(position) {
                source.unsubscribe(id);
            }
        }
    }
}

impl EngineInner {
    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.converters, &self.options)
    }

    fn state_of(&self, provider_id: &str) -> BindingState {
        self.states
            .read()
            .get(provider_id)
            .copied()
            .unwrap_or(BindingState::Unbound)
    }

    fn set_state(&self, provider_id: &str, state: BindingState) {
        self.states.write().insert(provider_id.to_string(), state);
    }

    fn register(
        &self,
        provider_id: &str,
        definitions: Vec<PropertyDefinition>,
    ) -> ConfigResult<ProviderHandle> {
        let _guard = self.resolve_lock.lock();

        match self.state_of(provider_id) {
            BindingState::Unbound => {}
            BindingState::Failed => {
                return Err(ConfigError::ProviderFailed {
                    provider: provider_id.to_string(),
                })
            }
            BindingState::Resolving | BindingState::Bound => {
                return Err(ConfigError::DuplicateProvider {
                    provider: provider_id.to_string(),
                })
            }
        }

        let duplicate = {
            let mut keys = HashSet::new();
            definitions
                .iter()
                .find(|definition| !keys.insert(definition.accessor_key()))
                .map(|definition| definition.accessor_key().to_string())
        };
        if let Some(key) = duplicate {
            return Err(ConfigError::DuplicateAccessor {
                provider: provider_id.to_string(),
                key,
            });
        }

        self.set_state(provider_id, BindingState::Resolving);

        let index = SourceIndex::build(&self.sources);
        let resolved = match self.resolver().resolve(provider_id, &definitions, &index) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.set_state(provider_id, BindingState::Failed);
                return Err(e);
            }
        };

        let properties: Vec<BoundProperty> = definitions
            .into_iter()
            .zip(resolved)
            .map(|(definition, resolved)| {
                debug!(
                    provider = provider_id,
                    property = definition.name(),
                    value_type = %definition.value_type(),
                    origin = resolved.origin.as_ref().map_or("default", |s| s.description()),
                    "bound property"
                );
                let cell = Arc::new(ValueCell::new(ValueState::new(&definition, resolved)));
                BoundProperty { definition, cell }
            })
            .collect();

        let entries = properties
            .iter()
            .map(|p| {
                (
                    p.definition.accessor_key().to_string(),
                    AnyValue::new(Arc::clone(&p.cell)),
                )
            })
            .collect();
        let handle = ProviderHandle::new(provider_id, entries);

        let mut all_values = Vec::clone(&self.all_values.load());
        all_values.extend(handle.values().cloned());

        self.providers.write().push(BoundProvider {
            id: provider_id.to_string(),
            properties,
            handle: handle.clone(),
        });
        self.all_values.store(Arc::new(all_values));
        self.set_state(provider_id, BindingState::Bound);

        info!(provider = provider_id, properties = handle.len(), "provider bound");
        Ok(handle)
    }

    fn refresh(&self) -> ConfigResult<ReloadReport> {
        let _guard = self.resolve_lock.lock();
        let index = SourceIndex::build(&self.sources);
        let resolver = self.resolver();

        let mut report = ReloadReport::default();
        let mut notifications = Vec::new();
        {
            let providers = self.providers.read();

            // Resolve everything before touching any value.
            let mut passes: Vec<(&BoundProperty, ResolvedProperty)> = Vec::new();
            for provider in providers.iter() {
                let dynamic: Vec<&BoundProperty> = provider
                    .properties
                    .iter()
                    .filter(|p| p.definition.is_dynamic())
                    .collect();
                let definitions: Vec<PropertyDefinition> =
                    dynamic.iter().map(|p| p.definition.clone()).collect();
                let resolved = resolver.resolve(&provider.id, &definitions, &index)?;
                passes.extend(dynamic.into_iter().zip(resolved));
            }

            for (property, resolved) in passes {
                let state = ValueState::new(&property.definition, resolved);
                let current = property.cell.load();
                if current.value != state.value {
                    let new = state.value.clone();
                    let previous = property.cell.replace(state);
                    report.changed.push(property.definition.name().to_string());
                    notifications.push(Notification {
                        cell: Arc::clone(&property.cell),
                        old: previous.value.clone(),
                        new,
                    });
                } else if current.metadata != state.metadata {
                    debug!(
                        property = property.definition.name(),
                        origin = state.metadata.source_description().unwrap_or("default"),
                        "property origin changed without a value change"
                    );
                    property.cell.replace(state);
                }
            }
        }

        debug!(
            names = index.len(),
            changed = report.changed.len(),
            "resolution pass complete"
        );

        for notification in notifications {
            report.listener_errors.extend(
                notification
                    .cell
                    .notify(&notification.old, &notification.new),
            );
        }
        Ok(report)
    }

    fn on_source_change(&self, position: usize) {
        if self.explicit_reloads.load(Ordering::SeqCst) > 0 {
            return;
        }
        match self.refresh() {
            Ok(report) if !report.is_unchanged() => {
                debug!(source = position, changed = ?report.changed, "refreshed after source change")
            }
            Ok(_) => {}
            Err(e) => {
                let description = self
                    .sources
                    .get(position)
                    .map(|s| s.description())
                    .unwrap_or_default();
                error!(source = %description, error = %e, "refresh after source change failed; keeping previous values")
            }
        }
    }
}

/// Owns the sources, converters and bound providers of one application.
///
/// Cloning an engine is cheap; clones share all state. Change
/// subscriptions on the sources are released when the last clone is dropped.
///
/// # Example
/// ```
/// use propbind::{EngineBuilder, MapSource, PropertyDefinition, ValueType};
/// use std::sync::Arc;
///
/// let engine = EngineBuilder::new()
///     .with_source(Arc::new(MapSource::new("overrides").with_value("db.port", "6543")))
///     .with_source(Arc::new(MapSource::new("base").with_value("db.port", "5432")))
///     .build()
///     .unwrap();
///
/// let db = engine
///     .register(
///         "db",
///         vec![
///             PropertyDefinition::new("db.port", ValueType::integer()),
///             PropertyDefinition::new("db.host", ValueType::string()).optional("localhost"),
///         ],
///     )
///     .unwrap();
///
/// assert_eq!(db.value::<i32>("db.port").unwrap().current_value(), Some(6543));
/// assert_eq!(
///     db.value::<String>("db.host").unwrap().current_value().as_deref(),
///     Some("localhost")
/// );
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<String> = self.inner.sources.iter().map(|s| s.description()).collect();
        f.debug_struct("Engine")
            .field("sources", &sources)
            .field("providers", &self.provider_ids())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl Engine {
    fn new(
        sources: Vec<Arc<dyn PropertySource>>,
        converters: ConverterRegistry,
        options: ResolverOptions,
    ) -> Self {
        let inner = Arc::new(EngineInner {
            sources,
            converters,
            options,
            resolve_lock: ReentrantMutex::new(()),
            providers: RwLock::new(Vec::new()),
            states: RwLock::new(HashMap::new()),
            all_values: ArcSwap::from_pointee(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            explicit_reloads: AtomicUsize::new(0),
        });

        for (position, source) in inner.sources.iter().enumerate() {
            let weak: Weak<EngineInner> = Arc::downgrade(&inner);
            let subscription = source.subscribe(Arc::new(move || {
                if let Some(engine) = weak.upgrade() {
                    engine.on_source_change(position);
                }
            }));
            if let Some(id) = subscription {
                inner.subscriptions.lock().push((position, id));
            }
        }

        debug!(
            sources = inner.sources.len(),
            converters = inner.converters.len(),
            "engine built"
        );
        Self { inner }
    }

    /// Resolves and binds a provider's definitions.
    ///
    /// Either every definition is bound and the provider becomes
    /// [`BindingState::Bound`], or an error is returned and nothing is bound.
    ///
    /// # Errors
    /// * `ConfigError::MissingRequiredProperty` - Listing every required property no source defines
    /// * `ConfigError::Conversion` - If a raw value or default does not parse as its type
    /// * `ConfigError::UnknownValueType` - If a definition names an unregistered type
    /// * `ConfigError::DuplicateProvider` - If the provider is already bound
    /// * `ConfigError::DuplicateAccessor` - If two definitions share an accessor key
    /// * `ConfigError::ProviderFailed` - If an earlier registration of this id failed
    pub fn register(
        &self,
        provider_id: impl AsRef<str>,
        definitions: Vec<PropertyDefinition>,
    ) -> ConfigResult<ProviderHandle> {
        self.inner.register(provider_id.as_ref(), definitions)
    }

    /// Registers every provider of a manifest in declaration order, stopping
    /// at the first failure.
    pub fn register_manifest(&self, manifest: &ProviderManifest) -> ConfigResult<Vec<ProviderHandle>> {
        manifest
            .providers
            .iter()
            .map(|declaration| self.register(&declaration.id, declaration.properties.clone()))
            .collect()
    }

    /// Returns the handle of a bound provider.
    pub fn provider(&self, provider_id: &str) -> Option<ProviderHandle> {
        self.inner
            .providers
            .read()
            .iter()
            .find(|p| p.id == provider_id)
            .map(|p| p.handle.clone())
    }

    /// Returns the lifecycle state of a provider; `Unbound` if never registered.
    pub fn binding_state(&self, provider_id: &str) -> BindingState {
        self.inner.state_of(provider_id)
    }

    /// Identifiers of bound providers in registration order.
    pub fn provider_ids(&self) -> Vec<String> {
        self.inner
            .providers
            .read()
            .iter()
            .map(|p| p.id.clone())
            .collect()
    }

    /// Every bound value across all providers, as of this call.
    pub fn all_values(&self) -> Arc<Vec<AnyValue>> {
        self.inner.all_values.load_full()
    }

    /// Reloads every reloadable source, then re-resolves.
    ///
    /// # Errors
    /// * `ConfigError::SourceIo` - From the first source that fails to reload;
    ///   no value is re-resolved in that case
    /// * `ConfigError::MissingRequiredProperty` / `ConfigError::Conversion` -
    ///   If the reloaded sources no longer satisfy a dynamic property; no
    ///   value changes
    pub fn reload(&self) -> ConfigResult<ReloadReport> {
        self.inner.explicit_reloads.fetch_add(1, Ordering::SeqCst);
        let reloaded = self
            .inner
            .sources
            .iter()
            .filter(|source| source.is_reloadable())
            .try_for_each(|source| source.reload());
        self.inner.explicit_reloads.fetch_sub(1, Ordering::SeqCst);

        if let Err(e) = reloaded {
            error!(error = %e, "source reload failed; keeping previous values");
            return Err(e);
        }
        self.refresh()
    }

    /// Re-resolves every dynamic property against the sources' current
    /// values without reloading them.
    pub fn refresh(&self) -> ConfigResult<ReloadReport> {
        self.inner.refresh()
    }

    /// Sources in precedence order.
    pub fn sources(&self) -> &[Arc<dyn PropertySource>] {
        &self.inner.sources
    }

    /// Converter registry owned by this engine.
    pub fn converters(&self) -> &ConverterRegistry {
        &self.inner.converters
    }

    /// Options applied to every resolution pass.
    pub fn options(&self) -> &ResolverOptions {
        &self.inner.options
    }
}

/// Builds an engine with the built-in converters plus `converters`, which
/// replace built-ins registered for the same type.
pub fn build_engine(
    sources: Vec<Arc<dyn PropertySource>>,
    converters: Vec<Arc<dyn PropertyConverter>>,
) -> Engine {
    let mut registry = ConverterRegistry::with_defaults();
    for converter in converters {
        registry.register(converter);
    }
    Engine::new(sources, registry, ResolverOptions::default())
}

/// Step-by-step construction of an [`Engine`].
pub struct EngineBuilder {
    sources: Vec<Arc<dyn PropertySource>>,
    converters: ConverterRegistry,
    options: ResolverOptions,
    providers: Vec<(String, Vec<PropertyDefinition>)>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("sources", &self.sources.len())
            .field("converters", &self.converters)
            .field("options", &self.options)
            .field("providers", &self.providers.len())
            .finish()
    }
}

impl EngineBuilder {
    /// Starts with no sources and the built-in converters.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            converters: ConverterRegistry::with_defaults(),
            options: ResolverOptions::default(),
            providers: Vec::new(),
        }
    }

    /// Adds a source below every source added before it.
    pub fn with_source(mut self, source: Arc<dyn PropertySource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Adds a converter, replacing any registered for the same type.
    pub fn with_converter(mut self, converter: Arc<dyn PropertyConverter>) -> Self {
        self.converters.register(converter);
        self
    }

    /// Replaces the converter registry, dropping the built-ins.
    pub fn with_converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = converters;
        self
    }

    /// Sets the resolution options.
    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    /// Registers a provider as part of `build`.
    pub fn with_provider(
        mut self,
        provider_id: impl Into<String>,
        definitions: Vec<PropertyDefinition>,
    ) -> Self {
        self.providers.push((provider_id.into(), definitions));
        self
    }

    /// Builds the engine and registers the providers added with
    /// [`EngineBuilder::with_provider`].
    pub fn build(self) -> ConfigResult<Engine> {
        let engine = Engine::new(self.sources, self.converters, self.options);
        for (provider_id, definitions) in self.providers {
            engine.register(&provider_id, definitions)?;
        }
        Ok(engine)
    }
}
