//! Environment variable property source.

use crate::error::ConfigResult;
use crate::source::{ChangeCallback, ChangeNotifier, PropertySource, SubscriptionId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::env;
use std::fmt;

type KeyMapper = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Property source backed by a snapshot of the process environment.
///
/// Without a prefix every variable is exposed under its own name. With a
/// prefix only `PREFIX_*` variables are exposed, with the prefix removed and
/// the rest mapped to a dotted lowercase name (`APP_DB_HOST` becomes
/// `db.host`). `reload` takes a fresh snapshot.
pub struct EnvSource {
    /// Optional prefix for environment variable names
    prefix: Option<String>,
    /// Custom name transformation applied after prefix stripping
    key_mapper: Option<KeyMapper>,
    /// Snapshot of matching variables, keyed by property name
    cached_vars: RwLock<HashMap<String, String>>,
    notifier: ChangeNotifier,
}

impl fmt::Debug for EnvSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvSource")
            .field("prefix", &self.prefix)
            .field("variables", &self.cached_vars.read().len())
            .finish()
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvSource {
    /// Exposes every environment variable under its own name.
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// Exposes only `PREFIX_*` variables, mapped to dotted names.
    ///
    /// # Example
    /// ```
    /// use propbind::{EnvSource, PropertySource};
    ///
    /// std::env::set_var("DOCAPP_SERVER_PORT", "9000");
    /// let source = EnvSource::with_prefix("DOCAPP");
    /// assert_eq!(source.raw_value("server.port").as_deref(), Some("9000"));
    /// # std::env::remove_var("DOCAPP_SERVER_PORT");
    /// ```
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::build(Some(prefix.into()), None)
    }

    /// Like [`EnvSource::with_prefix`] but with a custom name mapping applied
    /// to the variable name after the prefix is removed.
    pub fn with_key_mapper<F>(prefix: Option<String>, mapper: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::build(prefix, Some(Box::new(mapper)))
    }

    fn build(prefix: Option<String>, key_mapper: Option<KeyMapper>) -> Self {
        let source = Self {
            prefix,
            key_mapper,
            cached_vars: RwLock::new(HashMap::new()),
            notifier: ChangeNotifier::new(),
        };
        *source.cached_vars.write() = source.read_environment();
        source
    }

    /// Transforms an environment variable name into a property name, or
    /// `None` when the variable does not carry the configured prefix.
    pub fn transform_key(&self, var_name: &str) -> Option<String> {
        let stripped = match &self.prefix {
            Some(prefix) => var_name.strip_prefix(prefix.as_str())?.strip_prefix('_')?,
            None => var_name,
        };

        Some(match (&self.key_mapper, &self.prefix) {
            (Some(mapper), _) => mapper(stripped),
            (None, Some(_)) => stripped.to_lowercase().replace('_', "."),
            (None, None) => stripped.to_string(),
        })
    }

    fn read_environment(&self) -> HashMap<String, String> {
        env::vars()
            .filter_map(|(name, value)| self.transform_key(&name).map(|key| (key, value)))
            .collect()
    }
}

impl PropertySource for EnvSource {
    fn description(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("environment variables ({prefix}_*)"),
            None => "environment variables".to_string(),
        }
    }

    fn property_names(&self) -> Vec<String> {
        self.cached_vars.read().keys().cloned().collect()
    }

    fn raw_value(&self, name: &str) -> Option<String> {
        self.cached_vars.read().get(name).cloned()
    }

    fn snapshot(&self) -> HashMap<String, String> {
        self.cached_vars.read().clone()
    }

    fn is_reloadable(&self) -> bool {
        true
    }

    fn reload(&self) -> ConfigResult<()> {
        let fresh = self.read_environment();
        let changed = {
            let mut cached = self.cached_vars.write();
            let changed = *cached != fresh;
            *cached = fresh;
            changed
        };
        if changed {
            self.notifier.notify();
        }
        Ok(())
    }

    fn subscribe(&self, callback: ChangeCallback) -> Option<SubscriptionId> {
        Some(self.notifier.subscribe(callback))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }
}
