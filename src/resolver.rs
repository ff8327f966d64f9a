//! Resolution of property definitions against an ordered list of sources.
//!
//! A resolution pass first builds a [`SourceIndex`] from one snapshot of
//! every source, then classifies each definition against that index. Sources
//! registered earlier shadow later ones for identical names; definitions that
//! no source defines fall back to their default when they are optional.

use crate::converter::ConverterRegistry;
use crate::definition::{PropertyDefinition, ValueType};
use crate::error::{ConfigError, ConfigResult};
use crate::source::PropertySource;
use crate::value::ConfigValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Options controlling how raw values are converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Separator between list elements
    pub list_delimiter: char,
    /// Trim whitespace around each list element before conversion
    pub trim_list_elements: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            list_delimiter: ',',
            trim_list_elements: false,
        }
    }
}

/// Reference to the source that supplied a resolved value.
#[derive(Clone)]
pub struct SourceRef {
    position: usize,
    description: String,
    source: Arc<dyn PropertySource>,
}

impl SourceRef {
    /// Precedence position of the source; 0 wins over everything else.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Description of the source at the time of resolution.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn source(&self) -> &Arc<dyn PropertySource> {
        &self.source
    }
}

impl PartialEq for SourceRef {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position && Arc::ptr_eq(&self.source, &other.source)
    }
}

impl fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRef")
            .field("position", &self.position)
            .field("description", &self.description)
            .finish()
    }
}

/// Name to (source, raw value) index for one resolution pass.
pub struct SourceIndex {
    sources: Vec<SourceRef>,
    entries: HashMap<String, (usize, String)>,
}

impl SourceIndex {
    /// Builds the index; the first source defining a name wins.
    pub fn build(sources: &[Arc<dyn PropertySource>]) -> Self {
        let mut entries: HashMap<String, (usize, String)> = HashMap::new();
        let mut refs = Vec::with_capacity(sources.len());

        for (position, source) in sources.iter().enumerate() {
            refs.push(SourceRef {
                position,
                description: source.description(),
                source: Arc::clone(source),
            });
            for (name, value) in source.snapshot() {
                entries.entry(name).or_insert((position, value));
            }
        }

        debug!(
            sources = refs.len(),
            names = entries.len(),
            "built property source index"
        );

        Self {
            sources: refs,
            entries,
        }
    }

    /// Returns the winning source and raw value for a name.
    pub fn lookup(&self, name: &str) -> Option<(&SourceRef, &str)> {
        self.entries
            .get(name)
            .map(|(position, value)| (&self.sources[*position], value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of resolving one definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProperty {
    /// Raw string the value was converted from
    pub raw_value: String,
    /// Source that supplied the raw value; `None` when the default was used
    pub origin: Option<SourceRef>,
    /// True iff no source defined the property
    pub used_default: bool,
    /// Converted value
    pub value: ConfigValue,
}

/// Classifies definitions against a [`SourceIndex`] and converts raw values.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    converters: &'a ConverterRegistry,
    options: &'a ResolverOptions,
}

impl<'a> Resolver<'a> {
    pub fn new(converters: &'a ConverterRegistry, options: &'a ResolverOptions) -> Self {
        Self {
            converters,
            options,
        }
    }

    /// Resolves one definition. Returns `Ok(None)` for a required property
    /// that no source defines.
    pub fn resolve_one(
        &self,
        definition: &PropertyDefinition,
        index: &SourceIndex,
    ) -> ConfigResult<Option<ResolvedProperty>> {
        let (raw_value, origin) = match index.lookup(definition.name()) {
            Some((source, raw)) => (raw.to_string(), Some(source.clone())),
            None if !definition.required() => (definition.default_value().to_string(), None),
            None => return Ok(None),
        };

        let value = self.convert(definition.value_type(), &raw_value)?;
        let used_default = origin.is_none();

        Ok(Some(ResolvedProperty {
            raw_value,
            origin,
            used_default,
            value,
        }))
    }

    /// Resolves every definition of one provider.
    ///
    /// # Errors
    /// * `ConfigError::UnknownValueType` - If a definition names an unregistered type
    /// * `ConfigError::Conversion` - On the first value that fails to convert
    /// * `ConfigError::MissingRequiredProperty` - Listing every required property no source defines
    pub fn resolve(
        &self,
        provider: &str,
        definitions: &[PropertyDefinition],
        index: &SourceIndex,
    ) -> ConfigResult<Vec<ResolvedProperty>> {
        if let Some(unknown) = definitions
            .iter()
            .find(|d| !self.converters.contains(d.value_type().type_id()))
        {
            return Err(ConfigError::UnknownValueType {
                value_type: unknown.value_type().type_id().to_string(),
            });
        }

        let mut resolved = Vec::with_capacity(definitions.len());
        let mut missing = Vec::new();

        for definition in definitions {
            match self.resolve_one(definition, index)? {
                Some(property) => resolved.push(property),
                None => missing.push(definition.name().to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(ConfigError::missing_required(provider, missing));
        }

        Ok(resolved)
    }

    /// Converts a raw string to the declared type. List types split on the
    /// configured delimiter and convert each element; an empty raw string
    /// yields a single element converted from `""`.
    pub fn convert(&self, value_type: &ValueType, raw: &str) -> ConfigResult<ConfigValue> {
        match value_type {
            ValueType::Scalar(type_id) => self.converters.convert(type_id, raw),
            ValueType::List(type_id) => raw
                .split(self.options.list_delimiter)
                .map(|element| {
                    let element = if self.options.trim_list_elements {
                        element.trim()
                    } else {
                        element
                    };
                    self.converters.convert(type_id, element)
                })
                .collect::<ConfigResult<Vec<_>>>()
                .map(ConfigValue::List),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MapSource;
    use proptest::prelude::*;

    fn sources(list: Vec<MapSource>) -> Vec<Arc<dyn PropertySource>> {
        list.into_iter()
            .map(|s| Arc::new(s) as Arc<dyn PropertySource>)
            .collect()
    }

    #[test]
    fn test_first_registered_source_wins() {
        let sources = sources(vec![
            MapSource::new("a").with_value("x", "1"),
            MapSource::new("b").with_value("x", "2").with_value("y", "3"),
        ]);
        let index = SourceIndex::build(&sources);

        let (source, raw) = index.lookup("x").unwrap();
        assert_eq!(source.description(), "a");
        assert_eq!(source.position(), 0);
        assert_eq!(raw, "1");

        let (source, raw) = index.lookup("y").unwrap();
        assert_eq!(source.description(), "b");
        assert_eq!(raw, "3");
        assert_eq!(index.len(), 2);
        assert!(index.lookup("z").is_none());
    }

    #[test]
    fn test_default_used_only_when_absent() {
        let registry = ConverterRegistry::with_defaults();
        let options = ResolverOptions::default();
        let resolver = Resolver::new(&registry, &options);
        let index = SourceIndex::build(&sources(vec![MapSource::new("a").with_value("x", "5")]));

        let present = PropertyDefinition::new("x", ValueType::integer()).optional("9");
        let resolved = resolver.resolve_one(&present, &index).unwrap().unwrap();
        assert_eq!(resolved.value, ConfigValue::Integer(5));
        assert!(!resolved.used_default);
        assert_eq!(resolved.origin.as_ref().map(|s| s.description()), Some("a"));

        let absent = PropertyDefinition::new("y", ValueType::integer()).optional("9");
        let resolved = resolver.resolve_one(&absent, &index).unwrap().unwrap();
        assert_eq!(resolved.value, ConfigValue::Integer(9));
        assert_eq!(resolved.raw_value, "9");
        assert!(resolved.used_default);
        assert!(resolved.origin.is_none());

        let required = PropertyDefinition::new("y", ValueType::integer());
        assert!(resolver.resolve_one(&required, &index).unwrap().is_none());
    }

    #[test]
    fn test_missing_required_lists_all_names() {
        let registry = ConverterRegistry::with_defaults();
        let options = ResolverOptions::default();
        let resolver = Resolver::new(&registry, &options);
        let index = SourceIndex::build(&[]);

        let defs = vec![
            PropertyDefinition::new("a", ValueType::string()),
            PropertyDefinition::new("b", ValueType::string()).optional("x"),
            PropertyDefinition::new("c", ValueType::long()),
        ];
        match resolver.resolve("p", &defs, &index) {
            Err(ConfigError::MissingRequiredProperty { provider, names }) => {
                assert_eq!(provider, "p");
                assert_eq!(names, vec!["a".to_string(), "c".to_string()]);
            }
            other => panic!("expected missing required error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_and_conversion_failures() {
        let registry = ConverterRegistry::with_defaults();
        let options = ResolverOptions::default();
        let resolver = Resolver::new(&registry, &options);
        let index = SourceIndex::build(&sources(vec![MapSource::new("a").with_value("x", "nope")]));

        let defs = vec![PropertyDefinition::new("x", ValueType::scalar("uuid"))];
        assert!(matches!(
            resolver.resolve("p", &defs, &index),
            Err(ConfigError::UnknownValueType { .. })
        ));

        let defs = vec![PropertyDefinition::new("x", ValueType::boolean())];
        assert!(resolver
            .resolve("p", &defs, &index)
            .unwrap_err()
            .is_conversion());

        // invalid defaults fail too
        let defs = vec![PropertyDefinition::new("z", ValueType::integer()).optional("")];
        assert!(resolver
            .resolve("p", &defs, &index)
            .unwrap_err()
            .is_conversion());
    }

    #[test]
    fn test_list_conversion() {
        let registry = ConverterRegistry::with_defaults();
        let options = ResolverOptions::default();
        let resolver = Resolver::new(&registry, &options);
        let ints = ValueType::list_of(ValueType::integer());
        let strings = ValueType::list_of(ValueType::string());

        assert_eq!(
            resolver.convert(&ints, "1,2,3").unwrap(),
            ConfigValue::from(vec![1i32, 2, 3])
        );
        assert!(resolver.convert(&ints, "1, 2").is_err());
        assert!(resolver.convert(&ints, "").is_err());
        assert_eq!(
            resolver.convert(&strings, "").unwrap(),
            ConfigValue::from(vec![""])
        );
        assert_eq!(
            resolver.convert(&strings, "a, b").unwrap(),
            ConfigValue::from(vec!["a", " b"])
        );
    }

    #[test]
    fn test_list_options() {
        let registry = ConverterRegistry::with_defaults();
        let options = ResolverOptions {
            list_delimiter: ';',
            trim_list_elements: true,
        };
        let resolver = Resolver::new(&registry, &options);
        assert_eq!(
            resolver
                .convert(&ValueType::list_of(ValueType::long()), " 1 ; 2 ")
                .unwrap(),
            ConfigValue::from(vec![1i64, 2])
        );
    }

    proptest! {
        #[test]
        fn earliest_source_defines_the_value(
            values in proptest::collection::vec(proptest::option::of(any::<i32>()), 1..6)
        ) {
            let list: Vec<MapSource> = values
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    let source = MapSource::new(format!("s{i}"));
                    match v {
                        Some(v) => source.with_value("n", v.to_string()),
                        None => source,
                    }
                })
                .collect();
            let index = SourceIndex::build(&sources(list));
            let registry = ConverterRegistry::with_defaults();
            let options = ResolverOptions::default();
            let resolver = Resolver::new(&registry, &options);
            let def = PropertyDefinition::new("n", ValueType::integer()).optional("-1");

            let resolved = resolver.resolve_one(&def, &index).unwrap().unwrap();
            match values.iter().position(Option::is_some) {
                Some(first) => {
                    prop_assert_eq!(resolved.value, ConfigValue::Integer(values[first].unwrap()));
                    prop_assert_eq!(resolved.origin.map(|s| s.position()), Some(first));
                    prop_assert!(!resolved.used_default);
                }
                None => {
                    prop_assert_eq!(resolved.value, ConfigValue::Integer(-1));
                    prop_assert!(resolved.used_default);
                }
            }
        }
    }
}
