//! Flattening parsers for file-backed sources.
//!
//! Every supported format is reduced to a flat map of dotted property names
//! to raw strings, the only shape the resolution engine consumes. Nested
//! tables become `parent.child` names and arrays are joined with `,` so that
//! list-typed properties can split them again.

use crate::error::{ConfigError, ConfigResult};
use std::collections::HashMap;

/// Trait for configuration file parsers.
pub trait ConfigParser: Send + Sync {
    /// Parses file content into flat name to raw value pairs.
    fn parse(&self, content: &str) -> ConfigResult<HashMap<String, String>>;

    /// Returns the file extensions handled by this parser.
    fn supported_extensions(&self) -> &[&str];

    /// Returns the name of the format.
    fn name(&self) -> &str;
}

/// Determines the appropriate parser based on file extension.
///
/// # Supported Extensions
/// - `properties` - Java-style properties
/// - `json` - JSON parser
/// - `yaml`, `yml` - YAML parser
/// - `toml` - TOML parser
/// - `ini` - INI parser
///
/// # Example
/// ```rust
/// use propbind::parser::detect_parser_by_extension;
///
/// let parser = detect_parser_by_extension("yml").unwrap();
/// assert_eq!(parser.name(), "YAML");
/// assert!(detect_parser_by_extension("xml").is_err());
/// ```
pub fn detect_parser_by_extension(extension: &str) -> ConfigResult<Box<dyn ConfigParser>> {
    match extension.to_lowercase().as_str() {
        "properties" => Ok(Box::new(PropertiesParser)),
        "json" => Ok(Box::new(JsonParser)),
        "yaml" | "yml" => Ok(Box::new(YamlParser)),
        "toml" => Ok(Box::new(TomlParser)),
        "ini" => Ok(Box::new(IniParser)),
        other => Err(ConfigError::parse_error(
            extension,
            format!("unsupported configuration format '{other}'"),
        )),
    }
}

/// Java-style `.properties` parser.
///
/// Accepts `key=value`, `key: value` and `key value` lines; lines starting
/// with `#` or `!` are comments and a trailing `\` continues a value on the
/// next line.
pub struct PropertiesParser;

impl ConfigParser for PropertiesParser {
    fn parse(&self, content: &str) -> ConfigResult<HashMap<String, String>> {
        let mut result = HashMap::new();
        let mut pending = String::new();

        for line in content.lines() {
            let line = if pending.is_empty() {
                line.trim_start()
            } else {
                line.trim()
            };

            if pending.is_empty() && (line.is_empty() || line.starts_with(['#', '!'])) {
                continue;
            }

            if let Some(continued) = line.strip_suffix('\\') {
                pending.push_str(continued);
                continue;
            }

            pending.push_str(line);
            let (key, value) = split_property_line(&pending);
            result.insert(key.to_string(), value.to_string());
            pending.clear();
        }

        if !pending.is_empty() {
            let (key, value) = split_property_line(&pending);
            result.insert(key.to_string(), value.to_string());
        }

        Ok(result)
    }

    fn supported_extensions(&self) -> &[&str] {
        &["properties"]
    }

    fn name(&self) -> &str {
        "Properties"
    }
}

fn split_property_line(line: &str) -> (&str, &str) {
    match line.find(['=', ':', ' ', '\t']) {
        Some(pos) => {
            let key = line[..pos].trim_end();
            let rest = line[pos..].trim_start();
            let rest = rest
                .strip_prefix(['=', ':'])
                .map(str::trim_start)
                .unwrap_or(rest);
            (key, rest)
        }
        None => (line, ""),
    }
}

/// JSON configuration parser.
pub struct JsonParser;

impl ConfigParser for JsonParser {
    fn parse(&self, content: &str) -> ConfigResult<HashMap<String, String>> {
        let value: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| ConfigError::parse_error("JSON", e.to_string()))?;

        match value {
            serde_json::Value::Object(map) => {
                let mut result = HashMap::new();
                for (k, v) in map {
                    flatten_json(&k, v, &mut result);
                }
                Ok(result)
            }
            _ => Err(ConfigError::parse_error("JSON", "Root must be an object")),
        }
    }

    fn supported_extensions(&self) -> &[&str] {
        &["json"]
    }

    fn name(&self) -> &str {
        "JSON"
    }
}

fn flatten_json(prefix: &str, value: serde_json::Value, out: &mut HashMap<String, String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                flatten_json(&join_key(prefix, &k), v, out);
            }
        }
        serde_json::Value::Null => {}
        other => {
            out.insert(prefix.to_string(), json_scalar(&other));
        }
    }
}

fn json_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(json_scalar)
            .collect::<Vec<_>>()
            .join(","),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// YAML configuration parser.
pub struct YamlParser;

impl ConfigParser for YamlParser {
    fn parse(&self, content: &str) -> ConfigResult<HashMap<String, String>> {
        let value: serde_yaml::Value = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::parse_error("YAML", e.to_string()))?;

        match value {
            serde_yaml::Value::Mapping(map) => {
                let mut result = HashMap::new();
                for (k, v) in map {
                    flatten_yaml(&yaml_key(&k), v, &mut result);
                }
                Ok(result)
            }
            serde_yaml::Value::Null => Ok(HashMap::new()),
            _ => Err(ConfigError::parse_error(
                "YAML",
                "Root must be a mapping/object",
            )),
        }
    }

    fn supported_extensions(&self) -> &[&str] {
        &["yaml", "yml"]
    }

    fn name(&self) -> &str {
        "YAML"
    }
}

fn flatten_yaml(prefix: &str, value: serde_yaml::Value, out: &mut HashMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map {
                flatten_yaml(&join_key(prefix, &yaml_key(&k)), v, out);
            }
        }
        serde_yaml::Value::Tagged(tagged) => flatten_yaml(prefix, tagged.value, out),
        serde_yaml::Value::Null => {}
        other => {
            out.insert(prefix.to_string(), yaml_scalar(&other));
        }
    }
}

fn yaml_key(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        other => yaml_scalar(other),
    }
}

fn yaml_scalar(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Null => String::new(),
        serde_yaml::Value::Sequence(items) => items
            .iter()
            .map(yaml_scalar)
            .collect::<Vec<_>>()
            .join(","),
        serde_yaml::Value::Tagged(tagged) => yaml_scalar(&tagged.value),
        serde_yaml::Value::Mapping(_) => format!("{value:?}"),
    }
}

/// TOML configuration parser.
pub struct TomlParser;

impl ConfigParser for TomlParser {
    fn parse(&self, content: &str) -> ConfigResult<HashMap<String, String>> {
        let table: toml::Table = content
            .parse()
            .map_err(|e: toml::de::Error| ConfigError::parse_error("TOML", e.to_string()))?;

        let mut result = HashMap::new();
        for (k, v) in table {
            flatten_toml(&k, v, &mut result);
        }
        Ok(result)
    }

    fn supported_extensions(&self) -> &[&str] {
        &["toml"]
    }

    fn name(&self) -> &str {
        "TOML"
    }
}

fn flatten_toml(prefix: &str, value: toml::Value, out: &mut HashMap<String, String>) {
    match value {
        toml::Value::Table(table) => {
            for (k, v) in table {
                flatten_toml(&join_key(prefix, &k), v, out);
            }
        }
        other => {
            out.insert(prefix.to_string(), toml_scalar(&other));
        }
    }
}

fn toml_scalar(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(dt) => dt.to_string(),
        toml::Value::Array(items) => items
            .iter()
            .map(toml_scalar)
            .collect::<Vec<_>>()
            .join(","),
        toml::Value::Table(_) => value.to_string(),
    }
}

/// INI configuration parser. Keys inside `[section]` become `section.key`.
pub struct IniParser;

impl ConfigParser for IniParser {
    fn parse(&self, content: &str) -> ConfigResult<HashMap<String, String>> {
        let mut result = HashMap::new();
        let mut current_section: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let section_name = line[1..line.len() - 1].trim().to_string();
                if section_name.is_empty() {
                    return Err(ConfigError::parse_error("INI", "Empty section name"));
                }
                current_section = Some(section_name);
                continue;
            }

            let Some(eq_pos) = line.find('=') else {
                return Err(ConfigError::parse_error(
                    "INI",
                    format!("Invalid line format: {line}"),
                ));
            };

            let key = line[..eq_pos].trim();
            if key.is_empty() {
                return Err(ConfigError::parse_error("INI", "Empty key name"));
            }
            let value = line[eq_pos + 1..].trim().to_string();

            let name = match &current_section {
                Some(section) => join_key(section, key),
                None => key.to_string(),
            };
            result.insert(name, value);
        }

        Ok(result)
    }

    fn supported_extensions(&self) -> &[&str] {
        &["ini"]
    }

    fn name(&self) -> &str {
        "INI"
    }
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get<'a>(map: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
        map.get(key).map(String::as_str)
    }

    #[test]
    fn test_parser_detection() {
        for ext in ["properties", "json", "yaml", "yml", "toml", "ini", "JSON"] {
            assert!(detect_parser_by_extension(ext).is_ok(), "{ext}");
        }
        assert!(detect_parser_by_extension("xml").is_err());
    }

    #[test]
    fn test_properties_parser() {
        let content = "# comment\n\
                       ! also a comment\n\
                       db.host=localhost\n\
                       db.port : 5432\n\
                       name value with spaces\n\
                       hosts = a,b,\\\n    c\n\
                       empty=\n\
                       flag\n";
        let result = PropertiesParser.parse(content).unwrap();
        assert_eq!(get(&result, "db.host"), Some("localhost"));
        assert_eq!(get(&result, "db.port"), Some("5432"));
        assert_eq!(get(&result, "name"), Some("value with spaces"));
        assert_eq!(get(&result, "hosts"), Some("a,b,c"));
        assert_eq!(get(&result, "empty"), Some(""));
        assert_eq!(get(&result, "flag"), Some(""));
        assert_eq!(result.len(), 6);
    }

    #[test]
    fn test_json_flattening() {
        let content = r#"{
            "database": {"host": "localhost", "port": 5432, "ssl": true},
            "ports": [1, 2, 3],
            "nothing": null
        }"#;
        let result = JsonParser.parse(content).unwrap();
        assert_eq!(get(&result, "database.host"), Some("localhost"));
        assert_eq!(get(&result, "database.port"), Some("5432"));
        assert_eq!(get(&result, "database.ssl"), Some("true"));
        assert_eq!(get(&result, "ports"), Some("1,2,3"));
        assert!(!result.contains_key("nothing"));
        assert!(JsonParser.parse("[1]").is_err());
        assert!(JsonParser.parse("{").is_err());
    }

    #[test]
    fn test_yaml_flattening() {
        let content = "server:\n  port: 8080\n  hosts:\n    - a\n    - b\ndebug: false\n";
        let result = YamlParser.parse(content).unwrap();
        assert_eq!(get(&result, "server.port"), Some("8080"));
        assert_eq!(get(&result, "server.hosts"), Some("a,b"));
        assert_eq!(get(&result, "debug"), Some("false"));
        assert!(YamlParser.parse("").unwrap().is_empty());
    }

    #[test]
    fn test_toml_flattening() {
        let content = "debug = true\n[cache]\nsize = 64\nregions = [\"eu\", \"us\"]\n";
        let result = TomlParser.parse(content).unwrap();
        assert_eq!(get(&result, "debug"), Some("true"));
        assert_eq!(get(&result, "cache.size"), Some("64"));
        assert_eq!(get(&result, "cache.regions"), Some("eu,us"));
        assert!(TomlParser.parse("= broken").is_err());
    }

    #[test]
    fn test_ini_sections() {
        let content = "; comment\nname = app\n\n[database]\nhost = localhost\nport = 5432\n";
        let result = IniParser.parse(content).unwrap();
        assert_eq!(get(&result, "name"), Some("app"));
        assert_eq!(get(&result, "database.host"), Some("localhost"));
        assert_eq!(get(&result, "database.port"), Some("5432"));
        assert!(IniParser.parse("[]\n").is_err());
        assert!(IniParser.parse("no equals sign\n").is_err());
    }
}
