//! Integration tests for file-backed and environment sources

use propbind::{
    ConfigError, EngineBuilder, EnvSource, FileSource, MapSource, PropertyDefinition,
    PropertySource, ValueType,
};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("Failed to write config file");
    path
}

fn database_definitions() -> Vec<PropertyDefinition> {
    vec![
        PropertyDefinition::new("database.host", ValueType::string()),
        PropertyDefinition::new("database.port", ValueType::integer()).dynamic(),
        PropertyDefinition::new("database.replicas", ValueType::list_of(ValueType::string()))
            .optional("primary"),
    ]
}

#[test]
fn test_every_file_format_binds_the_same_values() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let files = [
        (
            "app.properties",
            "database.host=localhost\ndatabase.port=5432\ndatabase.replicas=r1,r2\n",
        ),
        (
            "app.json",
            r#"{"database": {"host": "localhost", "port": 5432, "replicas": ["r1", "r2"]}}"#,
        ),
        (
            "app.yaml",
            "database:\n  host: localhost\n  port: 5432\n  replicas:\n    - r1\n    - r2\n",
        ),
        (
            "app.toml",
            "[database]\nhost = \"localhost\"\nport = 5432\nreplicas = [\"r1\", \"r2\"]\n",
        ),
        (
            "app.ini",
            "[database]\nhost = localhost\nport = 5432\nreplicas = r1,r2\n",
        ),
    ];

    for (name, content) in files {
        let path = write_config(&temp_dir, name, content);
        let engine = EngineBuilder::new()
            .with_source(Arc::new(FileSource::new(&path).unwrap()))
            .build()
            .unwrap();
        let db = engine.register("db", database_definitions()).unwrap();

        assert_eq!(
            db.value::<String>("database.host").unwrap().current_value().as_deref(),
            Some("localhost"),
            "host from {name}"
        );
        assert_eq!(
            db.dynamic_value::<i32>("database.port").unwrap().current_value(),
            Some(5432),
            "port from {name}"
        );
        assert_eq!(
            db.value::<Vec<String>>("database.replicas")
                .unwrap()
                .current_value(),
            Some(vec!["r1".to_string(), "r2".to_string()]),
            "replicas from {name}"
        );
    }
}

#[test]
fn test_engine_reload_picks_up_file_changes() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_config(
        &temp_dir,
        "app.properties",
        "database.host=localhost\ndatabase.port=5432\n",
    );

    let engine = EngineBuilder::new()
        .with_source(Arc::new(FileSource::new(&path).unwrap()))
        .build()
        .unwrap();
    let db = engine.register("db", database_definitions()).unwrap();
    let port = db.dynamic_value::<i32>("database.port").unwrap();

    let changes = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&changes);
    port.add_listener(move |old, new| {
        recorded.lock().unwrap().push((*old, *new));
        Ok(())
    });

    fs::write(&path, "database.host=elsewhere\ndatabase.port=6543\n").unwrap();
    let report = engine.reload().unwrap();

    assert_eq!(report.changed, vec!["database.port"]);
    assert_eq!(port.current_value(), Some(6543));
    assert_eq!(*changes.lock().unwrap(), vec![(5432, 6543)]);
    // static values keep what they were bound with
    assert_eq!(
        db.value::<String>("database.host").unwrap().current_value().as_deref(),
        Some("localhost")
    );
}

#[test]
fn test_failed_reload_keeps_previous_values() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_config(
        &temp_dir,
        "app.json",
        r#"{"database": {"host": "localhost", "port": 5432}}"#,
    );

    let engine = EngineBuilder::new()
        .with_source(Arc::new(FileSource::new(&path).unwrap()))
        .build()
        .unwrap();
    let db = engine.register("db", database_definitions()).unwrap();
    let port = db.dynamic_value::<i32>("database.port").unwrap();

    fs::write(&path, "{ this is not json").unwrap();
    let err = engine.reload().unwrap_err();
    assert!(matches!(err, ConfigError::SourceIo { .. }));
    assert_eq!(port.current_value(), Some(5432));

    fs::write(&path, r#"{"database": {"host": "localhost", "port": "many"}}"#).unwrap();
    assert!(engine.reload().unwrap_err().is_conversion());
    assert_eq!(port.current_value(), Some(5432));

    fs::write(&path, r#"{"database": {"host": "localhost", "port": 7000}}"#).unwrap();
    engine.reload().unwrap();
    assert_eq!(port.current_value(), Some(7000));
}

#[test]
fn test_watched_file_updates_dynamic_values() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_config(
        &temp_dir,
        "watch.yaml",
        "database:\n  host: localhost\n  port: 5432\n",
    );

    let file = Arc::new(FileSource::new(&path).unwrap());
    let watcher = file.watch().unwrap();
    let engine = EngineBuilder::new()
        .with_source(file.clone())
        .build()
        .unwrap();
    let db = engine.register("db", database_definitions()).unwrap();
    let port = db.dynamic_value::<i32>("database.port").unwrap();

    fs::write(&path, "database:\n  host: localhost\n  port: 9999\n").unwrap();

    for _ in 0..50 {
        if port.current_value() == Some(9999) {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(port.current_value(), Some(9999));
    assert_eq!(
        port.metadata().source_description(),
        Some(file.description().as_str())
    );
    watcher.stop();
}

#[test]
fn test_environment_overrides_file() {
    env::set_var("FSITEST_DATABASE_PORT", "1234");

    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_config(
        &temp_dir,
        "app.toml",
        "[database]\nhost = \"localhost\"\nport = 5432\n",
    );

    let env_source = Arc::new(EnvSource::with_prefix("FSITEST"));
    let engine = EngineBuilder::new()
        .with_source(env_source.clone())
        .with_source(Arc::new(FileSource::new(&path).unwrap()))
        .build()
        .unwrap();
    let db = engine.register("db", database_definitions()).unwrap();
    let port = db.dynamic_value::<i32>("database.port").unwrap();
    assert_eq!(port.current_value(), Some(1234));
    assert_eq!(
        port.metadata().source_description(),
        Some("environment variables (FSITEST_*)")
    );

    env::remove_var("FSITEST_DATABASE_PORT");
    env_source.reload().unwrap();
    assert_eq!(port.current_value(), Some(5432));
    assert_eq!(
        port.metadata().source_description(),
        Some(path.display().to_string().as_str())
    );
}

#[test]
fn test_overrides_layered_over_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_config(
        &temp_dir,
        "app.properties",
        "database.host=localhost\ndatabase.port=5432\n",
    );

    let overrides = Arc::new(MapSource::new("overrides"));
    let engine = EngineBuilder::new()
        .with_source(overrides.clone())
        .with_source(Arc::new(FileSource::new(&path).unwrap()))
        .build()
        .unwrap();
    let db = engine.register("db", database_definitions()).unwrap();
    let port = db.dynamic_value::<i32>("database.port").unwrap();

    overrides.set("database.port", "1");
    assert_eq!(port.current_value(), Some(1));
    overrides.remove("database.port");
    assert_eq!(port.current_value(), Some(5432));
}
