use std::env;
use std::fs;
use std::sync::Mutex;
use tempfile::TempDir;

/// Environment variables are process-wide; serialize the tests touching them
static ENV_LOCK: Mutex<()> = Mutex::new(());

const ENV_VARS: [&str; 7] = [
    "LAZYPOOL_DOCUMENTS",
    "LAZYPOOL_DATABASE",
    "LAZYPOOL_CACHE",
    "LAZYPOOL_SERVICES",
    "LAZYPOOL_CAPACITY",
    "LAZYPOOL_INITIAL",
    "LAZYPOOL_CONNECT_TIMEOUT",
];

/// Test loading configuration from YAML file
#[test]
fn test_load_yaml_config() {
    let yaml = r#"
documents:
  address: "127.0.0.1:27017"
  username: admin
  password: secret
  initial: 1
  capacity: 10

database:
  address: "127.0.0.1:5432"
  database: app
  connect_timeout_secs: 5

cache:
  address: "127.0.0.1:6379"

services:
  user:
    address: "10.0.0.5:9000"
    initial: 5
    capacity: 5
  order:
    address: "10.0.0.6:9000"
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let config = lazypool::config::load_from_yaml(&config_path).unwrap();

    let documents = config.documents.as_ref().unwrap();
    assert_eq!(documents.address, "127.0.0.1:27017");
    assert_eq!(documents.password.as_deref(), Some("secret"));
    assert_eq!(documents.capacity, 10);

    let database = config.database.as_ref().unwrap();
    assert_eq!(database.database.as_deref(), Some("app"));
    assert_eq!(database.connect_timeout_secs, 5);

    assert_eq!(config.services.len(), 2);
    assert_eq!(config.services["user"].initial, 5);
    assert_eq!(config.services["order"].capacity, 10);

    let names: Vec<_> = config.backends().into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["documents", "database", "cache", "order", "user"]);
}

/// Invalid bounds are rejected at load time
#[test]
fn test_load_yaml_rejects_invalid_bounds() {
    let yaml = r#"
services:
  user:
    address: "10.0.0.5:9000"
    initial: 8
    capacity: 4
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let err = lazypool::config::load_from_yaml(&config_path).unwrap_err();
    assert!(format!("{:#}", err).contains("initial (8) must not exceed capacity (4)"));
}

/// Missing files are reported with their path
#[test]
fn test_load_yaml_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("missing.yaml");

    let err = lazypool::config::load_config(Some(config_path.to_str().unwrap())).unwrap_err();
    assert!(err.to_string().contains("missing.yaml"));
}

/// Test loading configuration from environment variables
#[test]
fn test_load_env_config() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let saved = save_env();

    env::set_var("LAZYPOOL_DOCUMENTS", "127.0.0.1:27017");
    env::set_var("LAZYPOOL_CACHE", "127.0.0.1:6379");
    env::set_var("LAZYPOOL_SERVICES", "user=10.0.0.5:9000, order = 10.0.0.6:9000");
    env::set_var("LAZYPOOL_CAPACITY", "4");
    env::set_var("LAZYPOOL_INITIAL", "2");

    let config = lazypool::config::load_from_env();
    restore_env(saved);
    let config = config.unwrap();

    let documents = config.documents.unwrap();
    assert_eq!(documents.address, "127.0.0.1:27017");
    assert_eq!(documents.capacity, 4);
    assert_eq!(documents.initial, 2);

    assert!(config.database.is_none());
    assert_eq!(config.cache.unwrap().address, "127.0.0.1:6379");

    assert_eq!(config.services.len(), 2);
    assert_eq!(config.services["order"].address, "10.0.0.6:9000");
    assert_eq!(config.services["user"].capacity, 4);
}

/// Environment without any backend is an error
#[test]
fn test_load_env_requires_a_backend() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let saved = save_env();

    let result = lazypool::config::load_from_env();
    restore_env(saved);

    assert!(result.is_err());
}

/// Malformed service entries are rejected
#[test]
fn test_load_env_rejects_malformed_services() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let saved = save_env();

    env::set_var("LAZYPOOL_SERVICES", "user-10.0.0.5:9000");
    let result = lazypool::config::load_from_env();
    restore_env(saved);

    let err = result.unwrap_err();
    assert!(err.to_string().contains("user-10.0.0.5:9000"));
}

/// Service entries without a name are rejected
#[test]
fn test_load_env_rejects_unnamed_service() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let saved = save_env();

    env::set_var("LAZYPOOL_SERVICES", "user=10.0.0.5:9000, =10.0.0.6:9000");
    let result = lazypool::config::load_from_env();
    restore_env(saved);

    let err = result.unwrap_err();
    assert!(err.to_string().contains("=10.0.0.6:9000"));
}

/// Clear every LAZYPOOL_* variable, returning the previous values
fn save_env() -> Vec<(&'static str, Option<String>)> {
    ENV_VARS
        .iter()
        .map(|key| {
            let value = env::var(key).ok();
            env::remove_var(key);
            (*key, value)
        })
        .collect()
}

/// Helper function to restore environment variables
fn restore_env(saved: Vec<(&'static str, Option<String>)>) {
    for (key, value) in saved {
        match value {
            Some(val) => env::set_var(key, val),
            None => env::remove_var(key),
        }
    }
}
