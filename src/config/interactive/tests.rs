use super::load_existing_config as load_existing_config_impl;
use super::non_empty;
use tempfile::TempDir;

#[test]
fn load_existing_config() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = load_existing_config_impl(temp_dir.path());
    assert_eq!(config.base_dir, temp_dir.path());
    assert!(!config.ollama.host.is_empty());
    assert!(config.ollama.port > 0);
    assert!(!config.embedding.model.is_empty());
}

#[test]
fn broken_config_falls_back_to_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(temp_dir.path().join("config.toml"), "[ollama\nport = 1")
        .expect("should write config");

    let config = load_existing_config_impl(temp_dir.path());
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.base_dir, temp_dir.path());
}

#[test]
fn model_name_validation() {
    assert!(non_empty(&"llama3".to_string()).is_ok());
    assert!(non_empty(&"  ".to_string()).is_err());
}
