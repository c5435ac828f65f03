use super::load_existing_config as load_existing_config_impl;
use crate::config::Config;
use tempfile::TempDir;

#[test]
fn load_existing_config_falls_back_to_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(temp_dir.path().join("config.toml"), "not [valid toml")
        .expect("write config");

    let config = load_existing_config_impl(temp_dir.path()).expect("config loaded successfully");
    assert_eq!(config, Config::with_base_dir(temp_dir.path()));
}

#[test]
fn load_existing_config_reads_saved_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut saved = Config::with_base_dir(temp_dir.path());
    saved.ollama.host = "embed-host".to_string();
    saved.save().expect("save");

    let config = load_existing_config_impl(temp_dir.path()).expect("config loaded successfully");
    assert_eq!(config.ollama.host, "embed-host");
}
