// Configuration management module
// TOML settings under the application directory plus the interactive editor

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    API_KEY_ENV_VAR, Config, ConfigError, IngestionConfig, LlmConfig, OllamaConfig,
    RetrievalConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
