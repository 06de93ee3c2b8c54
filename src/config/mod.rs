// Configuration management module
// TOML file settings with environment-variable overrides

pub mod settings;

pub use settings::{Config, ConfigError, OllamaConfig, SessionConfig};
