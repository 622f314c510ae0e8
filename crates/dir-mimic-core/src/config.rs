use crate::model::HashMode;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub localhost_only: bool,
    #[serde(default)]
    pub hash_mode: HashMode,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

fn default_port() -> u16 {
    8080
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            localhost_only: false,
            hash_mode: HashMode::None,
            ignore_patterns: Vec::new(),
        }
    }
}

/// Load `Config.toml` (optional) overlaid with `DIR_MIMIC_*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(
            Environment::with_prefix("DIR_MIMIC")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("ignore_patterns"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(text: &str) -> AppConfig {
        Config::builder()
            .add_source(ConfigFile::from_str(text, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = from_toml("");
        assert_eq!(config.port, 8080);
        assert!(!config.localhost_only);
        assert_eq!(config.hash_mode, HashMode::None);
        assert!(config.ignore_patterns.is_empty());
    }

    #[test]
    fn test_config_values_override_defaults() {
        let config = from_toml(
            r#"
            port = 9000
            localhost_only = true
            hash_mode = "sample"
            ignore_patterns = [".git", "**/.DS_Store"]
            "#,
        );
        assert_eq!(config.port, 9000);
        assert!(config.localhost_only);
        assert_eq!(config.hash_mode, HashMode::Sample);
        assert_eq!(config.ignore_patterns.len(), 2);
    }
}
