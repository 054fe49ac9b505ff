use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Used when `RUST_LOG` is not set.
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub convert: ConvertConfig,

    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConvertConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_top_names")]
    pub top_names: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            top_names: default_top_names(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `{"traceEvents": [...]}` with the envelope fields.
    #[default]
    Object,
    /// A bare array of events.
    Array,
}

fn default_top_names() -> usize {
    10
}

impl Config {
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").expect("empty config parses");
        assert_eq!(config.log_filter, None);
        assert_eq!(config.convert.format, OutputFormat::Object);
        assert_eq!(config.stats.top_names, 10);
    }

    #[test]
    fn test_full_config() {
        let config: Config = toml::from_str(
            r#"
log_filter = "teftool=debug"

[convert]
format = "array"

[stats]
top_names = 3
"#,
        )
        .expect("config parses");
        assert_eq!(config.log_filter.as_deref(), Some("teftool=debug"));
        assert_eq!(config.convert.format, OutputFormat::Array);
        assert_eq!(config.stats.top_names, 3);
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        assert!(toml::from_str::<Config>("[convert]\nformat = \"xml\"").is_err());
    }
}
