use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Server tuning knobs, loadable from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bytes read from the head of a file when guessing its encoding
    #[serde(default = "default_detect_sample_size")]
    pub detect_sample_size: usize,

    /// Detector confidence below this value is treated as "unknown"
    #[serde(default = "default_detect_confidence")]
    pub detect_confidence: f32,

    /// Extension-to-content-type overrides consulted before `mime_guess`,
    /// keyed by lowercase extension including the leading dot
    #[serde(default = "default_mime_overrides")]
    pub mime_overrides: HashMap<String, String>,
}

fn default_detect_sample_size() -> usize {
    1024
}

fn default_detect_confidence() -> f32 {
    0.5
}

fn default_mime_overrides() -> HashMap<String, String> {
    [
        (".html", "text/html"),
        (".txt", "text/plain"),
        (".json", "application/json"),
        (".xml", "application/xml"),
        (".css", "text/css"),
        (".js", "application/javascript"),
        (".md", "text/markdown"),
    ]
    .into_iter()
    .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            detect_sample_size: default_detect_sample_size(),
            detect_confidence: default_detect_confidence(),
            mime_overrides: default_mime_overrides(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Look up a content-type override for an extension (with leading dot)
    pub fn mime_override(&self, ext: &str) -> Option<&str> {
        self.mime_overrides
            .get(&ext.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_the_required_table() {
        let config = Config::default();
        assert_eq!(config.detect_sample_size, 1024);
        assert_eq!(config.detect_confidence, 0.5);
        assert_eq!(config.mime_override(".html"), Some("text/html"));
        assert_eq!(config.mime_override(".txt"), Some("text/plain"));
        assert_eq!(config.mime_override(".json"), Some("application/json"));
        assert_eq!(config.mime_override(".xml"), Some("application/xml"));
        assert_eq!(config.mime_override(".css"), Some("text/css"));
        assert_eq!(config.mime_override(".js"), Some("application/javascript"));
        assert_eq!(config.mime_override(".md"), Some("text/markdown"));
        assert_eq!(config.mime_override(".bin"), None);
    }

    #[test]
    fn override_lookup_is_case_insensitive() {
        let config = Config::default();
        assert_eq!(config.mime_override(".HTML"), Some("text/html"));
        assert_eq!(config.mime_override(".Txt"), Some("text/plain"));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: Config = toml::from_str("detect_sample_size = 4096").unwrap();
        assert_eq!(config.detect_sample_size, 4096);
        assert_eq!(config.detect_confidence, 0.5);
        assert_eq!(config.mime_override(".md"), Some("text/markdown"));
    }

    #[test]
    fn overrides_can_be_extended_from_toml() {
        let config: Config = toml::from_str(
            r#"
[mime_overrides]
".log" = "text/plain"
"#,
        )
        .unwrap();
        assert_eq!(config.mime_override(".log"), Some("text/plain"));
        // A custom table replaces the defaults wholesale, like any serde field.
        assert_eq!(config.mime_override(".html"), None);
    }
}
