use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MetadataError;

/// Default number of messages requested per peek call
pub const DEFAULT_PAGE_CAP: usize = 300;
/// Minimum allowed page cap
pub const MIN_PAGE_CAP: usize = 1;
/// Maximum allowed page cap
pub const MAX_PAGE_CAP: usize = 1000;
/// Default number of message characters shown when truncation is on
pub const DEFAULT_TRUNCATE_WIDTH: usize = 20;

fn default_page_cap() -> usize {
    DEFAULT_PAGE_CAP
}

fn default_truncate_width() -> usize {
    DEFAULT_TRUNCATE_WIDTH
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeekConfig {
    #[serde(default = "default_page_cap")]
    pub page_cap: usize,
}

impl Default for PeekConfig {
    fn default() -> Self {
        Self {
            page_cap: default_page_cap(),
        }
    }
}

impl PeekConfig {
    /// Validate the configuration, clamping page_cap to valid range.
    /// Returns a tuple of (validated_config, was_clamped).
    pub fn validated(mut self) -> (Self, bool) {
        let mut clamped = false;
        if self.page_cap < MIN_PAGE_CAP {
            self.page_cap = MIN_PAGE_CAP;
            clamped = true;
        } else if self.page_cap > MAX_PAGE_CAP {
            self.page_cap = MAX_PAGE_CAP;
            clamped = true;
        }
        (self, clamped)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Characters of message text kept when the full message is not requested
    #[serde(default = "default_truncate_width")]
    pub truncate_width: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            truncate_width: default_truncate_width(),
        }
    }
}

/// Environment to connection-string mapping plus tuning knobs.
///
/// Accepts the `appsettings.json` layout (`ServiceBusConnection` key) as
/// well as YAML with a `connections` key. Environment order follows the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "connections", alias = "ServiceBusConnection")]
    pub connections: IndexMap<String, String>,
    #[serde(default)]
    pub peek: PeekConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse settings from YAML or JSON text
    pub fn parse(content: &str) -> Result<Self, MetadataError> {
        let settings: Settings = serde_yaml::from_str(content)?;
        if settings.connections.is_empty() {
            return Err(MetadataError::Validation(
                "at least one environment connection is required".to_string(),
            ));
        }
        Ok(settings)
    }

    /// Environment names in file order
    pub fn environments(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }

    /// First configured environment
    pub fn default_environment(&self) -> Option<&str> {
        self.connections.keys().next().map(String::as_str)
    }

    /// Connection string for an environment
    pub fn connection(&self, environment: &str) -> Result<&str, MetadataError> {
        self.connections
            .get(environment)
            .map(String::as_str)
            .ok_or_else(|| MetadataError::UnknownEnvironment(environment.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_appsettings_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{
  "ServiceBusConnection": {{
    "qa": "nats://qa-nats:4222",
    "dev": "nats://localhost:4222",
    "prod": "tls://nats.prod:4222"
  }}
}}"#
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        let envs: Vec<&str> = settings.environments().collect();
        assert_eq!(envs, vec!["qa", "dev", "prod"]);
        assert_eq!(settings.default_environment(), Some("qa"));
        assert_eq!(settings.connection("dev").unwrap(), "nats://localhost:4222");
        assert_eq!(settings.peek.page_cap, DEFAULT_PAGE_CAP);
        assert_eq!(settings.display.truncate_width, DEFAULT_TRUNCATE_WIDTH);
    }

    #[test]
    fn test_load_yaml_with_tuning() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
connections:
  local: memory://
peek:
  page_cap: 50
display:
  truncate_width: 40
"#
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.connection("local").unwrap(), "memory://");
        assert_eq!(settings.peek.page_cap, 50);
        assert_eq!(settings.display.truncate_width, 40);
    }

    #[test]
    fn test_unknown_environment() {
        let settings = Settings::parse("connections:\n  dev: memory://\n").unwrap();
        let result = settings.connection("prod");
        assert!(matches!(result, Err(MetadataError::UnknownEnvironment(e)) if e == "prod"));
    }

    #[test]
    fn test_empty_connections_rejected() {
        let result = Settings::parse("connections: {}\n");
        assert!(matches!(result, Err(MetadataError::Validation(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = Settings::load(Path::new("/nonexistent/appsettings.json"));
        assert!(matches!(result, Err(MetadataError::Io(_))));
    }

    #[test]
    fn test_peek_config_validation_clamps_high() {
        let (validated, clamped) = PeekConfig { page_cap: 5000 }.validated();
        assert_eq!(validated.page_cap, MAX_PAGE_CAP);
        assert!(clamped);
    }

    #[test]
    fn test_peek_config_validation_clamps_low() {
        let (validated, clamped) = PeekConfig { page_cap: 0 }.validated();
        assert_eq!(validated.page_cap, MIN_PAGE_CAP);
        assert!(clamped);
    }

    #[test]
    fn test_peek_config_validation_keeps_valid() {
        let (validated, clamped) = PeekConfig { page_cap: 300 }.validated();
        assert_eq!(validated.page_cap, 300);
        assert!(!clamped);
    }
}
