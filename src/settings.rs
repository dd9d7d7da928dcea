use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{MarkupError, MarkupResult};

/// Default prefix of the framework's reserved tag namespace
pub const DEFAULT_NAMESPACE: &str = "wicket";
pub const DEFAULT_MARKUP_TYPE: &str = "html";

/// Parser and cache configuration.
///
/// Every field has a default, so a settings file only needs to name what it
/// changes:
/// ```yaml
/// wicketNamespace: wcn
/// stripComments: true
/// pollIntervalMs: 500
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarkupSettings {
    /// Prefix of the reserved tag namespace (`wicket:extend`, `wicket:id`, ...)
    pub wicket_namespace: String,
    /// Drop `<!-- ... -->` comments from raw text (conditional comments are kept)
    pub strip_comments: bool,
    /// Collapse runs of blanks and line breaks in raw text
    pub compress_whitespace: bool,
    /// Treat every relative link as if it were inside `<wicket:link>`
    pub automatic_linking: bool,
    /// Encoding used when the markup has no XML declaration
    pub default_encoding: String,
    /// Fail the parse when a markup has no `<?xml ...?>` declaration
    pub throw_on_missing_xml_declaration: bool,
    /// Markup type used in cache keys and resource file extensions
    pub markup_type: String,
    /// Poll interval of the background resource watcher; `None` disables it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
}

impl Default for MarkupSettings {
    fn default() -> Self {
        Self {
            wicket_namespace: DEFAULT_NAMESPACE.to_string(),
            strip_comments: false,
            compress_whitespace: false,
            automatic_linking: false,
            default_encoding: "UTF-8".to_string(),
            throw_on_missing_xml_declaration: false,
            markup_type: DEFAULT_MARKUP_TYPE.to_string(),
            poll_interval_ms: None,
        }
    }
}

impl MarkupSettings {
    /// Parse settings from a YAML document
    pub fn from_yaml_str(yaml: &str) -> MarkupResult<Self> {
        let settings: MarkupSettings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> MarkupResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            MarkupError::Settings(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    fn validate(&self) -> MarkupResult<()> {
        let ns = &self.wicket_namespace;
        if ns.is_empty() || !ns.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(MarkupError::Settings(format!(
                "wicketNamespace '{}' must be a non-empty XML name without ':'",
                ns
            )));
        }
        if self.markup_type.is_empty() {
            return Err(MarkupError::Settings("markupType must not be empty".to_string()));
        }
        if self.poll_interval_ms == Some(0) {
            return Err(MarkupError::Settings("pollIntervalMs must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = MarkupSettings::default();
        assert_eq!(settings.wicket_namespace, "wicket");
        assert_eq!(settings.markup_type, "html");
        assert!(!settings.strip_comments);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let settings = MarkupSettings::from_yaml_str("stripComments: true\n").unwrap();
        assert!(settings.strip_comments);
        assert_eq!(settings.wicket_namespace, "wicket");
        assert_eq!(settings.default_encoding, "UTF-8");
    }

    #[test]
    fn test_rejects_namespace_with_colon() {
        let result = MarkupSettings::from_yaml_str("wicketNamespace: \"a:b\"\n");
        assert!(matches!(result, Err(MarkupError::Settings(_))));
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let result = MarkupSettings::from_yaml_str("pollIntervalMs: 0\n");
        assert!(result.is_err());
    }
}
