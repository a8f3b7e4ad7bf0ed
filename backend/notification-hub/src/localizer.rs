//! Per-recipient message localization
//!
//! The hub only needs one capability from a translation backend:
//! resolve a message key for a language. Resolution never fails from the
//! hub's point of view: it retries with the fallback language, then
//! returns the raw key.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::{HubError, Result};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocalizeError {
    #[error("missing translation for key {key} in language {language}")]
    MissingKey { language: String, key: String },

    #[error("template error: {0}")]
    Template(String),
}

/// Translation backend
pub trait Localizer: Send + Sync {
    fn resolve(
        &self,
        language: &str,
        key: &str,
        data: &Value,
    ) -> std::result::Result<String, LocalizeError>;
}

/// Resolve `key` for `language`, falling back to `fallback_language` and
/// finally to the key itself.
pub fn localize(
    localizer: Option<&dyn Localizer>,
    fallback_language: &str,
    language: &str,
    key: &str,
    data: &Value,
) -> String {
    let Some(localizer) = localizer else {
        return key.to_string();
    };

    let first_error = match localizer.resolve(language, key, data) {
        Ok(text) => return text,
        Err(e) => e,
    };

    if language != fallback_language {
        debug!(
            language = %language,
            key = %key,
            error = %first_error,
            "Localization failed, retrying with fallback language"
        );
        match localizer.resolve(fallback_language, key, data) {
            Ok(text) => return text,
            Err(e) => {
                debug!(language = %fallback_language, key = %key, error = %e, "Fallback localization failed");
            }
        }
    }

    key.to_string()
}

/// In-memory catalog of `{{field}}` templates keyed by language and message key
#[derive(Debug, Clone, Default)]
pub struct CatalogLocalizer {
    catalogs: HashMap<String, HashMap<String, String>>,
}

impl CatalogLocalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(
        mut self,
        language: impl Into<String>,
        key: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.insert(language, key, template);
        self
    }

    pub fn insert(
        &mut self,
        language: impl Into<String>,
        key: impl Into<String>,
        template: impl Into<String>,
    ) {
        self.catalogs
            .entry(language.into())
            .or_default()
            .insert(key.into(), template.into());
    }

    pub fn languages(&self) -> Vec<&str> {
        self.catalogs.keys().map(String::as_str).collect()
    }

    /// Load every `<language>.json` file in `dir`; each file is a flat
    /// object of key -> template.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut localizer = Self::new();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(language) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let raw = std::fs::read_to_string(&path)?;
            let messages: HashMap<String, String> = serde_json::from_str(&raw).map_err(|e| {
                HubError::Configuration(format!("invalid catalog {}: {}", path.display(), e))
            })?;

            info!(language = %language, messages = messages.len(), "Loaded message catalog");
            localizer
                .catalogs
                .entry(language.to_string())
                .or_default()
                .extend(messages);
        }

        Ok(localizer)
    }
}

impl Localizer for CatalogLocalizer {
    fn resolve(
        &self,
        language: &str,
        key: &str,
        data: &Value,
    ) -> std::result::Result<String, LocalizeError> {
        let template = self
            .catalogs
            .get(language)
            .and_then(|messages| messages.get(key))
            .ok_or_else(|| LocalizeError::MissingKey {
                language: language.to_string(),
                key: key.to_string(),
            })?;

        render(template, data)
    }
}

/// Substitute `{{field}}` placeholders with values from a JSON object
fn render(template: &str, data: &Value) -> std::result::Result<String, LocalizeError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| LocalizeError::Template(format!("unclosed placeholder in {:?}", template)))?;

        let field = after[..end].trim();
        match data.get(field) {
            Some(Value::String(s)) => out.push_str(s),
            Some(Value::Null) | None => {
                return Err(LocalizeError::Template(format!("missing template field {}", field)));
            }
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> CatalogLocalizer {
        CatalogLocalizer::new()
            .with_message("en", "news.breaking", "Breaking: {{title}}")
            .with_message("es", "news.breaking", "Última hora: {{title}}")
            .with_message("en", "votes.count", "{{count}} votes")
    }

    #[test]
    fn test_render_substitutes_fields() {
        let localizer = catalog();
        let text = localizer
            .resolve("es", "news.breaking", &json!({"title": "Eclipse"}))
            .unwrap();
        assert_eq!(text, "Última hora: Eclipse");

        let text = localizer.resolve("en", "votes.count", &json!({"count": 3})).unwrap();
        assert_eq!(text, "3 votes");
    }

    #[test]
    fn test_render_errors() {
        assert!(matches!(
            render("Hi {{name}}", &json!({})),
            Err(LocalizeError::Template(_))
        ));
        assert!(matches!(
            render("Hi {{name", &json!({"name": "x"})),
            Err(LocalizeError::Template(_))
        ));
        assert_eq!(render("no placeholders", &Value::Null).unwrap(), "no placeholders");
    }

    #[test]
    fn test_missing_language_falls_back() {
        let localizer = catalog();
        let text = localize(
            Some(&localizer),
            "en",
            "fr",
            "news.breaking",
            &json!({"title": "Eclipse"}),
        );
        assert_eq!(text, "Breaking: Eclipse");
    }

    #[test]
    fn test_fallback_failure_returns_key() {
        let localizer = catalog();
        let text = localize(Some(&localizer), "en", "fr", "unknown.key", &json!({}));
        assert_eq!(text, "unknown.key");
    }

    #[test]
    fn test_template_error_falls_back_to_key() {
        let localizer = catalog();
        let text = localize(Some(&localizer), "en", "es", "news.breaking", &json!({}));
        assert_eq!(text, "news.breaking");
    }

    #[test]
    fn test_absent_localizer_returns_key() {
        let text = localize(None, "en", "es", "news.breaking", &json!({"title": "x"}));
        assert_eq!(text, "news.breaking");
    }

    struct FrenchBroken;

    impl Localizer for FrenchBroken {
        fn resolve(
            &self,
            language: &str,
            key: &str,
            _data: &Value,
        ) -> std::result::Result<String, LocalizeError> {
            if language == "fr" {
                Err(LocalizeError::Template("broken".to_string()))
            } else {
                Ok(format!("{}:{}", language, key))
            }
        }
    }

    #[test]
    fn test_failing_language_uses_fallback_text() {
        let text = localize(Some(&FrenchBroken), "en", "fr", "alert", &Value::Null);
        assert_eq!(text, "en:alert");
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("en.json"),
            r#"{"welcome": "Welcome, reader {{user_id}}"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("es.json"), r#"{"welcome": "Bienvenido"}"#).unwrap();
        std::fs::write(dir.path().join("README.txt"), "ignored").unwrap();

        let localizer = CatalogLocalizer::load_dir(dir.path()).unwrap();
        let mut languages = localizer.languages();
        languages.sort();
        assert_eq!(languages, vec!["en", "es"]);
        assert_eq!(
            localizer.resolve("en", "welcome", &json!({"user_id": 7})).unwrap(),
            "Welcome, reader 7"
        );
    }

    #[test]
    fn test_load_dir_rejects_invalid_catalog() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("en.json"), "[1, 2]").unwrap();

        let result = CatalogLocalizer::load_dir(dir.path());
        assert!(matches!(result, Err(HubError::Configuration(_))));
    }
}
