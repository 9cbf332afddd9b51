// ABOUTME: Loads page schemas and schema registries from JSON strings or files.
// ABOUTME: Validates every selector and regex once at load time and warms the compiled caches.

//! Schema loading.
//!
//! Schemas are data: one JSON object per provider + vertical, or a registry
//! object mapping names to schemas. A schema that references a selector or a
//! pattern that cannot compile is rejected here, so extraction never has to
//! report a schema problem.

use std::path::Path;

use anyhow::anyhow;

use crate::error::SerpError;
use crate::extractors::compiled::{precompile_patterns, precompile_selectors};
use crate::extractors::schema::{PageSchema, SchemaRegistry};

/// Parses and validates a single schema from JSON.
///
/// `name` only labels errors.
pub fn load_schema_str(name: &str, json: &str) -> Result<PageSchema, SerpError> {
    let schema: PageSchema = serde_json::from_str(json)
        .map_err(|e| SerpError::schema(name, "Load", Some(anyhow::Error::new(e))))?;
    validate_schema(name, &schema)?;
    Ok(schema)
}

/// Reads, parses and validates a single schema file.
pub fn load_schema_file(path: impl AsRef<Path>) -> Result<PageSchema, SerpError> {
    let path = path.as_ref();
    let label = path.display().to_string();
    let json = std::fs::read_to_string(path)
        .map_err(|e| SerpError::schema(label.as_str(), "Read", Some(anyhow::Error::new(e))))?;
    load_schema_str(&label, &json)
}

/// Parses and validates a registry object `{name: schema, ...}`.
pub fn load_registry_str(json: &str) -> Result<SchemaRegistry, SerpError> {
    let entries: std::collections::BTreeMap<String, PageSchema> = serde_json::from_str(json)
        .map_err(|e| SerpError::schema("registry", "Load", Some(anyhow::Error::new(e))))?;

    let mut registry = SchemaRegistry::new();
    for (name, schema) in entries {
        validate_schema(&name, &schema)?;
        registry.register(name, schema);
    }
    Ok(registry)
}

/// Reads, parses and validates a registry file.
pub fn load_registry_file(path: impl AsRef<Path>) -> Result<SchemaRegistry, SerpError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|e| {
        SerpError::schema(
            path.display().to_string(),
            "Read",
            Some(anyhow::Error::new(e)),
        )
    })?;
    load_registry_str(&json)
}

/// Rejects schemas with uncompilable selectors or patterns and an empty
/// results key.
pub fn validate_schema(name: &str, schema: &PageSchema) -> Result<(), SerpError> {
    if schema.results_key.trim().is_empty() {
        return Err(SerpError::schema(
            name,
            "Validate",
            Some(anyhow!("results_key must not be empty")),
        ));
    }

    let bad_selectors = precompile_selectors(schema.selectors());
    if !bad_selectors.is_empty() {
        return Err(SerpError::schema(
            name,
            "Validate",
            Some(anyhow!("invalid selector(s): {}", bad_selectors.join(", "))),
        ));
    }

    let bad_patterns = precompile_patterns(schema.patterns());
    if !bad_patterns.is_empty() {
        return Err(SerpError::schema(
            name,
            "Validate",
            Some(anyhow!("invalid pattern(s): {}", bad_patterns.join(", "))),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BING_WEB: &str = r#"{
        "container": "li.b_algo",
        "results_key": "organic_results",
        "fields": {"title": {"selector": "h2"}}
    }"#;

    #[test]
    fn loads_valid_schema() {
        let schema = load_schema_str("bing_web", BING_WEB).unwrap();
        assert_eq!(schema.container.as_deref(), Some("li.b_algo"));
        assert_eq!(schema.results_key, "organic_results");
    }

    #[test]
    fn rejects_unknown_strategy() {
        let err = load_schema_str(
            "bad",
            r#"{"fields": {"x": {"strategy": {"type": "outer_html"}}}}"#,
        )
        .unwrap_err();
        assert!(err.is_schema());
        assert_eq!(err.target, "bad");
    }

    #[test]
    fn rejects_invalid_selector_and_pattern() {
        let err = load_schema_str("sel", r#"{"container": "li:::nope"}"#).unwrap_err();
        assert!(err.is_schema());
        assert!(err.message().contains("li:::nope"));

        let err = load_schema_str("re", r#"{"global": {"n": {"regex": "(open"}}}"#).unwrap_err();
        assert!(err.message().contains("(open"));
    }

    #[test]
    fn rejects_invalid_pattern_in_pagination_url() {
        let err = load_schema_str(
            "pages",
            r#"{"pagination": {
                "container": "nav li",
                "url": {"strategy": {"type": "composite", "kind": {"kind": "regex_capture", "pattern": "first=(\\d+", "attribute": "href"}}}
            }}"#,
        )
        .unwrap_err();
        assert!(err.is_schema());
        assert!(err.message().contains("invalid pattern"), "{}", err.message());
        assert!(err.message().contains("first=("));
    }

    #[test]
    fn loads_registry_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"bing_web": {}, "empty": {{}}}}"#, BING_WEB).unwrap();
        let registry = load_registry_file(file.path()).unwrap();
        assert_eq!(registry.names(), vec!["bing_web", "empty"]);
    }

    #[test]
    fn missing_file_is_schema_error() {
        let err = load_schema_file("/definitely/not/here.json").unwrap_err();
        assert!(err.is_schema());
    }
}
