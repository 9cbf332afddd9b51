// ABOUTME: Page-level scalar extraction via regex over raw HTML or a single selector lookup.
// ABOUTME: Globals are evaluated once per document, before any section.

use std::collections::BTreeMap;

use scraper::Html;
use serde_json::Value;
use url::Url;

use crate::extractors::compiled;
use crate::extractors::resolve::{resolve, ResolveContext};
use crate::extractors::schema::GlobalField;
use crate::extractors::Record;

/// Resolves every global field of a schema against one document.
pub fn extract_globals(
    document: &Html,
    raw_html: &str,
    global: &BTreeMap<String, GlobalField>,
    base_url: Option<&Url>,
) -> Record {
    let ctx = ResolveContext::new(document, base_url);
    let root = document.root_element();
    global
        .iter()
        .map(|(key, field)| {
            let value = match field.regex {
                Some(ref pattern) => regex_global(raw_html, pattern, &field.field.fallback),
                None => resolve(root, &field.field, &ctx),
            };
            (key.clone(), value)
        })
        .collect()
}

/// Capture group 1 of `pattern` over the raw HTML with thousands separators
/// removed, or `fallback`.
fn regex_global(raw_html: &str, pattern: &str, fallback: &Value) -> Value {
    compiled::regex(pattern)
        .and_then(|re| {
            re.captures(raw_html)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().replace(',', ""))
        })
        .map(Value::String)
        .unwrap_or_else(|| fallback.clone())
}
