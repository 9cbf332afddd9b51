// ABOUTME: Repeated-container extraction producing one record per matching container.
// ABOUTME: Assigns 1-based positions, drops contentless records and applies record transforms.

use scraper::Html;
use serde_json::{Map, Value};
use url::Url;

use crate::extractors::compiled;
use crate::extractors::resolve::{host_of, resolve, ResolveContext};
use crate::extractors::schema::{RecordTransform, SectionSpec, DEFAULT_FALLBACK};
use crate::extractors::Record;

/// Extracts one record per container matched by `section.container`, in
/// document order.
///
/// An invalid container selector yields no records.
pub fn extract_section(document: &Html, section: &SectionSpec, base_url: Option<&Url>) -> Vec<Record> {
    let Some(sel) = compiled::selector(&section.container) else {
        return Vec::new();
    };
    let base_ctx = ResolveContext::new(document, base_url);

    let mut records = Vec::new();
    for (index, container) in document.select(&sel).enumerate() {
        let position = index + 1;
        let ctx = base_ctx.at(position);

        let mut record = Record::new();
        let mut has_content = false;
        for (name, spec) in &section.fields {
            let value = resolve(container, spec, &ctx);
            if value != spec.fallback && !is_empty_value(&value) {
                has_content = true;
            }
            record.insert(name.clone(), value);
        }
        if section.position && !record.contains_key("position") {
            record.insert("position".to_string(), Value::from(position));
            has_content = true;
        }
        if !has_content {
            continue;
        }

        for transform in &section.post_process {
            apply_transform(&mut record, transform);
        }
        records.push(record);
    }
    records
}

/// Null, empty string, empty array or empty object.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn apply_transform(record: &mut Record, transform: &RecordTransform) {
    match transform {
        RecordTransform::SourceObject {
            link_field,
            name_field,
            domain_field,
        } => source_object(record, link_field, name_field, domain_field),
    }
}

fn present<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Folds flat source fields into `source {link, domain, name}` and removes
/// the top-level duplicates.
fn source_object(record: &mut Record, link_field: &str, name_field: &str, domain_field: &str) {
    let source_link = present(record, link_field).map(str::to_string);
    let source_name = present(record, name_field).map(str::to_string);
    let domain = present(record, domain_field).map(str::to_string);
    if source_link.is_none() && source_name.is_none() && domain.is_none() {
        return;
    }

    let link = source_link
        .clone()
        .unwrap_or_else(|| DEFAULT_FALLBACK.to_string());
    let domain_source = source_link
        .clone()
        .or_else(|| present(record, "link").map(str::to_string))
        .unwrap_or_default();
    let source_domain = host_of(&domain_source).unwrap_or_else(|| DEFAULT_FALLBACK.to_string());
    let name = source_name
        .or_else(|| domain.clone())
        .unwrap_or_else(|| DEFAULT_FALLBACK.to_string());

    if present(record, "title") == Some(DEFAULT_FALLBACK) {
        record.insert("title".to_string(), Value::String(name.clone()));
    }
    if present(record, "link") == Some(DEFAULT_FALLBACK) {
        record.insert("link".to_string(), Value::String(link.clone()));
    }

    if present(record, "title") == Some(name.as_str()) {
        record.remove("title");
    }
    if present(record, "link") == Some(link.as_str()) {
        record.remove("link");
    }
    if present(record, domain_field) == Some(name.as_str()) {
        record.remove(domain_field);
    }
    record.remove(link_field);
    record.remove(name_field);

    let mut source = Map::new();
    source.insert("link".to_string(), Value::String(link));
    source.insert("domain".to_string(), Value::String(source_domain));
    source.insert("name".to_string(), Value::String(name));
    record.insert("source".to_string(), Value::Object(source));
}
