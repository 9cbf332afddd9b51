// ABOUTME: Assembles one page record from a schema: globals, main results, named sections, pagination.
// ABOUTME: Parsing and extraction are synchronous; the parsed tree never outlives this call.

use scraper::Html;
use serde_json::Value;
use url::Url;

use crate::extractors::global::extract_globals;
use crate::extractors::pagination::extract_pagination;
use crate::extractors::schema::PageSchema;
use crate::extractors::section::extract_section;
use crate::extractors::Record;

/// Parses `raw_html` and extracts the page record described by `schema`.
pub fn extract_page(raw_html: &str, schema: &PageSchema, base_url: Option<&Url>) -> Record {
    let document = Html::parse_document(raw_html);
    extract_document(&document, raw_html, schema, base_url)
}

/// Extracts the page record from an already parsed document.
///
/// Globals are resolved first; a section or the pagination strip sharing a
/// global's key replaces it.
pub fn extract_document(
    document: &Html,
    raw_html: &str,
    schema: &PageSchema,
    base_url: Option<&Url>,
) -> Record {
    let mut record = extract_globals(document, raw_html, &schema.global, base_url);

    if let Some(main) = schema.main_section() {
        let results = extract_section(document, &main, base_url);
        record.insert(schema.results_key.clone(), records_value(results));
    }

    for (name, section) in &schema.sections {
        let records = extract_section(document, section, base_url);
        record.insert(name.clone(), records_value(records));
    }

    if let Some(ref pagination) = schema.pagination {
        record.insert(
            "pagination".to_string(),
            extract_pagination(document, pagination, base_url),
        );
    }

    record
}

fn records_value(records: Vec<Record>) -> Value {
    Value::Array(records.into_iter().map(Value::Object).collect())
}
