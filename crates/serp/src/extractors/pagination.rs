// ABOUTME: Summarises a pagination strip into page links, the current page and the next-page link.
// ABOUTME: A numbered cell with a link is another page; a numbered cell without one is the current page.

use scraper::Html;
use serde_json::{json, Value};
use url::Url;

use crate::extractors::compiled;
use crate::extractors::resolve::{element_text, resolve, select_first, ResolveContext};
use crate::extractors::schema::PaginationSpec;

/// Extracts `{page_links: [{page, url}], current_page, next_page_link}`.
///
/// Cells whose text is not a page number (e.g. "Next") are skipped.
pub fn extract_pagination(document: &Html, spec: &PaginationSpec, base_url: Option<&Url>) -> Value {
    let ctx = ResolveContext::new(document, base_url);
    let mut page_links = Vec::new();
    let mut current_page = Value::Null;

    if let Some(cell_sel) = compiled::selector(&spec.container) {
        for cell in document.select(&cell_sel) {
            let Ok(page) = element_text(cell).parse::<u32>() else {
                continue;
            };
            match select_first(cell, &spec.link_selector) {
                Some(link) => page_links.push(json!({
                    "page": page,
                    "url": resolve(link, &spec.url, &ctx),
                })),
                None => current_page = Value::from(page),
            }
        }
    }

    let next_page_link = spec
        .next_selector
        .as_deref()
        .and_then(|css| select_first(document.root_element(), css))
        .map(|anchor| resolve(anchor, &spec.url, &ctx))
        .unwrap_or(Value::Null);

    json!({
        "page_links": page_links,
        "current_page": current_page,
        "next_page_link": next_page_link,
    })
}
