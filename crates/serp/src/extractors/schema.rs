// ABOUTME: Declarative extraction schema data models and the per-provider schema registry.
// ABOUTME: Defines field strategies, composite kinds, post-processing steps, sections and page schemas.

//! Schema definitions for declarative SERP extraction.
//!
//! A [`PageSchema`] describes one provider + vertical (e.g. "bing web" or
//! "google news"): page-level globals, the main repeated result section, any
//! number of named sections and an optional pagination strip. Every field is a
//! [`FieldSpec`] whose [`Strategy`] is a closed tagged variant, so an unknown
//! strategy fails at load time instead of silently falling through.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::SerpError;

/// Fallback used when a field does not declare one.
pub const DEFAULT_FALLBACK: &str = "N/A";

fn default_fallback() -> Value {
    Value::String(DEFAULT_FALLBACK.to_string())
}

fn default_true() -> bool {
    true
}

/// How a field's value is obtained from its target element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Strategy {
    /// Trimmed text content.
    Text,
    /// A named attribute, optionally retrying a second attribute.
    Attribute {
        name: String,
        #[serde(default)]
        fallback_attribute: Option<String>,
    },
    /// The `href` attribute, normalized and resolved against the page URL.
    Href,
    /// The `src` attribute, normalized and resolved against the page URL.
    Src,
    /// 1-based index of the record within its container set.
    Position,
    /// Hostname of the URL held in `attribute`.
    DomainFrom { attribute: String },
    /// A key projected out of JSON embedded in `attribute`.
    JsonEmbedded { attribute: String, key: String },
    /// A fixed, named derivation needing more than one element.
    Composite { kind: CompositeKind },
    /// A literal value; the element is ignored.
    Static { value: Value },
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Text
    }
}

fn default_separator() -> String {
    "·".to_string()
}

fn default_visible_limit() -> usize {
    3
}

/// Structural derivations available to `Strategy::Composite`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompositeKind {
    /// Text of the element following the matched label element.
    SiblingOfLabel { label: String },
    /// Href of the anchor whose visible text equals `text`, searched around
    /// the nearest `ancestor`.
    AnchorByText { ancestor: String, text: String },
    /// Last non-empty segment of the text split on `separator`.
    LastSegment {
        #[serde(default = "default_separator")]
        separator: String,
    },
    /// Capture group 1 of `pattern` run over an attribute or the text.
    RegexCapture {
        pattern: String,
        #[serde(default)]
        attribute: Option<String>,
        #[serde(default)]
        numeric: bool,
    },
    /// Href of the nearest enclosing anchor.
    ClosestLink,
    /// `"true"` for the first `limit` records, `"false"` afterwards.
    VisibleFromIndex {
        #[serde(default = "default_visible_limit")]
        limit: usize,
    },
    /// Texts of every match of each part selector, joined with spaces.
    JoinText { parts: Vec<String> },
    /// Text of the first match anywhere in the document.
    DocumentText { selector: String },
}

/// Output shape of a unix-timestamp conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    #[default]
    DateTime,
    Date,
    Time,
}

/// A second pass applied to an otherwise successfully resolved value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PostProcess {
    /// Parse the value as a URL and keep its hostname.
    Domain,
    /// Parse the value as JSON and project `key`.
    Json { key: String },
    /// Convert epoch seconds to an ISO-8601 UTC string.
    UnixTimestamp {
        #[serde(default)]
        format: TimestampFormat,
    },
    /// Remove every character in `chars`, then trim.
    StripChars { chars: String },
    /// Strip thousands separators and parse as an integer.
    Number,
}

/// Declarative description of how to obtain one field's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Sub-element query scoped to the container; absent means the container itself.
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default = "default_fallback")]
    pub fallback: Value,
    #[serde(default)]
    pub post: Vec<PostProcess>,
}

impl Default for FieldSpec {
    fn default() -> Self {
        Self {
            selector: None,
            strategy: Strategy::Text,
            fallback: default_fallback(),
            post: Vec::new(),
        }
    }
}

impl FieldSpec {
    /// A text field read from `selector`.
    pub fn text(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            ..Default::default()
        }
    }

    /// A field read from `selector` with the given strategy.
    pub fn with_strategy(selector: Option<&str>, strategy: Strategy) -> Self {
        Self {
            selector: selector.map(str::to_string),
            strategy,
            ..Default::default()
        }
    }

    /// Replace the fallback value.
    pub fn fallback(mut self, fallback: impl Into<Value>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// Append a post-processing step.
    pub fn then(mut self, step: PostProcess) -> Self {
        self.post.push(step);
        self
    }
}

fn default_source_link() -> String {
    "source_link".to_string()
}

fn default_source_name() -> String {
    "source_name".to_string()
}

fn default_domain_field() -> String {
    "domain".to_string()
}

/// Record-level derivations applied after every field has been resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordTransform {
    /// Fold flat source fields into a nested `source {link, domain, name}` object.
    SourceObject {
        #[serde(default = "default_source_link")]
        link_field: String,
        #[serde(default = "default_source_name")]
        name_field: String,
        #[serde(default = "default_domain_field")]
        domain_field: String,
    },
}

/// One repeated-record extraction unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub container: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
    /// Whether records carry the implicit 1-based `position` key.
    #[serde(default = "default_true")]
    pub position: bool,
    #[serde(default)]
    pub post_process: Vec<RecordTransform>,
}

impl SectionSpec {
    /// Creates a section over `container` with no fields.
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            fields: BTreeMap::new(),
            position: true,
            post_process: Vec::new(),
        }
    }

    /// Adds a field.
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }
}

/// A page-scoped scalar field: regex over raw HTML, or a single selector lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GlobalField {
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(flatten)]
    pub field: FieldSpec,
}

impl GlobalField {
    /// A regex-family global.
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            regex: Some(pattern.into()),
            field: FieldSpec::default(),
        }
    }

    /// A selector-family global.
    pub fn selector(field: FieldSpec) -> Self {
        Self { regex: None, field }
    }
}

fn default_link_selector() -> String {
    "a".to_string()
}

fn default_page_url() -> FieldSpec {
    FieldSpec {
        strategy: Strategy::Href,
        fallback: Value::Null,
        ..Default::default()
    }
}

/// Pagination strip summarised into page links, current page and next link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationSpec {
    /// One element per page cell.
    pub container: String,
    /// Anchor inside a cell; a cell without one is the current page.
    #[serde(default = "default_link_selector")]
    pub link_selector: String,
    /// Document-level "next page" anchor.
    #[serde(default)]
    pub next_selector: Option<String>,
    /// How the URL is read from the link or next anchor.
    #[serde(default = "default_page_url")]
    pub url: FieldSpec,
}

fn default_results_key() -> String {
    "results".to_string()
}

/// Schema for one provider + vertical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSchema {
    /// Container of the vertical's main result set.
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
    /// Record key the main result set is emitted under.
    #[serde(default = "default_results_key")]
    pub results_key: String,
    /// Record transforms applied to the main result set.
    #[serde(default)]
    pub post_process: Vec<RecordTransform>,
    #[serde(default)]
    pub global: BTreeMap<String, GlobalField>,
    #[serde(default)]
    pub sections: BTreeMap<String, SectionSpec>,
    #[serde(default)]
    pub pagination: Option<PaginationSpec>,
    /// Keys (dotted paths allowed) that count as meaningful content.
    #[serde(default)]
    pub primary: Vec<String>,
}

impl Default for PageSchema {
    fn default() -> Self {
        Self {
            container: None,
            fields: BTreeMap::new(),
            results_key: default_results_key(),
            post_process: Vec::new(),
            global: BTreeMap::new(),
            sections: BTreeMap::new(),
            pagination: None,
            primary: Vec::new(),
        }
    }
}

impl PageSchema {
    /// The main result set as a section, when the schema declares one.
    pub fn main_section(&self) -> Option<SectionSpec> {
        self.container.as_ref().map(|container| SectionSpec {
            container: container.clone(),
            fields: self.fields.clone(),
            position: true,
            post_process: self.post_process.clone(),
        })
    }

    /// Keys checked for meaningful content.
    ///
    /// Falls back to every section key when `primary` is empty.
    pub fn primary_keys(&self) -> Vec<String> {
        if !self.primary.is_empty() {
            return self.primary.clone();
        }
        let mut keys: Vec<String> = Vec::new();
        if self.container.is_some() {
            keys.push(self.results_key.clone());
        }
        keys.extend(self.sections.keys().cloned());
        if self.pagination.is_some() {
            keys.push("pagination.page_links".to_string());
        }
        keys
    }

    /// Every CSS selector the schema references, for validation and cache warm-up.
    pub fn selectors(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(ref c) = self.container {
            out.push(c.clone());
        }
        for spec in self.fields.values() {
            collect_field_selectors(spec, &mut out);
        }
        for g in self.global.values() {
            collect_field_selectors(&g.field, &mut out);
        }
        for section in self.sections.values() {
            out.push(section.container.clone());
            for spec in section.fields.values() {
                collect_field_selectors(spec, &mut out);
            }
        }
        if let Some(ref p) = self.pagination {
            out.push(p.container.clone());
            out.push(p.link_selector.clone());
            if let Some(ref n) = p.next_selector {
                out.push(n.clone());
            }
            collect_field_selectors(&p.url, &mut out);
        }
        out
    }

    /// Every regex pattern the schema references.
    pub fn patterns(&self) -> Vec<String> {
        let mut out: Vec<String> = self.global.values().filter_map(|g| g.regex.clone()).collect();
        let fields = self
            .fields
            .values()
            .chain(self.sections.values().flat_map(|s| s.fields.values()))
            .chain(self.global.values().map(|g| &g.field))
            .chain(self.pagination.iter().map(|p| &p.url));
        for spec in fields {
            if let Strategy::Composite {
                kind: CompositeKind::RegexCapture { ref pattern, .. },
            } = spec.strategy
            {
                out.push(pattern.clone());
            }
        }
        out
    }
}

fn collect_field_selectors(spec: &FieldSpec, out: &mut Vec<String>) {
    if let Some(ref s) = spec.selector {
        out.push(s.clone());
    }
    if let Strategy::Composite { ref kind } = spec.strategy {
        match kind {
            CompositeKind::SiblingOfLabel { label } => out.push(label.clone()),
            CompositeKind::AnchorByText { ancestor, .. } => out.push(ancestor.clone()),
            CompositeKind::JoinText { parts } => out.extend(parts.iter().cloned()),
            CompositeKind::DocumentText { selector } => out.push(selector.clone()),
            CompositeKind::LastSegment { .. }
            | CompositeKind::RegexCapture { .. }
            | CompositeKind::ClosestLink
            | CompositeKind::VisibleFromIndex { .. } => {}
        }
    }
}

/// Registry for looking up page schemas by provider/vertical name.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    map: HashMap<String, PageSchema>,
}

impl SchemaRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, schema: PageSchema) {
        self.map.insert(name.into(), schema);
    }

    /// Looks up a schema by name.
    pub fn get(&self, name: &str) -> Option<&PageSchema> {
        self.map.get(name)
    }

    /// Looks up a schema by name as a shareable handle.
    pub fn shared(&self, name: &str) -> Result<Arc<PageSchema>, SerpError> {
        self.map.get(name).cloned().map(Arc::new).ok_or_else(|| {
            SerpError::schema(
                name,
                "Lookup",
                Some(anyhow::anyhow!(
                    "unknown schema; registered: {}",
                    self.names().join(", ")
                )),
            )
        })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.map.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered schemas.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if no schemas are registered.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn field_spec_defaults() {
        let spec: FieldSpec = serde_json::from_value(json!({"selector": "h3"})).unwrap();
        assert_eq!(spec.selector.as_deref(), Some("h3"));
        assert_eq!(spec.strategy, Strategy::Text);
        assert_eq!(spec.fallback, json!("N/A"));
        assert!(spec.post.is_empty());
    }

    #[test]
    fn strategy_variants_deserialize() {
        let spec: FieldSpec = serde_json::from_value(json!({
            "selector": "a.iusc",
            "strategy": {"type": "json_embedded", "attribute": "m", "key": "murl"},
            "fallback": null
        }))
        .unwrap();
        assert_eq!(
            spec.strategy,
            Strategy::JsonEmbedded {
                attribute: "m".to_string(),
                key: "murl".to_string()
            }
        );
        assert_eq!(spec.fallback, Value::Null);

        let composite: Strategy = serde_json::from_value(json!({
            "type": "composite",
            "kind": {"kind": "last_segment"}
        }))
        .unwrap();
        assert_eq!(
            composite,
            Strategy::Composite {
                kind: CompositeKind::LastSegment {
                    separator: "·".to_string()
                }
            }
        );
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let res: Result<FieldSpec, _> = serde_json::from_value(json!({
            "strategy": {"type": "inner_html"}
        }));
        assert!(res.is_err());
    }

    #[test]
    fn global_field_flattens_field_spec() {
        let g: GlobalField = serde_json::from_value(json!({
            "regex": "About ([\\d,]+) results",
            "fallback": -1
        }))
        .unwrap();
        assert_eq!(g.regex.as_deref(), Some("About ([\\d,]+) results"));
        assert_eq!(g.field.fallback, json!(-1));

        let g: GlobalField = serde_json::from_value(json!({
            "selector": "title"
        }))
        .unwrap();
        assert!(g.regex.is_none());
        assert_eq!(g.field.selector.as_deref(), Some("title"));
    }

    #[test]
    fn section_position_defaults_on() {
        let s: SectionSpec = serde_json::from_value(json!({"container": "li.b_algo"})).unwrap();
        assert!(s.position);
        assert!(s.post_process.is_empty());
    }

    #[test]
    fn primary_keys_default_to_all_sections() {
        let schema = PageSchema {
            container: Some("div.g".to_string()),
            results_key: "organic_results".to_string(),
            sections: BTreeMap::from([
                ("related_searches".to_string(), SectionSpec::new("a.k8XOCe")),
                ("top_stories".to_string(), SectionSpec::new("g-inner-card")),
            ]),
            ..Default::default()
        };
        assert_eq!(
            schema.primary_keys(),
            vec!["organic_results", "related_searches", "top_stories"]
        );

        let explicit = PageSchema {
            primary: vec!["news_results".to_string()],
            ..schema
        };
        assert_eq!(explicit.primary_keys(), vec!["news_results"]);
    }

    #[test]
    fn selectors_and_patterns_are_collected() {
        let schema = PageSchema {
            container: Some("li.b_algo".to_string()),
            fields: BTreeMap::from([
                ("title".to_string(), FieldSpec::text("h2")),
                (
                    "page".to_string(),
                    FieldSpec::with_strategy(
                        None,
                        Strategy::Composite {
                            kind: CompositeKind::RegexCapture {
                                pattern: "Page (\\d+)".to_string(),
                                attribute: Some("aria-label".to_string()),
                                numeric: true,
                            },
                        },
                    ),
                ),
            ]),
            global: BTreeMap::from([(
                "result_count".to_string(),
                GlobalField::regex("([\\d,]+) results"),
            )]),
            ..Default::default()
        };
        assert_eq!(schema.selectors(), vec!["li.b_algo", "h2"]);
        assert_eq!(schema.patterns(), vec!["([\\d,]+) results", "Page (\\d+)"]);
    }

    #[test]
    fn registry_lookup() {
        let mut registry = SchemaRegistry::new();
        assert!(registry.is_empty());
        registry.register("bing_web", PageSchema::default());
        registry.register("bing_images", PageSchema::default());
        assert_eq!(registry.len(), 2);
        assert!(registry.get("bing_web").is_some());
        assert!(registry.get("google_web").is_none());
        assert!(registry.shared("google_web").unwrap_err().is_schema());
        assert_eq!(registry.names(), vec!["bing_images", "bing_web"]);
    }
}
