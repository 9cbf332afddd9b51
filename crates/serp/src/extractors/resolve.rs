// ABOUTME: Per-field value resolution: selector lookup, strategies, composites and post-processing.
// ABOUTME: Total over its inputs; every failure path yields the field's declared fallback.

//! Field resolution.
//!
//! [`resolve`] turns one [`FieldSpec`] plus a scope element into a JSON value.
//! It performs no I/O and never fails: a missing element, an absent
//! attribute, malformed embedded JSON or an unparseable URL all produce the
//! field's fallback.

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html};
use serde_json::Value;
use url::Url;

use crate::extractors::compiled;
use crate::extractors::schema::{CompositeKind, FieldSpec, PostProcess, Strategy, TimestampFormat};

/// Caller-supplied context for one resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveContext<'a> {
    /// 1-based record index within its container set (0 outside sections).
    pub position: usize,
    /// The whole document, for composites that look outside the scope.
    pub document: Option<&'a Html>,
    /// Base URL relative links are resolved against.
    pub base_url: Option<&'a Url>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(document: &'a Html, base_url: Option<&'a Url>) -> Self {
        Self {
            position: 0,
            document: Some(document),
            base_url,
        }
    }

    /// Same context at a different record position.
    pub fn at(self, position: usize) -> Self {
        Self { position, ..self }
    }
}

/// Resolves one field's value within `scope`.
pub fn resolve(scope: ElementRef<'_>, spec: &FieldSpec, ctx: &ResolveContext<'_>) -> Value {
    let target = match spec.selector {
        Some(ref css) => match select_first(scope, css) {
            Some(el) => el,
            None => return spec.fallback.clone(),
        },
        None => scope,
    };

    let value = match apply_strategy(target, &spec.strategy, ctx) {
        Some(v) => v,
        None => return spec.fallback.clone(),
    };
    if value == spec.fallback {
        return value;
    }

    let mut value = value;
    for step in &spec.post {
        value = match post_process(value, step) {
            Some(v) => v,
            None => return spec.fallback.clone(),
        };
    }
    value
}

fn apply_strategy(target: ElementRef<'_>, strategy: &Strategy, ctx: &ResolveContext<'_>) -> Option<Value> {
    match strategy {
        Strategy::Text => non_empty(element_text(target)).map(Value::String),
        Strategy::Attribute {
            name,
            fallback_attribute,
        } => {
            let raw = attr(target, name).or_else(|| {
                fallback_attribute
                    .as_deref()
                    .and_then(|fb| attr(target, fb))
            })?;
            let is_link = matches!(name.as_str(), "href" | "src");
            let value = if is_link {
                normalize_url(raw, None)
            } else {
                raw.to_string()
            };
            Some(Value::String(value))
        }
        Strategy::Href => link_attr(target, "href", ctx.base_url).map(Value::String),
        Strategy::Src => link_attr(target, "src", ctx.base_url).map(Value::String),
        Strategy::Position => Some(Value::from(ctx.position)),
        Strategy::DomainFrom { attribute } => {
            let raw = attr(target, attribute)?;
            host_of(&normalize_url(raw, None)).map(Value::String)
        }
        Strategy::JsonEmbedded { attribute, key } => {
            let raw = attr(target, attribute)?;
            project_json(raw, key)
        }
        Strategy::Composite { kind } => composite(target, kind, ctx),
        Strategy::Static { value } => Some(value.clone()),
    }
}

fn composite(target: ElementRef<'_>, kind: &CompositeKind, ctx: &ResolveContext<'_>) -> Option<Value> {
    match kind {
        CompositeKind::SiblingOfLabel { label } => {
            let label_el = select_first(target, label)?;
            let sibling = next_element_sibling(label_el)?;
            non_empty(element_text(sibling)).map(Value::String)
        }
        CompositeKind::AnchorByText { ancestor, text } => {
            let anchor_root = closest(target, ancestor)?;
            let search_root = parent_element(anchor_root).unwrap_or(anchor_root);
            let wanted = text.trim();
            let sel = compiled::selector("a")?;
            let anchor = search_root
                .select(&sel)
                .find(|a| element_text(*a) == wanted)?;
            link_attr(anchor, "href", ctx.base_url).map(Value::String)
        }
        CompositeKind::LastSegment { separator } => {
            let text = element_text(target);
            text.split(separator.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .last()
                .map(|s| Value::String(s.to_string()))
        }
        CompositeKind::RegexCapture {
            pattern,
            attribute,
            numeric,
        } => {
            let haystack = match attribute {
                Some(name) => attr(target, name)?.to_string(),
                None => element_text(target),
            };
            let re = compiled::regex(pattern)?;
            let captured = re.captures(&haystack)?.get(1)?.as_str().trim().to_string();
            if *numeric {
                parse_number(&captured)
            } else {
                non_empty(captured).map(Value::String)
            }
        }
        CompositeKind::ClosestLink => {
            let anchor = closest(target, "a")?;
            link_attr(anchor, "href", ctx.base_url).map(Value::String)
        }
        CompositeKind::VisibleFromIndex { limit } => {
            Some(Value::String((ctx.position <= *limit).to_string()))
        }
        CompositeKind::JoinText { parts } => {
            let mut pieces: Vec<String> = Vec::new();
            for part in parts {
                let Some(sel) = compiled::selector(part) else {
                    continue;
                };
                pieces.extend(target.select(&sel).filter_map(|el| non_empty(element_text(el))));
            }
            non_empty(pieces.join(" ")).map(Value::String)
        }
        CompositeKind::DocumentText { selector } => {
            let doc = ctx.document?;
            let sel = compiled::selector(selector)?;
            let el = doc.select(&sel).next()?;
            non_empty(element_text(el)).map(Value::String)
        }
    }
}

fn post_process(value: Value, step: &PostProcess) -> Option<Value> {
    match step {
        PostProcess::Domain => host_of(value.as_str()?).map(Value::String),
        PostProcess::Json { key } => project_json(value.as_str()?, key),
        PostProcess::UnixTimestamp { format } => {
            let secs = match value {
                Value::Number(ref n) => n.as_i64()?,
                Value::String(ref s) => s.trim().parse::<i64>().ok()?,
                _ => return None,
            };
            format_timestamp(secs, *format).map(Value::String)
        }
        PostProcess::StripChars { chars } => {
            let stripped: String = value.as_str()?.chars().filter(|c| !chars.contains(*c)).collect();
            non_empty(stripped.trim().to_string()).map(Value::String)
        }
        PostProcess::Number => match value {
            Value::Number(_) => Some(value),
            Value::String(ref s) => parse_number(s),
            _ => None,
        },
    }
}

/// Formats epoch seconds as an ISO-8601 UTC string, or its date or time half.
pub fn format_timestamp(secs: i64, format: TimestampFormat) -> Option<String> {
    let dt: DateTime<Utc> = DateTime::from_timestamp(secs, 0)?;
    let out = match format {
        TimestampFormat::DateTime => dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        TimestampFormat::Date => dt.format("%Y-%m-%d").to_string(),
        TimestampFormat::Time => dt.format("%H:%M:%S%.3f").to_string(),
    };
    Some(out)
}

fn parse_number(s: &str) -> Option<Value> {
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    cleaned.trim().parse::<i64>().ok().map(Value::from)
}

fn project_json(raw: &str, key: &str) -> Option<Value> {
    let decoded = raw.replace("&quot;", "\"");
    let parsed: Value = serde_json::from_str(&decoded).ok()?;
    match parsed.get(key)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        v => Some(v.clone()),
    }
}

/// Returns the first descendant of `scope` matching `css`.
pub fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = compiled::selector(css)?;
    // Bound first: the Select temporary must not outlive `sel` in a tail expression
    let found = scope.select(&sel).next();
    found
}

/// Text content with whitespace runs collapsed and ends trimmed.
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Nearest inclusive ancestor matching `css`.
pub fn closest<'a>(el: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = compiled::selector(css)?;
    if sel.matches(&el) {
        return Some(el);
    }
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| sel.matches(a))
}

fn parent_element(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.parent().and_then(ElementRef::wrap)
}

fn next_element_sibling(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.next_siblings().find_map(ElementRef::wrap)
}

/// Non-empty trimmed attribute value.
fn attr<'a>(el: ElementRef<'a>, name: &str) -> Option<&'a str> {
    el.value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn link_attr(el: ElementRef<'_>, name: &str, base: Option<&Url>) -> Option<String> {
    attr(el, name).map(|raw| normalize_url(raw, base))
}

/// Rewrites protocol-relative `//host` URLs to https and, when a base URL is
/// known, resolves relative references against it.
pub fn normalize_url(raw: &str, base: Option<&Url>) -> String {
    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    if Url::parse(raw).is_ok() {
        return raw.to_string();
    }
    match base.and_then(|b| b.join(raw).ok()) {
        Some(joined) => joined.to_string(),
        None => raw.to_string(),
    }
}

/// Hostname of an absolute URL.
pub fn host_of(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .map(str::to_string)
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
