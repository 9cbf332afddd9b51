// ABOUTME: Pre-compiled CSS selector and regex caches for O(1) lookup during extraction.
// ABOUTME: Invalid inputs are cached as None so bad schema entries are parsed only once.

//! Selector and pattern caching for efficient repeated DOM queries.
//!
//! CSS selector parsing is expensive relative to the actual DOM matching, and
//! every container in every document reuses the same handful of selectors.
//! Both caches compile once per distinct string and hand out shared handles.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;

static SELECTOR_CACHE: Lazy<RwLock<HashMap<String, Option<Arc<Selector>>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

static REGEX_CACHE: Lazy<RwLock<HashMap<String, Option<Regex>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Gets or compiles a CSS selector, caching the result.
///
/// Returns `None` for selectors `scraper` cannot parse.
pub fn selector(css: &str) -> Option<Arc<Selector>> {
    {
        let cache = SELECTOR_CACHE.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get(css) {
            return cached.clone();
        }
    }

    let compiled = Selector::parse(css).ok().map(Arc::new);
    let mut cache = SELECTOR_CACHE
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    // Another thread may have inserted while we compiled
    if let Some(cached) = cache.get(css) {
        return cached.clone();
    }
    cache.insert(css.to_string(), compiled.clone());
    compiled
}

/// Gets or compiles a regex pattern, caching the result.
pub fn regex(pattern: &str) -> Option<Regex> {
    {
        let cache = REGEX_CACHE.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get(pattern) {
            return cached.clone();
        }
    }

    let compiled = Regex::new(pattern).ok();
    let mut cache = REGEX_CACHE.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(cached) = cache.get(pattern) {
        return cached.clone();
    }
    cache.insert(pattern.to_string(), compiled.clone());
    compiled
}

/// Precompiles a batch of selectors into the cache.
///
/// Returns the selectors that failed to parse, in input order.
pub fn precompile_selectors<I, S>(selectors: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut invalid = Vec::new();
    let mut cache = SELECTOR_CACHE
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    for css in selectors {
        let css = css.as_ref();
        let entry = cache
            .entry(css.to_string())
            .or_insert_with(|| Selector::parse(css).ok().map(Arc::new));
        if entry.is_none() {
            invalid.push(css.to_string());
        }
    }
    invalid
}

/// Precompiles a batch of regex patterns into the cache.
///
/// Returns the patterns that failed to compile, in input order.
pub fn precompile_patterns<I, S>(patterns: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut invalid = Vec::new();
    let mut cache = REGEX_CACHE.write().unwrap_or_else(PoisonError::into_inner);
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let entry = cache
            .entry(pattern.to_string())
            .or_insert_with(|| Regex::new(pattern).ok());
        if entry.is_none() {
            invalid.push(pattern.to_string());
        }
    }
    invalid
}
