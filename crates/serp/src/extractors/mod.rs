// ABOUTME: Declarative extraction module: schema model, field resolution and page assembly.
// ABOUTME: Everything here is synchronous and side-effect free apart from the compiled caches.

pub mod compiled;
pub mod global;
pub mod loader;
pub mod page;
pub mod pagination;
pub mod resolve;
pub mod schema;
pub mod section;

/// One extracted record: field name to JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;
