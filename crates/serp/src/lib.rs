// ABOUTME: Main library entry point for the declarative SERP extraction engine.
// ABOUTME: Re-exports the public API: schemas, extraction, orchestration, providers and the Client.

//! serp-extract - schema-driven extraction of search engine result pages.
//!
//! A [`PageSchema`] declares, per field, where a value lives and how to read
//! it. The extractors apply a schema to a parsed page without I/O; the
//! orchestrator fetches many queries concurrently, each bounded by a timeout,
//! and reports one outcome per query in input order.
//!
//! # Example
//!
//! ```no_run
//! use serp_extract::{load_schema_file, Client, QueryTask, SearchEndpoint, SerpError};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SerpError> {
//!     let schema = Arc::new(load_schema_file("schemas/bing_web.json")?);
//!     let client = Client::builder().build()?;
//!     let endpoint = SearchEndpoint::parse("https://www.bing.com/search")?;
//!     let result = client
//!         .search_with_schema(schema, endpoint, vec![QueryTask::new("rust async")])
//!         .await;
//!     println!("{}", result.to_json());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod extractors;
pub mod observer;
pub mod options;
pub mod orchestrator;
pub mod provider;
pub mod resource;
pub mod result;
pub mod sanitize;

pub use crate::client::{extract_html_with_schema, Client};
pub use crate::error::{ErrorCode, SerpError};
pub use crate::extractors::loader::{
    load_registry_file, load_registry_str, load_schema_file, load_schema_str,
};
pub use crate::extractors::page::extract_page;
pub use crate::extractors::resolve::{resolve, ResolveContext};
pub use crate::extractors::schema::{
    CompositeKind, FieldSpec, GlobalField, PageSchema, PaginationSpec, PostProcess,
    RecordTransform, SchemaRegistry, SectionSpec, Strategy, TimestampFormat,
};
pub use crate::extractors::Record;
pub use crate::observer::{BatchObserver, NoOpObserver, TracingObserver};
pub use crate::options::{ClientBuilder, Options};
pub use crate::orchestrator::{run, run_batch, BatchOptions, TimeoutPolicy};
pub use crate::provider::{DocumentProvider, HttpDocumentProvider, RawDocument, SearchEndpoint};
pub use crate::result::{BatchEntry, BatchResult, QueryOutcome, QueryTask};
pub use crate::sanitize::{has_meaningful_content, sanitize};
