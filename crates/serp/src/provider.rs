// ABOUTME: Document acquisition seam: the DocumentProvider trait and its reqwest-backed implementation.
// ABOUTME: Providers return raw HTML; parsing happens later on the extraction side.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::SerpError;
use crate::resource::{fetch, FetchOptions};
use crate::result::QueryTask;

/// Raw page contents for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDocument {
    pub raw_html: String,
    /// URL relative links in the page are resolved against.
    pub base_url: Option<Url>,
}

impl RawDocument {
    pub fn new(raw_html: impl Into<String>) -> Self {
        Self {
            raw_html: raw_html.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }
}

/// Acquires the raw document for a query.
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn fetch(&self, task: &QueryTask) -> Result<RawDocument, SerpError>;
}

#[async_trait]
impl<P: DocumentProvider + ?Sized> DocumentProvider for Arc<P> {
    async fn fetch(&self, task: &QueryTask) -> Result<RawDocument, SerpError> {
        (**self).fetch(task).await
    }
}

/// Generic search endpoint: a base URL, the query parameter name and static
/// extra parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEndpoint {
    pub base_url: Url,
    pub query_param: String,
    pub params: Vec<(String, String)>,
}

impl SearchEndpoint {
    /// Endpoint using `q` as the query parameter.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            query_param: "q".to_string(),
            params: Vec::new(),
        }
    }

    /// Parses `base_url`; fails with an invalid-URL error.
    pub fn parse(base_url: &str) -> Result<Self, SerpError> {
        let url = Url::parse(base_url).map_err(|e| {
            SerpError::invalid_url(base_url, "Endpoint", Some(anyhow::Error::new(e)))
        })?;
        Ok(Self::new(url))
    }

    pub fn query_param(mut self, name: impl Into<String>) -> Self {
        self.query_param = name.into();
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// The request URL for one query, parameters appended after any already on the base.
    pub fn url_for(&self, query: &str) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(&self.query_param, query);
            for (k, v) in &self.params {
                pairs.append_pair(k, v);
            }
        }
        url
    }
}

/// Fetches search pages over HTTP with reqwest.
#[derive(Debug, Clone)]
pub struct HttpDocumentProvider {
    client: reqwest::Client,
    endpoint: SearchEndpoint,
    fetch_options: FetchOptions,
}

impl HttpDocumentProvider {
    pub fn new(client: reqwest::Client, endpoint: SearchEndpoint, fetch_options: FetchOptions) -> Self {
        Self {
            client,
            endpoint,
            fetch_options,
        }
    }

    pub fn endpoint(&self) -> &SearchEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl DocumentProvider for HttpDocumentProvider {
    async fn fetch(&self, task: &QueryTask) -> Result<RawDocument, SerpError> {
        let url = self.endpoint.url_for(&task.query);
        let result = fetch(&self.client, url.as_str(), &self.fetch_options)
            .await
            .map_err(|mut e| {
                e.target = task.query.clone();
                e
            })?;
        let base_url = Url::parse(&result.final_url).ok().or(Some(url));
        Ok(RawDocument {
            raw_html: result.text(),
            base_url,
        })
    }
}
