// ABOUTME: The SERP client: owns the HTTP client, schema registry and observer, and runs searches.
// ABOUTME: Offers live batch searches against an endpoint and offline extraction of saved HTML.

use std::net::ToSocketAddrs;
use std::sync::Arc;

use url::Url;

use crate::error::SerpError;
use crate::extractors::schema::{PageSchema, SchemaRegistry};
use crate::extractors::Record;
use crate::observer::BatchObserver;
use crate::options::{ClientBuilder, Options};
use crate::orchestrator::{process_document, run_batch, BatchOptions};
use crate::provider::{HttpDocumentProvider, RawDocument, SearchEndpoint};
use crate::resource::{is_private_ip, FetchOptions};
use crate::result::{BatchResult, QueryTask};

/// The main client for running schema-driven searches.
pub struct Client {
    opts: Options,
    http_client: reqwest::Client,
    registry: SchemaRegistry,
    observer: Arc<dyn BatchObserver>,
}

impl Client {
    /// Create a new ClientBuilder for configuring the client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a client that logs through `observer`.
    pub fn with_observer(opts: Options, observer: Arc<dyn BatchObserver>) -> Result<Self, SerpError> {
        let http_client = match opts.http_client.clone() {
            Some(client) => client,
            None => build_http_client(&opts)?,
        };
        let registry = opts.registry.clone().unwrap_or_default();
        Ok(Self {
            opts,
            http_client,
            registry,
            observer,
        })
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Looks up a registered schema.
    pub fn schema(&self, name: &str) -> Result<Arc<PageSchema>, SerpError> {
        self.registry.shared(name)
    }

    /// An HTTP provider for `endpoint` sharing this client's connection pool.
    pub fn provider(&self, endpoint: SearchEndpoint) -> HttpDocumentProvider {
        let fetch_options = FetchOptions {
            headers: self.opts.headers.clone(),
            allow_private_networks: self.opts.allow_private_networks,
        };
        HttpDocumentProvider::new(self.http_client.clone(), endpoint, fetch_options)
    }

    fn batch_options(&self) -> BatchOptions {
        BatchOptions::with_timeout(self.opts.timeout).policy(self.opts.timeout_policy)
    }

    /// Runs every task against `endpoint` with the registered schema `name`.
    pub async fn search(
        &self,
        name: &str,
        endpoint: SearchEndpoint,
        tasks: Vec<QueryTask>,
    ) -> Result<BatchResult, SerpError> {
        let schema = self.schema(name)?;
        Ok(self.search_with_schema(schema, endpoint, tasks).await)
    }

    /// Runs every task against `endpoint` with an explicit schema.
    pub async fn search_with_schema(
        &self,
        schema: Arc<PageSchema>,
        endpoint: SearchEndpoint,
        tasks: Vec<QueryTask>,
    ) -> BatchResult {
        let provider = Arc::new(self.provider(endpoint));
        run_batch(
            tasks,
            schema,
            provider,
            &self.batch_options(),
            self.observer.as_ref(),
        )
        .await
    }

    /// Extracts a saved page with the registered schema `name`.
    ///
    /// Fails with a `Blocked` error when the page has no meaningful content.
    pub fn extract_html(&self, name: &str, html: &str, base_url: Option<&str>) -> Result<Record, SerpError> {
        let schema = self.schema(name)?;
        extract_html_with_schema(&schema, html, base_url)
    }
}

/// Extracts a saved page with an explicit schema.
pub fn extract_html_with_schema(
    schema: &PageSchema,
    html: &str,
    base_url: Option<&str>,
) -> Result<Record, SerpError> {
    let mut document = RawDocument::new(html);
    if let Some(raw) = base_url {
        let url = Url::parse(raw).map_err(|e| {
            SerpError::invalid_url(raw, "ExtractHTML", Some(anyhow::Error::new(e)))
        })?;
        document = document.with_base_url(url);
    }
    let task = QueryTask::new(base_url.unwrap_or("<html>"));
    process_document(&task, &document, schema)
}

fn build_http_client(opts: &Options) -> Result<reqwest::Client, SerpError> {
    let allow_private = opts.allow_private_networks;
    let redirect_policy = reqwest::redirect::Policy::custom(move |attempt| {
        if allow_private {
            return attempt.follow();
        }
        let next = attempt.url().clone();
        let Some(host) = next.host_str() else {
            return attempt.follow();
        };
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<std::net::IpAddr>() {
            if is_private_ip(&ip) {
                return attempt.error("redirect to private IP blocked");
            }
            return attempt.follow();
        }
        // Redirect policies are synchronous, so resolve with std
        let port = next.port_or_known_default().unwrap_or(80);
        match (host, port).to_socket_addrs() {
            Ok(mut addrs) => {
                if addrs.any(|sa| is_private_ip(&sa.ip())) {
                    attempt.error("redirect to private IP blocked")
                } else {
                    attempt.follow()
                }
            }
            Err(_) => attempt.error("DNS lookup failed during redirect"),
        }
    });

    reqwest::Client::builder()
        .redirect(redirect_policy)
        .user_agent(&opts.user_agent)
        .timeout(opts.timeout)
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
        .map_err(|e| SerpError::fetch("http client", "Build", Some(anyhow::Error::new(e))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoOpObserver;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        let mut reg = SchemaRegistry::new();
        reg.register(
            "bing_web",
            serde_json::from_value(json!({
                "container": "li.b_algo",
                "results_key": "organic_results",
                "fields": {
                    "title": {"selector": "h2"},
                    "link": {"selector": "h2 a", "strategy": {"type": "href"}}
                }
            }))
            .unwrap(),
        );
        reg
    }

    #[test]
    fn unknown_schema_is_schema_error() {
        let client = Client::builder().registry(registry()).build().unwrap();
        let err = client.schema("google_web").unwrap_err();
        assert!(err.is_schema());
        assert!(err.message().contains("bing_web"));
    }

    #[test]
    fn extract_html_resolves_against_base() {
        let client = Client::builder()
            .registry(registry())
            .observer(Arc::new(NoOpObserver))
            .build()
            .unwrap();
        let record = client
            .extract_html(
                "bing_web",
                r#"<li class="b_algo"><h2><a href="/ck/a?u=1">Rust</a></h2></li>"#,
                Some("https://www.bing.com/search?q=rust"),
            )
            .unwrap();
        assert_eq!(
            record["organic_results"],
            json!([{"title": "Rust", "link": "https://www.bing.com/ck/a?u=1", "position": 1}])
        );
    }

    #[test]
    fn extract_html_rejects_bad_base_url() {
        let schema = registry().get("bing_web").cloned().unwrap();
        let err = extract_html_with_schema(&schema, "<p></p>", Some("nope")).unwrap_err();
        assert!(err.is_invalid_url());
    }
}
