// ABOUTME: Configuration options for the SERP client including timeouts, HTTP settings and schemas.
// ABOUTME: ClientBuilder provides a fluent API for constructing Client instances with custom settings.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::client::Client;
use crate::error::SerpError;
use crate::extractors::schema::SchemaRegistry;
use crate::observer::{BatchObserver, TracingObserver};
use crate::orchestrator::{TimeoutPolicy, DEFAULT_TIMEOUT};

/// Desktop browser User-Agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Configuration options for the SERP client.
#[derive(Debug, Clone)]
pub struct Options {
    /// Per-query bound covering fetch and extraction.
    pub timeout: Duration,
    pub timeout_policy: TimeoutPolicy,
    pub user_agent: String,
    pub allow_private_networks: bool,
    pub http_client: Option<reqwest::Client>,
    pub headers: HashMap<String, String>,
    pub registry: Option<SchemaRegistry>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            timeout_policy: TimeoutPolicy::Cancel,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            allow_private_networks: false,
            http_client: None,
            headers: HashMap::new(),
            registry: None,
        }
    }
}

/// Builder for constructing Client instances with custom configuration.
#[derive(Clone)]
pub struct ClientBuilder {
    opts: Options,
    observer: Option<Arc<dyn BatchObserver>>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("opts", &self.opts)
            .field("custom_observer", &self.observer.is_some())
            .finish()
    }
}

impl ClientBuilder {
    /// Create a new ClientBuilder with default options.
    pub fn new() -> Self {
        Self {
            opts: Options::default(),
            observer: None,
        }
    }

    /// Set the per-query timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = timeout;
        self
    }

    /// Choose what happens to a query's work when it times out.
    pub fn timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.opts.timeout_policy = policy;
        self
    }

    /// Set the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.opts.user_agent = user_agent.into();
        self
    }

    /// Allow or disallow requests to private networks.
    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.opts.allow_private_networks = allow;
        self
    }

    /// Use a custom HTTP client.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.opts.http_client = Some(client);
        self
    }

    /// Add a custom header to all requests.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.headers.insert(key.into(), value.into());
        self
    }

    /// Set the schema registry searches look schemas up in.
    pub fn registry(mut self, reg: SchemaRegistry) -> Self {
        self.opts.registry = Some(reg);
        self
    }

    /// Replace the default tracing observer.
    pub fn observer(mut self, observer: Arc<dyn BatchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Build the Client with the configured options.
    pub fn build(self) -> Result<Client, SerpError> {
        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(TracingObserver) as Arc<dyn BatchObserver>);
        Client::with_observer(self.opts, observer)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = Options::default();
        assert_eq!(opts.timeout, Duration::from_secs(40));
        assert_eq!(opts.timeout_policy, TimeoutPolicy::Cancel);
        assert!(!opts.allow_private_networks);
        assert!(opts.user_agent.starts_with("Mozilla/5.0"));
    }

    #[test]
    fn builder_debug_hides_observer() {
        let builder = ClientBuilder::new()
            .timeout(Duration::from_millis(250))
            .header("Accept-Language", "en-US");
        let dbg = format!("{:?}", builder);
        assert!(dbg.contains("custom_observer: false"));
        assert!(dbg.contains("250ms"));
    }
}
