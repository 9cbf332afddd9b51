// ABOUTME: HTTP fetching for search result pages with SSRF protection, size limits and charset decoding.
// ABOUTME: Non-2xx responses are fetch errors carrying the status code.

use std::collections::HashMap;
use std::net::IpAddr;

use bytes::Bytes;
use ipnet::IpNet;
use once_cell::sync::Lazy;
use url::Url;

use crate::error::SerpError;

/// Maximum allowed content length (10 MB).
pub const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

static PRIVATE_NETS: Lazy<Vec<IpNet>> = Lazy::new(|| {
    [
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "fc00::/7",
        "fe80::/10",
    ]
    .iter()
    .filter_map(|net| net.parse().ok())
    .collect()
});

/// Options for fetching a page.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub headers: HashMap<String, String>,
    pub allow_private_networks: bool,
}

/// Result of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub url: String,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchResult {
    /// Decodes the body to a String, honoring the content-type charset.
    pub fn text(&self) -> String {
        decode_body(&self.body, self.content_type.as_deref())
    }
}

/// Check if an IP address is in a private/reserved range.
pub fn is_private_ip(addr: &IpAddr) -> bool {
    addr.is_loopback() || PRIVATE_NETS.iter().any(|net| net.contains(addr))
}

fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(encoding) = content_type
        .and_then(extract_charset)
        .and_then(|charset| encoding_rs::Encoding::for_label(charset.as_bytes()))
    {
        let (decoded, _, _) = encoding.decode(body);
        return decoded.into_owned();
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

fn extract_charset(content_type: &str) -> Option<String> {
    let lower = content_type.to_lowercase();
    lower.split(';').find_map(|part| {
        part.trim()
            .strip_prefix("charset=")
            .map(|cs| cs.trim_matches('"').trim_matches('\'').to_string())
    })
}

/// Rejects URLs whose host is, or resolves to, a private address.
async fn guard_host(target: &str, url: &Url, reason: &str) -> Result<(), SerpError> {
    let Some(host) = url.host_str() else {
        return Ok(());
    };
    let blocked = || SerpError::ssrf(target, "Fetch", Some(anyhow::anyhow!("{}", reason)));

    // Url keeps IPv6 hosts bracketed
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return if is_private_ip(&ip) { Err(blocked()) } else { Ok(()) };
    }

    let port = url.port_or_known_default().unwrap_or(80);
    let addrs = tokio::net::lookup_host((host, port)).await.map_err(|e| {
        SerpError::fetch(target, "Fetch", Some(anyhow::anyhow!("DNS lookup failed: {}", e)))
    })?;
    for socket_addr in addrs {
        if is_private_ip(&socket_addr.ip()) {
            return Err(blocked());
        }
    }
    Ok(())
}

/// Fetch a page from the given URL.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    opts: &FetchOptions,
) -> Result<FetchResult, SerpError> {
    if url.is_empty() {
        return Err(SerpError::invalid_url(url, "Fetch", None));
    }

    let parsed_url = Url::parse(url).map_err(|e| {
        SerpError::invalid_url(url, "Fetch", Some(anyhow::anyhow!("invalid URL: {}", e)))
    })?;

    let scheme = parsed_url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(SerpError::invalid_url(
            url,
            "Fetch",
            Some(anyhow::anyhow!("scheme must be http or https")),
        ));
    }

    if !opts.allow_private_networks {
        guard_host(url, &parsed_url, "private IP addresses are not allowed").await?;
    }

    let mut request = client.get(url);
    for (key, value) in &opts.headers {
        request = request.header(key, value);
    }

    let response = request.send().await.map_err(|e| {
        SerpError::fetch(url, "Fetch", Some(anyhow::anyhow!("request failed: {}", e)))
    })?;

    if !opts.allow_private_networks {
        guard_host(
            url,
            response.url(),
            "redirect to private IP address is not allowed",
        )
        .await?;
    }

    if let Some(len) = response.content_length() {
        if len as usize > MAX_CONTENT_LENGTH {
            return Err(SerpError::fetch(
                url,
                "Fetch",
                Some(anyhow::anyhow!("content too large")),
            ));
        }
    }

    let status = response.status();
    if !status.is_success() {
        return Err(SerpError::fetch(
            url,
            "Fetch",
            Some(anyhow::anyhow!("HTTP error! status: {}", status.as_u16())),
        ));
    }

    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_lowercase());

    let body = response.bytes().await.map_err(|e| {
        SerpError::fetch(
            url,
            "Fetch",
            Some(anyhow::anyhow!("failed to read body: {}", e)),
        )
    })?;

    if body.len() > MAX_CONTENT_LENGTH {
        return Err(SerpError::fetch(
            url,
            "Fetch",
            Some(anyhow::anyhow!("content too large")),
        ));
    }

    Ok(FetchResult {
        status: status.as_u16(),
        url: url.to_string(),
        final_url,
        content_type,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn create_test_client() -> reqwest::Client {
        reqwest::Client::builder()
            .user_agent("test-agent")
            .build()
            .unwrap()
    }

    fn open_opts() -> FetchOptions {
        FetchOptions {
            allow_private_networks: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_ok_utf8() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/search").query_param("q", "rust");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body("<p>hello</p>");
        });

        let client = create_test_client();
        let result = fetch(&client, &server.url("/search?q=rust"), &open_opts()).await;
        mock.assert();

        let result = result.expect("fetch should succeed");
        assert_eq!(result.status, 200);
        assert_eq!(result.text(), "<p>hello</p>");
    }

    #[tokio::test]
    async fn test_fetch_non_2xx_carries_status() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/search");
            then.status(429).body("slow down");
        });

        let client = create_test_client();
        let err = fetch(&client, &server.url("/search"), &open_opts())
            .await
            .expect_err("should fail on 429");
        mock.assert();
        assert!(err.is_fetch());
        assert_eq!(err.message(), "HTTP error! status: 429");
    }

    #[tokio::test]
    async fn test_custom_headers_are_sent() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/h")
                .header("accept-language", "en-US");
            then.status(200).body("ok");
        });

        let client = create_test_client();
        let mut opts = open_opts();
        opts.headers
            .insert("Accept-Language".to_string(), "en-US".to_string());
        fetch(&client, &server.url("/h"), &opts)
            .await
            .expect("fetch should succeed");
        mock.assert();
    }

    #[tokio::test]
    async fn test_private_ip_block() {
        let server = MockServer::start();
        let client = create_test_client();
        let url = format!("http://127.0.0.1:{}/search", server.port());
        let err = fetch(&client, &url, &FetchOptions::default())
            .await
            .expect_err("should fail on private IP");
        assert!(err.is_ssrf());
    }

    #[tokio::test]
    async fn test_invalid_urls() {
        let client = create_test_client();
        let err = fetch(&client, "", &open_opts()).await.unwrap_err();
        assert!(err.is_invalid_url());
        let err = fetch(&client, "ftp://example.com/", &open_opts())
            .await
            .unwrap_err();
        assert!(err.is_invalid_url());
    }

    #[test]
    fn test_is_private_ip() {
        assert!(is_private_ip(&"10.0.0.1".parse().unwrap()));
        assert!(is_private_ip(&"172.31.255.255".parse().unwrap()));
        assert!(is_private_ip(&"192.168.1.1".parse().unwrap()));
        assert!(is_private_ip(&"127.0.0.1".parse().unwrap()));
        assert!(is_private_ip(&"169.254.0.1".parse().unwrap()));
        assert!(is_private_ip(&"::1".parse().unwrap()));
        assert!(is_private_ip(&"fd00::1".parse().unwrap()));
        assert!(is_private_ip(&"fe80::1".parse().unwrap()));
        assert!(!is_private_ip(&"8.8.8.8".parse().unwrap()));
        assert!(!is_private_ip(&"172.32.0.1".parse().unwrap()));
        assert!(!is_private_ip(&"2001:4860:4860::8888".parse().unwrap()));
    }

    #[test]
    fn test_extract_charset() {
        assert_eq!(
            extract_charset("text/html; charset=ISO-8859-1"),
            Some("iso-8859-1".to_string())
        );
        assert_eq!(
            extract_charset("text/html; charset=\"utf-8\""),
            Some("utf-8".to_string())
        );
        assert_eq!(extract_charset("text/html"), None);
    }

    #[test]
    fn test_decode_body_with_declared_charset() {
        let latin1: &[u8] = &[0x63, 0x61, 0x66, 0xe9];
        assert_eq!(
            decode_body(latin1, Some("text/html; charset=iso-8859-1")),
            "café"
        );
    }
}
