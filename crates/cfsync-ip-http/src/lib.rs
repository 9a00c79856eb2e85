// # HTTP IP Source
//
// This crate provides an HTTP-based IP source for cfsync.
//
// ## Detection
//
// Each family is detected by fetching one URL, normally reached over that
// family's network. The default endpoints are Cloudflare's trace pages on
// `1.1.1.1` and `2606:4700:4700::1111`, which answer with `key=value` lines:
//
// ```text
// fl=123f45
// h=1.1.1.1
// ip=203.0.113.7
// ts=1700000000.000
// ```
//
// Plain-text echo services (`https://api.ipify.org`, `https://icanhazip.com`)
// answer with the bare address and are accepted too.
//
// ## Scope
//
// - One request per `detect` call, no caching, no polling
// - 10 second request timeout
// - The answer must be an address of the requested family; everything else
//   (loopback, unspecified, ...) is left to the engine's validation

use async_trait::async_trait;
use cfsync_core::{Error, IpFamily, IpSource, Result};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

/// Default IPv4 detection endpoint
pub const DEFAULT_IPV4_URL: &str = "https://1.1.1.1/cdn-cgi/trace";

/// Default IPv6 detection endpoint
pub const DEFAULT_IPV6_URL: &str = "https://[2606:4700:4700::1111]/cdn-cgi/trace";

/// Request timeout for detection endpoints
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP-based IP source
#[derive(Debug, Clone)]
pub struct HttpIpSource {
    /// Endpoint per family; a family without one cannot be detected
    urls: BTreeMap<IpFamily, String>,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpIpSource {
    /// Create a source using the default endpoints for both families
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        let urls = BTreeMap::from([
            (IpFamily::V4, DEFAULT_IPV4_URL.to_string()),
            (IpFamily::V6, DEFAULT_IPV6_URL.to_string()),
        ]);

        Ok(Self { urls, client })
    }

    /// Detect `family` through `url` instead of the default endpoint
    pub fn with_url(mut self, family: IpFamily, url: impl Into<String>) -> Self {
        self.urls.insert(family, url.into());
        self
    }

    /// Stop detecting `family`; `detect` then always fails for it
    pub fn without(mut self, family: IpFamily) -> Self {
        self.urls.remove(&family);
        self
    }

    /// The endpoint used for `family`, if any
    pub fn url(&self, family: IpFamily) -> Option<&str> {
        self.urls.get(&family).map(String::as_str)
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::ip_detection(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ip_detection(format!(
                "{} answered with HTTP {}",
                url, status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| Error::ip_detection(format!("Failed to read answer of {}: {}", url, e)))
    }
}

/// Extract the address from a trace page or a bare-address answer
fn parse_address(body: &str) -> Result<IpAddr> {
    let text = body
        .lines()
        .find_map(|line| line.trim().strip_prefix("ip="))
        .unwrap_or(body)
        .trim();

    text.parse()
        .map_err(|_| Error::ip_detection(format!("Answer is not an IP address: {:?}", text)))
}

#[async_trait]
impl IpSource for HttpIpSource {
    async fn detect(&self, family: IpFamily) -> Result<IpAddr> {
        let url = self.url(family).ok_or_else(|| {
            Error::ip_detection(format!("No detection endpoint configured for {}", family))
        })?;

        let body = self.fetch(url).await?;
        let ip = parse_address(&body)?;

        if !family.matches(&ip) {
            return Err(Error::ip_detection(format!(
                "{} returned {}, which is not an {} address",
                url, ip, family
            )));
        }

        debug!(family = %family, ip = %ip, url = %url, "detected public address");
        Ok(ip)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
