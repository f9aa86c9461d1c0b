//! HTTP access to upstream vendors: a request seam, text transport and
//! direct-then-relay fallback.

mod basic;

pub use basic::BasicClient;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Request, Response};
use tracing::{debug, warn};

/// Executes one prepared request. Real clients and wrappers implement this.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// GETs `url` with a deadline and returns the body of a successful response.
pub async fn fetch_bytes<C: HttpClient>(
    client: &C,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let mut req = Request::new(reqwest::Method::GET, url.parse()?);
    *req.timeout_mut() = Some(timeout);
    req.headers_mut().insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );

    let resp = client.execute(req).await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

/// Fetches a URL as text within a deadline.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String>;
}

#[async_trait]
impl<C: HttpClient> Transport for C {
    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String> {
        let bytes = fetch_bytes(self, url, timeout).await?;
        String::from_utf8(bytes).context("Response body is not UTF-8")
    }
}

/// Direct and relay routes to one upstream.
pub struct Fallback<D, R> {
    pub direct: D,
    pub relay: R,
    pub relay_prefix: String,
    pub direct_timeout: Duration,
    pub relay_timeout: Duration,
}

impl<D: Transport, R: Transport> Fallback<D, R> {
    /// Tries the direct URL, then the relay-prefixed URL once.
    pub async fn fetch(&self, url: &str, label: &str) -> Result<String> {
        match self.direct.get_text(url, self.direct_timeout).await {
            Ok(body) => return Ok(body),
            Err(e) => warn!(source = label, error = %e, "Direct fetch failed, trying relay"),
        }

        let relayed = format!("{}{}", self.relay_prefix, url);
        debug!(source = label, "Fetching through relay");
        self.relay
            .get_text(&relayed, self.relay_timeout)
            .await
            .with_context(|| format!("All fetch routes failed for {label}"))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Canned responses keyed by URL prefix; records every URL asked for.
    #[derive(Default)]
    pub struct MockTransport {
        pub responses: HashMap<String, String>,
        pub calls: Mutex<Vec<String>>,
    }

    impl MockTransport {
        pub fn with(mut self, url_prefix: &str, body: &str) -> Self {
            self.responses.insert(url_prefix.to_string(), body.to_string());
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn get_text(&self, url: &str, _timeout: Duration) -> Result<String> {
            self.calls.lock().unwrap().push(url.to_string());
            self.responses
                .iter()
                .filter(|(prefix, _)| url.starts_with(prefix.as_str()))
                .max_by_key(|(prefix, _)| prefix.len())
                .map(|(_, body)| body.clone())
                .ok_or_else(|| anyhow::anyhow!("connection refused: {url}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;

    fn fallback(
        direct: MockTransport,
        relay: MockTransport,
    ) -> Fallback<MockTransport, MockTransport> {
        Fallback {
            direct,
            relay,
            relay_prefix: "https://relay.test/fetch/".to_string(),
            direct_timeout: Duration::from_secs(15),
            relay_timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn test_direct_success_skips_relay() {
        let f = fallback(
            MockTransport::default().with("https://vendor.test", "[]"),
            MockTransport::default(),
        );
        assert_eq!(f.fetch("https://vendor.test/a", "primary").await.unwrap(), "[]");
        assert!(f.relay.calls().is_empty());
    }

    #[tokio::test]
    async fn test_relay_used_after_direct_failure() {
        let f = fallback(
            MockTransport::default(),
            MockTransport::default().with("https://relay.test/fetch/https://vendor.test", "ok"),
        );
        assert_eq!(f.fetch("https://vendor.test/a", "primary").await.unwrap(), "ok");
        assert_eq!(f.relay.calls(), vec!["https://relay.test/fetch/https://vendor.test/a"]);
    }

    #[tokio::test]
    async fn test_both_routes_failing_is_an_error() {
        let f = fallback(MockTransport::default(), MockTransport::default());
        assert!(f.fetch("https://vendor.test/a", "primary").await.is_err());
        assert_eq!(f.direct.calls().len(), 1);
        assert_eq!(f.relay.calls().len(), 1);
    }
}
