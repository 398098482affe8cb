//! Node REST client
//!
//! Thin typed client for the read-only REST surface exposed by Symbol
//! nodes. Every operation is a single timeout-bounded GET that decodes a
//! JSON body; any transport error, non-2xx status, timeout, or decode
//! failure is logged and collapses to `None`. No retries here — protocol
//! fallback is the prober's job.
//!
//! The [`NodeApi`] trait is the seam the crawl pipeline and the height
//! query service are generic over, so tests can script node behavior
//! without a network.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::types::{ChainInfo, NodeIdentity, NodeServerInfo};

/// Typed view of the consumed REST surface.
///
/// Each operation maps to one GET; `None` covers every failure mode
/// (transport, status, timeout, decode) — callers never see an error type.
#[async_trait]
pub trait NodeApi: Send + Sync + 'static {
    /// GET `/chain/info`
    async fn chain_info(&self, base_url: &str, timeout: Duration) -> Option<ChainInfo>;

    /// GET `/node/info`
    async fn node_info(&self, base_url: &str, timeout: Duration) -> Option<NodeIdentity>;

    /// GET `/node/server`
    async fn node_server(&self, base_url: &str, timeout: Duration) -> Option<NodeServerInfo>;

    /// GET `/node/peers`
    async fn node_peers(&self, base_url: &str, timeout: Duration) -> Option<Vec<NodeIdentity>>;
}

/// reqwest-backed implementation of [`NodeApi`].
///
/// One shared client; the timeout is applied per request and cancels the
/// in-flight request when it elapses.
pub struct NodeRestClient {
    client: reqwest::Client,
}

impl NodeRestClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("symbol-nodewatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        base_url: &str,
        path: &str,
        timeout: Duration,
    ) -> Option<T> {
        let url = join_url(base_url, path);
        debug!("Fetching from {}", url);

        let response = match self.client.get(&url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!("Timed out fetching from {}", url);
                return None;
            }
            Err(e) => {
                warn!("Error fetching from {}: {}", url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Failed to fetch from {}: {}", url, response.status());
            return None;
        }

        match response.json::<T>().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!("Invalid body from {}: {}", url, e);
                None
            }
        }
    }
}

#[async_trait]
impl NodeApi for NodeRestClient {
    async fn chain_info(&self, base_url: &str, timeout: Duration) -> Option<ChainInfo> {
        self.fetch(base_url, "/chain/info", timeout).await
    }

    async fn node_info(&self, base_url: &str, timeout: Duration) -> Option<NodeIdentity> {
        self.fetch(base_url, "/node/info", timeout).await
    }

    async fn node_server(&self, base_url: &str, timeout: Duration) -> Option<NodeServerInfo> {
        self.fetch(base_url, "/node/server", timeout).await
    }

    async fn node_peers(&self, base_url: &str, timeout: Duration) -> Option<Vec<NodeIdentity>> {
        self.fetch(base_url, "/node/peers", timeout).await
    }
}

/// Join a base URL and an absolute path without doubling slashes
fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted [`NodeApi`] double for pipeline tests.

    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::de::DeserializeOwned;

    use super::NodeApi;
    use crate::types::{ChainInfo, NodeIdentity, NodeServerInfo};

    /// Scripted behavior for one URL
    pub enum MockResponse {
        /// Respond immediately with this JSON body
        Json(serde_json::Value),
        /// Fail immediately (stands in for any transport/status/decode error)
        Fail,
        /// Sleep for the given duration, then fail (a peer that never answers)
        Hang(Duration),
    }

    /// Mock node API keyed by full URL (`base_url` + path).
    ///
    /// Unscripted URLs fail. Every call is recorded for assertions on
    /// call counts.
    #[derive(Default)]
    pub struct MockNodeApi {
        responses: Mutex<HashMap<String, MockResponse>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockNodeApi {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script(self, url: &str, response: MockResponse) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(url.to_string(), response);
            self
        }

        /// URLs requested so far, in order
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        async fn respond<T: DeserializeOwned>(&self, base_url: &str, path: &str) -> Option<T> {
            let url = super::join_url(base_url, path);
            self.calls.lock().unwrap().push(url.clone());

            // Mutex guard must not live across the sleep below
            let hang = {
                let responses = self.responses.lock().unwrap();
                match responses.get(&url) {
                    Some(MockResponse::Json(value)) => {
                        return serde_json::from_value(value.clone()).ok();
                    }
                    Some(MockResponse::Hang(duration)) => *duration,
                    Some(MockResponse::Fail) | None => return None,
                }
            };

            tokio::time::sleep(hang).await;
            None
        }
    }

    #[async_trait]
    impl NodeApi for MockNodeApi {
        async fn chain_info(&self, base_url: &str, _timeout: Duration) -> Option<ChainInfo> {
            self.respond(base_url, "/chain/info").await
        }

        async fn node_info(&self, base_url: &str, _timeout: Duration) -> Option<NodeIdentity> {
            self.respond(base_url, "/node/info").await
        }

        async fn node_server(&self, base_url: &str, _timeout: Duration) -> Option<NodeServerInfo> {
            self.respond(base_url, "/node/server").await
        }

        async fn node_peers(&self, base_url: &str, _timeout: Duration) -> Option<Vec<NodeIdentity>> {
            self.respond(base_url, "/node/peers").await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://node.test:3000", "/chain/info"),
            "http://node.test:3000/chain/info"
        );
        assert_eq!(
            join_url("http://node.test:3000/", "/chain/info"),
            "http://node.test:3000/chain/info"
        );
    }
}
