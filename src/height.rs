//! Height query service
//!
//! On-demand, cache-fronted consensus height lookup. Unlike the crawl
//! pipeline it queries the trusted nodes directly (never the persisted
//! snapshot), and it uses a non-averaging median: after sorting, the
//! element at `len / 2` is the consensus height, even for even-length
//! input. That divergence from `crawler::consensus::median_height` is
//! intentional and must not be unified.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::config::WatchConfig;
use crate::rest::NodeApi;
use crate::types::HeightSummary;

/// Typed failures of the height query, surfaced distinctly to the caller
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeightError {
    /// No trusted node produced a valid numeric height
    #[error("failed to fetch a height from any trusted node")]
    NoData,

    /// No node reported a height at or above the computed median; should
    /// be impossible with this median, handled rather than crashed on
    #[error("no trusted node at or above the median height")]
    NoConsensusNode,
}

/// Single-entry TTL cache for the height summary.
///
/// Invalidated purely by elapsed wall-clock time since capture, never
/// explicitly.
pub struct HeightCache {
    ttl: Duration,
    entry: Option<(HeightSummary, Instant)>,
}

impl HeightCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    /// Cached summary, if captured within the TTL window
    pub fn get(&self) -> Option<HeightSummary> {
        let (summary, captured_at) = self.entry.as_ref()?;
        if captured_at.elapsed() < self.ttl {
            Some(*summary)
        } else {
            None
        }
    }

    pub fn put(&mut self, summary: HeightSummary) {
        self.entry = Some((summary, Instant::now()));
    }
}

/// Cache-fronted consensus height lookup against the trusted nodes
pub struct HeightService<A: NodeApi> {
    config: Arc<WatchConfig>,
    api: Arc<A>,
    cache: RwLock<HeightCache>,
}

impl<A: NodeApi> HeightService<A> {
    pub fn new(config: Arc<WatchConfig>, api: Arc<A>) -> Self {
        let cache = RwLock::new(HeightCache::new(config.cache_ttl()));
        Self { config, api, cache }
    }

    /// Resolve the consensus height, serving from cache when warm.
    ///
    /// Cold path: fan out `/chain/info` across all trusted nodes, keep the
    /// valid numeric results, take the non-averaging median, and return the
    /// first node (in configured order) at or above it. Cache population is
    /// deliberately unguarded against concurrent cold queries; both do the
    /// work and the last writer wins.
    pub async fn query(&self) -> Result<HeightSummary, HeightError> {
        if let Some(cached) = self.cache.read().await.get() {
            debug!("Serving height from cache: {:?}", cached);
            return Ok(cached);
        }

        let heights = self.fetch_heights().await;
        if heights.is_empty() {
            error!("Failed to fetch a height from any trusted node");
            return Err(HeightError::NoData);
        }

        let median = median_floor_index(&heights.iter().map(|(h, _)| *h).collect::<Vec<_>>());
        debug!("Median height across trusted nodes: {}", median);

        // First node in original query order at or above the median
        let selected = heights
            .iter()
            .find(|(height, _)| *height >= median)
            .ok_or_else(|| {
                error!("No trusted node at or above median height {}", median);
                HeightError::NoConsensusNode
            })?;

        let summary = HeightSummary {
            height: selected.0,
            finalized_height: selected.1,
        };
        info!(
            "Consensus height {} (finalized {})",
            summary.height, summary.finalized_height
        );

        self.cache.write().await.put(summary);
        Ok(summary)
    }

    /// Query every trusted node in parallel, preserving configured order.
    ///
    /// Each call is bounded by the short per-call timeout; failures and
    /// non-numeric heights contribute nothing.
    async fn fetch_heights(&self) -> Vec<(u64, u64)> {
        let timeout = self.config.height_query_timeout();

        let handles: Vec<_> = self
            .config
            .trusted_nodes
            .iter()
            .map(|url| {
                let api = self.api.clone();
                let url = url.clone();
                tokio::spawn(async move { api.chain_info(&url, timeout).await })
            })
            .collect();

        let mut heights = Vec::new();
        for handle in handles {
            let Ok(Some(chain_info)) = handle.await else {
                continue;
            };
            if let Some(height) = chain_info.parsed_height() {
                heights.push((height, chain_info.latest_finalized_block.height));
            }
        }
        heights
    }
}

/// Non-averaging median: the sorted element at index `len / 2`.
///
/// For even-length input this picks the upper middle instead of averaging
/// the two middles; the crawl pipeline's calculator averages. Keep both.
fn median_floor_index(heights: &[u64]) -> u64 {
    let mut sorted = heights.to_vec();
    sorted.sort_unstable();
    sorted[sorted.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::testing::{MockNodeApi, MockResponse};

    fn chain_info_json(height: &str, finalized_height: u64) -> serde_json::Value {
        serde_json::json!({
            "height": height,
            "latestFinalizedBlock": {
                "finalizationEpoch": 1,
                "finalizationPoint": 1,
                "height": finalized_height,
                "hash": "AB"
            }
        })
    }

    fn test_config(trusted: &[&str]) -> Arc<WatchConfig> {
        Arc::new(WatchConfig {
            trusted_nodes: trusted.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
    }

    #[test]
    fn test_median_floor_index_upper_middle_on_even() {
        assert_eq!(median_floor_index(&[100, 200]), 200);
        assert_eq!(median_floor_index(&[1, 2, 3, 4]), 3);
        assert_eq!(median_floor_index(&[5]), 5);
        assert_eq!(median_floor_index(&[30, 10, 20]), 20);
    }

    #[tokio::test]
    async fn test_higher_node_wins_on_even_count() {
        // Heights {100, 200}: the non-averaging median is 200, so the
        // higher node is the first at-or-above-median selection
        let api = MockNodeApi::new()
            .script(
                "http://t1.test:3000/chain/info",
                MockResponse::Json(chain_info_json("100", 90)),
            )
            .script(
                "http://t2.test:3000/chain/info",
                MockResponse::Json(chain_info_json("200", 190)),
            );

        let service = HeightService::new(
            test_config(&["http://t1.test:3000", "http://t2.test:3000"]),
            Arc::new(api),
        );

        let summary = service.query().await.unwrap();
        assert_eq!(summary.height, 200);
        assert_eq!(summary.finalized_height, 190);
    }

    #[tokio::test]
    async fn test_cache_short_circuits_within_ttl() {
        let api = Arc::new(MockNodeApi::new().script(
            "http://t1.test:3000/chain/info",
            MockResponse::Json(chain_info_json("100", 90)),
        ));
        let service = HeightService::new(test_config(&["http://t1.test:3000"]), api.clone());

        let first = service.query().await.unwrap();
        let calls_after_first = api.call_count();

        // Second query inside the TTL window: identical result, zero
        // additional network calls
        let second = service.query().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(api.call_count(), calls_after_first);
    }

    #[tokio::test]
    async fn test_expired_cache_refetches() {
        let api = Arc::new(MockNodeApi::new().script(
            "http://t1.test:3000/chain/info",
            MockResponse::Json(chain_info_json("100", 90)),
        ));
        let config = Arc::new(WatchConfig {
            trusted_nodes: vec!["http://t1.test:3000".to_string()],
            cache_ttl_secs: 0,
            ..Default::default()
        });
        let service = HeightService::new(config, api.clone());

        service.query().await.unwrap();
        let calls_after_first = api.call_count();
        service.query().await.unwrap();
        assert!(api.call_count() > calls_after_first);
    }

    #[tokio::test]
    async fn test_all_nodes_failing_is_no_data() {
        let api = MockNodeApi::new()
            .script("http://t1.test:3000/chain/info", MockResponse::Fail)
            .script("http://t2.test:3000/chain/info", MockResponse::Fail);

        let service = HeightService::new(
            test_config(&["http://t1.test:3000", "http://t2.test:3000"]),
            Arc::new(api),
        );

        assert_eq!(service.query().await.unwrap_err(), HeightError::NoData);
    }

    #[tokio::test]
    async fn test_non_numeric_heights_are_no_data() {
        let api = MockNodeApi::new().script(
            "http://t1.test:3000/chain/info",
            MockResponse::Json(chain_info_json("garbage", 90)),
        );

        let service = HeightService::new(test_config(&["http://t1.test:3000"]), Arc::new(api));
        assert_eq!(service.query().await.unwrap_err(), HeightError::NoData);
    }

    #[tokio::test]
    async fn test_partial_failure_uses_remaining_nodes() {
        let api = MockNodeApi::new()
            .script("http://t1.test:3000/chain/info", MockResponse::Fail)
            .script(
                "http://t2.test:3000/chain/info",
                MockResponse::Json(chain_info_json("150", 140)),
            );

        let service = HeightService::new(
            test_config(&["http://t1.test:3000", "http://t2.test:3000"]),
            Arc::new(api),
        );

        let summary = service.query().await.unwrap();
        assert_eq!(summary.height, 150);
    }

    #[test]
    fn test_cache_ttl_zero_is_always_cold() {
        let mut cache = HeightCache::new(Duration::from_secs(0));
        cache.put(HeightSummary { height: 1, finalized_height: 1 });
        assert_eq!(cache.get(), None);
    }
}
