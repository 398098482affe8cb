//! Crawl pipeline
//!
//! One crawl cycle discovers peers from the trusted nodes, deduplicates
//! them by host, probes each peer in bounded parallel groups, computes the
//! network-wide consensus height, drops peers that lag behind it, and
//! atomically replaces the published snapshot.
//!
//! Failure containment: a failing peer or trusted node only removes itself
//! from the cycle's output; only a snapshot write failure fails the cycle,
//! and even that never takes down the process — the scheduler retries on
//! the next tick.

pub mod consensus;
pub mod snapshot;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::config::{ProbeTarget, WatchConfig};
use crate::rest::NodeApi;
use crate::types::{version_to_string, ChainInfo, NodeIdentity, PeerRecord};
use snapshot::SnapshotStore;

/// Fixed plaintext REST port used for published endpoints, regardless of
/// which scheme answered the probe (downstream consumers speak plaintext)
const PLAINTEXT_REST_PORT: u16 = 3000;

/// Outcome of one crawl cycle
#[derive(Debug, Clone, Copy)]
pub struct CrawlSummary {
    /// Candidate peers across all trusted nodes, duplicates included
    pub discovered: usize,
    /// Unique hosts after deduplication
    pub unique: usize,
    /// Peers that answered every probe stage
    pub responsive: usize,
    /// Records written to the snapshot after the staleness filter
    pub published: usize,
    /// Consensus median height, if any peer reported one
    pub median_height: Option<f64>,
}

/// Drives the crawl pipeline against a [`NodeApi`] implementation
pub struct Crawler<A: NodeApi> {
    config: Arc<WatchConfig>,
    api: Arc<A>,
    store: SnapshotStore,
}

impl<A: NodeApi> Crawler<A> {
    pub fn new(config: Arc<WatchConfig>, api: Arc<A>) -> Self {
        let store = SnapshotStore::new(&config.snapshot_path);
        Self { config, api, store }
    }

    /// Run one full crawl cycle and replace the snapshot.
    ///
    /// Only snapshot persistence can fail the cycle; every network failure
    /// just shrinks the output.
    pub async fn run_cycle(&self) -> anyhow::Result<CrawlSummary> {
        info!("Crawl cycle starting");
        info!("Trusted nodes: {}", self.config.trusted_nodes.join(", "));

        let candidates = self.discover_peers().await;
        let discovered = candidates.len();

        let unique = consensus::deduplicate_by_host(candidates);
        info!("Unique node peers: {}", unique.len());

        let records = self.probe_all(&unique).await;
        let responsive = records.len();

        // Median over every height that made it through a probe; peers that
        // failed any stage contribute nothing
        let heights: Vec<u64> = records.iter().map(|record| record.height).collect();
        let median = consensus::median_height(&heights);
        match median {
            Some(median) => info!("Median height: {}", median),
            None => error!("No valid heights available to calculate median"),
        }

        let mut filtered = consensus::filter_stale(records, median, self.config.height_threshold);
        consensus::sort_by_response_time(&mut filtered);

        self.store.write(&filtered).await?;

        let summary = CrawlSummary {
            discovered,
            unique: unique.len(),
            responsive,
            published: filtered.len(),
            median_height: median,
        };
        info!(
            "Crawl cycle finished: {} discovered, {} unique, {} responsive, {} published",
            summary.discovered, summary.unique, summary.responsive, summary.published
        );
        Ok(summary)
    }

    /// Fetch the peer list of every trusted node in parallel and flatten.
    ///
    /// Trusted nodes are pre-configured with working endpoints, so there is
    /// no scheme fallback here; a failing node contributes zero peers.
    async fn discover_peers(&self) -> Vec<NodeIdentity> {
        let timeout = self.config.crawl_timeout();

        let mut handles = Vec::new();
        for url in &self.config.trusted_nodes {
            let api = self.api.clone();
            let url = url.clone();
            handles.push(tokio::spawn(async move {
                let peers = api.node_peers(&url, timeout).await;
                if peers.is_none() {
                    warn!("Trusted node contributed no peers: {}", url);
                }
                peers.unwrap_or_default()
            }));
        }

        let mut candidates = Vec::new();
        for handle in handles {
            if let Ok(peers) = handle.await {
                candidates.extend(peers);
            }
        }
        candidates
    }

    /// Probe the unique peer set in fixed-size groups.
    ///
    /// Groups run strictly in sequence; within a group every peer is probed
    /// concurrently, bounding in-flight probes to the group size. Output
    /// order follows group order, then intra-group launch order.
    async fn probe_all(&self, peers: &[NodeIdentity]) -> Vec<PeerRecord> {
        let mut records = Vec::new();
        for chunk in peers.chunks(self.config.chunk_size) {
            let handles: Vec<_> = chunk
                .iter()
                .map(|peer| {
                    let api = self.api.clone();
                    let config = self.config.clone();
                    let peer = peer.clone();
                    tokio::spawn(async move { probe_peer(api, config, peer).await })
                })
                .collect();

            for handle in handles {
                if let Ok(Some(record)) = handle.await {
                    records.push(record);
                }
            }
        }
        records
    }
}

/// Probe one peer and assemble its snapshot record.
///
/// Tries each configured scheme/port in order (default HTTPS:3001 then
/// HTTP:3000) for `/chain/info`; the first scheme that answers is used for
/// the concurrent node-info/node-server pair, whose wall-clock time becomes
/// the peer's measured response time. Any absent stage drops the peer.
async fn probe_peer<A: NodeApi>(
    api: Arc<A>,
    config: Arc<WatchConfig>,
    peer: NodeIdentity,
) -> Option<PeerRecord> {
    let timeout = config.crawl_timeout();

    // Each attempt carries a second, outer window on top of the client's
    // own timeout. The outer window abandons the in-flight request rather
    // than cancelling it (known resource-cleanliness gap, kept on purpose).
    let mut reached: Option<(ChainProbe, &ProbeTarget)> = None;
    for target in &config.probe_targets {
        let base_url = target.base_url(&peer.host);
        let attempt = abandon_after(timeout, {
            let api = api.clone();
            async move { api.chain_info(&base_url, timeout).await }
        })
        .await
        .flatten();

        match attempt {
            Some(chain_info) => {
                reached = Some((chain_info_probe(&peer, chain_info)?, target));
                break;
            }
            None => warn!(
                "Node peer is not reachable over {}: {}",
                target.scheme, peer.host
            ),
        }
    }

    let Some((chain, target)) = reached else {
        warn!("Dropping unreachable peer: {}", peer.host);
        return None;
    };

    let base_url = target.base_url(&peer.host);
    let started = Instant::now();
    let (node_info, node_server) = tokio::join!(
        abandon_after(timeout, {
            let api = api.clone();
            let base_url = base_url.clone();
            async move { api.node_info(&base_url, timeout).await }
        }),
        abandon_after(timeout, {
            let api = api.clone();
            let base_url = base_url.clone();
            async move { api.node_server(&base_url, timeout).await }
        }),
    );
    let response_time = started.elapsed().as_millis() as u64;

    let (Some(Some(node_info)), Some(Some(node_server))) = (node_info, node_server) else {
        warn!("Incomplete node metadata, dropping peer: {}", peer.host);
        return None;
    };

    Some(PeerRecord {
        balance: 0,
        endpoint: format!("http://{}:{}", peer.host, PLAINTEXT_REST_PORT),
        finalized_epoch: chain.finalized_epoch,
        finalized_hash: chain.finalized_hash,
        finalized_height: chain.finalized_height,
        finalized_point: chain.finalized_point,
        height: chain.height,
        is_healthy: None,
        is_ssl_enabled: target.is_https(),
        main_public_key: node_info.public_key,
        name: node_info.friendly_name,
        node_public_key: node_info.node_public_key,
        rest_version: node_server.server_info.rest_version,
        roles: node_info.roles,
        version: version_to_string(node_info.version),
        host: peer.host,
        port: node_info.port,
        response_time,
    })
}

/// Chain state extracted from a successful `/chain/info` probe
struct ChainProbe {
    height: u64,
    finalized_epoch: u64,
    finalized_point: u64,
    finalized_height: u64,
    finalized_hash: String,
}

/// Validate a chain-info body; a non-numeric height invalidates the probe
fn chain_info_probe(peer: &NodeIdentity, chain_info: ChainInfo) -> Option<ChainProbe> {
    let Some(height) = chain_info.parsed_height() else {
        warn!(
            "Invalid height {:?} from peer {}, dropping",
            chain_info.height, peer.host
        );
        return None;
    };

    let finalized = chain_info.latest_finalized_block;
    Some(ChainProbe {
        height,
        finalized_epoch: finalized.finalization_epoch,
        finalized_point: finalized.finalization_point,
        finalized_height: finalized.height,
        finalized_hash: finalized.hash,
    })
}

/// Wait at most `window` for a spawned future.
///
/// When the window elapses the task is abandoned, not aborted: it keeps
/// running detached and its result is discarded.
async fn abandon_after<T, F>(window: Duration, future: F) -> Option<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(window, tokio::spawn(future)).await {
        Ok(Ok(value)) => Some(value),
        _ => None,
    }
}

/// Run crawl cycles forever on the configured interval.
///
/// Cycle failures are logged and swallowed; the next tick retries from
/// scratch.
pub async fn run_scheduler<A: NodeApi>(crawler: Arc<Crawler<A>>, period: Duration) -> anyhow::Result<()> {
    info!("Crawl scheduler running every {:?}", period);
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;
        if let Err(e) = crawler.run_cycle().await {
            error!("Crawl cycle failed: {:#}", e);
        }
    }
}
