//! Watcher configuration
//!
//! All tunables for the crawl pipeline and the height query service.
//! Values are environment-sourced with sensible defaults; CLI flags may
//! override individual fields via the builder methods.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default probe group size for the bounded crawl scheduler
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Default per-request timeout for crawl probes (ms)
pub const DEFAULT_CRAWL_TIMEOUT_MS: u64 = 3000;

/// Default allowed height deficit below the consensus median
pub const DEFAULT_HEIGHT_THRESHOLD: u64 = 20;

/// Default freshness window for the cached height summary (seconds)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30;

/// Default per-call timeout for the height query fan-out (ms)
pub const DEFAULT_HEIGHT_QUERY_TIMEOUT_MS: u64 = 2000;

/// Default crawl schedule (every 10 minutes)
pub const DEFAULT_CRAWL_SCHEDULE: &str = "*/10 * * * *";

/// Default snapshot output path
pub const DEFAULT_SNAPSHOT_PATH: &str = "public/nodewatch-peers.json";

/// Probe target: scheme and REST port tried by the peer prober
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub scheme: String,
    pub port: u16,
}

impl ProbeTarget {
    pub fn new(scheme: &str, port: u16) -> Self {
        Self { scheme: scheme.to_string(), port }
    }

    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }

    /// Base URL for this target against a bare host
    pub fn base_url(&self, host: &str) -> String {
        format!("{}://{}:{}", self.scheme, host, self.port)
    }
}

/// Main configuration for the node watcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    // === Sources ===
    /// Pre-configured, assumed-reliable REST endpoints used as discovery
    /// seeds and as height-consensus sources
    pub trusted_nodes: Vec<String>,

    // === Crawl pipeline ===
    /// Maximum concurrent outbound probes per group
    pub chunk_size: usize,

    /// Per-request timeout for crawl probes (ms); also the outer
    /// abandon-after window around each probe step
    pub crawl_timeout_ms: u64,

    /// Peers at or below (median - threshold) are dropped from the snapshot
    pub height_threshold: u64,

    /// Scheme/port pairs tried in order by the prober
    pub probe_targets: Vec<ProbeTarget>,

    /// Crawl schedule expression; only the `*/N * * * *` form is
    /// interpreted (every N minutes), anything else falls back to default
    pub crawl_schedule: String,

    /// Snapshot output path, fully replaced each cycle
    pub snapshot_path: String,

    // === Height query service ===
    /// Freshness window for the cached height summary (seconds)
    pub cache_ttl_secs: u64,

    /// Per-call timeout for the height query fan-out (ms)
    pub height_query_timeout_ms: u64,

    // === API ===
    /// HTTP API listen port
    pub api_port: u16,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            trusted_nodes: vec![],
            chunk_size: DEFAULT_CHUNK_SIZE,
            crawl_timeout_ms: DEFAULT_CRAWL_TIMEOUT_MS,
            height_threshold: DEFAULT_HEIGHT_THRESHOLD,
            probe_targets: vec![
                ProbeTarget::new("https", 3001),
                ProbeTarget::new("http", 3000),
            ],
            crawl_schedule: DEFAULT_CRAWL_SCHEDULE.to_string(),
            snapshot_path: DEFAULT_SNAPSHOT_PATH.to_string(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            height_query_timeout_ms: DEFAULT_HEIGHT_QUERY_TIMEOUT_MS,
            api_port: 3000,
        }
    }
}

impl WatchConfig {
    /// Build configuration from the process environment.
    ///
    /// Recognized keys: `TRUSTED_NODES` (comma-separated URLs),
    /// `CRAWL_CHUNK_SIZE`, `CRAWL_TIMEOUT_MS`, `HEIGHT_THRESHOLD`,
    /// `HEIGHT_CACHE_TTL_SECS`, `HEIGHT_QUERY_TIMEOUT_MS`, `CRAWL_SCHEDULE`,
    /// `SNAPSHOT_PATH`, `PORT`. Unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            trusted_nodes: parse_node_list(&env_var("TRUSTED_NODES")),
            chunk_size: parse_or(&env_var("CRAWL_CHUNK_SIZE"), defaults.chunk_size),
            crawl_timeout_ms: parse_or(&env_var("CRAWL_TIMEOUT_MS"), defaults.crawl_timeout_ms),
            height_threshold: parse_or(&env_var("HEIGHT_THRESHOLD"), defaults.height_threshold),
            probe_targets: defaults.probe_targets,
            crawl_schedule: non_empty_or(&env_var("CRAWL_SCHEDULE"), &defaults.crawl_schedule),
            snapshot_path: non_empty_or(&env_var("SNAPSHOT_PATH"), &defaults.snapshot_path),
            cache_ttl_secs: parse_or(&env_var("HEIGHT_CACHE_TTL_SECS"), defaults.cache_ttl_secs),
            height_query_timeout_ms: parse_or(
                &env_var("HEIGHT_QUERY_TIMEOUT_MS"),
                defaults.height_query_timeout_ms,
            ),
            api_port: parse_or(&env_var("PORT"), defaults.api_port),
        }
    }

    // Builder-style methods for CLI overrides

    pub fn with_api_port(mut self, port: u16) -> Self {
        self.api_port = port;
        self
    }

    pub fn with_snapshot_path(mut self, path: Option<String>) -> Self {
        if let Some(path) = path {
            self.snapshot_path = path;
        }
        self
    }

    pub fn crawl_timeout(&self) -> Duration {
        Duration::from_millis(self.crawl_timeout_ms)
    }

    pub fn height_query_timeout(&self) -> Duration {
        Duration::from_millis(self.height_query_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Interval between crawl cycles, derived from the schedule expression.
    ///
    /// Only the original `*/N * * * *` cron form is interpreted; anything
    /// else yields the 10-minute default.
    pub fn crawl_interval(&self) -> Duration {
        match parse_every_n_minutes(&self.crawl_schedule) {
            Some(minutes) => Duration::from_secs(minutes * 60),
            None => Duration::from_secs(600),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be at least 1");
        }

        if self.crawl_timeout_ms == 0 {
            anyhow::bail!("crawl_timeout_ms must be at least 1");
        }

        if self.probe_targets.is_empty() {
            anyhow::bail!("at least one probe target is required");
        }

        if self.trusted_nodes.iter().any(|url| url.is_empty()) {
            anyhow::bail!("trusted node URLs must be non-empty");
        }

        Ok(())
    }
}

fn env_var(key: &str) -> String {
    std::env::var(key).unwrap_or_default()
}

/// Split a comma-separated URL list, trimming and dropping empty entries
fn parse_node_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect()
}

fn parse_or<T: std::str::FromStr>(raw: &str, default: T) -> T {
    raw.trim().parse().unwrap_or(default)
}

fn non_empty_or(raw: &str, default: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Interpret a `*/N * * * *` cron expression as "every N minutes"
fn parse_every_n_minutes(schedule: &str) -> Option<u64> {
    let mut fields = schedule.split_whitespace();
    let minute = fields.next()?;
    if fields.count() != 4 {
        return None;
    }

    let n: u64 = minute.strip_prefix("*/")?.parse().ok()?;
    if n == 0 || n > 59 {
        return None;
    }
    Some(n)
}
