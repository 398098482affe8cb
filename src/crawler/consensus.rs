//! Consensus height calculation and staleness filtering
//!
//! Pure functions of the crawl pipeline: host deduplication, the
//! network-wide median height, the strict staleness cutoff, and the
//! latency sort for the published snapshot.
//!
//! This median averages the two middle values on even-length input. The
//! height query service deliberately uses a different, non-averaging
//! median (`height::median_floor_index`); the two must not be unified,
//! since their results differ at even-length boundaries.

use crate::types::{NodeIdentity, PeerRecord};

/// Median of the collected heights, `None` for empty input.
///
/// `None` is distinct from a computed median of 0: it means consensus is
/// undeterminable and the staleness filter must pass everything through.
/// Even-length input averages the two middle values, so the result can
/// land between integers.
pub fn median_height(heights: &[u64]) -> Option<f64> {
    if heights.is_empty() {
        return None;
    }

    let mut sorted = heights.to_vec();
    sorted.sort_unstable();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0)
    } else {
        Some(sorted[mid] as f64)
    }
}

/// Drop records whose height lags the consensus median by the threshold
/// or more; the boundary is strict (`height > median - threshold` keeps).
///
/// Without a median, everything passes: data is not discarded when
/// consensus is undeterminable.
pub fn filter_stale(records: Vec<PeerRecord>, median: Option<f64>, threshold: u64) -> Vec<PeerRecord> {
    let Some(median) = median else {
        return records;
    };

    let cutoff = median - threshold as f64;
    records
        .into_iter()
        .filter(|record| record.height as f64 > cutoff)
        .collect()
}

/// Sort ascending by measured response time.
///
/// A record without a measurement carries 0 and sorts to the front;
/// consumers must treat 0 as "unknown", not "fastest".
pub fn sort_by_response_time(records: &mut [PeerRecord]) {
    records.sort_by_key(|record| record.response_time);
}

/// Collapse a merged peer list to one entry per host.
///
/// First occurrence wins and input order is preserved; entries without a
/// host are discarded.
pub fn deduplicate_by_host(peers: Vec<NodeIdentity>) -> Vec<NodeIdentity> {
    let mut seen = std::collections::HashSet::new();
    peers
        .into_iter()
        .filter(|peer| !peer.host.is_empty() && seen.insert(peer.host.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, height: u64, response_time: u64) -> PeerRecord {
        PeerRecord {
            balance: 0,
            endpoint: format!("http://{}.test:3000", name),
            finalized_epoch: 0,
            finalized_hash: String::new(),
            finalized_height: 0,
            finalized_point: 0,
            height,
            is_healthy: None,
            is_ssl_enabled: false,
            main_public_key: String::new(),
            name: name.to_string(),
            node_public_key: String::new(),
            rest_version: String::new(),
            roles: 0,
            version: String::new(),
            host: format!("{}.test", name),
            port: 7900,
            response_time,
        }
    }

    fn identity(host: &str) -> NodeIdentity {
        NodeIdentity {
            host: host.to_string(),
            friendly_name: host.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_median_odd_count() {
        assert_eq!(median_height(&[300, 100, 200]), Some(200.0));
        assert_eq!(median_height(&[5]), Some(5.0));
    }

    #[test]
    fn test_median_even_count_averages() {
        assert_eq!(median_height(&[100, 200]), Some(150.0));
        assert_eq!(median_height(&[100, 80]), Some(90.0));
        // Adjacent middles average to a half-step
        assert_eq!(median_height(&[100, 101, 102, 103]), Some(101.5));
    }

    #[test]
    fn test_median_empty_is_distinct_from_zero() {
        assert_eq!(median_height(&[]), None);
        assert_eq!(median_height(&[0, 0, 0]), Some(0.0));
    }

    #[test]
    fn test_filter_strict_boundary() {
        // median 100, threshold 20: exactly (median - threshold) is excluded,
        // one above is included
        let records = vec![record("at-cutoff", 80, 0), record("above-cutoff", 81, 0)];
        let kept = filter_stale(records, Some(100.0), 20);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "above-cutoff");
    }

    #[test]
    fn test_filter_without_median_keeps_everything() {
        let records = vec![record("a", 1, 0), record("b", 1_000_000, 0)];
        let kept = filter_stale(records, None, 20);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_filter_heights_100_80_threshold_10() {
        // median 90, cutoff 80: the peer at 80 is excluded (80 <= 80)
        let records = vec![record("high", 100, 0), record("low", 80, 0)];
        let median = median_height(&[100, 80]);
        assert_eq!(median, Some(90.0));

        let kept = filter_stale(records, median, 10);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "high");
    }

    #[test]
    fn test_filter_heights_100_50_threshold_40() {
        // median 75, cutoff 35: both peers survive
        let records = vec![record("high", 100, 0), record("low", 50, 0)];
        let median = median_height(&[100, 50]);
        assert_eq!(median, Some(75.0));

        let kept = filter_stale(records, median, 40);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_sort_by_response_time() {
        let mut records = vec![
            record("slow", 0, 300),
            record("unmeasured", 0, 0),
            record("fast", 0, 20),
        ];
        sort_by_response_time(&mut records);
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        // Zero (unknown) sorts to the front
        assert_eq!(names, vec!["unmeasured", "fast", "slow"]);
    }

    #[test]
    fn test_deduplicate_first_occurrence_wins() {
        let mut first = identity("a.test");
        first.public_key = "FIRST".to_string();
        let mut second = identity("a.test");
        second.public_key = "SECOND".to_string();

        let unique = deduplicate_by_host(vec![first, identity("b.test"), second]);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].host, "a.test");
        assert_eq!(unique[0].public_key, "FIRST");
        assert_eq!(unique[1].host, "b.test");
    }

    #[test]
    fn test_deduplicate_discards_missing_host() {
        let unique = deduplicate_by_host(vec![NodeIdentity::default(), identity("a.test")]);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].host, "a.test");
    }
}
