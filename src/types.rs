//! Core types for the node watcher
//!
//! Wire types consumed from the Symbol REST surface (`/node/peers`,
//! `/chain/info`, `/node/info`, `/node/server`) and the record types this
//! service produces: the persisted snapshot entry, the height summary, and
//! the P2P peer projection.

use serde::{Deserialize, Serialize};

// =============================================================================
// ROLE BITMASK
// =============================================================================

/// Role bit: node accepts peer connections
pub const ROLE_PEER: u64 = 1;

/// Role bit: node exposes the REST API
pub const ROLE_API: u64 = 2;

/// Role bit: node participates in finalization voting
pub const ROLE_VOTING: u64 = 4;

/// Render a role bitmask as a comma-joined label set, e.g. `"Peer, Api"`.
///
/// Unknown high bits are ignored; a mask with none of the known bits set
/// renders as an empty string.
pub fn role_labels(roles: u64) -> String {
    let mut labels = Vec::new();
    if roles & ROLE_PEER != 0 {
        labels.push("Peer");
    }
    if roles & ROLE_API != 0 {
        labels.push("Api");
    }
    if roles & ROLE_VOTING != 0 {
        labels.push("Voting");
    }
    labels.join(", ")
}

// =============================================================================
// CONSUMED REST TYPES
// =============================================================================

/// Node identity as reported by `/node/peers` entries and `/node/info`.
///
/// Peer lists from the wild are sparse; every field defaults so a partial
/// entry still decodes. An entry without a host is discarded downstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeIdentity {
    /// Packed protocol version (rendered dot-hex for display)
    pub version: u32,
    pub public_key: String,
    pub network_generation_hash_seed: String,
    /// Role bitmask (bit 0 = Peer, bit 1 = Api, bit 2 = Voting)
    pub roles: u64,
    pub port: u16,
    pub network_identifier: u32,
    pub host: String,
    pub friendly_name: String,
    pub node_public_key: String,
}

/// `/chain/info` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    /// Chain height as a decimal string; non-numeric values are treated as
    /// invalid and excluded from aggregation
    pub height: String,
    pub latest_finalized_block: FinalizedBlock,
}

impl ChainInfo {
    /// Parse the reported height, `None` if it is not a decimal integer.
    pub fn parsed_height(&self) -> Option<u64> {
        self.height.trim().parse().ok()
    }
}

/// Finalized-block record inside `/chain/info`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FinalizedBlock {
    pub finalization_epoch: u64,
    pub finalization_point: u64,
    pub height: u64,
    pub hash: String,
}

/// `/node/server` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeServerInfo {
    pub server_info: ServerInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerInfo {
    pub rest_version: String,
}

// =============================================================================
// PRODUCED TYPES
// =============================================================================

/// One persisted snapshot entry, assembled from a successful probe.
///
/// Constructed once per crawl cycle and immutable afterwards; the snapshot
/// file is fully replaced each cycle, there is no incremental merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    /// Present in the published format, not computed by this service
    pub balance: u64,
    /// Plaintext REST endpoint, always port 3000 regardless of the scheme
    /// that answered the probe (downstream consumers speak plaintext)
    pub endpoint: String,
    pub finalized_epoch: u64,
    pub finalized_hash: String,
    pub finalized_height: u64,
    pub finalized_point: u64,
    pub height: u64,
    /// Present in the published format, not computed by this service
    pub is_healthy: Option<bool>,
    /// True iff the probe succeeded over HTTPS
    pub is_ssl_enabled: bool,
    pub main_public_key: String,
    pub name: String,
    pub node_public_key: String,
    pub rest_version: String,
    pub roles: u64,
    /// Protocol version rendered dot-hex, e.g. `"1.0.2.6"`
    pub version: String,
    pub host: String,
    pub port: u16,
    /// Measured round-trip for the node-info/node-server pair, in ms
    pub response_time: u64,
}

/// Result of the height query service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeightSummary {
    pub finalized_height: u64,
    pub height: u64,
}

/// P2P peer projection entry served to plaintext peers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownPeer {
    pub public_key: String,
    pub endpoint: KnownPeerEndpoint,
    pub metadata: KnownPeerMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownPeerEndpoint {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownPeerMetadata {
    pub name: String,
    pub roles: String,
}

// =============================================================================
// VERSION RENDERING
// =============================================================================

/// Render a packed protocol version as a dot-separated hex string.
///
/// The u32 is split into four bytes, each rendered as two hex digits with a
/// single leading zero stripped: `0x01000206` becomes `"1.0.2.6"`.
pub fn version_to_string(version: u32) -> String {
    let hex = format!("{:08x}", version);
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let part = std::str::from_utf8(pair).unwrap_or("00");
            if let Some(stripped) = part.strip_prefix('0') {
                stripped.to_string()
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}
