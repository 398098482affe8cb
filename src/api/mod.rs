//! HTTP API Module
//!
//! Serving surface for downstream consumers: the consensus height lookup,
//! the raw persisted snapshot, and the P2P peer projection. This layer only
//! reads what the crawl pipeline persisted; it never probes peers itself.

mod routes;

pub use routes::{run_api_server, ApiState};
