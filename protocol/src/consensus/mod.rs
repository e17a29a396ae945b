//! # Consensus Gateway
//!
//! Adapter to the external BFT consensus engine (Tendermint/CometBFT RPC).
//! The ledger core needs four things from it:
//!
//! | Call             | Engine method        | Retried | Purpose                        |
//! |------------------|----------------------|---------|--------------------------------|
//! | `anchor`         | `abci_info`          | yes     | salt for id derivation         |
//! | `broadcast_sync` | `broadcast_tx_sync`  | never   | mempool admission              |
//! | `search`         | `tx_search`          | yes     | indexed lookup by `bftx.id`    |
//! | `info`           | `abci_info`          | yes     | height and app hash for humans |
//!
//! A broadcast that times out is ambiguous (the engine may have admitted
//! it), so it is never retried here. Callers that want to retry one must
//! first check with `search`.
//!
//! ## Connection lifecycle
//!
//! Two gateways share one wire implementation ([`session::RpcSession`]):
//!
//! - [`ScopedGateway`] opens a session per call and releases it on every
//!   exit path. One-shot CLI commands use it.
//! - [`PersistentGateway`] holds one session behind an async mutex, reopens
//!   it after a transport failure and tears it down on `shutdown`. The API
//!   server uses it.
//!
//! [`LocalEngine`] implements the same trait in-process for tests and
//! offline development.

pub mod gateway;
pub mod local;
pub mod query;
pub mod session;
pub mod wire;

pub use gateway::{PersistentGateway, ScopedGateway};
pub use local::LocalEngine;
pub use query::EqualityQuery;
pub use session::RpcSession;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_RETRIES, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RPC_URL,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Timeout, refused connection, or any other transport failure.
    #[error("consensus engine unavailable: {0}")]
    Unavailable(String),

    /// The engine answered and said no.
    #[error("consensus engine rejected transaction (code {code}): {log}")]
    Rejected { code: u32, log: String },

    /// The engine answered with something we could not interpret.
    #[error("malformed consensus engine response: {0}")]
    Protocol(String),

    #[error("invalid search query: {0}")]
    InvalidQuery(String),

    /// The gateway was shut down.
    #[error("consensus session closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What the engine says after admitting a transaction to its mempool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReceipt {
    /// Engine transaction hash (upper-case hex SHA-256 of the raw bytes).
    pub hash: String,
    pub log: String,
}

/// One indexed transaction returned by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub hash: String,
    pub height: u64,
    /// Position of the transaction within its block.
    pub index: u64,
    /// The raw bytes that were broadcast.
    pub tx: Vec<u8>,
}

/// Summary of the engine's application state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInfo {
    /// Application name reported by the ABCI app.
    pub data: String,
    pub version: String,
    pub last_block_height: u64,
    /// Hex of the latest committed application hash, the id anchor.
    pub last_block_app_hash: String,
}

// ---------------------------------------------------------------------------
// Gateway trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ConsensusGateway: Send + Sync {
    /// Latest committed application-state hash.
    async fn anchor(&self) -> Result<Vec<u8>, GatewayError>;

    /// Submit raw transaction bytes for synchronous mempool admission.
    async fn broadcast_sync(&self, tx: &[u8]) -> Result<BroadcastReceipt, GatewayError>;

    /// Every indexed transaction matching `query`, in engine order. Empty
    /// when nothing matches.
    async fn search(&self, query: &EqualityQuery) -> Result<Vec<SearchHit>, GatewayError>;

    async fn info(&self) -> Result<EngineInfo, GatewayError>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Endpoint and timing for the RPC gateways. Loaded from the node's TOML
/// settings; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub rpc_url: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// Extra attempts for idempotent reads after a transport failure.
    pub read_retries: u32,
}

impl GatewayConfig {
    pub fn with_url(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            read_retries: DEFAULT_READ_RETRIES,
        }
    }
}
