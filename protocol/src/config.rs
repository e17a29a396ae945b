//! # Protocol Configuration & Constants
//!
//! Every magic number the BF_TX core depends on lives here. Runtime settings
//! that operators tune per deployment (endpoints, timeouts) are carried by
//! [`crate::consensus::GatewayConfig`]; these constants are their defaults.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Record Format
// ---------------------------------------------------------------------------

/// Index key the consensus application files each record's `Id` under.
/// Search queries are equality filters on it.
pub const SEARCH_ID_KEY: &str = "bftx.id";

/// Identifiers are hex-encoded SHA-256 digests.
pub const ID_HEX_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 secret key length in bytes.
pub const SIGNING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// AES-256-GCM key length in bytes. The KEM shared secret is stretched to this
/// with BLAKE3 before sealing.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. Twelve. Not sixteen.
pub const AES_NONCE_LENGTH: usize = 12;

/// Domain-separation context for deriving the sealing key from a KEM secret.
pub const SEAL_KDF_CONTEXT: &str = "blockfreight bftx 2024-01 payload seal key";

/// Name of the parameter set used when a caller does not pick one.
pub const DEFAULT_PARAMETER_SET: &str = "default";

// ---------------------------------------------------------------------------
// Consensus Engine
// ---------------------------------------------------------------------------

/// Default JSON-RPC endpoint of the local consensus engine.
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:46657";

/// Connection establishment bound. A node that can't accept a TCP connection
/// in this window is treated as unavailable.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Whole-request bound for every engine round trip, broadcast included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How many extra attempts idempotent reads (anchor, search, info) get after
/// a transport failure. Broadcasts are never retried.
pub const DEFAULT_READ_RETRIES: u32 = 2;

/// Pause between read retries.
pub const READ_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Page size requested from `tx_search`.
pub const SEARCH_PAGE_SIZE: u32 = 100;

// ---------------------------------------------------------------------------
// Node Surface
// ---------------------------------------------------------------------------

/// Default port for the request/response API.
pub const DEFAULT_API_PORT: u16 = 12345;

/// File name of the node signing key inside the data directory.
pub const SIGNING_KEY_FILE: &str = "signing.key";

/// Directory (inside the data directory) holding KEM keypairs.
pub const KEM_KEY_DIR: &str = "kem";

/// Directory (inside the data directory) holding the sled database.
pub const DB_DIR: &str = "db";
