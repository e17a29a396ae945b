//! # CLI Interface
//!
//! `clap` derive definitions for the `bftx` binary. Global flags select the
//! data directory, the consensus endpoint and the log format; each
//! subcommand maps onto one transaction-service operation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Blockfreight BF_TX node.
///
/// Constructs, signs, encodes and broadcasts bill-of-lading transactions
/// against a Tendermint-compatible consensus engine, or serves the same
/// operations over HTTP.
#[derive(Parser, Debug)]
#[command(name = "bftx", about = "Blockfreight BF_TX node", version, propagate_version = true)]
pub struct BftxCli {
    /// Node data directory (signing key, KEM keys, transaction store).
    #[arg(long, short = 'd', env = "BFTX_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Consensus engine JSON-RPC endpoint.
    #[arg(long, env = "BFTX_RPC_URL", global = true)]
    pub rpc_url: Option<String>,

    /// Settings file (TOML). Defaults to `<data-dir>/config.toml` when present.
    #[arg(long, short = 'c', env = "BFTX_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Use the in-process consensus engine instead of the RPC endpoint.
    #[arg(long, env = "BFTX_LOCAL_ENGINE", global = true)]
    pub local_engine: bool,

    /// Log output format: pretty or json.
    #[arg(long, env = "BFTX_LOG_FORMAT", global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory and generate the node's keys.
    Init,
    /// Construct a transaction from a JSON payload file. Prints the id.
    Construct {
        /// Path to the payload (a JSON object).
        file: PathBuf,
    },
    /// Check a payload file without constructing anything.
    Validate { file: PathBuf },
    /// Print the id of the stored transaction carrying this payload.
    Verify { file: PathBuf },
    /// Sign a stored transaction.
    Sign { id: String },
    /// Seal a stored transaction's payload.
    Encode {
        id: String,
        /// Named parameter set (`default`, `kyber512`, `kyber768`, `kyber1024`).
        #[arg(long)]
        params: Option<String>,
    },
    /// Open a stored transaction's sealed payload.
    Decode {
        id: String,
        #[arg(long)]
        params: Option<String>,
    },
    /// Submit a signed transaction to the consensus engine.
    Broadcast { id: String },
    /// Print a stored transaction.
    Get { id: String },
    /// Print a transaction as indexed by the consensus engine.
    Query { id: String },
    /// Construct an amendment of an existing transaction.
    Append {
        file: PathBuf,
        /// Id of the transaction being amended.
        old_id: String,
    },
    /// Print a transaction's lifecycle state.
    State { id: String },
    /// Print the number of stored transactions.
    Total,
    /// Print the consensus engine's latest height and anchor.
    Info,
    /// Repair amendment links left half-written by an interrupted append.
    Reconcile,
    /// Serve the HTTP API.
    Serve {
        /// Listen port.
        #[arg(long, short = 'p', env = "BFTX_API_PORT")]
        port: Option<u16>,
    },
}
