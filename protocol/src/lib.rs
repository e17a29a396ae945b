// Copyright (c) 2026 Blockfreight Contributors. MIT License.
// See LICENSE for details.

//! # BFTX Protocol: Core Library
//!
//! Lifecycle core for Blockfreight's freight ledger. A bill of lading enters
//! as an arbitrary JSON payload and leaves as a signed `BF_TX` record
//! committed to a Tendermint-compatible consensus engine.
//!
//! ```text
//!  construct ─► (encode ⇄ decode) ─► sign ─► broadcast ─► query
//!       └─────────── append (amendment of any record) ──────────┘
//! ```
//!
//! ## Architecture
//!
//! - **transaction**: the `BF_TX` record, canonical bytes, identity,
//!   signing and the lifecycle guards.
//! - **encoding**: reversible post-quantum sealing of a payload.
//! - **storage**: the durable id-to-record store. Source of truth.
//! - **consensus**: everything that talks to the consensus engine, plus
//!   an in-process engine for tests and offline work.
//! - **service**: the orchestrator. Locks, guards, persists, logs.
//! - **crypto**: Ed25519, Kyber, AES-GCM and hashing wrappers.
//! - **error**: the caller-facing error taxonomy.
//! - **config**: protocol constants.
//!
//! ## Ground rules
//!
//! 1. A record's id is derived from its content and the engine's anchor.
//!    Nobody picks it.
//! 2. Every state transition is checked against the stored record, under a
//!    per-id lock, before anything is written.
//! 3. The store is committed before the network is touched.

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod service;
pub mod storage;
pub mod transaction;

pub use consensus::{ConsensusGateway, GatewayConfig, LocalEngine, PersistentGateway, ScopedGateway};
pub use encoding::EncodingPipeline;
pub use error::{BftxError, BftxResult, ErrorKind};
pub use service::TransactionService;
pub use storage::{BftxDb, TxStore};
pub use transaction::{BfTx, LifecycleState, SigningService};
