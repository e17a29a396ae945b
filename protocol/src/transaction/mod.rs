//! # Transaction Module
//!
//! The BF_TX record and the pure logic around it: how it serializes, how
//! its id is derived, how the node signs it, and which lifecycle
//! transitions it may take.
//!
//! ## Architecture
//!
//! ```text
//! types.rs      : BfTx record and EncodingState
//! canonical.rs  : Sorted-key canonical serialization and its projections
//! identity.rs   : Anchor-salted identifier derivation
//! signing.rs    : Ed25519 signing service for the Verified transition
//! lifecycle.rs  : State labels and transition guards
//! ```
//!
//! Orchestration (load, guard, apply, persist, broadcast) lives in
//! [`crate::service`]; nothing here touches the store.

pub mod canonical;
pub mod identity;
pub mod lifecycle;
pub mod signing;
pub mod types;

pub use identity::{derive_with_anchor, IdentityDeriver};
pub use lifecycle::{check, Action, LifecycleError, LifecycleState};
pub use signing::{SigningError, SigningService};
pub use types::{BfTx, EncodingState, BFTX_TYPE};
