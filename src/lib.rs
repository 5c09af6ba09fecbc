//! # Elements Covenant Toolkit
//!
//! Builds and spends a Taproot output on Elements whose script path forces
//! the spending transaction to pay a committed destination script. The
//! covenant leaf recomputes the destination's Taproot tweak on the stack and
//! checks it against an inspected output with `OP_TWEAKVERIFY`.
//!
//! ## Layers
//!
//! - [`tagged_hash`], [`script`], [`covenant`]: leaf construction
//! - [`taproot`]: leaf hashes, hash trees, tweaks, output scripts and addresses
//! - [`witness`]: control blocks and the covenant witness stack
//! - [`pset`]: partial transaction roles, sighash, signing and extraction over
//!   `elements` transactions
//! - [`services`]: node RPC and the end-to-end flow

pub mod config;
pub mod covenant;
pub mod error;
pub mod identity;
pub mod network;
pub mod pset;
pub mod script;
pub mod services;
pub mod tagged_hash;
pub mod taproot;
pub mod utils;
pub mod witness;

// Re-export commonly used types
pub use covenant::{covenant_script, DestinationScript};
pub use error::{CovenantError, CovenantResult};
pub use identity::SigningIdentity;
pub use network::NetworkParams;
pub use pset::PartialTransaction;
pub use services::{CovenantFlow, ElementsRpcClient, LedgerNode};
pub use taproot::TaprootCommitment;
