//! # Services Module
//!
//! Node plumbing for the covenant toolkit.
//!
//! ## Components
//!
//! - **RPC Client**: Elements node JSON-RPC client behind the `LedgerNode` trait
//! - **Covenant Flow**: end-to-end issue, lock, fund and spend sequence

pub mod covenant_service;
pub mod rpc_client;

pub use covenant_service::{CovenantFlow, Deadline, SpendReport};
pub use rpc_client::{ElementsRpcClient, LedgerNode};
