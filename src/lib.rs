//! provendb-verify - verification engine for ProvenDB database versions
//!
//! Given a MongoDB database holding versioned documents with per-document
//! cryptographic metadata, and a Chainpoint v3 Proof anchored to one or more
//! blockchains, this crate decides whether a database version, a collection
//! set, or a single document has been preserved as claimed.
//!
//! ## Subsystems
//!
//! - **Hashing**: deterministic document hashing over canonical BSON, folded
//!   into per-collection and database-level merkle trees ([`hashing`],
//!   [`merkle`])
//! - **Proof evaluation**: walking a Chainpoint branch tree from a leaf hash
//!   to its anchor values ([`proof::eval`])
//! - **Anchor verification**: checking evaluated anchors against chain
//!   endpoints or anchor URIs ([`proof::anchor`])
//! - **Codec**: JSON, zlib+MessagePack binary and base64 proof forms
//!   ([`proof::binary`])
//! - **Orchestration**: end-to-end database/document/archive/raw-proof
//!   verification ([`verify`])

pub mod config;
pub mod crypto;
pub mod db;
pub mod hashing;
pub mod httputil;
pub mod merkle;
pub mod proof;
pub mod types;
pub mod verify;

pub use config::{Args, VerifierConfig};
pub use types::{Result, VerificationStatus, Verdict, VerifyError};
