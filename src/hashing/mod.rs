//! Deterministic document and database hashing
//!
//! Re-derives the per-document hashes recorded when a version was anchored,
//! folds them into per-collection merkle trees, and folds collection roots
//! into the database merkle root.

pub mod database;
pub mod document;

pub use database::{hash_database, HashResult, ProofMap};
pub use document::{hash_document, hash_key};

/// Primary id key of every document
pub const ID_KEY: &str = "_id";

/// Prefix of ProvenDB metadata collections and fields
pub const PROVENDB_META_PREFIX: &str = "_provendb";

/// Prefix of MongoDB system collections
pub const MONGODB_SYSTEM_PREFIX: &str = "system.";

/// Collections with this name suffix are excluded from hashing
pub const PROVENDB_IGNORED_SUFFIX: &str = "pdbignore";

/// Per-document metadata sub-document key
pub const DOC_META_KEY: &str = "_provendb_metadata";

/// First version a document revision is visible in
pub const MIN_VERSION_KEY: &str = "minVersion";

/// Last version a document revision is visible in
pub const MAX_VERSION_KEY: &str = "maxVersion";

/// Recorded document hash, hex
pub const HASH_KEY: &str = "hash";

/// Marks a tombstoned document whose content is gone
pub const FORGOTTEN_KEY: &str = "forgotten";
