//! MongoDB access: connection handling and ProvenDB metadata queries

pub mod mongo;
pub mod versions;

pub use mongo::{connect, DbTarget};
pub use versions::{
    find_docs, get_proof, latest_verifiable_version, locate_document, verifiable_versions,
    ProofLookup, StoredProof, VerifiableVersion,
};
