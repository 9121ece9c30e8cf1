//! Merkle bag hashing
//!
//! A bag is an unordered multiset of `(key, value)` pairs. Leaves adopt the
//! entry value as their hash directly; internal nodes combine children with
//! SHA-256 over `left || right`. The derived root is independent of insertion
//! order once leaves are sorted by key - callers sort where the producer
//! sorts (collection roots are always sorted at the database level).

use crate::crypto::sha256;
use crate::types::{Result, VerifyError};

mod bag;

pub use bag::BagHasher;

/// A key-value pair used as a merkle leaf. The value is used as the leaf
/// hash directly, without pre-hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BagEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl BagEntry {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BagEntry {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Algorithm used to derive a leaf hash from an entry value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueHashAlgorithm {
    /// The value is the hash
    #[default]
    None,
}

impl ValueHashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueHashAlgorithm::None => "none",
        }
    }
}

/// Algorithm used to combine two sibling hashes into a parent hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashCombiningAlgorithm {
    /// `SHA256(left || right)`
    #[default]
    Sha256,
}

impl HashCombiningAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashCombiningAlgorithm::Sha256 => "sha256",
        }
    }
}

/// One step along a merkle authentication path. Exactly one of the two
/// hashes is non-empty: `left_hash` means the sibling sits on the left of
/// the current hash, `right_hash` the opposite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathNode {
    pub left_hash: Vec<u8>,
    pub right_hash: Vec<u8>,
}

/// Merkle proof for a single bag entry, ordered leaf-to-root
#[derive(Debug, Clone, Default)]
pub struct Proof {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub root_hash: Vec<u8>,
    pub value_hash_algorithm: ValueHashAlgorithm,
    pub hash_combining_algorithm: HashCombiningAlgorithm,
    pub path: Vec<PathNode>,
    /// Associated metadata, e.g. the collection name for a document proof
    pub meta: Option<String>,
}

impl Proof {
    /// Folds the entry value along the path and compares the result to the
    /// recorded root hash.
    pub fn verify(&self) -> Result<()> {
        let mut hash = match self.value_hash_algorithm {
            ValueHashAlgorithm::None => self.value.clone(),
        };

        let combine = match self.hash_combining_algorithm {
            HashCombiningAlgorithm::Sha256 => sha256::hash_byte_array,
        };

        for node in &self.path {
            if !node.left_hash.is_empty() {
                hash = combine(&[&node.left_hash, &hash]);
            } else {
                hash = combine(&[&hash, &node.right_hash]);
            }
        }

        if hash == self.root_hash {
            return Ok(());
        }

        Err(VerifyError::falsified(format!(
            "recalculated root hash {} doesn't match hash {} in proof",
            hex::encode(&hash),
            hex::encode(&self.root_hash),
        )))
    }
}
