//! Chainpoint v3 proof model
//!
//! The proof is held as a typed tree (`ChainpointProof` / `Branch` / `Op` /
//! `Anchor`). The JSON-Schema validator in [`schema`] enforces the shape
//! once, before the tree is decoded; evaluation and reshaping are then
//! plain pattern matching.

use serde::{Deserialize, Serialize};

use crate::merkle;
use crate::types::{Result, VerifyError};

pub mod anchor;
pub mod binary;
pub mod eval;
pub mod schema;
pub mod signature;

/// JSON-LD context every Chainpoint v3 proof carries
pub const CHAINPOINT_CONTEXT: &str = "https://w3id.org/chainpoint/v3";

/// Label of the synthetic branch holding a document's merkle path
pub const DOC_BRANCH_LABEL: &str = "pdb_doc_branch";

/// Label of a Bitcoin anchor branch
pub const BTC_BRANCH_LABEL: &str = "btc_anchor_branch";

/// A Chainpoint v3 proof: a leaf hash plus a tree of hash-operation
/// branches ending in blockchain anchors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainpointProof {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "type")]
    pub proof_type: String,
    /// Hex leaf hash the proof starts from
    pub hash: String,
    pub hash_id_node: String,
    pub hash_submitted_node_at: String,
    pub hash_id_core: String,
    pub hash_submitted_core_at: String,
    pub branches: Vec<Branch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub ops: Vec<Op>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<Branch>>,
}

/// A single proof operation. Exactly one of the four forms appears per op
/// object; the serde representation mirrors the wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Op {
    /// Concatenate the operand to the left: `operand || current`
    Left { l: String },
    /// Concatenate the operand to the right: `current || operand`
    Right { r: String },
    /// Apply a hash function to the current state
    Hash { op: HashOp },
    /// Record the current state against one or more anchors
    Anchors { anchors: Vec<Anchor> },
}

/// Supported hash operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashOp {
    #[serde(rename = "sha-224")]
    Sha224,
    #[serde(rename = "sha-256")]
    Sha256,
    #[serde(rename = "sha-384")]
    Sha384,
    #[serde(rename = "sha-512")]
    Sha512,
    #[serde(rename = "sha3-224")]
    Sha3_224,
    #[serde(rename = "sha3-256")]
    Sha3_256,
    #[serde(rename = "sha3-384")]
    Sha3_384,
    #[serde(rename = "sha3-512")]
    Sha3_512,
    /// SHA-256 applied twice in a row
    #[serde(rename = "sha-256-x2")]
    Sha256X2,
}

/// A trust anchor: `expected_value` is asserted to be recorded on the chain
/// identified by `type` at `anchor_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    #[serde(rename = "type")]
    pub anchor_type: String,
    pub anchor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uris: Option<Vec<String>>,
}

/// Scope of a proof, detected from the label of its first branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofKind {
    /// The leaf is the database merkle root
    Database,
    /// The leaf is a single document hash; the first branch carries the
    /// document's authentication path into the database root
    Document,
}

/// Detects the proof scope from the first branch's label.
pub fn proof_kind(proof: &ChainpointProof) -> Result<ProofKind> {
    let first = proof
        .branches
        .first()
        .ok_or_else(|| VerifyError::falsified("Chainpoint Proof has no branches"))?;

    if first.label.as_deref() == Some(DOC_BRANCH_LABEL) {
        Ok(ProofKind::Document)
    } else {
        Ok(ProofKind::Database)
    }
}

/// Converts a document-scope proof into a database-scope proof by replaying
/// the leading document branch and dropping it. The proof's new leaf is the
/// post-branch hash, i.e. the database merkle root.
pub fn doc_proof_to_db_proof(proof: &mut ChainpointProof) -> Result<()> {
    let first = proof
        .branches
        .first()
        .ok_or_else(|| VerifyError::falsified("Chainpoint Proof has no branches"))?;

    if first.label.as_deref() != Some(DOC_BRANCH_LABEL) {
        return Err(VerifyError::falsified(
            "the input Chainpoint Proof is not a document Proof",
        ));
    }

    let start_hash = hex::decode(&proof.hash)
        .map_err(|e| VerifyError::falsified(format!("invalid proof hash: {e}")))?;

    let (_, end_hash) = eval::eval_branch(&start_hash, first)?;

    proof.hash = hex::encode(end_hash);
    proof.branches.remove(0);

    // exactly one document branch is defined at the head of a document proof
    if let Some(next) = proof.branches.first() {
        if next.label.as_deref() == Some(DOC_BRANCH_LABEL) {
            return Err(VerifyError::falsified(
                "Chainpoint Proof has more than one document branch",
            ));
        }
    }

    Ok(())
}

/// Converts a database-scope proof into a document-scope proof by splicing
/// the document's merkle authentication path in front of the existing
/// branches. The proof's new leaf is the document hash.
pub fn db_proof_to_doc_proof(proof: &mut ChainpointProof, mkl: &merkle::Proof) -> Result<()> {
    let hash = match mkl.value_hash_algorithm {
        merkle::ValueHashAlgorithm::None => mkl.value.clone(),
    };

    let hash_op = match mkl.hash_combining_algorithm {
        merkle::HashCombiningAlgorithm::Sha256 => HashOp::Sha256,
    };

    proof.hash = hex::encode(hash);

    let mut ops = Vec::with_capacity(mkl.path.len() * 2);

    for node in &mkl.path {
        if !node.left_hash.is_empty() {
            ops.push(Op::Left {
                l: hex::encode(&node.left_hash),
            });
        } else {
            ops.push(Op::Right {
                r: hex::encode(&node.right_hash),
            });
        }

        ops.push(Op::Hash { op: hash_op });
    }

    proof.branches.insert(
        0,
        Branch {
            label: Some(DOC_BRANCH_LABEL.to_string()),
            ops,
            branches: None,
        },
    );

    Ok(())
}
