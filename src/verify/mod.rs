//! End-to-end verification entry points
//!
//! Four flows share the same tail pipeline (evaluate, optionally check
//! signatures, verify anchors):
//!
//! - [`verify_raw`]: a Chainpoint proof on its own, no database
//! - [`verify_archive`]: a proof archive holding a proof and its document
//! - [`verify_database`]: a database version against a stored or external
//!   proof
//! - [`verify_document`]: a single document within a version
//!
//! Every entry point returns a [`Verdict`] for verified, falsified and
//! unverifiable outcomes; transport and configuration errors surface as
//! plain errors instead of verification results.

use std::path::Path;

use mongodb::Database;
use rsa::RsaPublicKey;
use serde_json::Value;
use tracing::info;

use crate::config::VerifierConfig;
use crate::db::versions::{self, locate_document};
use crate::hashing::{hash_database, hash_document, ProofMap};
use crate::merkle;
use crate::proof::{
    anchor, binary, db_proof_to_doc_proof, doc_proof_to_db_proof, eval, proof_kind, schema,
    signature, ChainpointProof, ProofKind,
};
use crate::types::{Result, VerificationStatus, Verdict, VerifyError};

pub mod archive;

/// Maps a pipeline result onto a human verdict. Status-tagged errors
/// become falsified/unverifiable verdicts; anything else surfaces
/// unchanged as a transport or configuration error.
fn conclude(prefix: &str, result: Result<()>) -> Result<Verdict> {
    match result {
        Ok(()) => Ok(Verdict::verified(format!("{prefix} is verified"))),
        Err(e) => match e.status() {
            Some(VerificationStatus::Falsified) => Ok(Verdict {
                status: VerificationStatus::Falsified,
                message: format!("{prefix} is falsified"),
                detail: Some(e.to_string()),
            }),
            Some(VerificationStatus::Unverifiable) => Ok(Verdict {
                status: VerificationStatus::Unverifiable,
                message: format!("unable to verify {prefix}"),
                detail: Some(e.to_string()),
            }),
            _ => Err(e),
        },
    }
}

/// Validates the schema and decodes the typed proof tree.
fn decode_proof(value: &Value) -> Result<ChainpointProof> {
    schema::verify(value)?;

    serde_json::from_value(value.clone())
        .map_err(|e| VerifyError::falsified(format!("invalid Chainpoint Proof: {e}")))
}

/// Shared pipeline tail: evaluate the proof, check signatures when a key
/// was supplied, then verify every anchor.
async fn verify_evaluated(
    cfg: &VerifierConfig,
    proof: &ChainpointProof,
    pub_key: Option<&RsaPublicKey>,
) -> Result<()> {
    info!("verifying Chainpoint Proof");
    let evaluated = eval::eval(proof)?;

    if let Some(key) = pub_key {
        info!("verifying Chainpoint Proof signature");
        signature::verify_signatures(&evaluated, key)?;
    }

    anchor::verify(cfg, &evaluated).await
}

fn save_output(out: &Path, proof: &ChainpointProof) -> Result<()> {
    info!(path = %out.display(), "outputting Chainpoint Proof");

    let value = serde_json::to_value(proof)
        .map_err(|e| VerifyError::Codec(format!("cannot encode Chainpoint Proof: {e}")))?;

    binary::save_proof(out, &value)
}

/// Verifies a raw Chainpoint proof with no database involvement.
pub async fn verify_raw(
    cfg: &VerifierConfig,
    proof: &Value,
    pub_key: Option<&RsaPublicKey>,
) -> Result<Verdict> {
    let result = async {
        let proof = decode_proof(proof)?;
        verify_evaluated(cfg, &proof, pub_key).await
    }
    .await;

    conclude("Chainpoint Proof", result)
}

/// Verifies a proof archive: the contained document must hash to the
/// proof's leaf, and the proof itself must verify.
pub async fn verify_archive(
    cfg: &VerifierConfig,
    path: &Path,
    pub_key: Option<&RsaPublicKey>,
) -> Result<Verdict> {
    info!(path = %path.display(), "loading ProvenDB Proof Archive");

    let result = async {
        let (proof_value, doc) = archive::load_archive(path)?;
        let proof = decode_proof(&proof_value)?;

        let expected_hash = hex::decode(&proof.hash)
            .map_err(|e| VerifyError::falsified(format!("invalid proof hash: {e}")))?;

        let (actual_hash, _) = hash_document(&doc, cfg.skip_doc_check)?;

        if actual_hash != expected_hash {
            return Err(VerifyError::falsified(format!(
                "document hash mismatched. Expected: {}, actual: {}",
                hex::encode(&expected_hash),
                hex::encode(&actual_hash),
            )));
        }

        verify_evaluated(cfg, &proof, pub_key).await
    }
    .await;

    conclude("ProvenDB Proof Archive", result)
}

/// Verifies a database version: the reconstructed database merkle root
/// must equal the proof's leaf hash, and the proof must verify. A
/// document-scope input proof is first reshaped to database scope.
#[allow(clippy::too_many_arguments)]
pub async fn verify_database(
    cfg: &VerifierConfig,
    db: &Database,
    proof: &Value,
    version: i64,
    scope_cols: &[String],
    ignored_collections: &[String],
    out: Option<&Path>,
    pub_key: Option<&RsaPublicKey>,
) -> Result<Verdict> {
    let prefix = format!("Database `{}` in version {version}", db.name());

    let result = async {
        let mut proof = decode_proof(proof)?;

        if proof_kind(&proof)? == ProofKind::Document {
            // a document proof covers the database once its document
            // branch is replayed away
            doc_proof_to_db_proof(&mut proof)?;
        }

        let expected_hash = hex::decode(&proof.hash)
            .map_err(|e| VerifyError::falsified(format!("invalid proof hash: {e}")))?;

        let mut proof_map = ProofMap::new();
        let hash_result = hash_database(
            cfg,
            db,
            version,
            &mut proof_map,
            scope_cols,
            ignored_collections,
            None,
        )
        .await?;

        let actual_hash = hash_result.hash.unwrap_or_default();

        if actual_hash != expected_hash {
            return Err(VerifyError::falsified(format!(
                "database merkle root hash mismatched. Expected: {}, actual: {}",
                hex::encode(&expected_hash),
                hex::encode(&actual_hash),
            )));
        }

        verify_evaluated(cfg, &proof, pub_key).await?;

        if let Some(out) = out {
            save_output(out, &proof)?;
        }

        Ok(())
    }
    .await;

    conclude(&prefix, result)
}

/// Verifies a single document within a version.
///
/// Against a document-scope proof the document hash is compared directly;
/// against a database-scope proof the database root is reconstructed with
/// the document's authentication path extracted on the way, which also
/// enables saving a document-scope proof via `out`.
#[allow(clippy::too_many_arguments)]
pub async fn verify_document(
    cfg: &VerifierConfig,
    db: &Database,
    proof: &Value,
    version: i64,
    scope_cols: &[String],
    col_name: &str,
    doc_filter: &str,
    ignored_collections: &[String],
    out: Option<&Path>,
    pub_key: Option<&RsaPublicKey>,
) -> Result<Verdict> {
    let prefix = format!("Document in `{col_name}` with filter `{doc_filter}` in version {version}");

    let result = async {
        if !scope_cols.is_empty() && !scope_cols.iter().any(|n| n == col_name) {
            return Err(VerifyError::unverifiable(format!(
                "the collection level version proof doesn't cover the collection `{col_name}`"
            )));
        }

        let mut proof = decode_proof(proof)?;
        let kind = proof_kind(&proof)?;

        // verifying against a document proof needs the document hash
        // itself; against a database proof only the merkle leaf key
        let calc_hash = kind == ProofKind::Document;
        let (doc_hash, key) =
            locate_document(db, version, col_name, doc_filter, calc_hash, cfg.skip_doc_check)
                .await?;

        let expected_hash = hex::decode(&proof.hash)
            .map_err(|e| VerifyError::falsified(format!("invalid proof hash: {e}")))?;

        let mut doc_merkle_proof: Option<merkle::Proof> = None;

        let actual_hash = match kind {
            ProofKind::Document => doc_hash.ok_or_else(|| {
                VerifyError::Database("document hash was not computed".to_string())
            })?,
            ProofKind::Database => {
                let mut proof_map = ProofMap::new();
                versions::seed_proof_map(&mut proof_map, col_name, key);

                let hash_result = hash_database(
                    cfg,
                    db,
                    version,
                    &mut proof_map,
                    scope_cols,
                    ignored_collections,
                    None,
                )
                .await?;

                doc_merkle_proof = hash_result.proofs.into_iter().next();
                hash_result.hash.unwrap_or_default()
            }
        };

        if actual_hash != expected_hash {
            return Err(VerifyError::falsified(format!(
                "document hash mismatched. Expected: {}, actual: {}",
                hex::encode(&expected_hash),
                hex::encode(&actual_hash),
            )));
        }

        verify_evaluated(cfg, &proof, pub_key).await?;

        if let Some(out) = out {
            if kind == ProofKind::Database {
                if let Some(mkl) = doc_merkle_proof.filter(|p| !p.value.is_empty()) {
                    // embed the recovered document merkle path
                    db_proof_to_doc_proof(&mut proof, &mkl)?;
                }
            }

            save_output(out, &proof)?;
        }

        Ok(())
    }
    .await;

    conclude(&prefix, result)
}
