//! Branch signature verification
//!
//! Walks every branch of an evaluated proof and verifies each embedded
//! RSA-PSS/SHA-256 signature against a single public key. A proof verified
//! with a public key must contain at least one signature.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rsa::RsaPublicKey;
use tracing::debug;

use crate::crypto::rsa as rsasig;
use crate::types::{Result, VerifyError};

use super::eval::{EvaluatedBranch, EvaluatedProof};

/// Verifies every embedded branch signature against `pub_key`.
pub fn verify_signatures(evaluated: &EvaluatedProof, pub_key: &RsaPublicKey) -> Result<()> {
    let has_sig = walk(&evaluated.branches, pub_key)?;

    if !has_sig {
        return Err(VerifyError::falsified("signature is missing"));
    }

    Ok(())
}

fn walk(branches: &[EvaluatedBranch], pub_key: &RsaPublicKey) -> Result<bool> {
    let mut has_sig = false;

    for branch in branches {
        if let Some(sig) = &branch.sig {
            verify_branch_sig(branch, sig, pub_key)?;
            has_sig = true;
        }

        has_sig |= walk(&branch.branches, pub_key)?;
    }

    Ok(has_sig)
}

fn verify_branch_sig(branch: &EvaluatedBranch, sig: &str, pub_key: &RsaPublicKey) -> Result<()> {
    let label = branch.label.as_deref().unwrap_or("");

    if sig.is_empty() {
        return Err(VerifyError::falsified(format!(
            "invalid `sig` in branch `{label}`"
        )));
    }

    let sig_hash = branch.sig_hash.as_deref().ok_or_else(|| {
        VerifyError::falsified(format!("`sigHash` is missing in branch `{label}`"))
    })?;

    let hash = hex::decode(sig_hash).map_err(|e| {
        VerifyError::falsified(format!("cannot decode `sigHash` in branch `{label}`: {e}"))
    })?;

    // a signature that cannot be decoded leaves nothing to check
    // cryptographically, so the proof is unverifiable rather than falsified
    let sig_bytes = STANDARD.decode(sig).map_err(|e| {
        VerifyError::unverifiable(format!("cannot verify signature in branch `{label}`: {e}"))
    })?;

    debug!(label, "verifying branch signature");

    rsasig::verify_pss_sha256(pub_key, &hash, &sig_bytes)
        .map_err(|e| VerifyError::falsified(format!("falsified signature in branch `{label}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha256;
    use crate::types::VerificationStatus;
    use rsa::{Pss, RsaPrivateKey};
    use sha2::Sha256;

    fn key_pair() -> (RsaPrivateKey, RsaPublicKey) {
        let mut rng = rand::thread_rng();
        let prv = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let pub_key = prv.to_public_key();
        (prv, pub_key)
    }

    fn signed_branch(prv: &RsaPrivateKey, hash: &[u8]) -> EvaluatedBranch {
        let mut rng = rand::thread_rng();
        let sig = prv.sign_with_rng(&mut rng, Pss::new::<Sha256>(), hash).unwrap();

        EvaluatedBranch {
            label: Some("pdb_sig_branch".to_string()),
            sig: Some(STANDARD.encode(sig)),
            sig_hash: Some(hex::encode(hash)),
            ..Default::default()
        }
    }

    fn proof_with(branches: Vec<EvaluatedBranch>) -> EvaluatedProof {
        EvaluatedProof {
            branches,
            ..Default::default()
        }
    }

    #[test]
    fn valid_signature_passes() {
        let (prv, pub_key) = key_pair();
        let hash = sha256::hash_byte_array(&[b"state"]);

        let proof = proof_with(vec![signed_branch(&prv, &hash)]);
        assert!(verify_signatures(&proof, &pub_key).is_ok());
    }

    #[test]
    fn nested_signature_found() {
        let (prv, pub_key) = key_pair();
        let hash = sha256::hash_byte_array(&[b"nested"]);

        let parent = EvaluatedBranch {
            branches: vec![signed_branch(&prv, &hash)],
            ..Default::default()
        };

        let proof = proof_with(vec![parent]);
        assert!(verify_signatures(&proof, &pub_key).is_ok());
    }

    #[test]
    fn wrong_key_is_falsified() {
        let (prv, _) = key_pair();
        let (_, other_pub) = key_pair();
        let hash = sha256::hash_byte_array(&[b"state"]);

        let proof = proof_with(vec![signed_branch(&prv, &hash)]);
        let err = verify_signatures(&proof, &other_pub).unwrap_err();

        assert_eq!(err.status(), Some(VerificationStatus::Falsified));
        assert!(err.to_string().contains("falsified signature"));
    }

    #[test]
    fn missing_sig_hash_is_falsified() {
        let (prv, pub_key) = key_pair();
        let hash = sha256::hash_byte_array(&[b"state"]);

        let mut branch = signed_branch(&prv, &hash);
        branch.sig_hash = None;

        let err = verify_signatures(&proof_with(vec![branch]), &pub_key).unwrap_err();
        assert!(err.to_string().contains("`sigHash` is missing"));
    }

    #[test]
    fn undecodable_signature_is_unverifiable() {
        let (prv, pub_key) = key_pair();
        let hash = sha256::hash_byte_array(&[b"state"]);

        let mut branch = signed_branch(&prv, &hash);
        branch.sig = Some("!!not base64!!".to_string());

        let err = verify_signatures(&proof_with(vec![branch]), &pub_key).unwrap_err();
        assert_eq!(err.status(), Some(VerificationStatus::Unverifiable));
        assert!(err.to_string().contains("cannot verify signature"));
    }

    #[test]
    fn no_signatures_is_falsified() {
        let (_, pub_key) = key_pair();

        let proof = proof_with(vec![EvaluatedBranch::default()]);
        let err = verify_signatures(&proof, &pub_key).unwrap_err();

        assert_eq!(err.to_string(), "signature is missing");
        assert_eq!(err.status(), Some(VerificationStatus::Falsified));
    }
}
