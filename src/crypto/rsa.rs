//! RSA-PSS/SHA-256 signature verification and public key import
//!
//! Proof branches may embed a base64 RSA-PSS signature over the branch hash
//! state at signature position; this module verifies those signatures
//! against a PEM public key supplied by the caller.

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pss, RsaPublicKey};
use sha2::Sha256;

use crate::types::{Result, VerifyError};

/// Imports an RSA public key from its PEM string form.
///
/// Accepts both SubjectPublicKeyInfo (`PUBLIC KEY`) and PKCS#1
/// (`RSA PUBLIC KEY`) blocks.
pub fn import_public_key_pem(pem: &str) -> Result<RsaPublicKey> {
    if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
        return Ok(key);
    }

    RsaPublicKey::from_pkcs1_pem(pem)
        .map_err(|e| VerifyError::InvalidInput(format!("invalid RSA public key: {e}")))
}

/// Verifies an RSA-PSS signature over a SHA-256 digest.
pub fn verify_pss_sha256(key: &RsaPublicKey, digest: &[u8], sig: &[u8]) -> Result<()> {
    key.verify(Pss::new::<Sha256>(), digest, sig)
        .map_err(|e| VerifyError::Falsified(e.to_string()))
}
