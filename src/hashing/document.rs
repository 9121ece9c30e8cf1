//! Document hashing
//!
//! A stored document hashes as its canonical BSON bytes with the primary id
//! removed and the ProvenDB metadata trimmed down to the fields that were
//! present when the version was anchored. BSON preserves insertion order
//! and round-trips every numeric and date type bit-exact, so the serialized
//! bytes - and therefore the hash - reproduce the producer's exactly.

use bson::{Bson, Document};

use crate::crypto::sha256;
use crate::types::{Result, VerifyError};

use super::{DOC_META_KEY, FORGOTTEN_KEY, HASH_KEY, ID_KEY, MIN_VERSION_KEY};

/// Computes the deterministic hash of a stored document and returns it
/// along with the document's metadata sub-document.
///
/// Forgotten documents adopt the hash recorded in their metadata without
/// re-hashing; their content is no longer available. Unless
/// `skip_doc_check` is set, a freshly computed hash is compared to the
/// recorded one and a mismatch is a falsified document.
///
/// Errors are prefixed with the document's primary id.
pub fn hash_document(doc: &Document, skip_doc_check: bool) -> Result<(Vec<u8>, Document)> {
    hash_document_inner(doc, skip_doc_check).map_err(|(meta_id, e)| {
        let doc_id = doc
            .get(ID_KEY)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "null".to_string());

        let pid = meta_id
            .map(|v| format!(" (ProvenDB ID `{v}`)"))
            .unwrap_or_default();

        e.with_prefix(&format!("document `{doc_id}`{pid}: "))
    })
}

fn hash_document_inner(
    doc: &Document,
    skip_doc_check: bool,
) -> Result<(Vec<u8>, Document), (Option<Bson>, VerifyError)> {
    let meta = doc
        .get_document(DOC_META_KEY)
        .map_err(|_| (None, VerifyError::falsified("cannot get ProvenDB metadata")))?;

    let meta_id = meta.get(ID_KEY).cloned().ok_or_else(|| {
        (
            None,
            VerifyError::falsified("cannot get _id in ProvenDB metadata"),
        )
    })?;

    let fail = |e: VerifyError| (Some(meta_id.clone()), e);

    let min_version = meta.get(MIN_VERSION_KEY).cloned().ok_or_else(|| {
        fail(VerifyError::falsified(format!(
            "cannot get {MIN_VERSION_KEY} in ProvenDB metadata"
        )))
    })?;

    let expected_hash = || -> Result<Option<Vec<u8>>, VerifyError> {
        match meta.get(HASH_KEY) {
            None | Some(Bson::Null) => Ok(None),
            Some(Bson::String(s)) => hex::decode(s)
                .map(Some)
                .map_err(|e| VerifyError::falsified(format!("cannot decode {HASH_KEY}: {e}"))),
            Some(_) => Err(VerifyError::falsified(format!(
                "cannot convert {HASH_KEY} element value to string"
            ))),
        }
    };

    if meta.get_bool(FORGOTTEN_KEY).unwrap_or(false) {
        let hash = expected_hash()
            .map_err(fail)?
            .ok_or_else(|| fail(VerifyError::falsified("cannot get hash of forgotten document")))?;

        return Ok((hash, meta.clone()));
    }

    // trim the metadata to the fields present at anchoring time, keeping
    // the sub-document in its original position
    let mut trimmed = Document::new();
    trimmed.insert(ID_KEY, meta_id.clone());
    trimmed.insert(MIN_VERSION_KEY, min_version);

    let mut hashed = Document::new();

    for (key, value) in doc {
        if key == ID_KEY {
            continue;
        }

        if key == DOC_META_KEY {
            hashed.insert(key.clone(), trimmed.clone());
        } else {
            hashed.insert(key.clone(), value.clone());
        }
    }

    let bytes = bson::to_vec(&hashed)
        .map_err(|e| fail(VerifyError::Codec(format!("cannot serialize document: {e}"))))?;

    let hash = sha256::hash_byte_array(&[&bytes]);

    if !skip_doc_check {
        if let Some(expected) = expected_hash().map_err(fail)? {
            if expected != hash {
                let content = Bson::Document(hashed).into_canonical_extjson();
                return Err(fail(VerifyError::falsified(format!(
                    "document hash mismatched. Expected: {}, actual: {}. Hashed document content: {content}",
                    hex::encode(&expected),
                    hex::encode(&hash),
                ))));
            }
        }
    }

    Ok((hash, meta.clone()))
}

/// Derives the merkle leaf key for a document from its metadata: the BSON
/// serialization of `{"": <metadata _id>}`. The canonical serialization
/// gives a cross-type total order matching the producer's.
pub fn hash_key(meta: &Document) -> Result<Vec<u8>> {
    let id = meta
        .get(ID_KEY)
        .cloned()
        .ok_or_else(|| VerifyError::falsified("cannot get _id in ProvenDB metadata"))?;

    let mut key_doc = Document::new();
    key_doc.insert("", id);

    bson::to_vec(&key_doc)
        .map_err(|e| VerifyError::Codec(format!("cannot serialize hash key: {e}")))
}
