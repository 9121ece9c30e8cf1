//! Database and collection hashing
//!
//! Collections hash concurrently, one task per collection; the first error
//! aborts the remaining tasks. Collection roots are then sorted by name and
//! folded into the database merkle root, and any requested per-document
//! authentication paths are spliced with the collection-level paths.

use std::collections::HashMap;

use bson::{doc, Bson, Document};
use futures_util::TryStreamExt;
use mongodb::{Collection, Database};
use tokio::task::JoinSet;
use tracing::debug;

use crate::config::VerifierConfig;
use crate::crypto::sha256;
use crate::db::versions;
use crate::merkle::{BagEntry, BagHasher, Proof};
use crate::types::{Result, VerifyError};

use super::{
    document, MONGODB_SYSTEM_PREFIX, PROVENDB_IGNORED_SUFFIX, PROVENDB_META_PREFIX,
};

/// Requested per-document proofs, keyed by collection name and merkle leaf
/// key. Populated before the fan-out; each collection task only produces
/// proofs for its own sub-map.
pub type ProofMap = HashMap<String, HashMap<Vec<u8>, Proof>>;

/// Result of hashing a collection or a whole database
#[derive(Debug, Clone, Default)]
pub struct HashResult {
    pub name: String,
    /// `None` for an empty collection
    pub hash: Option<Vec<u8>>,
    pub height: i64,
    pub size: i64,
    pub proofs: Vec<Proof>,
}

/// Builds the server-side filter selecting the collections that take part
/// in hashing: system and ProvenDB metadata collections are excluded, as
/// are explicitly ignored names and the ignored suffix.
fn collection_name_filter(cols: &[String], ignored_collections: &[String]) -> Document {
    let mut ignored_regex = String::new();

    for collection in ignored_collections {
        ignored_regex.push_str(&format!("^{collection}$|"));
    }

    let pattern = format!(
        "^{PROVENDB_META_PREFIX}|^{MONGODB_SYSTEM_PREFIX}|{ignored_regex}{PROVENDB_IGNORED_SUFFIX}$"
    );

    let mut name_filter = doc! {
        "$not": Bson::RegularExpression(bson::Regex {
            pattern,
            options: String::new(),
        }),
    };

    if !cols.is_empty() {
        name_filter.insert("$in", cols.to_vec());
    }

    doc! { "name": name_filter, "type": "collection" }
}

/// Reconstructs the database merkle root at `version`.
///
/// `proof_map` names the documents whose authentication paths are wanted;
/// on return those proofs carry the full path to the database root.
/// `cols` restricts hashing to a collection-scope proof's collections. An
/// empty database hashes to the empty-string SHA-256.
pub async fn hash_database(
    cfg: &VerifierConfig,
    db: &Database,
    version: i64,
    proof_map: &mut ProofMap,
    cols: &[String],
    ignored_collections: &[String],
    filter: Option<&str>,
) -> Result<HashResult> {
    let user_filter = match filter {
        Some(s) => Some(
            versions::parse_ext_json_filter(s)
                .map_err(|e| VerifyError::InvalidInput(format!("invalid `filter`: {e}")))?,
        ),
        None => None,
    };

    let names = db
        .list_collection_names()
        .filter(collection_name_filter(cols, ignored_collections))
        .await?;

    debug!(database = db.name(), collections = names.len(), version, "hashing database");

    let mut tasks = JoinSet::new();

    for name in names {
        let collection = db.collection::<Document>(&name);
        let proof_keys: Vec<Vec<u8>> = proof_map
            .get(&name)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        let user_filter = user_filter.clone();
        let skip_doc_check = cfg.skip_doc_check;

        tasks.spawn(async move {
            hash_collection(collection, name, version, user_filter, proof_keys, skip_doc_check)
                .await
        });
    }

    let mut entries: Vec<BagEntry> = Vec::new();
    let mut height: i64 = 0;
    let mut size: i64 = 0;

    while let Some(joined) = tasks.join_next().await {
        let result = match joined {
            Ok(result) => result,
            Err(e) => {
                tasks.abort_all();
                return Err(VerifyError::Database(format!(
                    "collection hashing task failed: {e}"
                )));
            }
        };

        let collection_result = match result {
            Ok(r) => r,
            Err(e) => {
                // first error cancels the remaining collection tasks
                tasks.abort_all();
                return Err(e);
            }
        };

        let Some(hash) = collection_result.hash else {
            // empty collections are dropped from the aggregation
            continue;
        };

        entries.push(BagEntry::new(collection_result.name.as_bytes().to_vec(), hash));
        height = height.max(collection_result.height);
        size += collection_result.size;

        if let Some(doc_map) = proof_map.get_mut(&collection_result.name) {
            for proof in collection_result.proofs {
                if let Some(doc_proof) = doc_map.get_mut(&proof.key) {
                    doc_proof.value = proof.value;
                    doc_proof.value_hash_algorithm = proof.value_hash_algorithm;
                    doc_proof.hash_combining_algorithm = proof.hash_combining_algorithm;
                    doc_proof.path = proof.path;
                }
            }
        }
    }

    let count = entries.len() as i64;
    entries.sort_by(|a, b| a.key.cmp(&b.key));

    for entry in &entries {
        debug!(
            collection = String::from_utf8_lossy(&entry.key).as_ref(),
            "collection hash assembly order"
        );
    }

    let col_proof_keys: Vec<Vec<u8>> = proof_map.keys().map(|k| k.as_bytes().to_vec()).collect();

    let mut bag = BagHasher::new();
    let (hash, col_proofs) = bag.patch(entries, &col_proof_keys);

    let Some(hash) = hash else {
        // empty database version
        return Ok(HashResult {
            hash: Some(sha256::EMPTY_STRING.to_vec()),
            ..Default::default()
        });
    };

    // merge collection-level paths into the requested document proofs to
    // form complete paths to the database root
    for col_proof in &col_proofs {
        let col_name = String::from_utf8_lossy(&col_proof.key).to_string();

        if let Some(doc_map) = proof_map.get_mut(col_name.as_str()) {
            for doc_proof in doc_map.values_mut() {
                if !doc_proof.value.is_empty() {
                    doc_proof.root_hash = hash.clone();
                    doc_proof.path.extend(col_proof.path.iter().cloned());
                }
            }
        }
    }

    let mut final_proofs = Vec::new();

    for (col_name, doc_map) in proof_map.iter() {
        for doc_proof in doc_map.values() {
            let mut proof = doc_proof.clone();
            proof.meta = Some(col_name.clone());
            final_proofs.push(proof);
        }
    }

    Ok(HashResult {
        name: db.name().to_string(),
        hash: Some(hash),
        height: height + bag.height(),
        // collection roots are counted once as collection trees and once
        // as database-level leaves; remove the double count
        size: size - count + bag.size(),
        proofs: final_proofs,
    })
}

/// Hashes a single collection at `version`, returning its merkle root and
/// the authentication paths for the requested keys.
async fn hash_collection(
    collection: Collection<Document>,
    name: String,
    version: i64,
    user_filter: Option<Document>,
    proof_keys: Vec<Vec<u8>>,
    skip_doc_check: bool,
) -> Result<HashResult> {
    hash_collection_inner(collection, &name, version, user_filter, proof_keys, skip_doc_check)
        .await
        .map_err(|e| e.with_prefix(&format!("collection `{name}`: ")))
}

async fn hash_collection_inner(
    collection: Collection<Document>,
    name: &str,
    version: i64,
    user_filter: Option<Document>,
    proof_keys: Vec<Vec<u8>>,
    skip_doc_check: bool,
) -> Result<HashResult> {
    let mut cursor = versions::find_docs(&collection, version, user_filter, None).await?;

    let mut entries: Vec<BagEntry> = Vec::new();

    while let Some(doc) = cursor.try_next().await? {
        let (hash, meta) = document::hash_document(&doc, skip_doc_check)?;
        let key = document::hash_key(&meta)?;

        entries.push(BagEntry::new(key, hash));
    }

    if entries.is_empty() {
        return Ok(HashResult {
            name: name.to_string(),
            ..Default::default()
        });
    }

    let mut bag = BagHasher::new();
    let (hash, proofs) = bag.patch(entries, &proof_keys);

    if let Some(hash) = &hash {
        debug!(collection = name, hash = %hex::encode(hash), "finished hashing collection");
    }

    Ok(HashResult {
        name: name.to_string(),
        hash,
        height: bag.height(),
        size: bag.size(),
        proofs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_filter_excludes_system_and_metadata() {
        let filter = collection_name_filter(&[], &[]);

        let name = filter.get_document("name").unwrap();
        let Some(Bson::RegularExpression(regex)) = name.get("$not") else {
            panic!("expected a $not regex");
        };

        assert_eq!(regex.pattern, "^_provendb|^system.|pdbignore$");
        assert_eq!(filter.get_str("type").unwrap(), "collection");
        assert!(!name.contains_key("$in"));
    }

    #[test]
    fn name_filter_includes_ignored_collections() {
        let filter =
            collection_name_filter(&[], &["scratch".to_string(), "tmp".to_string()]);

        let name = filter.get_document("name").unwrap();
        let Some(Bson::RegularExpression(regex)) = name.get("$not") else {
            panic!("expected a $not regex");
        };

        assert_eq!(
            regex.pattern,
            "^_provendb|^system.|^scratch$|^tmp$|pdbignore$"
        );
    }

    #[test]
    fn name_filter_intersects_target_collections() {
        let filter = collection_name_filter(&["accounts".to_string()], &[]);

        let name = filter.get_document("name").unwrap();
        let targets = name.get_array("$in").unwrap();
        assert_eq!(targets, &vec![Bson::String("accounts".to_string())]);
    }

    // End-to-end database hashing requires a running MongoDB instance and
    // is exercised against seeded fixtures outside unit tests.
}
