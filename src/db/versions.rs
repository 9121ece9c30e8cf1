//! ProvenDB version-proof store and versioned document queries
//!
//! Proofs live in the `_provendb_versionProofs` metadata collection, one
//! record per anchored version. Documents are versioned in place through
//! their metadata's `minVersion`/`maxVersion` window.

use bson::{doc, Bson, Document};
use futures_util::TryStreamExt;
use mongodb::{Collection, Cursor, Database};
use serde_json::Value;
use tracing::{debug, info};

use crate::hashing::{self, document as doc_hashing};
use crate::merkle;
use crate::proof::binary;
use crate::types::{Result, VerifyError};

/// Metadata collection holding one record per anchored version
pub const VERSION_PROOFS_COLLECTION: &str = "_provendb_versionProofs";

pub const PROOF_ID_KEY: &str = "proofId";
pub const VERSION_KEY: &str = "version";
pub const SUBMITTED_KEY: &str = "submitted";
pub const STATUS_KEY: &str = "status";
pub const SCOPE_KEY: &str = "scope";
pub const PROOF_KEY: &str = "proof";
pub const DETAILS_KEY: &str = "details";
pub const COLLECTIONS_KEY: &str = "collections";
pub const NAME_KEY: &str = "name";

pub const SCOPE_COLLECTION: &str = "collection";

const DOC_META_MIN_VERSION_KEY: &str = "_provendb_metadata.minVersion";
const DOC_META_MAX_VERSION_KEY: &str = "_provendb_metadata.maxVersion";
const DOC_META_ID_KEY: &str = "_provendb_metadata._id";

/// How to look up a stored version proof
#[derive(Debug, Clone)]
pub enum ProofLookup<'a> {
    ProofId(&'a str),
    Version(i64),
}

/// A version proof loaded from the metadata collection
#[derive(Debug, Clone)]
pub struct StoredProof {
    pub proof_id: String,
    /// Decoded proof JSON tree
    pub proof: Value,
    pub version: i64,
    /// Collections covered by a collection-scope proof; empty for
    /// database scope
    pub collections: Vec<String>,
}

/// Builds the filter used to load a stored version proof.
fn proof_filter(id: &ProofLookup<'_>, col_name: Option<&str>) -> Document {
    let mut filter = match id {
        ProofLookup::ProofId(p) => doc! { PROOF_ID_KEY: *p },
        ProofLookup::Version(v) => doc! { VERSION_KEY: *v },
    };

    filter.insert(STATUS_KEY, doc! { "$in": ["submitted", "valid"] });

    if let Some(name) = col_name {
        // the proof must cover the requested collection
        filter.insert(
            format!("{DETAILS_KEY}.{COLLECTIONS_KEY}"),
            doc! { "$elemMatch": { NAME_KEY: name } },
        );
    }

    filter
}

/// Loads a stored version proof by proof id or version number.
///
/// Valid proofs win over submitted ones, earliest submission first.
pub async fn get_proof(
    db: &Database,
    id: ProofLookup<'_>,
    col_name: Option<&str>,
) -> Result<StoredProof> {
    let filter = proof_filter(&id, col_name);

    let found = db
        .collection::<Document>(VERSION_PROOFS_COLLECTION)
        .find_one(filter)
        .sort(doc! { STATUS_KEY: -1, SUBMITTED_KEY: 1 })
        .projection(doc! {
            PROOF_ID_KEY: 1,
            VERSION_KEY: 1,
            STATUS_KEY: 1,
            PROOF_KEY: 1,
            DETAILS_KEY: 1,
            SCOPE_KEY: 1,
        })
        .await?;

    let record = found.ok_or_else(|| {
        let col_msg = col_name
            .map(|n| format!(" that covers collection `{n}`"))
            .unwrap_or_default();

        VerifyError::InvalidInput(format!(
            "no proof{col_msg} with status `submitted` or `valid` can be found"
        ))
    })?;

    let proof_id = record
        .get_str(PROOF_ID_KEY)
        .map_err(|_| VerifyError::Database(format!("cannot get {PROOF_ID_KEY}")))?
        .to_string();

    info!(proof_id = proof_id.as_str(), "loading Chainpoint Proof");

    let version = record
        .get_i64(VERSION_KEY)
        .map_err(|_| VerifyError::Database(format!("cannot get {VERSION_KEY}")))?;

    let proof_bytes = match record.get(PROOF_KEY) {
        Some(Bson::Binary(bin)) => bin.bytes.clone(),
        _ => return Err(VerifyError::Database(format!("cannot get {PROOF_KEY}"))),
    };

    let proof = binary::proof_from_binary(proof_bytes.as_slice())?;

    let scope = record
        .get_str(SCOPE_KEY)
        .map_err(|_| VerifyError::Database(format!("cannot get {SCOPE_KEY}")))?;

    let mut collections = Vec::new();

    if scope == SCOPE_COLLECTION {
        let details = record.get_document(DETAILS_KEY).map_err(|_| {
            VerifyError::Database(format!("cannot get {DETAILS_KEY}.{COLLECTIONS_KEY}"))
        })?;
        let array = details.get_array(COLLECTIONS_KEY).map_err(|_| {
            VerifyError::Database(format!("cannot get {DETAILS_KEY}.{COLLECTIONS_KEY}"))
        })?;

        for value in array {
            let name = value
                .as_document()
                .and_then(|d| d.get_str(NAME_KEY).ok())
                .ok_or_else(|| VerifyError::Database(format!("cannot get {NAME_KEY}")))?;

            collections.push(name.to_string());
        }
    }

    Ok(StoredProof {
        proof_id,
        proof,
        version,
        collections,
    })
}

/// Returns the newest version with a stored proof.
pub async fn latest_verifiable_version(db: &Database) -> Result<i64> {
    let found = db
        .collection::<Document>(VERSION_PROOFS_COLLECTION)
        .find_one(doc! {})
        .sort(doc! { VERSION_KEY: -1, SUBMITTED_KEY: 1 })
        .projection(doc! { VERSION_KEY: 1 })
        .await?;

    let record = found.ok_or_else(|| {
        VerifyError::InvalidInput("no verifiable version can be found".to_string())
    })?;

    record
        .get_i64(VERSION_KEY)
        .map_err(|_| VerifyError::Database(format!("cannot get {VERSION_KEY}")))
}

/// A verifiable version summary for listing
#[derive(Debug, Clone)]
pub struct VerifiableVersion {
    pub proof_id: String,
    pub version: i64,
    pub submitted: bson::DateTime,
    pub status: String,
}

/// Lists every verifiable version, newest first.
pub async fn verifiable_versions(db: &Database) -> Result<Vec<VerifiableVersion>> {
    let mut cursor = db
        .collection::<Document>(VERSION_PROOFS_COLLECTION)
        .find(doc! {})
        .sort(doc! { VERSION_KEY: -1 })
        .projection(doc! {
            PROOF_ID_KEY: 1,
            VERSION_KEY: 1,
            SUBMITTED_KEY: 1,
            STATUS_KEY: 1,
        })
        .await?;

    let mut result = Vec::new();

    while let Some(record) = cursor.try_next().await? {
        // skip records missing any of the listed fields
        let (Ok(proof_id), Ok(version), Ok(submitted), Ok(status)) = (
            record.get_str(PROOF_ID_KEY),
            record.get_i64(VERSION_KEY),
            record.get_datetime(SUBMITTED_KEY),
            record.get_str(STATUS_KEY),
        ) else {
            continue;
        };

        result.push(VerifiableVersion {
            proof_id: proof_id.to_string(),
            version,
            submitted: *submitted,
            status: status.to_string(),
        });
    }

    Ok(result)
}

/// Builds the visibility filter for documents at a version, AND-ing the
/// user filter in. A user filter carrying its own `$and` array has its
/// entries flattened into the combined one, not nested.
fn visible_docs_filter(version: i64, user_filter: Option<Document>) -> Document {
    let mut and_statements = vec![
        Bson::Document(doc! { DOC_META_MIN_VERSION_KEY: { "$lte": version } }),
        Bson::Document(doc! { DOC_META_MAX_VERSION_KEY: { "$gte": version } }),
    ];

    let mut filter = match user_filter {
        Some(mut f) => {
            if let Some(Bson::Array(entries)) = f.remove("$and") {
                and_statements.extend(entries);
            }
            f
        }
        None => Document::new(),
    };

    filter.insert("$and", and_statements);
    filter
}

/// Queries the documents visible at `version`, sorted by
/// `(minVersion ASC, _id ASC)`.
pub async fn find_docs(
    collection: &Collection<Document>,
    version: i64,
    user_filter: Option<Document>,
    projection: Option<Document>,
) -> Result<Cursor<Document>> {
    let filter = visible_docs_filter(version, user_filter);

    let mut find = collection
        .find(filter)
        .sort(doc! { DOC_META_MIN_VERSION_KEY: 1, DOC_META_ID_KEY: 1 });

    if let Some(projection) = projection {
        find = find.projection(projection);
    }

    Ok(find.await?)
}

/// Locates the single document matched by a collection name and filter at
/// a version, returning its hash (when `calc_hash` is set) and merkle leaf
/// key.
pub async fn locate_document(
    db: &Database,
    version: i64,
    col_name: &str,
    doc_filter: &str,
    calc_hash: bool,
    skip_doc_check: bool,
) -> Result<(Option<Vec<u8>>, Vec<u8>)> {
    let filter = parse_ext_json_filter(doc_filter)
        .map_err(|e| VerifyError::InvalidInput(format!("invalid '--docFilter': {e}")))?;

    let projection = if calc_hash {
        None
    } else {
        Some(doc! { hashing::ID_KEY: 0, DOC_META_ID_KEY: 1 })
    };

    let collection = db.collection::<Document>(col_name);
    let mut cursor = find_docs(&collection, version, Some(filter), projection).await?;

    let mut hash = None;
    let mut key: Option<Vec<u8>> = None;

    while let Some(document) = cursor.try_next().await? {
        if key.is_some() {
            return Err(VerifyError::InvalidInput(format!(
                "please make sure that '--collection' and '--docFilter' combined only returns a single document in version {version}"
            )));
        }

        let meta = if calc_hash {
            let (doc_hash, meta) = doc_hashing::hash_document(&document, skip_doc_check)?;
            hash = Some(doc_hash);
            meta
        } else {
            document
                .get_document(hashing::DOC_META_KEY)
                .map_err(|_| {
                    VerifyError::Database(format!("{} is not a document", hashing::DOC_META_KEY))
                })?
                .clone()
        };

        key = Some(doc_hashing::hash_key(&meta)?);
        debug!(collection = col_name, "located verification target document");
    }

    let key = key.ok_or_else(|| {
        VerifyError::InvalidInput(format!(
            "'--collection' and '--docFilter' combined doesn't return any document in version {version}"
        ))
    })?;

    Ok((hash, key))
}

/// Parses a MongoDB extended JSON document filter.
pub fn parse_ext_json_filter(filter: &str) -> Result<Document, String> {
    let json: Value = serde_json::from_str(filter).map_err(|e| e.to_string())?;
    let bson = Bson::try_from(json).map_err(|e| e.to_string())?;

    match bson {
        Bson::Document(d) => Ok(d),
        _ => Err("filter must be a JSON object".to_string()),
    }
}

/// Seeds a proof map entry for the located document so database hashing
/// extracts its authentication path.
pub fn seed_proof_map(proof_map: &mut hashing::ProofMap, col_name: &str, key: Vec<u8>) {
    proof_map.entry(col_name.to_string()).or_default().insert(
        key.clone(),
        merkle::Proof {
            key,
            ..Default::default()
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proof_filter_by_version() {
        let filter = proof_filter(&ProofLookup::Version(7), None);

        assert_eq!(filter.get_i64(VERSION_KEY).unwrap(), 7);
        assert_eq!(
            filter.get_document(STATUS_KEY).unwrap(),
            &doc! { "$in": ["submitted", "valid"] }
        );
        assert!(!filter.contains_key("details.collections"));
    }

    #[test]
    fn proof_filter_with_collection_scope() {
        let filter = proof_filter(&ProofLookup::ProofId("abc"), Some("accounts"));

        assert_eq!(filter.get_str(PROOF_ID_KEY).unwrap(), "abc");
        assert_eq!(
            filter.get_document("details.collections").unwrap(),
            &doc! { "$elemMatch": { "name": "accounts" } }
        );
    }

    #[test]
    fn visibility_filter_without_user_filter() {
        let filter = visible_docs_filter(5, None);

        assert_eq!(
            filter,
            doc! { "$and": [
                { DOC_META_MIN_VERSION_KEY: { "$lte": 5i64 } },
                { DOC_META_MAX_VERSION_KEY: { "$gte": 5i64 } },
            ]}
        );
    }

    #[test]
    fn visibility_filter_merges_user_filter() {
        let user = doc! { "name": "alice" };
        let filter = visible_docs_filter(3, Some(user));

        assert_eq!(filter.get_str("name").unwrap(), "alice");
        assert_eq!(filter.get_array("$and").unwrap().len(), 2);
    }

    #[test]
    fn visibility_filter_flattens_user_and() {
        let user = doc! { "$and": [ { "a": 1 }, { "b": 2 } ] };
        let filter = visible_docs_filter(3, Some(user));

        // user $and entries join the version predicates in one array
        assert_eq!(filter.get_array("$and").unwrap().len(), 4);
        assert!(!filter.contains_key("a"));
    }

    #[test]
    fn ext_json_filter_parsing() {
        let filter =
            parse_ext_json_filter(r#"{"_id": {"$oid": "5b6a6a1646e0fb00080aac8c"}}"#).unwrap();
        assert!(matches!(filter.get("_id"), Some(Bson::ObjectId(_))));

        assert!(parse_ext_json_filter("[1, 2]").is_err());
        assert!(parse_ext_json_filter("not json").is_err());
    }

    #[test]
    fn seed_proof_map_creates_entry() {
        let mut proof_map = hashing::ProofMap::new();
        seed_proof_map(&mut proof_map, "accounts", vec![1, 2, 3]);

        let proof = &proof_map["accounts"][&vec![1, 2, 3]];
        assert_eq!(proof.key, vec![1, 2, 3]);
        assert!(proof.value.is_empty());
    }
}
