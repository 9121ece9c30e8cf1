//! Proof archive loading
//!
//! A ProvenDB proof archive is a ZIP holding a Chainpoint proof
//! (`*.proof.json`) and the extended-JSON document it covers
//! (`*.doc.json`). Metadata entries such as the `__MACOSX/` folder a macOS
//! archiver adds are ignored.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use bson::{Bson, Document};
use serde_json::Value;
use zip::ZipArchive;

use crate::types::{Result, VerifyError};

/// Loads the proof and document from a proof archive.
pub fn load_archive(path: &Path) -> Result<(Value, Document)> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| VerifyError::Codec(format!("cannot read Proof Archive: {e}")))?;

    let mut proof: Option<Value> = None;
    let mut doc: Option<Document> = None;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| VerifyError::Codec(format!("cannot read Proof Archive entry: {e}")))?;

        if !entry.is_file() || entry.name().starts_with("__MACOSX") {
            continue;
        }

        if entry.name().ends_with(".proof.json") {
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;

            proof = Some(
                serde_json::from_slice(&data)
                    .map_err(|e| VerifyError::falsified(format!("invalid `.proof.json`: {e}")))?,
            );
        } else if entry.name().ends_with(".doc.json") {
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;

            let json: Value = serde_json::from_slice(&data)
                .map_err(|e| VerifyError::falsified(format!("invalid `.doc.json`: {e}")))?;
            let bson = Bson::try_from(json)
                .map_err(|e| VerifyError::falsified(format!("invalid `.doc.json`: {e}")))?;

            match bson {
                Bson::Document(d) => doc = Some(d),
                _ => {
                    return Err(VerifyError::falsified(
                        "`.doc.json` must hold a single document",
                    ))
                }
            }
        }
    }

    let doc =
        doc.ok_or_else(|| VerifyError::falsified("`.doc.json` is missing from the archive"))?;
    let proof =
        proof.ok_or_else(|| VerifyError::falsified("`.proof.json` is missing from the archive"))?;

    Ok((proof, doc))
}
