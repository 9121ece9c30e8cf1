//! Proof codec: JSON, zlib-compressed MessagePack, and base64
//!
//! The canonical in-memory form is the JSON tree; the binary form is
//! `zlib(messagepack(tree))` and the `.txt` form is standard padded base64
//! of the binary form. On-disk JSON uses two-space indentation.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde_json::Value;

use crate::types::{Result, VerifyError};

/// Reads a binary stream (zlib over MessagePack) into a proof JSON tree.
pub fn proof_from_binary<R: Read>(reader: R) -> Result<Value> {
    let decoder = ZlibDecoder::new(reader);

    rmp_serde::from_read(decoder)
        .map_err(|e| VerifyError::Codec(format!("invalid binary Chainpoint Proof: {e}")))
}

/// Reads a base64 binary stream into a proof JSON tree.
pub fn proof_from_base64<R: Read>(mut reader: R) -> Result<Value> {
    let mut encoded = String::new();
    reader.read_to_string(&mut encoded)?;

    let binary = STANDARD
        .decode(encoded.trim())
        .map_err(|e| VerifyError::Codec(format!("invalid base64 Chainpoint Proof: {e}")))?;

    proof_from_binary(binary.as_slice())
}

/// Writes a proof JSON tree as a binary stream.
pub fn proof_to_binary<W: Write>(proof: &Value, writer: W) -> Result<()> {
    let mut encoder = ZlibEncoder::new(writer, Compression::default());

    rmp_serde::encode::write(&mut encoder, proof)
        .map_err(|e| VerifyError::Codec(format!("cannot encode Chainpoint Proof: {e}")))?;

    encoder
        .finish()
        .map_err(|e| VerifyError::Codec(format!("cannot compress Chainpoint Proof: {e}")))?;

    Ok(())
}

/// Encodes a proof JSON tree into its base64 binary string.
pub fn proof_to_base64(proof: &Value) -> Result<String> {
    let mut binary = Vec::new();
    proof_to_binary(proof, &mut binary)?;
    Ok(STANDARD.encode(binary))
}

/// Loads a proof from a `.json` (JSON) or `.txt` (base64 binary) file.
pub fn load_proof(path: &Path) -> Result<Value> {
    let load = || -> Result<Value> {
        let file = File::open(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_reader(file)
                .map_err(|e| VerifyError::Codec(format!("invalid JSON: {e}"))),
            Some("txt") => proof_from_base64(file),
            _ => Err(VerifyError::InvalidInput(
                "filename must end in either '.json' or '.txt'".to_string(),
            )),
        }
    };

    load().map_err(|e| {
        e.with_prefix(&format!(
            "cannot load Chainpoint Proof from `{}`: ",
            path.display()
        ))
    })
}

/// Saves a proof to a `.json` (two-space indented JSON) or `.txt` (base64
/// binary) file.
pub fn save_proof(path: &Path, proof: &Value) -> Result<()> {
    let save = || -> Result<()> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                let mut file = File::create(path)?;
                serde_json::to_writer_pretty(&mut file, proof)
                    .map_err(|e| VerifyError::Codec(format!("cannot encode JSON: {e}")))?;
                Ok(())
            }
            Some("txt") => {
                let mut file = File::create(path)?;
                file.write_all(proof_to_base64(proof)?.as_bytes())?;
                Ok(())
            }
            _ => Err(VerifyError::InvalidInput(
                "filename must end in either '.json' or '.txt'".to_string(),
            )),
        }
    };

    save().map_err(|e| {
        e.with_prefix(&format!(
            "cannot save Chainpoint Proof to `{}`: ",
            path.display()
        ))
    })
}
