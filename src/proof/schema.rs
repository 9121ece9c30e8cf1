//! Chainpoint v3 JSON-Schema validation
//!
//! Runs before the typed tree is decoded; a schema violation is a
//! falsified proof, never a transport error.

use std::fmt::Write as _;
use std::sync::OnceLock;

use jsonschema::JSONSchema;
use serde_json::Value;

use crate::types::{Result, VerifyError};

/// The Chainpoint v3 JSON schema
pub const CHAINPOINT_PROOF_SCHEMA_V3: &str = r##"{
  "$schema": "http://json-schema.org/draft-04/schema#",
  "additionalProperties": false,
  "definitions": {
    "branch": {
      "additionalProperties": false,
      "properties": {
        "label": {
          "description": "An aritrary text branch label. Can contain up to 64 letters, numbers, hyphen, underscore, or period characters.",
          "pattern": "^[a-zA-Z0-9-_\\.]*$",
          "title": "The Label Schema",
          "type": "string",
          "minLength": 0,
          "maxLength": 64
        },
        "branches": {
          "items": {
            "$ref": "#/definitions/branch"
          },
          "type": "array",
          "uniqueItems": true
        },
        "ops": {
          "items": {
            "$ref": "#/definitions/operation"
          },
          "type": "array"
        }
      },
      "required": [
        "ops"
      ],
      "type": "object"
    },
    "anchor": {
      "additionalProperties": false,
      "properties": {
        "type": {
          "description": "A trust anchor",
          "title": "One of the known trust anchor types. Calendar (cal), Ethereum (eth), and Bitcoin (btc).",
          "type": "string",
          "enum": [
            "cal",
            "eth",
            "btc"
          ]
        },
        "anchor_id": {
          "description": "An identifier used to look up embedded anchor data. e.g. a Bitcoin transaction or block ID.",
          "title": "A service specific unique ID for this anchor",
          "type": "string",
          "minLength": 1,
          "maxLength": 512
        },
        "uris": {
          "items": {
            "description": "A URI used to lookup and retrieve the exact hash resource required to validate this anchor. The URI MUST return only a Hexadecimal hash value as a string. The URI MUST also contain the current 'anchor_id' value to lookup the URI resource. This strict requirement is to allow automated clients to retrieve and validate intermediate hashes when verifying a proof. The body value returned by the URI MUST be of even length and match the regex /^[a-fA-F0-9]+$/.",
            "title": "A URI for retrieving a hash value for this item",
            "type": "string",
            "format": "uri",
            "minLength": 1,
            "maxLength": 512
          },
          "type": "array",
          "uniqueItems": true
        }
      },
      "required": [
        "type",
        "anchor_id"
      ],
      "type": "object"
    },
    "operation": {
      "additionalProperties": false,
      "properties": {
        "l": {
          "description": "Concatenate the byte array value of this property to the left of the prior state of the hash (value|prior_hash).",
          "title": "Concatenate value with left side of previous value",
          "type": "string",
          "minLength": 1,
          "maxLength": 512
        },
        "r": {
          "description": "Concatenate the byte array value of this property to the right of the prior state of the hash (prior_hash|value).",
          "title": "Concatenate value with right side of previous value",
          "type": "string",
          "minLength": 1,
          "maxLength": 512
        },
        "op": {
          "description": "A hashing operation from the SHA2 or SHA3 families of hash functions to apply to a left or right operation hash value. The special value of 'sha-256-x2' performs a 'sha-256' twice in a row.",
          "title": "The hashing operation to apply to a left or right hash",
          "type": "string",
          "enum": [
            "sha-224",
            "sha-256",
            "sha-384",
            "sha-512",
            "sha3-224",
            "sha3-256",
            "sha3-384",
            "sha3-512",
            "sha-256-x2"
          ]
        },
        "anchors": {
          "items": {
            "$ref": "#/definitions/anchor"
          },
          "type": "array",
          "uniqueItems": true
        }
      },
      "type": "object"
    }
  },
  "description": "This document contains a schema for validating an instance of a Chainpoint v3 Proof.",
  "id": "http://example.com/example.json",
  "properties": {
    "@context": {
      "default": "https://w3id.org/chainpoint/v3",
      "description": "A registered JSON-LD context URI for this document type",
      "title": "The JSON-LD @context",
      "type": "string",
      "enum": [
        "https://w3id.org/chainpoint/v3"
      ]
    },
    "type": {
      "default": "Chainpoint",
      "description": "The JSON-LD Type",
      "title": "The JSON-LD Type",
      "type": "string",
      "enum": [
        "Chainpoint"
      ]
    },
    "hash": {
      "description": "The even length Hexadecimal output of a cryptographic one-way hash function representing the data to be anchored.",
      "pattern": "^[a-fA-F0-9]{40,128}$",
      "title": "The hash to be anchored",
      "type": "string"
    },
    "hash_id_node": {
      "description": "The Type 1 (timestamp) UUID used to identify and track a hash or retrieve a Chainpoint proof from a Chainpoint Node",
      "pattern": "^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[1][0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}$",
      "title": "A Type 1 (timestamp) UUID that identifies a hash",
      "type": "string"
    },
    "hash_submitted_node_at": {
      "description": "The timestamp, in ISO8601 form, extracted from the hash_id_node that represents the time the hash was submitted to Chainpoint Node. Must be in \"2017-03-23T11:30:33Z\" form with granularity only to seconds and UTC zone.",
      "pattern": "^\\d{4}-\\d\\d-\\d\\dT\\d\\d:\\d\\d:\\d\\dZ$",
      "title": "An ISO8601 timestamp, extracted from hash_id_node",
      "type": "string"
    },
    "hash_id_core": {
      "description": "The Type 1 (timestamp) UUID used to by Chainpoint Node to identify and track a hash or retrieve a Chainpoint proof from Chainpoint Core",
      "pattern": "^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[1][0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}$",
      "title": "A Type 1 (timestamp) UUID that identifies a hash",
      "type": "string"
    },
    "hash_submitted_core_at": {
      "description": "The timestamp, in ISO8601 form, extracted from the hash_id_core that represents the time the hash was submitted to Chainpoint Core. Must be in \"2017-03-23T11:30:33Z\" form with granularity only to seconds and UTC zone.",
      "pattern": "^\\d{4}-\\d\\d-\\d\\dT\\d\\d:\\d\\d:\\d\\dZ$",
      "title": "An ISO8601 timestamp, extracted from hash_id_core",
      "type": "string"
    },
    "branches": {
      "items": {
        "$ref": "#/definitions/branch"
      },
      "type": "array",
      "uniqueItems": true
    }
  },
  "required": [
    "@context",
    "type",
    "hash",
    "hash_id_node",
    "hash_submitted_node_at",
    "hash_id_core",
    "hash_submitted_core_at",
    "branches"
  ],
  "title": "Chainpoint v3 JSON Schema.",
  "type": "object"
}"##;

static SCHEMA_JSON: OnceLock<Value> = OnceLock::new();
static COMPILED: OnceLock<JSONSchema> = OnceLock::new();

fn compiled() -> &'static JSONSchema {
    COMPILED.get_or_init(|| {
        let schema = SCHEMA_JSON.get_or_init(|| {
            serde_json::from_str(CHAINPOINT_PROOF_SCHEMA_V3).expect("embedded schema is valid JSON")
        });
        JSONSchema::compile(schema).expect("embedded schema compiles")
    })
}

/// Validates a proof JSON tree against the Chainpoint v3 schema.
pub fn verify(proof: &Value) -> Result<()> {
    if let Err(errors) = compiled().validate(proof) {
        let mut msg = String::from("failed to pass Chainpoint v3 JSON schema:\n");

        for error in errors {
            let _ = writeln!(msg, "- {error}");
        }

        return Err(VerifyError::Falsified(msg));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_proof() -> Value {
        json!({
            "@context": "https://w3id.org/chainpoint/v3",
            "type": "Chainpoint",
            "hash": "bdf8c9bdf076d6aff0292a1c9448691d2ae283f2ce41b045355e2c8cb8e85ef2",
            "hash_id_node": "e7e2ec40-96ea-11e8-8a45-01e7e2ec40ca",
            "hash_submitted_node_at": "2018-08-03T05:41:39Z",
            "hash_id_core": "e84bb940-96ea-11e8-9af0-01a3a4a4e0e6",
            "hash_submitted_core_at": "2018-08-03T05:41:40Z",
            "branches": [
                {
                    "label": "cal_anchor_branch",
                    "ops": [
                        { "l": "abcd" },
                        { "op": "sha-256" },
                        {
                            "anchors": [
                                {
                                    "type": "cal",
                                    "anchor_id": "985635",
                                    "uris": ["https://a.chainpoint.org/calendar/985635/hash"]
                                }
                            ]
                        }
                    ]
                }
            ]
        })
    }

    #[test]
    fn valid_proof_passes() {
        assert!(verify(&minimal_proof()).is_ok());
    }

    #[test]
    fn missing_required_field_fails() {
        let mut proof = minimal_proof();
        proof.as_object_mut().unwrap().remove("hash");

        let err = verify(&proof).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("failed to pass Chainpoint v3 JSON schema"));
    }

    #[test]
    fn unknown_hash_op_fails() {
        let mut proof = minimal_proof();
        proof["branches"][0]["ops"][1] = json!({ "op": "md5" });
        assert!(verify(&proof).is_err());
    }

    #[test]
    fn bad_anchor_type_fails() {
        let mut proof = minimal_proof();
        proof["branches"][0]["ops"][2]["anchors"][0]["type"] = json!("doge");
        assert!(verify(&proof).is_err());
    }

    #[test]
    fn wrong_context_fails() {
        let mut proof = minimal_proof();
        proof["@context"] = json!("https://w3id.org/chainpoint/v2");
        assert!(verify(&proof).is_err());
    }

    #[test]
    fn additional_property_fails() {
        let mut proof = minimal_proof();
        proof["extra"] = json!(1);
        assert!(verify(&proof).is_err());
    }
}
