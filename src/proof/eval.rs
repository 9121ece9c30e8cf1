//! Chainpoint proof evaluation
//!
//! Walks the branch tree from the proof's leaf hash, threading the hash
//! state through every operation, and extracts the material later stages
//! verify: anchor expected values, embedded signatures, and the Bitcoin
//! transaction id recovered from the double-SHA-256 step.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use sha3::{Sha3_224, Sha3_256, Sha3_384, Sha3_512};

use crate::types::{Result, VerifyError};

use super::{Anchor, Branch, ChainpointProof, HashOp, Op, BTC_BRANCH_LABEL};

/// Prefix marking a branch operand as an embedded signature
pub const SIGNATURE_PREFIX: &str = "sig:";

/// Evaluated form of a proof: identity fields plus evaluated branches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedProof {
    pub hash: String,
    pub hash_id_node: String,
    pub hash_submitted_node_at: String,
    pub hash_id_core: String,
    pub hash_submitted_core_at: String,
    pub branches: Vec<EvaluatedBranch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedBranch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anchors: Vec<EvaluatedAnchor>,
    /// Base64 signature embedded in this branch, without the `sig:` prefix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
    /// Hex hash state at signature position
    #[serde(rename = "sigHash", skip_serializing_if = "Option::is_none")]
    pub sig_hash: Option<String>,
    /// OP_RETURN payload recovered from a Bitcoin branch
    #[serde(rename = "opReturnValue", skip_serializing_if = "Option::is_none")]
    pub op_return_value: Option<String>,
    /// Bitcoin transaction id recovered from a Bitcoin branch
    #[serde(rename = "btcTxId", skip_serializing_if = "Option::is_none")]
    pub btc_tx_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<EvaluatedBranch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedAnchor {
    #[serde(rename = "type")]
    pub anchor_type: String,
    pub anchor_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uris: Vec<String>,
    /// Hex value the anchor is expected to hold; byte-reversed for `btc`
    pub expected_value: String,
}

/// Evaluates a proof, producing anchor expected values and per-branch
/// signature and Bitcoin transaction material.
pub fn eval(proof: &ChainpointProof) -> Result<EvaluatedProof> {
    let hash = hex::decode(&proof.hash)
        .map_err(|e| VerifyError::falsified(format!("failed to evaluate Proof: {e}")))?;

    let branches = eval_branches(&hash, &proof.branches)
        .map_err(|e| e.with_prefix("failed to evaluate Proof: "))?;

    Ok(EvaluatedProof {
        hash: proof.hash.clone(),
        hash_id_node: proof.hash_id_node.clone(),
        hash_submitted_node_at: proof.hash_submitted_node_at.clone(),
        hash_id_core: proof.hash_id_core.clone(),
        hash_submitted_core_at: proof.hash_submitted_core_at.clone(),
        branches,
    })
}

/// Evaluates a single branch from `start_hash`, returning the evaluated
/// branch and the hash state after its last operation.
pub fn eval_branch(start_hash: &[u8], branch: &Branch) -> Result<(EvaluatedBranch, Vec<u8>)> {
    let mut curr = start_hash.to_vec();
    let mut result = EvaluatedBranch {
        label: branch.label.clone(),
        ..Default::default()
    };

    // the Bitcoin branch interleaves the transaction body with double
    // SHA-256; the OP_RETURN payload lies three hash states back
    let is_btc = branch.label.as_deref() == Some(BTC_BRANCH_LABEL);
    let mut window: Option<VecDeque<Vec<u8>>> = if is_btc { Some(VecDeque::new()) } else { None };

    for op in &branch.ops {
        match op {
            Op::Right { r } => {
                check_sig(r, &curr, &mut result);
                curr.extend_from_slice(&decode_operand(r));
            }
            Op::Left { l } => {
                check_sig(l, &curr, &mut result);
                let mut next = decode_operand(l);
                next.extend_from_slice(&curr);
                curr = next;
            }
            Op::Hash { op } => {
                curr = apply_hash(*op, &curr);

                if *op == HashOp::Sha256X2 {
                    if let Some(w) = window.take() {
                        let op_return = w.front().ok_or_else(|| {
                            VerifyError::falsified(
                                "cannot recover OP_RETURN in Bitcoin branch",
                            )
                        })?;

                        result.op_return_value = Some(hex::encode(op_return));
                        result.btc_tx_id = Some(reverse_hex(&curr));
                    }
                }
            }
            Op::Anchors { anchors } => {
                result.anchors.extend(eval_anchors(&curr, anchors));
            }
        }

        if let Some(w) = window.as_mut() {
            // keep the last three hash states
            w.push_back(curr.clone());
            while w.len() > 3 {
                w.pop_front();
            }
        }
    }

    if let Some(branches) = &branch.branches {
        result.branches = eval_branches(&curr, branches)?;
    }

    Ok((result, curr))
}

/// Walks sibling branches left to right, threading the hash state from one
/// branch into the next.
fn eval_branches(start_hash: &[u8], branches: &[Branch]) -> Result<Vec<EvaluatedBranch>> {
    let mut curr = start_hash.to_vec();
    let mut result = Vec::with_capacity(branches.len());

    for branch in branches {
        let (evaluated, end_hash) = eval_branch(&curr, branch)?;
        result.push(evaluated);
        curr = end_hash;
    }

    Ok(result)
}

fn eval_anchors(curr: &[u8], anchors: &[Anchor]) -> Vec<EvaluatedAnchor> {
    anchors
        .iter()
        .map(|anchor| {
            // BTC merkle roots are little endian, unlike Chainpoint's big
            // endian hash states
            let expected_value = if anchor.anchor_type == "btc" {
                reverse_hex(curr)
            } else {
                hex::encode(curr)
            };

            EvaluatedAnchor {
                anchor_type: anchor.anchor_type.clone(),
                anchor_id: anchor.anchor_id.clone(),
                uris: anchor.uris.clone().unwrap_or_default(),
                expected_value,
            }
        })
        .collect()
}

/// Records the signature pinned to the current hash state. The prefix test
/// runs before any hex decoding: an operand like `sig:aabb` must keep its
/// full literal form when concatenated.
fn check_sig(operand: &str, curr: &[u8], result: &mut EvaluatedBranch) {
    if let Some(sig) = operand.strip_prefix(SIGNATURE_PREFIX) {
        result.sig = Some(sig.to_string());
        result.sig_hash = Some(hex::encode(curr));
    }
}

/// Decodes an operand as hex where possible, falling back to its UTF-8
/// bytes. Both forms appear in real proofs.
fn decode_operand(operand: &str) -> Vec<u8> {
    hex::decode(operand).unwrap_or_else(|_| operand.as_bytes().to_vec())
}

fn apply_hash(op: HashOp, data: &[u8]) -> Vec<u8> {
    match op {
        HashOp::Sha224 => Sha224::digest(data).to_vec(),
        HashOp::Sha256 => Sha256::digest(data).to_vec(),
        HashOp::Sha384 => Sha384::digest(data).to_vec(),
        HashOp::Sha512 => Sha512::digest(data).to_vec(),
        HashOp::Sha3_224 => Sha3_224::digest(data).to_vec(),
        HashOp::Sha3_256 => Sha3_256::digest(data).to_vec(),
        HashOp::Sha3_384 => Sha3_384::digest(data).to_vec(),
        HashOp::Sha3_512 => Sha3_512::digest(data).to_vec(),
        HashOp::Sha256X2 => {
            let once = Sha256::digest(data);
            Sha256::digest(once).to_vec()
        }
    }
}

fn reverse_hex(bytes: &[u8]) -> String {
    let reversed: Vec<u8> = bytes.iter().rev().copied().collect();
    hex::encode(reversed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha256;
    use crate::proof::CHAINPOINT_CONTEXT;

    fn base_proof(hash: &str, branches: Vec<Branch>) -> ChainpointProof {
        ChainpointProof {
            context: CHAINPOINT_CONTEXT.to_string(),
            proof_type: "Chainpoint".to_string(),
            hash: hash.to_string(),
            hash_id_node: "e7e2ec40-96ea-11e8-8a45-01e7e2ec40ca".to_string(),
            hash_submitted_node_at: "2018-08-03T05:41:39Z".to_string(),
            hash_id_core: "e84bb940-96ea-11e8-9af0-01a3a4a4e0e6".to_string(),
            hash_submitted_core_at: "2018-08-03T05:41:40Z".to_string(),
            branches,
        }
    }

    fn leaf_hash() -> Vec<u8> {
        sha256::hash_byte_array(&[b"leaf"])
    }

    #[test]
    fn concat_and_hash_ops() {
        let leaf = leaf_hash();
        let sibling = sha256::hash_byte_array(&[b"sibling"]);

        let branch = Branch {
            label: Some("cal_anchor_branch".to_string()),
            ops: vec![
                Op::Left {
                    l: hex::encode(&sibling),
                },
                Op::Hash { op: HashOp::Sha256 },
                Op::Anchors {
                    anchors: vec![Anchor {
                        anchor_type: "cal".to_string(),
                        anchor_id: "985635".to_string(),
                        uris: Some(vec!["https://a.chainpoint.org/calendar/985635/hash".into()]),
                    }],
                },
            ],
            branches: None,
        };

        let proof = base_proof(&hex::encode(&leaf), vec![branch]);
        let evaluated = eval(&proof).unwrap();

        let expected = sha256::hash_byte_array(&[&sibling, &leaf]);
        let anchor = &evaluated.branches[0].anchors[0];
        assert_eq!(anchor.expected_value, hex::encode(&expected));
        assert_eq!(anchor.anchor_type, "cal");
        assert_eq!(anchor.uris.len(), 1);
        assert_eq!(evaluated.hash, proof.hash);
    }

    #[test]
    fn utf8_operand_fallback() {
        let leaf = leaf_hash();

        // "zz..." is not valid hex, so the operand feeds in as UTF-8 bytes
        let branch = Branch {
            label: None,
            ops: vec![
                Op::Right {
                    r: "zz-not-hex".to_string(),
                },
                Op::Hash { op: HashOp::Sha256 },
            ],
            branches: None,
        };

        let (_, end) = eval_branch(&leaf, &branch).unwrap();

        let mut concat = leaf.clone();
        concat.extend_from_slice(b"zz-not-hex");
        assert_eq!(end, sha256::hash_byte_array(&[&concat]));
    }

    #[test]
    fn signature_extraction_pins_hash_state() {
        let leaf = leaf_hash();
        let sig = "dGVzdC1zaWduYXR1cmU=";

        let branch = Branch {
            label: Some("pdb_sig_branch".to_string()),
            ops: vec![
                Op::Right {
                    r: format!("sig:{sig}"),
                },
                Op::Hash { op: HashOp::Sha256 },
            ],
            branches: None,
        };

        let (evaluated, end) = eval_branch(&leaf, &branch).unwrap();

        assert_eq!(evaluated.sig.as_deref(), Some(sig));
        // sigHash is the state before the concatenation is applied
        assert_eq!(evaluated.sig_hash.as_deref(), Some(hex::encode(&leaf).as_str()));

        // the operand is concatenated with its full literal form, prefix
        // included
        let mut concat = leaf.clone();
        concat.extend_from_slice(format!("sig:{sig}").as_bytes());
        assert_eq!(end, sha256::hash_byte_array(&[&concat]));
    }

    #[test]
    fn bitcoin_branch_recovers_tx_material() {
        let leaf = leaf_hash();

        let ops = vec![
            Op::Right {
                r: "0101".to_string(),
            },
            Op::Hash { op: HashOp::Sha256 },
            Op::Left {
                l: "0202".to_string(),
            },
            Op::Hash { op: HashOp::Sha256X2 },
            Op::Anchors {
                anchors: vec![Anchor {
                    anchor_type: "btc".to_string(),
                    anchor_id: "503275".to_string(),
                    uris: None,
                }],
            },
        ];

        let branch = Branch {
            label: Some(BTC_BRANCH_LABEL.to_string()),
            ops,
            branches: None,
        };

        // replay by hand to derive expectations
        let mut curr = leaf.clone();
        curr.extend_from_slice(&[0x01, 0x01]);
        let after_concat = curr.clone(); // window state 1
        let after_hash = sha256::hash_byte_array(&[&after_concat]); // window state 2
        let mut with_left = vec![0x02, 0x02];
        with_left.extend_from_slice(&after_hash); // window state 3
        let doubled = sha256::hash_byte_array(&[&sha256::hash_byte_array(&[&with_left])]);

        let (evaluated, end) = eval_branch(&leaf, &branch).unwrap();

        // three states retained; the oldest is the OP_RETURN payload
        assert_eq!(
            evaluated.op_return_value.as_deref(),
            Some(hex::encode(&after_concat).as_str())
        );
        assert_eq!(
            evaluated.btc_tx_id.as_deref(),
            Some(reverse_hex(&doubled).as_str())
        );
        // btc anchors record the byte-reversed expected value
        assert_eq!(
            evaluated.branches.len(),
            0
        );
        assert_eq!(
            evaluated.anchors[0].expected_value,
            reverse_hex(&doubled)
        );
        assert_eq!(end, doubled);
    }

    #[test]
    fn non_btc_branch_has_no_tx_material() {
        let leaf = leaf_hash();
        let branch = Branch {
            label: Some("eth_anchor_branch".to_string()),
            ops: vec![
                Op::Hash { op: HashOp::Sha256X2 },
            ],
            branches: None,
        };

        let (evaluated, _) = eval_branch(&leaf, &branch).unwrap();
        assert!(evaluated.op_return_value.is_none());
        assert!(evaluated.btc_tx_id.is_none());
    }

    #[test]
    fn sibling_branches_thread_the_hash() {
        let leaf = leaf_hash();

        let first = Branch {
            label: None,
            ops: vec![Op::Hash { op: HashOp::Sha256 }],
            branches: None,
        };
        let second = Branch {
            label: None,
            ops: vec![
                Op::Hash { op: HashOp::Sha256 },
                Op::Anchors {
                    anchors: vec![Anchor {
                        anchor_type: "cal".to_string(),
                        anchor_id: "1".to_string(),
                        uris: None,
                    }],
                },
            ],
            branches: None,
        };

        let proof = base_proof(&hex::encode(&leaf), vec![first, second]);
        let evaluated = eval(&proof).unwrap();

        let once = sha256::hash_byte_array(&[&leaf]);
        let twice = sha256::hash_byte_array(&[&once]);
        assert_eq!(
            evaluated.branches[1].anchors[0].expected_value,
            hex::encode(twice)
        );
    }

    #[test]
    fn nested_branches_continue_from_parent() {
        let leaf = leaf_hash();

        let child = Branch {
            label: None,
            ops: vec![Op::Anchors {
                anchors: vec![Anchor {
                    anchor_type: "cal".to_string(),
                    anchor_id: "1".to_string(),
                    uris: None,
                }],
            }],
            branches: None,
        };
        let parent = Branch {
            label: None,
            ops: vec![Op::Hash { op: HashOp::Sha512 }],
            branches: Some(vec![child]),
        };

        let proof = base_proof(&hex::encode(&leaf), vec![parent]);
        let evaluated = eval(&proof).unwrap();

        let expected = apply_hash(HashOp::Sha512, &leaf);
        assert_eq!(
            evaluated.branches[0].branches[0].anchors[0].expected_value,
            hex::encode(expected)
        );
    }

    #[test]
    fn invalid_leaf_hash_fails() {
        let proof = base_proof("not-hex", vec![]);
        let err = eval(&proof).unwrap_err();
        assert!(err.to_string().starts_with("failed to evaluate Proof"));
    }

    #[test]
    fn all_hash_ops_produce_expected_lengths() {
        let data = b"data";
        for (op, len) in [
            (HashOp::Sha224, 28),
            (HashOp::Sha256, 32),
            (HashOp::Sha384, 48),
            (HashOp::Sha512, 64),
            (HashOp::Sha3_224, 28),
            (HashOp::Sha3_256, 32),
            (HashOp::Sha3_384, 48),
            (HashOp::Sha3_512, 64),
            (HashOp::Sha256X2, 32),
        ] {
            assert_eq!(apply_hash(op, data).len(), len);
        }
    }
}
