//! Chainpoint-style merkle tree over a bag of entries
//!
//! Nodes live in an arena indexed by position, with a parent index threaded
//! in during pairwise combination so authentication paths can be walked
//! bottom-up without reference cycles.

use std::collections::HashSet;

use crate::crypto::sha256;

use super::{BagEntry, Proof};

struct Node {
    key: Option<Vec<u8>>,
    value: Option<Vec<u8>>,
    height: i8,
    size: i64,
    hash: Vec<u8>,
    left_hash: Vec<u8>,
    right_hash: Vec<u8>,
    parent: Option<usize>,
}

/// Merkle tree hasher over an unordered bag of key-value entries.
///
/// Construction repeats pairwise combination: the current layer is
/// partitioned left-to-right into adjacent pairs, each pair combines into a
/// parent hashing `left || right`, and an odd trailing node is promoted to
/// the next layer unchanged. Versioned save/restore and incremental proof
/// extraction are not supported.
pub struct BagHasher {
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl BagHasher {
    pub fn new() -> Self {
        BagHasher {
            nodes: Vec::new(),
            root: None,
        }
    }

    /// Builds the tree from `entries` and returns the root hash along with
    /// authentication paths for the requested `proof_keys`.
    ///
    /// Entries are taken in the given order; callers sort by key where
    /// determinism across permutations is required. Empty entries yield
    /// `(None, vec![])`.
    pub fn patch(&mut self, entries: Vec<BagEntry>, proof_keys: &[Vec<u8>]) -> (Option<Vec<u8>>, Vec<Proof>) {
        if entries.is_empty() {
            return (None, Vec::new());
        }

        self.nodes.clear();
        self.root = None;

        let mut proof_key_set: HashSet<&[u8]> = proof_keys.iter().map(|k| k.as_slice()).collect();
        let mut proof_nodes: Vec<usize> = Vec::new();
        let mut layer: Vec<usize> = Vec::with_capacity(entries.len());

        for entry in entries {
            let idx = self.nodes.len();

            if proof_key_set.remove(entry.key.as_slice()) {
                proof_nodes.push(idx);
            }

            self.nodes.push(Node {
                hash: entry.value.clone(),
                key: Some(entry.key),
                value: Some(entry.value),
                height: 0,
                size: 1,
                left_hash: Vec::new(),
                right_hash: Vec::new(),
                parent: None,
            });

            layer.push(idx);
        }

        while layer.len() > 1 {
            layer = self.pairwise_combine(&layer);
        }

        let root = layer[0];
        self.root = Some(root);
        let root_hash = self.nodes[root].hash.clone();

        let proofs = proof_nodes
            .into_iter()
            .map(|idx| {
                let node = &self.nodes[idx];
                Proof {
                    key: node.key.clone().unwrap_or_default(),
                    value: node.value.clone().unwrap_or_default(),
                    root_hash: root_hash.clone(),
                    path: self.path_to_root(idx),
                    ..Default::default()
                }
            })
            .collect();

        (Some(root_hash), proofs)
    }

    fn pairwise_combine(&mut self, layer: &[usize]) -> Vec<usize> {
        let mut result = Vec::with_capacity((layer.len() + 1) / 2);

        for pair in layer.chunks(2) {
            match pair {
                [j, k] => {
                    let (node_j, node_k) = (&self.nodes[*j], &self.nodes[*k]);
                    let parent_idx = self.nodes.len();

                    let parent = Node {
                        key: None,
                        value: None,
                        height: 1 + node_j.height.max(node_k.height),
                        size: 1 + node_j.size + node_k.size,
                        hash: sha256::hash_byte_array(&[&node_j.hash, &node_k.hash]),
                        left_hash: node_j.hash.clone(),
                        right_hash: node_k.hash.clone(),
                        parent: None,
                    };

                    self.nodes.push(parent);
                    self.nodes[*j].parent = Some(parent_idx);
                    self.nodes[*k].parent = Some(parent_idx);
                    result.push(parent_idx);
                }
                [j] => result.push(*j),
                _ => unreachable!(),
            }
        }

        result
    }

    /// Walks parent indices from a leaf: at each step, if the current hash
    /// matches the parent's left hash the sibling is on the right, and vice
    /// versa. The path is ordered leaf-to-root.
    fn path_to_root(&self, mut idx: usize) -> Vec<super::PathNode> {
        let mut path = Vec::new();

        while let Some(parent_idx) = self.nodes[idx].parent {
            let parent = &self.nodes[parent_idx];
            let mut node = super::PathNode::default();

            if self.nodes[idx].hash == parent.left_hash {
                node.right_hash = parent.right_hash.clone();
            } else {
                node.left_hash = parent.left_hash.clone();
            }

            path.push(node);
            idx = parent_idx;
        }

        path
    }

    /// Height of the tree built by the last `patch`
    pub fn height(&self) -> i64 {
        self.root.map(|r| self.nodes[r].height as i64).unwrap_or(0)
    }

    /// Number of nodes in the tree built by the last `patch`
    pub fn size(&self) -> i64 {
        self.root.map(|r| self.nodes[r].size).unwrap_or(0)
    }
}

impl Default for BagHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, value: &[u8]) -> BagEntry {
        BagEntry::new(key.as_bytes().to_vec(), value.to_vec())
    }

    fn sorted(mut entries: Vec<BagEntry>) -> Vec<BagEntry> {
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    #[test]
    fn empty_bag() {
        let mut hasher = BagHasher::new();
        let (hash, proofs) = hasher.patch(Vec::new(), &[]);
        assert!(hash.is_none());
        assert!(proofs.is_empty());
    }

    #[test]
    fn single_leaf_is_root() {
        let value = sha256::hash_byte_array(&[b"only"]);
        let mut hasher = BagHasher::new();
        let (hash, proofs) = hasher.patch(vec![entry("k", &value)], &[b"k".to_vec()]);

        assert_eq!(hash, Some(value.clone()));
        assert_eq!(proofs.len(), 1);
        assert!(proofs[0].path.is_empty());
        assert!(proofs[0].verify().is_ok());
        assert_eq!(hasher.height(), 0);
        assert_eq!(hasher.size(), 1);
    }

    #[test]
    fn two_leaves_known_root() {
        // same vector as the canonical two-hash combination
        let a = hex::decode("7d536ec0a82aaf6d2e3cdc1b6a1c1d7def3dc3e624305ff82cc0fa7e9a21b926")
            .unwrap();
        let b = hex::decode("5044a13e1eaa191436b8bfb19df6a229cba8d64e3d67192a7085f62a94ad3f12")
            .unwrap();
        let expected =
            hex::decode("caac105b13e7b8eb7cf5ee85a19e73ec01137ea3bcd54061fd37e57f1e23009f")
                .unwrap();

        let mut hasher = BagHasher::new();
        let (hash, _) = hasher.patch(vec![entry("a", &a), entry("b", &b)], &[]);
        assert_eq!(hash, Some(expected));
        assert_eq!(hasher.height(), 1);
        assert_eq!(hasher.size(), 3);
    }

    #[test]
    fn odd_leaf_promoted() {
        let a = sha256::hash_byte_array(&[b"a"]);
        let b = sha256::hash_byte_array(&[b"b"]);
        let c = sha256::hash_byte_array(&[b"c"]);

        let ab = sha256::hash_byte_array(&[&a, &b]);
        let expected = sha256::hash_byte_array(&[&ab, &c]);

        let mut hasher = BagHasher::new();
        let (hash, _) =
            hasher.patch(vec![entry("a", &a), entry("b", &b), entry("c", &c)], &[]);

        assert_eq!(hash, Some(expected));
        assert_eq!(hasher.height(), 2);
        assert_eq!(hasher.size(), 5);
    }

    #[test]
    fn permutation_determinism_after_sort() {
        let entries = vec![
            entry("cherry", &sha256::hash_byte_array(&[b"3"])),
            entry("apple", &sha256::hash_byte_array(&[b"1"])),
            entry("banana", &sha256::hash_byte_array(&[b"2"])),
            entry("date", &sha256::hash_byte_array(&[b"4"])),
        ];

        let mut permuted = entries.clone();
        permuted.rotate_left(2);

        let mut h1 = BagHasher::new();
        let mut h2 = BagHasher::new();
        let (r1, _) = h1.patch(sorted(entries), &[]);
        let (r2, _) = h2.patch(sorted(permuted), &[]);

        assert_eq!(r1, r2);
    }

    #[test]
    fn root_changes_with_leaf_set() {
        let entries = vec![
            entry("a", &sha256::hash_byte_array(&[b"1"])),
            entry("b", &sha256::hash_byte_array(&[b"2"])),
        ];

        let mut h1 = BagHasher::new();
        let (with_two, _) = h1.patch(entries.clone(), &[]);

        let mut extended = entries;
        extended.push(entry("c", &sha256::hash_byte_array(&[b"3"])));
        let mut h2 = BagHasher::new();
        let (with_three, _) = h2.patch(extended, &[]);

        assert_ne!(with_two, with_three);
    }

    #[test]
    fn proofs_self_verify() {
        let keys = ["a", "b", "c", "d", "e", "f", "g"];
        let entries: Vec<BagEntry> = keys
            .iter()
            .map(|k| entry(k, &sha256::hash_byte_array(&[k.as_bytes()])))
            .collect();

        let proof_keys: Vec<Vec<u8>> = keys.iter().map(|k| k.as_bytes().to_vec()).collect();

        let mut hasher = BagHasher::new();
        let (hash, proofs) = hasher.patch(entries, &proof_keys);
        let root = hash.unwrap();

        assert_eq!(proofs.len(), keys.len());
        for proof in &proofs {
            assert_eq!(proof.root_hash, root);
            assert_eq!(proof.value_hash_algorithm.as_str(), "none");
            assert_eq!(proof.hash_combining_algorithm.as_str(), "sha256");
            assert!(proof.verify().is_ok());
        }

        // mutating any value invalidates the proof
        let mut broken = proofs[3].clone();
        broken.value[0] ^= 0xff;
        assert!(broken.verify().is_err());
    }

    #[test]
    fn unknown_proof_key_ignored() {
        let entries = vec![entry("a", &sha256::hash_byte_array(&[b"1"]))];
        let mut hasher = BagHasher::new();
        let (_, proofs) = hasher.patch(entries, &[b"missing".to_vec()]);
        assert!(proofs.is_empty());
    }
}
