//! Canonical SHA-256 hashing over byte runs
//!
//! All merkle combination in this crate concatenates `left || right` in
//! order before hashing; no keyed or commutative combination is provided.

use sha2::{Digest, Sha256};

/// SHA-256 of the empty string, used as the hash of an empty database version
pub const EMPTY_STRING: [u8; 32] = [
    0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9,
    0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52,
    0xb8, 0x55,
];

/// Hashes the concatenation of the given byte runs into a 32-byte SHA-256
/// value. Each run feeds the hasher in order.
pub fn hash_byte_array(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Sha256::new();

    for part in parts {
        hasher.update(part);
    }

    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_hash() {
        assert_eq!(hash_byte_array(&[]), EMPTY_STRING.to_vec());
        assert_eq!(hash_byte_array(&[b""]), EMPTY_STRING.to_vec());
    }

    #[test]
    fn combine_two_sha256() {
        let a = hex::decode("7d536ec0a82aaf6d2e3cdc1b6a1c1d7def3dc3e624305ff82cc0fa7e9a21b926")
            .unwrap();
        let b = hex::decode("5044a13e1eaa191436b8bfb19df6a229cba8d64e3d67192a7085f62a94ad3f12")
            .unwrap();
        let expected =
            hex::decode("caac105b13e7b8eb7cf5ee85a19e73ec01137ea3bcd54061fd37e57f1e23009f")
                .unwrap();

        assert_eq!(hash_byte_array(&[&a, &b]), expected);

        let mut ab = a.clone();
        ab.extend_from_slice(&b);
        assert_eq!(hash_byte_array(&[&ab]), expected);
    }

    #[test]
    fn partition_invariance() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let whole = hash_byte_array(&[data]);

        for split in [1, 7, 20, data.len() - 1] {
            let (l, r) = data.split_at(split);
            assert_eq!(hash_byte_array(&[l, r]), whole);
        }
    }
}
