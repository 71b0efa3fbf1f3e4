//! SHA-256 hashing for identifiers and content addressing.

use sha2::{Digest, Sha256};

/// Calculate the SHA-256 hash of in-memory data as a hex string.
pub fn sha256(data: &[u8]) -> String {
    hex::encode(sha256_digest(data))
}

/// Raw 32-byte SHA-256 digest of in-memory data.
pub fn sha256_digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let hash = sha256(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_sha256_empty() {
        let hash = sha256(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_matches_hex() {
        let digest = sha256_digest(b"InChI=1S/CH4/h1H4");
        assert_eq!(hex::encode(digest), sha256(b"InChI=1S/CH4/h1H4"));
    }
}
