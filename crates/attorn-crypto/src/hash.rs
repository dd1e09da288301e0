//! Domain-separated BLAKE3 digests.

use std::fmt;

/// A 32-byte BLAKE3 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash under a derivation context so digests from different record
    /// kinds never collide.
    #[must_use]
    pub fn hash_with_domain(domain: &str, data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(domain);
        hasher.update(data);
        Self(*hasher.finalize().as_bytes())
    }

    /// Hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_separation() {
        let value = ContentHash::hash_with_domain("attorn.token-value", b"evidence");
        let other = ContentHash::hash_with_domain("attorn.other", b"evidence");
        assert_ne!(value, other);
        assert_eq!(
            value,
            ContentHash::hash_with_domain("attorn.token-value", b"evidence")
        );
        assert_eq!(value.to_hex().len(), 64);
    }
}
