use sha2::{Digest, Sha256};

/// Deterministic fingerprint of (author, cleaned text) for exact-duplicate suppression.
///
/// Author and text are separated by a unit separator so that ("ab", "c") and
/// ("a", "bc") never collide.
pub fn content_hash(author: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(author.as_bytes());
    hasher.update([0x1f]);
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
