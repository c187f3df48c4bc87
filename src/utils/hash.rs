//! SHA-256 och innehållsadresserade sökvägar

use sha2::{Digest, Sha256};

/// Hex-kodad SHA-256 av rådata
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Bygg `<hash[0:2]>/<hash>.<ext>`
///
/// Samma innehåll med samma filändelse hamnar alltid på samma sökväg,
/// vilket ger deduplicering utan extra bokföring.
pub fn content_path(hash: &str, extension: &str) -> String {
    let shard = hash.get(0..2).unwrap_or(hash);
    format!("{}/{}.{}", shard, hash, extension)
}

/// Kontrollera att en sträng ser ut som en SHA-256 i hex
pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_content_path_layout() {
        let hash = sha256_hex(b"hello");
        assert_eq!(content_path(&hash, "pdf"), format!("2c/{}.pdf", hash));
    }

    #[test]
    fn test_is_sha256_hex() {
        assert!(is_sha256_hex(&sha256_hex(b"x")));
        assert!(!is_sha256_hex("abc"));
        assert!(!is_sha256_hex(&"z".repeat(64)));
    }
}
