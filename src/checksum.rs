//! SDL content checksums for idempotent resubmission

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SHA256 checksum of raw SDL bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Checksum of SDL text exactly as submitted. Whitespace and
    /// descriptions count; two texts that parse identically but differ
    /// byte-wise are different submissions.
    pub fn of_sdl(sdl: &str) -> Self {
        Self::from_bytes(sdl.as_bytes())
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }

    /// Verify that SDL matches this checksum
    pub fn verify(&self, sdl: &str) -> bool {
        *self == Self::of_sdl(sdl)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Checksum {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_handles_non_hex_text() {
        assert_eq!(Checksum::from("abc".to_string()).short(), "abc");
        let odd = Checksum::from("aéééééééééé".to_string());
        assert_eq!(odd.short(), "aéééééééééé");
        assert_eq!(Checksum::of_sdl("type Query { a: Int }").short().len(), 12);
    }

    #[test]
    fn test_checksum_consistency() {
        let sdl = "type Query { name: String }";
        assert_eq!(Checksum::of_sdl(sdl), Checksum::of_sdl(sdl));
        assert_eq!(Checksum::of_sdl(sdl).as_str().len(), 64);
    }

    #[test]
    fn test_whitespace_is_significant() {
        let a = Checksum::of_sdl("type Query { name: String }");
        let b = Checksum::of_sdl("type Query {\n  name: String\n}");
        assert_ne!(a, b);
    }

    #[test]
    fn test_checksum_verification() {
        let sdl = "type Query { id: ID! }";
        let checksum = Checksum::of_sdl(sdl);
        assert!(checksum.verify(sdl));
        assert!(!checksum.verify("type Query { id: ID }"));
        assert_eq!(checksum.short().len(), 12);
    }
}
