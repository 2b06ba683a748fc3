//! Content hashing for conditional GET.
//!
//! A [`Digest`] is the SHA-256 of an artifact's bytes, hex encoded. It is
//! only used for cache invalidation, so the only property that matters is
//! that any change to the content produces a different value.

use sha2::{Digest as _, Sha256};
use std::fmt;

/// Stable content identity of a byte sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest(String);

impl Digest {
    /// Hex form of the hash.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Strong entity tag for the `ETag` header.
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Whether an `If-None-Match` header value matches this digest.
    ///
    /// Accepts the quoted form we send, the bare hex form, weak tags, lists of
    /// tags and the `*` wildcard.
    pub fn matches(&self, if_none_match: &str) -> bool {
        if_none_match.split(',').any(|candidate| {
            let candidate = candidate.trim();
            if candidate == "*" {
                return true;
            }
            let candidate = candidate.strip_prefix("W/").unwrap_or(candidate);
            let candidate = candidate
                .strip_prefix('"')
                .and_then(|c| c.strip_suffix('"'))
                .unwrap_or(candidate);
            candidate == self.0
        })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash a byte sequence.
pub fn digest(bytes: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Digest(format!("{:x}", hasher.finalize()))
}
