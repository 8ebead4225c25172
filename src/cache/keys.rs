//! Cache key derivation.
//!
//! A key is the CRC-32 of the compiled URL followed by the JSON form of the
//! query. Nothing else about the call takes part, so volatile input such as a
//! request body or a timestamp can never split or merge entries.

use std::fmt;

use serde_json::{Map, Value};

/// Checksum identifying one cacheable request signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u32);

impl CacheKey {
    pub fn checksum(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Derive the cache key for a compiled URL and its query.
///
/// An absent query hashes as `null`, so it does not share a key with an
/// empty one.
pub fn derive_key(url: &str, query: Option<&Map<String, Value>>) -> CacheKey {
    let serialized = match query {
        Some(query) => serde_json::to_string(query).unwrap_or_default(),
        None => "null".to_string(),
    };

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(url.as_bytes());
    hasher.update(serialized.as_bytes());
    CacheKey(hasher.finalize())
}
