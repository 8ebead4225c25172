//! Response cache.
//!
//! Successful, validated responses are kept for the TTL their route (or the
//! individual call) declares, keyed by a checksum of the compiled URL and
//! query. Entries are tagged with an invalidation group so that a mutating
//! call can purge the reads it makes stale.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! capacity = 1024
//! ```

mod config;
mod keys;
pub(crate) mod lock;
mod store;

pub use config::CacheConfig;
pub use keys::{CacheKey, derive_key};
pub use store::TtlStore;
