//! Caching subsystem.
//!
//! One store, two tiers. Every successful fetch writes up to two entries
//! into the same [`ResponseCache`]:
//!
//! - a *live* entry under the request URL itself, with a short TTL; a hit
//!   here bypasses the network and the circuit entirely;
//! - a *stale* entry under [`stale_key`]`(url)`, with a much longer TTL,
//!   consulted only by the fallback path when a fresh fetch fails or the
//!   circuit is open.
//!
//! The store is an explicitly shared resource: clients built from the same
//! `Arc<ResponseCache>` (via
//! [`MuninBuilder::shared_cache()`](crate::MuninBuilder::shared_cache)) see
//! each other's entries, and [`ResponseCache::flush()`] clears them for
//! everyone. Clients built without an injected store get a private one.

pub mod response;

pub use response::{CacheConfig, ResponseCache, stale_key};
