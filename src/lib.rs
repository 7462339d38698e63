//! Munin - Resilient HTTP GET client with caching and circuit breaking
//!
//! This crate wraps plain GET requests in three layers of protection: a
//! live response cache, a circuit breaker per upstream command, and a
//! stale-cache fallback that keeps serving the last known good response
//! when the upstream is down or the circuit refuses to call it.
//!
//! # Example
//!
//! ```rust,no_run
//! use munin::Munin;
//!
//! #[tokio::main]
//! async fn main() -> munin::Result<()> {
//!     let client = Munin::builder()
//!         .command("catalog")
//!         .header("Accept", "application/json")
//!         .build()?;
//!
//!     // Served from the live cache when fresh, from upstream otherwise,
//!     // and from the stale cache when upstream is unavailable.
//!     let body = client.get("http://catalog.internal/items").await?;
//!
//!     println!("{body}");
//!     Ok(())
//! }
//! ```
//!
//! A response body is cached under its URL twice, with different
//! lifetimes: a short-lived live copy that answers repeat requests without
//! touching the network, and a long-lived stale copy consulted only when a
//! fetch fails. Circuit state is shared per command name, so many clients
//! hitting the same upstream open and recover together.

pub mod breaker;
pub mod cache;
pub mod client;
pub mod error;
pub mod telemetry;
pub mod transport;

// Re-export main types at crate root
pub use client::{Munin, MuninBuilder, ResilientClient};
pub use error::{MuninError, Result};

// Re-export collaborator types
pub use breaker::{CircuitBreaker, CircuitConfig, CircuitRegistry, CircuitState};
pub use cache::{CacheConfig, ResponseCache};
pub use transport::{
    HttpTransport, ReqwestTransport, StatusOutcome, TransportConfig, TransportResponse,
    classify_status,
};
