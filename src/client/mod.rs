//! Client construction and request orchestration.

mod builder;
mod resilient;

pub use builder::{DEFAULT_COMMAND, DEFAULT_LIVE_TTL, DEFAULT_STALE_TTL, Munin, MuninBuilder};
pub use resilient::ResilientClient;
