//! Typed access to the TTL key-value store shared by all units.
//!
//! Every record is keyed by stream name under a namespace prefix and expires
//! unless refreshed within the TTL window. Readers treat an expired or missing
//! key as absent, never as an error.

mod client;
pub mod keys;
mod memory;
mod records;
#[cfg(feature = "redis-bus")]
mod redis;
mod store;
#[cfg(test)]
mod tests;

pub use client::{absorb, BusClient};
pub use memory::MemoryStore;
pub use records::{LogRecord, Probe, ProbeStatus, TrackSnapshot};
#[cfg(feature = "redis-bus")]
pub use self::redis::RedisStore;
pub use store::{glob_match, BusStore};
