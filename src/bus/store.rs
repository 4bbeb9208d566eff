use crate::error::BusError;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Storage operations the bus needs from the external cache.
///
/// Values are opaque bytes. Every write carries a TTL; an entry that was not
/// refreshed within its TTL must read back as absent.
#[async_trait]
pub trait BusStore: Send + Sync {
    /// Store a value, replacing any previous one
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), BusError>;

    /// Fetch a value; `None` when missing or expired
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BusError>;

    /// List live keys matching a glob pattern (`*` and `?`)
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, BusError>;

    /// Prepend to a list, trim it to `capacity` entries and refresh its TTL
    async fn push_capped(
        &self,
        key: &str,
        value: Bytes,
        capacity: usize,
        ttl: Duration,
    ) -> Result<(), BusError>;

    /// First `count` entries of a list, newest first
    async fn range(&self, key: &str, count: usize) -> Result<Vec<Bytes>, BusError>;
}

/// Glob match with `*` (any run) and `?` (any single character)
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            resume = t;
            p += 1;
        } else if let Some(star_at) = star {
            p = star_at + 1;
            resume += 1;
            t = resume;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
