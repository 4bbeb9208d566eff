use super::store::BusStore;
use crate::error::BusError;
use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tracing::info;

const SCAN_BATCH: usize = 500;

/// Redis-backed store over a multiplexed async connection
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to the server at `url` (e.g. `redis://127.0.0.1:6379/0`)
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url).map_err(|e| BusError::Connection {
            details: format!("{}: {}", url, e),
        })?;

        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BusError::Connection {
                details: format!("{}: {}", url, e),
            })?;

        info!("Connected to redis bus at {}", url);
        Ok(Self { conn })
    }
}

fn command_error(command: &str, e: redis::RedisError) -> BusError {
    BusError::Command {
        command: command.to_string(),
        details: e.to_string(),
    }
}

/// Redis rejects a zero expiry, so round sub-second TTLs up
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl BusStore for RedisStore {
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value.as_ref())
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| command_error("SET", e))
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, BusError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("GET", e))?;
        Ok(value.map(Bytes::from))
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, BusError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| command_error("SCAN", e))?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn push_capped(
        &self,
        key: &str,
        value: Bytes,
        capacity: usize,
        ttl: Duration,
    ) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        let last_index = capacity.saturating_sub(1) as i64;

        redis::pipe()
            .atomic()
            .cmd("LPUSH")
            .arg(key)
            .arg(value.as_ref())
            .ignore()
            .cmd("LTRIM")
            .arg(key)
            .arg(0)
            .arg(last_index)
            .ignore()
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_seconds(ttl))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| command_error("LPUSH", e))
    }

    async fn range(&self, key: &str, count: usize) -> Result<Vec<Bytes>, BusError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let values: Vec<Vec<u8>> = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(count as i64 - 1)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("LRANGE", e))?;
        Ok(values.into_iter().map(Bytes::from).collect())
    }
}
