use super::keys;
use super::memory::MemoryStore;
use super::records::{LogRecord, Probe, ProbeStatus};
use super::store::BusStore;
use crate::config::{BusBackend, BusConfig};
use crate::error::BusError;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Typed façade over the bus store.
///
/// Cheap to clone; every clone shares the same store handle. Keys passed in are
/// relative to the configured prefix.
#[derive(Clone)]
pub struct BusClient {
    store: Arc<dyn BusStore>,
    prefix: String,
    ttl: Duration,
    log_capacity: usize,
}

impl BusClient {
    pub fn new(store: Arc<dyn BusStore>, config: &BusConfig) -> Self {
        Self {
            store,
            prefix: config.prefix.clone(),
            ttl: config.ttl(),
            log_capacity: config.log_capacity,
        }
    }

    /// Client backed by a fresh in-process store
    pub fn in_memory(config: &BusConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    /// Build the client for the configured backend
    pub async fn connect(config: &BusConfig) -> Result<Self, BusError> {
        match config.backend {
            BusBackend::Memory => {
                info!("Using in-process bus store");
                Ok(Self::in_memory(config))
            }
            #[cfg(feature = "redis-bus")]
            BusBackend::Redis => {
                let store = super::RedisStore::connect(&config.url).await?;
                Ok(Self::new(Arc::new(store), config))
            }
            #[cfg(not(feature = "redis-bus"))]
            BusBackend::Redis => Err(BusError::Connection {
                details: "redis support is not compiled in (enable the redis-bus feature)"
                    .to_string(),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Namespace a key; already-namespaced keys pass through unchanged
    pub fn key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            return key.to_string();
        }
        match key.strip_prefix(self.prefix.as_str()) {
            Some(rest) if rest.starts_with(':') => key.to_string(),
            _ => format!("{}:{}", self.prefix, key),
        }
    }

    pub async fn set_bytes(&self, key: &str, value: Bytes) -> Result<(), BusError> {
        self.store.set(&self.key(key), value, self.ttl).await
    }

    pub async fn get_bytes(&self, key: &str) -> Result<Option<Bytes>, BusError> {
        self.store.get(&self.key(key)).await
    }

    /// Publish a raw JPEG frame under the bare and the `frame:` keys
    pub async fn push_frame(&self, stream: &str, jpeg: Bytes) -> Result<(), BusError> {
        self.set_bytes(&keys::raw_frame(stream), jpeg.clone()).await?;
        self.set_bytes(&keys::raw_frame_alias(stream), jpeg).await
    }

    /// Latest raw frame, preferring the namespaced alias
    pub async fn get_frame(&self, stream: &str) -> Result<Option<Bytes>, BusError> {
        match self.get_bytes(&keys::raw_frame_alias(stream)).await? {
            Some(frame) => Ok(Some(frame)),
            None => self.get_bytes(&keys::raw_frame(stream)).await,
        }
    }

    /// Publish an annotated JPEG frame under both aliases
    pub async fn push_annotated(&self, stream: &str, jpeg: Bytes) -> Result<(), BusError> {
        self.set_bytes(&keys::annotated_frame(stream), jpeg.clone())
            .await?;
        self.set_bytes(&keys::annotated_frame_alias(stream), jpeg)
            .await
    }

    pub async fn get_annotated(&self, stream: &str) -> Result<Option<Bytes>, BusError> {
        self.get_bytes(&keys::annotated_frame(stream)).await
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), BusError> {
        let encoded = serde_json::to_vec(value).map_err(|e| BusError::Decode {
            key: key.to_string(),
            details: e.to_string(),
        })?;
        self.set_bytes(key, Bytes::from(encoded)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, BusError> {
        let Some(raw) = self.get_bytes(key).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| BusError::Decode {
                key: self.key(key),
                details: e.to_string(),
            })
    }

    /// Publish the liveness probe for a unit
    pub async fn publish_probe(
        &self,
        stream: &str,
        status: ProbeStatus,
        details: Value,
    ) -> Result<(), BusError> {
        let probe = Probe::now(status, details);
        self.set_json(&keys::probe(stream), &probe).await
    }

    pub async fn get_probe(&self, stream: &str) -> Result<Option<Probe>, BusError> {
        self.get_json(&keys::probe(stream)).await
    }

    /// Append a record to the global log list and to its logger's list
    pub async fn push_log(&self, record: &LogRecord) -> Result<(), BusError> {
        let encoded = serde_json::to_vec(record).map_err(|e| BusError::Decode {
            key: keys::LOGS.to_string(),
            details: e.to_string(),
        })?;
        let encoded = Bytes::from(encoded);

        self.store
            .push_capped(
                &self.key(keys::LOGS),
                encoded.clone(),
                self.log_capacity,
                self.ttl,
            )
            .await?;
        self.store
            .push_capped(
                &self.key(&keys::logs_for(&record.name)),
                encoded,
                self.log_capacity,
                self.ttl,
            )
            .await
    }

    /// Last `count` log records, newest first. Entries that do not parse are skipped.
    pub async fn read_logs(
        &self,
        logger: Option<&str>,
        count: usize,
    ) -> Result<Vec<LogRecord>, BusError> {
        let key = match logger {
            Some(name) => keys::logs_for(name),
            None => keys::LOGS.to_string(),
        };

        let raw = self.store.range(&self.key(&key), count).await?;
        Ok(raw
            .iter()
            .filter_map(|entry| serde_json::from_slice(entry).ok())
            .collect())
    }

    /// Full (prefixed) keys matching a relative glob pattern
    pub async fn list_keys(&self, pattern: &str) -> Result<Vec<String>, BusError> {
        self.store.scan(&self.key(pattern)).await
    }

    /// Read several keys as JSON; absent or non-JSON values map to `None`
    pub async fn get_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<(String, Option<Value>)>, BusError> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let value = self
                .get_bytes(key)
                .await?
                .and_then(|raw| serde_json::from_slice::<Value>(&raw).ok());
            values.push((key.clone(), value));
        }
        Ok(values)
    }

    /// All current probes keyed by stream name
    pub async fn probes(&self) -> Result<BTreeMap<String, Probe>, BusError> {
        let probe_prefix = self.key(&keys::probe(""));
        let mut probes = BTreeMap::new();

        for key in self.list_keys(&keys::probe("*")).await? {
            let Some(stream) = key.strip_prefix(probe_prefix.as_str()) else {
                continue;
            };
            // A probe may expire between SCAN and GET
            match self.get_json::<Probe>(&key).await {
                Ok(Some(probe)) => {
                    probes.insert(stream.to_string(), probe);
                }
                Ok(None) => {}
                Err(e) => debug!("Skipping unreadable probe {}: {}", key, e),
            }
        }

        Ok(probes)
    }
}

/// Log a failed best-effort write and carry on
pub fn absorb(what: &str, result: Result<(), BusError>) {
    if let Err(e) = result {
        debug!("Bus write of {} failed: {}", what, e);
    }
}
