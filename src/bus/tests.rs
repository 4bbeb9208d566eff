use super::*;
use crate::config::BusConfig;
use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn create_test_bus_config(ttl_seconds: u64) -> BusConfig {
    BusConfig {
        prefix: "test".to_string(),
        ttl_seconds,
        log_capacity: 3,
        ..BusConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_entry_absent_after_ttl() {
    let bus = BusClient::in_memory(&create_test_bus_config(2));

    bus.push_frame("cam1", Bytes::from_static(b"jpeg")).await.unwrap();
    assert!(bus.get_frame("cam1").await.unwrap().is_some());

    tokio::time::advance(Duration::from_secs(3)).await;

    assert!(bus.get_frame("cam1").await.unwrap().is_none());
    assert!(bus.get_bytes("cam1").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_rewrite_refreshes_ttl() {
    let bus = BusClient::in_memory(&create_test_bus_config(2));

    bus.set_json("tracks:cam1", &json!({"ts": 1})).await.unwrap();
    tokio::time::advance(Duration::from_millis(1500)).await;
    bus.set_json("tracks:cam1", &json!({"ts": 2})).await.unwrap();
    tokio::time::advance(Duration::from_millis(1500)).await;

    let value: serde_json::Value = bus.get_json("tracks:cam1").await.unwrap().unwrap();
    assert_eq!(value["ts"], 2);
}

#[tokio::test]
async fn test_frame_written_under_both_aliases() {
    let store = Arc::new(MemoryStore::new());
    let bus = BusClient::new(store.clone(), &create_test_bus_config(30));

    bus.push_frame("door", Bytes::from_static(b"raw")).await.unwrap();
    bus.push_annotated("door", Bytes::from_static(b"ann"))
        .await
        .unwrap();

    let keys = store.scan("test:*").await.unwrap();
    assert_eq!(
        keys,
        vec![
            "test:annotated:door".to_string(),
            "test:door".to_string(),
            "test:frame:annotated:door".to_string(),
            "test:frame:door".to_string(),
        ]
    );
    assert_eq!(
        bus.get_annotated("door").await.unwrap().unwrap(),
        Bytes::from_static(b"ann")
    );
}

#[tokio::test]
async fn test_key_prefix_is_idempotent() {
    let bus = BusClient::in_memory(&create_test_bus_config(30));

    assert_eq!(bus.key("probe:cam1"), "test:probe:cam1");
    assert_eq!(bus.key("test:probe:cam1"), "test:probe:cam1");
    // Only a full "<prefix>:" counts as already namespaced
    assert_eq!(bus.key("testing"), "test:testing");
}

#[tokio::test]
async fn test_logs_capped_newest_first() {
    let bus = BusClient::in_memory(&create_test_bus_config(30));

    for i in 0..5 {
        let logger = if i % 2 == 0 { "ingest" } else { "pipeline" };
        bus.push_log(&LogRecord::now(logger, "INFO", format!("message {}", i)))
            .await
            .unwrap();
    }

    let all = bus.read_logs(None, 10).await.unwrap();
    let messages: Vec<&str> = all.iter().map(|r| r.msg.as_str()).collect();
    assert_eq!(messages, vec!["message 4", "message 3", "message 2"]);

    let ingest = bus.read_logs(Some("ingest"), 2).await.unwrap();
    let messages: Vec<&str> = ingest.iter().map(|r| r.msg.as_str()).collect();
    assert_eq!(messages, vec!["message 4", "message 2"]);

    assert!(bus.read_logs(Some("missing"), 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_probes_keyed_by_stream() {
    let bus = BusClient::in_memory(&create_test_bus_config(30));

    bus.publish_probe("cam1", ProbeStatus::Ok, json!({"event": "tick", "frames": 3}))
        .await
        .unwrap();
    bus.publish_probe("cam2", ProbeStatus::Error, json!({"reason": "open_failed"}))
        .await
        .unwrap();

    let probes = bus.probes().await.unwrap();
    assert_eq!(probes.len(), 2);
    assert_eq!(probes["cam1"].status, ProbeStatus::Ok);
    assert_eq!(probes["cam1"].details["frames"], 3);
    assert_eq!(probes["cam2"].status, ProbeStatus::Error);

    let raw: serde_json::Value = bus.get_json("probe:cam2").await.unwrap().unwrap();
    assert_eq!(raw["status"], "error");
}

#[tokio::test]
async fn test_get_many_tolerates_absent_and_binary() {
    let bus = BusClient::in_memory(&create_test_bus_config(30));

    bus.set_json("last_frame_meta:cam1", &json!({"ts": 5, "w": 640, "h": 480}))
        .await
        .unwrap();
    bus.push_frame("cam1", Bytes::from_static(&[0xFF, 0xD8, 0x00]))
        .await
        .unwrap();

    let keys = vec![
        "last_frame_meta:cam1".to_string(),
        "frame:cam1".to_string(),
        "tracks:nowhere".to_string(),
    ];
    let values = bus.get_many(&keys).await.unwrap();

    assert_eq!(values[0].1.as_ref().unwrap()["w"], 640);
    assert!(values[1].1.is_none());
    assert!(values[2].1.is_none());
}

#[tokio::test]
async fn test_get_json_reports_decode_error() {
    let bus = BusClient::in_memory(&create_test_bus_config(30));
    bus.set_bytes("probe:bad", Bytes::from_static(b"not json"))
        .await
        .unwrap();

    assert!(matches!(
        bus.get_probe("bad").await,
        Err(crate::error::BusError::Decode { .. })
    ));
    assert!(bus.get_probe("absent").await.unwrap().is_none());
}

#[tokio::test]
async fn test_memory_store_rejects_list_on_value() {
    let store = MemoryStore::new();
    let ttl = Duration::from_secs(10);

    store.set("k", Bytes::from_static(b"v"), ttl).await.unwrap();
    assert!(store
        .push_capped("k", Bytes::from_static(b"x"), 5, ttl)
        .await
        .is_err());

    store
        .push_capped("l", Bytes::from_static(b"x"), 5, ttl)
        .await
        .unwrap();
    assert!(store.get("l").await.is_err());
    assert_eq!(store.len(), 2);
}

#[test]
fn test_glob_match() {
    assert!(glob_match("pi-live:probe:*", "pi-live:probe:cam1"));
    assert!(glob_match("*", ""));
    assert!(glob_match("cam?", "cam1"));
    assert!(!glob_match("cam?", "cam12"));
    assert!(glob_match("a*b*c", "axxbyyc"));
    assert!(!glob_match("a*b*c", "axxbyy"));
    assert!(!glob_match("probe:*", "pi-live:probe:cam1"));
}
