use super::*;
use crate::bus::{BusClient, ProbeStatus};
use crate::config::{AppConfig, BusConfig, StreamConfig, Transport};
use crate::error::{EdgewatchError, IngestError};
use crate::inference::{Detection, Detector};
use crate::ingest::{FrameSource, SourceOpener, UrlSourceOpener};
use crate::pipeline::Annotator;
use async_trait::async_trait;
use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;

struct FixedDetector;

impl Detector for FixedDetector {
    fn infer(&self, _frame: &RgbImage) -> Vec<Detection> {
        vec![Detection {
            class_id: 0,
            confidence: 0.9,
            x1: 4.0,
            y1: 4.0,
            x2: 20.0,
            y2: 20.0,
        }]
    }
}

struct RefusingOpener;

#[async_trait]
impl SourceOpener for RefusingOpener {
    async fn open(
        &self,
        stream: &StreamConfig,
        transport: Transport,
    ) -> Result<Box<dyn FrameSource>, IngestError> {
        Err(IngestError::OpenFailed {
            url: stream.url.clone(),
            transport: transport.to_string(),
            details: "connection refused".to_string(),
        })
    }
}

fn create_test_config() -> AppConfig {
    let mut cam1 = StreamConfig::new("cam1", "stub://cam1");
    cam1.width = 64;
    cam1.height = 48;
    cam1.fps = 20;
    let mut cam2 = StreamConfig::new("cam2", "stub://cam2");
    cam2.width = 32;
    cam2.height = 32;
    cam2.infer_every_n_frames = 2;

    AppConfig {
        streams: vec![cam1, cam2],
        ..AppConfig::default()
    }
}

fn create_test_bus() -> BusClient {
    BusClient::in_memory(&BusConfig::default())
}

fn create_test_orchestrator(
    mode: RunMode,
    bus: &BusClient,
    opener: Arc<dyn SourceOpener>,
) -> crate::error::Result<EdgeOrchestrator> {
    EdgeOrchestrator::with_components(
        create_test_config(),
        mode,
        bus.clone(),
        opener,
        Arc::new(FixedDetector),
        Arc::new(Annotator::boxes_only()),
    )
}

fn stub_opener() -> Arc<dyn SourceOpener> {
    Arc::new(UrlSourceOpener::new(Default::default()))
}

async fn wait_for_annotated(bus: &BusClient, stream: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while bus.get_annotated(stream).await.unwrap().is_none() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("annotated frame never appeared");
}

#[test]
fn test_run_mode_selection() {
    assert!(RunMode::All.runs_ingest() && RunMode::All.runs_pipeline());
    assert!(!RunMode::Ingest("cam1".into()).runs_pipeline());
    assert!(!RunMode::Pipeline("cam1".into()).runs_ingest());
    assert_eq!(RunMode::Pipeline("cam1".into()).stream(), Some("cam1"));
    assert_eq!(UnitKind::Ingest.component("cam1"), "ingest:cam1");
}

#[tokio::test]
async fn test_unknown_stream_is_rejected() {
    let bus = create_test_bus();
    let result = create_test_orchestrator(RunMode::Ingest("garage".into()), &bus, stub_opener());

    assert!(matches!(
        result,
        Err(EdgewatchError::UnknownStream { ref name }) if name == "garage"
    ));
}

#[tokio::test]
async fn test_initialize_registers_units() {
    let bus = create_test_bus();
    let mut orchestrator = create_test_orchestrator(RunMode::All, &bus, stub_opener()).unwrap();
    assert!(orchestrator.get_all_component_states().await.is_empty());

    orchestrator.initialize().await.unwrap();

    let states = orchestrator.get_all_component_states().await;
    assert_eq!(states.len(), 4);
    for name in ["ingest:cam1", "pipeline:cam1", "ingest:cam2", "pipeline:cam2"] {
        assert_eq!(states.get(name), Some(&ComponentState::Stopped), "{}", name);
    }

    let mut single =
        create_test_orchestrator(RunMode::Pipeline("cam2".into()), &bus, stub_opener()).unwrap();
    single.initialize().await.unwrap();
    assert_eq!(single.streams().len(), 1);
    assert_eq!(
        single.get_all_component_states().await.keys().collect::<Vec<_>>(),
        vec!["pipeline:cam2"]
    );
}

#[tokio::test]
async fn test_component_state_management() {
    let bus = create_test_bus();
    let orchestrator = create_test_orchestrator(RunMode::All, &bus, stub_opener()).unwrap();

    orchestrator
        .set_component_state("ingest:cam1", ComponentState::Starting)
        .await;
    assert_eq!(
        orchestrator.get_component_state("ingest:cam1").await,
        Some(ComponentState::Starting)
    );

    orchestrator
        .set_component_state("ingest:cam1", ComponentState::Running)
        .await;
    orchestrator
        .set_component_state("pipeline:cam1", ComponentState::Failed)
        .await;

    let all_states = orchestrator.get_all_component_states().await;
    assert_eq!(all_states.len(), 2);
    assert_eq!(all_states.get("ingest:cam1"), Some(&ComponentState::Running));
    assert_eq!(orchestrator.get_component_state("cam9").await, None);
}

#[tokio::test]
async fn test_full_run_processes_streams_and_stops_cleanly() {
    let bus = create_test_bus();
    let mut orchestrator = create_test_orchestrator(RunMode::All, &bus, stub_opener()).unwrap();
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    wait_for_annotated(&bus, "cam1").await;
    wait_for_annotated(&bus, "cam2").await;

    let token = orchestrator.shutdown_token();
    let states = orchestrator.component_states();
    let run = tokio::spawn(async move { orchestrator.run().await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();
    let exit_code = tokio::time::timeout(Duration::from_secs(15), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(exit_code, 0);
    for (name, state) in states.all().await {
        assert_eq!(state, ComponentState::Stopped, "{}", name);
    }
    for stream in ["cam1", "cam2"] {
        let probe = bus.get_probe(stream).await.unwrap().unwrap();
        assert_eq!(probe.status, ProbeStatus::Stopped);
        assert!(bus.get_frame(stream).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn test_ingest_only_unit_publishes_and_stops() {
    let bus = create_test_bus();
    let mut orchestrator =
        create_test_orchestrator(RunMode::Ingest("cam1".into()), &bus, stub_opener()).unwrap();
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while bus.get_frame("cam1").await.unwrap().is_none() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("raw frame never appeared");

    assert_eq!(
        orchestrator.get_component_state("ingest:cam1").await,
        Some(ComponentState::Running)
    );
    assert_eq!(orchestrator.shutdown().await.unwrap(), 0);
    assert_eq!(
        orchestrator.get_component_state("ingest:cam1").await,
        Some(ComponentState::Stopped)
    );
    assert!(bus.get_annotated("cam1").await.unwrap().is_none());
    let probe = bus.get_probe("cam1").await.unwrap().unwrap();
    assert_eq!(probe.status, ProbeStatus::Stopped);
}

#[tokio::test]
async fn test_failed_initial_open_ends_run_with_error() {
    let bus = create_test_bus();
    let mut orchestrator = create_test_orchestrator(
        RunMode::Ingest("cam1".into()),
        &bus,
        Arc::new(RefusingOpener),
    )
    .unwrap();
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    let exit_code = tokio::time::timeout(Duration::from_secs(5), orchestrator.run())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exit_code, 1);
    assert_eq!(
        orchestrator.get_component_state("ingest:cam1").await,
        Some(ComponentState::Failed)
    );
    let probe = bus.get_probe("cam1").await.unwrap().unwrap();
    assert_eq!(probe.status, ProbeStatus::Error);
}

#[tokio::test]
async fn test_one_failed_stream_leaves_others_running() {
    struct OnlyCam2;

    #[async_trait]
    impl SourceOpener for OnlyCam2 {
        async fn open(
            &self,
            stream: &StreamConfig,
            transport: Transport,
        ) -> Result<Box<dyn FrameSource>, IngestError> {
            if stream.name == "cam2" {
                UrlSourceOpener::new(Default::default())
                    .open(stream, transport)
                    .await
            } else {
                RefusingOpener.open(stream, transport).await
            }
        }
    }

    let bus = create_test_bus();
    let mut orchestrator = create_test_orchestrator(RunMode::All, &bus, Arc::new(OnlyCam2)).unwrap();
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    wait_for_annotated(&bus, "cam2").await;
    assert_eq!(
        orchestrator.get_component_state("ingest:cam1").await,
        Some(ComponentState::Failed)
    );
    assert_eq!(
        orchestrator.get_component_state("ingest:cam2").await,
        Some(ComponentState::Running)
    );

    let exit_code = orchestrator.shutdown().await.unwrap();
    assert_eq!(exit_code, 1);
    assert_eq!(
        orchestrator.get_component_state("pipeline:cam2").await,
        Some(ComponentState::Stopped)
    );
}
