use super::state::ComponentStates;
use super::types::{RunMode, ShutdownReason};
use crate::bus::BusClient;
use crate::config::{AppConfig, StreamConfig};
use crate::error::{EdgewatchError, Result};
use crate::inference::{Detector, InferenceEngine};
use crate::ingest::{SourceOpener, UrlSourceOpener};
use crate::pipeline::Annotator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// How long shutdown waits for units to finish their current iteration
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Main application coordinator that runs every per-stream unit
pub struct EdgeOrchestrator {
    pub(super) config: AppConfig,
    pub(super) mode: RunMode,
    pub(super) streams: Vec<StreamConfig>,
    pub(super) bus: BusClient,

    // Shared collaborators handed to each unit
    pub(super) opener: Arc<dyn SourceOpener>,
    pub(super) detector: Arc<dyn Detector>,
    pub(super) annotator: Arc<Annotator>,

    // Lifecycle management
    pub(super) units: JoinSet<(String, Result<()>)>,
    pub(super) component_states: ComponentStates,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
    pub(super) stop_timeout: Duration,
    pub(super) failures: usize,
}

/// Detector used when no pipeline unit runs
struct NoDetector;

impl Detector for NoDetector {
    fn infer(&self, _frame: &image::RgbImage) -> Vec<crate::inference::Detection> {
        Vec::new()
    }
}

impl EdgeOrchestrator {
    /// Build the orchestrator for `mode`. The inference backend is set up
    /// here, once, and only when a pipeline unit will run.
    pub async fn new(config: AppConfig, mode: RunMode, bus: BusClient) -> Result<Self> {
        select_streams(&config, &mode)?;

        let opener: Arc<dyn SourceOpener> = Arc::new(UrlSourceOpener::new(config.ingest.clone()));

        let (detector, annotator): (Arc<dyn Detector>, Annotator) = if mode.runs_pipeline() {
            let inference = config.inference.clone();
            let engine = tokio::task::spawn_blocking(move || InferenceEngine::new(&inference))
                .await
                .map_err(|e| EdgewatchError::system(format!("Inference setup failed: {}", e)))?;
            match engine.backend_name() {
                Some(name) => info!("Inference backend: {}", name),
                None => info!("No inference backend; pipelines will publish empty track sets"),
            }
            (Arc::new(engine), Annotator::load(&config.annotation))
        } else {
            (Arc::new(NoDetector), Annotator::boxes_only())
        };

        Self::with_components(config, mode, bus, opener, detector, Arc::new(annotator))
    }

    /// Build the orchestrator around already constructed collaborators
    pub fn with_components(
        config: AppConfig,
        mode: RunMode,
        bus: BusClient,
        opener: Arc<dyn SourceOpener>,
        detector: Arc<dyn Detector>,
        annotator: Arc<Annotator>,
    ) -> Result<Self> {
        let streams = select_streams(&config, &mode)?;
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(Self {
            config,
            mode,
            streams,
            bus,
            opener,
            detector,
            annotator,
            units: JoinSet::new(),
            component_states: ComponentStates::default(),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            failures: 0,
        })
    }

    pub fn set_stop_timeout(&mut self, timeout: Duration) {
        self.stop_timeout = timeout;
    }

    /// Token that stops every unit when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn mode(&self) -> &RunMode {
        &self.mode
    }

    /// Streams this process serves
    pub fn streams(&self) -> &[StreamConfig] {
        &self.streams
    }

    /// Shared view of every unit's state
    pub fn component_states(&self) -> ComponentStates {
        self.component_states.clone()
    }
}

/// Streams named by `mode`; an unknown name is a configuration error
fn select_streams(config: &AppConfig, mode: &RunMode) -> Result<Vec<StreamConfig>> {
    match mode.stream() {
        None => Ok(config.streams.clone()),
        Some(name) => config
            .stream(name)
            .cloned()
            .map(|stream| vec![stream])
            .ok_or_else(|| EdgewatchError::UnknownStream {
                name: name.to_string(),
            }),
    }
}
