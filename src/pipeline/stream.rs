use super::annotate::Annotator;
use crate::bus::{absorb, keys, BusClient, ProbeStatus, TrackSnapshot};
use crate::config::{AnnotationConfig, StreamConfig};
use crate::frame::{encode_jpeg, unix_seconds, Frame};
use crate::inference::{Detection, Detector};
use crate::tracker::{Track, Tracker};
use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What one pass over the latest frame amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing published for the stream yet, or the entry expired
    NoFrame,
    /// A payload was there but did not decode
    Undecodable,
    Processed {
        frame_count: u64,
        /// Whether the detector ran this cycle
        inferred: bool,
        tracks: usize,
    },
}

/// Detect, track, annotate and republish loop for one stream
pub struct StreamPipeline {
    stream: StreamConfig,
    config: AnnotationConfig,
    bus: BusClient,
    detector: Arc<dyn Detector>,
    annotator: Arc<Annotator>,
    tracker: Tracker,
    frame_count: u64,
    inferences: u64,
}

impl StreamPipeline {
    pub fn new(
        stream: StreamConfig,
        config: AnnotationConfig,
        bus: BusClient,
        detector: Arc<dyn Detector>,
        annotator: Arc<Annotator>,
    ) -> Self {
        Self {
            stream,
            config,
            bus,
            detector,
            annotator,
            tracker: Tracker::default(),
            frame_count: 0,
            inferences: 0,
        }
    }

    pub fn with_tracker(mut self, tracker: Tracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn name(&self) -> &str {
        &self.stream.name
    }

    /// Frames processed so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Detector invocations so far
    pub fn inferences(&self) -> u64 {
        self.inferences
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Process frames until cancelled, then publish the stopped probe
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!("Starting pipeline for {}", self.stream.name);

        while !cancel.is_cancelled() {
            match self.process_cycle().await {
                CycleOutcome::NoFrame => pause(&cancel, self.config.idle_backoff()).await,
                CycleOutcome::Undecodable => {
                    pause(&cancel, self.config.undecodable_backoff()).await
                }
                CycleOutcome::Processed { .. } => tokio::task::yield_now().await,
            }
        }

        absorb(
            "probe",
            self.bus
                .publish_probe(
                    &self.stream.name,
                    ProbeStatus::Stopped,
                    json!({ "event": "stop", "frames": self.frame_count }),
                )
                .await,
        );
        info!(
            "Stopping pipeline for {} after {} frames",
            self.stream.name, self.frame_count
        );
    }

    /// Run one cycle against the latest raw frame on the bus
    pub async fn process_cycle(&mut self) -> CycleOutcome {
        let raw = match self.bus.get_frame(&self.stream.name).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return CycleOutcome::NoFrame,
            Err(e) => {
                debug!("Frame read for {} failed: {}", self.stream.name, e);
                return CycleOutcome::NoFrame;
            }
        };

        let decoded = tokio::task::spawn_blocking(move || Frame::decode_jpeg(&raw)).await;
        let frame = match decoded {
            Ok(Ok(frame)) => Arc::new(frame),
            Ok(Err(e)) => {
                debug!("Skipping undecodable frame on {}: {}", self.stream.name, e);
                return CycleOutcome::Undecodable;
            }
            Err(e) => {
                warn!("Decode task for {} failed: {}", self.stream.name, e);
                return CycleOutcome::Undecodable;
            }
        };

        self.frame_count += 1;
        let stride = u64::from(self.stream.infer_every_n_frames.max(1));
        let inferred = self.frame_count % stride == 0;

        let detections = if inferred {
            self.inferences += 1;
            self.detect(Arc::clone(&frame)).await
        } else {
            Vec::new()
        };

        let tracks = self.tracker.update(&detections, &frame.image);
        self.publish(frame, &tracks).await;

        CycleOutcome::Processed {
            frame_count: self.frame_count,
            inferred,
            tracks: tracks.len(),
        }
    }

    async fn detect(&self, frame: Arc<Frame>) -> Vec<Detection> {
        let detector = Arc::clone(&self.detector);
        match tokio::task::spawn_blocking(move || detector.infer(&frame.image)).await {
            Ok(detections) => detections,
            Err(e) => {
                warn!("Inference task for {} failed: {}", self.stream.name, e);
                Vec::new()
            }
        }
    }

    async fn publish(&self, frame: Arc<Frame>, tracks: &[Track]) {
        let name = &self.stream.name;
        let annotator = Arc::clone(&self.annotator);
        let quality = self.config.jpeg_quality;
        let drawn = tracks.to_vec();
        let captured_at = frame.captured_at;

        let encoded = tokio::task::spawn_blocking(move || {
            encode_jpeg(&annotator.draw(&frame.image, &drawn), quality)
        })
        .await;
        match encoded {
            Ok(Ok(jpeg)) => absorb(
                "annotated frame",
                self.bus.push_annotated(name, Bytes::from(jpeg)).await,
            ),
            Ok(Err(e)) => warn!("Annotated frame for {} not published: {}", name, e),
            Err(e) => warn!("Annotation task for {} failed: {}", name, e),
        }

        let snapshot = TrackSnapshot {
            ts: unix_seconds(captured_at),
            tracks: tracks.to_vec(),
        };
        absorb(
            "track snapshot",
            self.bus.set_json(&keys::tracks(name), &snapshot).await,
        );
        absorb(
            "probe",
            self.bus
                .publish_probe(
                    name,
                    ProbeStatus::Ok,
                    json!({ "event": "tick", "frames": self.frame_count }),
                )
                .await,
        );
    }
}

async fn pause(cancel: &CancellationToken, duration: Duration) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}
