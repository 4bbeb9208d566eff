use super::*;
use crate::bus::{keys, BusClient, ProbeStatus, TrackSnapshot};
use crate::config::{AnnotationConfig, BusConfig, StreamConfig};
use crate::frame::{encode_jpeg, Frame};
use crate::inference::{Detection, Detector};
use crate::tracker::Track;
use bytes::Bytes;
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Returns one fixed detection and counts calls
struct CountingDetector {
    calls: AtomicUsize,
}

impl CountingDetector {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for CountingDetector {
    fn infer(&self, _frame: &RgbImage) -> Vec<Detection> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        vec![Detection {
            class_id: 3,
            confidence: 0.75,
            x1: 10.0,
            y1: 12.0,
            x2: 30.0,
            y2: 40.0,
        }]
    }
}

fn create_test_bus() -> BusClient {
    BusClient::in_memory(&BusConfig::default())
}

fn create_test_pipeline(
    infer_every_n_frames: u32,
    bus: &BusClient,
    detector: &Arc<CountingDetector>,
) -> StreamPipeline {
    let stream = StreamConfig {
        infer_every_n_frames,
        ..StreamConfig::new("cam1", "stub://cam1")
    };
    let detector: Arc<dyn Detector> = detector.clone();
    StreamPipeline::new(
        stream,
        AnnotationConfig::default(),
        bus.clone(),
        detector,
        Arc::new(Annotator::boxes_only()),
    )
}

fn test_jpeg() -> Bytes {
    let image = RgbImage::from_pixel(64, 48, Rgb([40, 40, 40]));
    Bytes::from(encode_jpeg(&image, 90).unwrap())
}

fn sample_track() -> Track {
    Track {
        track_id: 4,
        stable_uid: 9,
        class_id: 2,
        confidence: 0.876,
        x1: 10.0,
        y1: 10.0,
        x2: 30.0,
        y2: 25.0,
        missed_count: 0,
    }
}

#[tokio::test]
async fn test_inference_runs_on_sampling_cadence() {
    let bus = create_test_bus();
    let detector = CountingDetector::new();
    let mut pipeline = create_test_pipeline(3, &bus, &detector);

    let mut inferred_on = Vec::new();
    for _ in 0..9 {
        bus.push_frame("cam1", test_jpeg()).await.unwrap();
        match pipeline.process_cycle().await {
            CycleOutcome::Processed {
                frame_count,
                inferred,
                ..
            } => {
                if inferred {
                    inferred_on.push(frame_count);
                }
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(inferred_on, vec![3, 6, 9]);
    assert_eq!(detector.calls(), 3);
    assert_eq!(pipeline.inferences(), 3);
    assert_eq!(pipeline.frame_count(), 9);
    assert_eq!(pipeline.tracker().updates(), 9);
}

#[tokio::test]
async fn test_tracks_age_between_inferences() {
    let bus = create_test_bus();
    let detector = CountingDetector::new();
    let mut pipeline = create_test_pipeline(3, &bus, &detector);
    bus.push_frame("cam1", test_jpeg()).await.unwrap();

    for _ in 0..4 {
        pipeline.process_cycle().await;
    }

    let live = pipeline.tracker().live();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].missed_count, 1);
}

#[tokio::test]
async fn test_missing_frame_is_not_an_error() {
    let bus = create_test_bus();
    let detector = CountingDetector::new();
    let mut pipeline = create_test_pipeline(1, &bus, &detector);

    assert_eq!(pipeline.process_cycle().await, CycleOutcome::NoFrame);
    assert_eq!(pipeline.frame_count(), 0);
    assert!(bus.get_probe("cam1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_undecodable_frame_is_skipped() {
    let bus = create_test_bus();
    let detector = CountingDetector::new();
    let mut pipeline = create_test_pipeline(1, &bus, &detector);

    bus.push_frame("cam1", Bytes::from_static(b"not a jpeg"))
        .await
        .unwrap();

    assert_eq!(pipeline.process_cycle().await, CycleOutcome::Undecodable);
    assert_eq!(pipeline.frame_count(), 0);
    assert_eq!(detector.calls(), 0);
    assert!(bus.get_annotated("cam1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_cycle_publishes_outputs() {
    let bus = create_test_bus();
    let detector = CountingDetector::new();
    let mut pipeline = create_test_pipeline(1, &bus, &detector);
    bus.push_frame("cam1", test_jpeg()).await.unwrap();

    let outcome = pipeline.process_cycle().await;
    assert_eq!(
        outcome,
        CycleOutcome::Processed {
            frame_count: 1,
            inferred: true,
            tracks: 1
        }
    );

    let annotated = bus.get_annotated("cam1").await.unwrap().unwrap();
    let decoded = Frame::decode_jpeg(&annotated).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 48));
    assert!(bus
        .get_bytes(&keys::annotated_frame_alias("cam1"))
        .await
        .unwrap()
        .is_some());

    let snapshot: TrackSnapshot = bus.get_json(&keys::tracks("cam1")).await.unwrap().unwrap();
    assert_eq!(snapshot.tracks.len(), 1);
    assert_eq!(snapshot.tracks[0].stable_uid, 1);
    assert_eq!(snapshot.tracks[0].class_id, 3);
    assert!(snapshot.ts > 0);

    let probe = bus.get_probe("cam1").await.unwrap().unwrap();
    assert_eq!(probe.status, ProbeStatus::Ok);
    assert_eq!(probe.details["event"], "tick");
    assert_eq!(probe.details["frames"], 1);
}

#[tokio::test]
async fn test_run_publishes_stopped_probe() {
    let bus = create_test_bus();
    let detector = CountingDetector::new();
    let mut pipeline = create_test_pipeline(2, &bus, &detector);
    bus.push_frame("cam1", test_jpeg()).await.unwrap();

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        pipeline.run(token).await;
        pipeline
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();
    let pipeline = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(pipeline.frame_count() > 0);
    let probe = bus.get_probe("cam1").await.unwrap().unwrap();
    assert_eq!(probe.status, ProbeStatus::Stopped);
}

#[tokio::test]
async fn test_idle_run_stops_promptly() {
    let bus = create_test_bus();
    let detector = CountingDetector::new();
    let mut pipeline = create_test_pipeline(1, &bus, &detector);

    let cancel = CancellationToken::new();
    cancel.cancel();
    pipeline.run(cancel).await;

    assert_eq!(pipeline.frame_count(), 0);
    let probe = bus.get_probe("cam1").await.unwrap().unwrap();
    assert_eq!(probe.status, ProbeStatus::Stopped);
}

#[test]
fn test_annotation_draws_on_a_copy() {
    let original = RgbImage::from_pixel(64, 48, Rgb([0, 0, 0]));
    let annotator = Annotator::boxes_only();

    let drawn = annotator.draw(&original, &[sample_track()]);

    assert_eq!(drawn.get_pixel(10, 10), &Rgb([0, 255, 0]));
    assert_eq!(drawn.get_pixel(11, 15), &Rgb([0, 255, 0]));
    assert_eq!(drawn.get_pixel(20, 17), &Rgb([0, 0, 0]));
    assert!(original.pixels().all(|p| *p == Rgb([0, 0, 0])));
}

#[test]
fn test_annotation_tolerates_degenerate_boxes() {
    let original = RgbImage::new(16, 16);
    let track = Track {
        x1: 15.0,
        y1: 15.0,
        x2: 15.0,
        y2: 15.0,
        ..sample_track()
    };

    let drawn = Annotator::boxes_only().draw(&original, &[track]);
    assert_eq!(drawn.dimensions(), (16, 16));
}

#[test]
fn test_label_text() {
    assert_eq!(label(&sample_track()), "id:9 cls:2 conf:0.88");
}

#[test]
fn test_missing_font_disables_labels() {
    let config = AnnotationConfig {
        font_path: "/nonexistent/font.ttf".to_string(),
        ..AnnotationConfig::default()
    };
    assert!(!Annotator::load(&config).has_labels());
}
