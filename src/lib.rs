//! Edge video analytics: resilient stream ingestion, object detection on an
//! accelerator with a software fallback, greedy IoU tracking, and a TTL
//! key-value bus tying the per-stream units together.

pub mod app;
pub mod bus;
pub mod config;
pub mod error;
pub mod frame;
pub mod inference;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod tracker;

pub use app::{ComponentState, EdgeOrchestrator, RunMode, ShutdownReason};
pub use bus::{BusClient, BusStore, LogRecord, MemoryStore, Probe, ProbeStatus, TrackSnapshot};
pub use config::{AppConfig, StreamConfig, Transport};
pub use error::{EdgewatchError, Result};
pub use frame::{CaptureMeta, Frame};
pub use inference::{Detection, Detector, InferenceEngine};
pub use ingest::{IngestEngine, IngestState};
pub use logging::{init_logging, LogOptions};
pub use pipeline::{CycleOutcome, StreamPipeline};
pub use tracker::{Track, Tracker};
