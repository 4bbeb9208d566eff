//! Stream ingestion: turns an unreliable network video source into a steady,
//! throttled sequence of JPEG frames on the bus.
//!
//! One [`IngestEngine`] runs per stream. It owns its capture handle
//! exclusively, recovers from starved reads by reopening the source, and falls
//! back from the unreliable to the reliable transport for good once reopening
//! keeps failing.

mod engine;
#[cfg(all(feature = "gstreamer-source", target_os = "linux"))]
mod gst;
mod source;
mod synthetic;

pub use engine::{IngestEngine, IngestState};
#[cfg(all(feature = "gstreamer-source", target_os = "linux"))]
pub use gst::GstSource;
pub use source::{FrameSource, SourceOpener, UrlSourceOpener};
pub use synthetic::SyntheticSource;
