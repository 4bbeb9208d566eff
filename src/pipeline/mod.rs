//! Per-stream processing: pull the latest raw frame from the bus, detect on a
//! sampling cadence, track every frame, annotate, and republish.

mod annotate;
mod stream;
#[cfg(test)]
mod tests;

pub use annotate::{label, Annotator};
pub use stream::{CycleOutcome, StreamPipeline};
