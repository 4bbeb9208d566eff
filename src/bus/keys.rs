//! Key scheme shared by producers and readers. All keys are relative to the
//! bus prefix, which `BusClient` prepends.

/// Raw frame, legacy bare key
pub fn raw_frame(stream: &str) -> String {
    stream.to_string()
}

/// Raw frame, namespaced alias
pub fn raw_frame_alias(stream: &str) -> String {
    format!("frame:{}", stream)
}

pub fn annotated_frame(stream: &str) -> String {
    format!("annotated:{}", stream)
}

pub fn annotated_frame_alias(stream: &str) -> String {
    format!("frame:annotated:{}", stream)
}

/// Width/height/timestamp of the last raw frame
pub fn capture_meta(stream: &str) -> String {
    format!("last_frame_meta:{}", stream)
}

pub fn tracks(stream: &str) -> String {
    format!("tracks:{}", stream)
}

pub fn probe(stream: &str) -> String {
    format!("probe:{}", stream)
}

/// Global log list
pub const LOGS: &str = "logs";

/// Per-logger log list
pub fn logs_for(logger: &str) -> String {
    format!("logs:{}", logger)
}
