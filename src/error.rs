use thiserror::Error;

#[derive(Error, Debug)]
pub enum EdgewatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Unknown stream '{name}'")]
    UnknownStream { name: String },

    #[error("System error: {message}")]
    System { message: String },
}

/// Errors talking to the TTL key-value store
#[derive(Error, Debug, Clone)]
pub enum BusError {
    #[error("Bus connection failed: {details}")]
    Connection { details: String },

    #[error("Bus command '{command}' failed: {details}")]
    Command { command: String, details: String },

    #[error("Bus value for '{key}' is not valid JSON: {details}")]
    Decode { key: String, details: String },
}

/// Video source errors
#[derive(Error, Debug, Clone)]
pub enum IngestError {
    #[error("Failed to open source {url} over {transport}: {details}")]
    OpenFailed {
        url: String,
        transport: String,
        details: String,
    },

    #[error("Unsupported source URL: {url}")]
    UnsupportedSource { url: String },

    #[error("Source pipeline error: {details}")]
    Pipeline { details: String },
}

/// Detector backend errors
#[derive(Error, Debug, Clone)]
pub enum InferenceError {
    #[error("Model artifact not found: {path}")]
    ArtifactMissing { path: String },

    #[error("Accelerator device unavailable: {details}")]
    DeviceUnavailable { details: String },

    #[error("Model load failed: {details}")]
    ModelLoad { details: String },

    #[error("Model download from {url} failed: {details}")]
    Download { url: String, details: String },

    #[error("Backend run failed: {details}")]
    Run { details: String },

    #[error("Unexpected output shape {shape:?} for {expected} attributes per box")]
    OutputShape { shape: Vec<usize>, expected: usize },
}

/// Frame decode/encode errors
#[derive(Error, Debug, Clone)]
pub enum FrameError {
    #[error("JPEG decode failed: {details}")]
    Decode { details: String },

    #[error("JPEG encode failed: {details}")]
    Encode { details: String },

    #[error("Buffer of {actual} bytes does not hold a {width}x{height} RGB frame")]
    BufferSize {
        width: u32,
        height: u32,
        actual: usize,
    },
}

impl EdgewatchError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

pub type Result<T, E = EdgewatchError> = std::result::Result<T, E>;
