use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Top-level configuration, constructed once at process start and handed to
/// each component by reference.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_streams")]
    pub streams: Vec<StreamConfig>,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub annotation: AnnotationConfig,
}

/// One camera stream
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StreamConfig {
    /// Unique stream name, used as the bus key
    pub name: String,

    /// Source URL (rtsp://, file://, http:// or stub:// for a synthetic source)
    pub url: String,

    /// Target frames per second
    #[serde(default = "default_stream_fps")]
    pub fps: u32,

    /// Decode width in pixels
    #[serde(default = "default_stream_width")]
    pub width: u32,

    /// Decode height in pixels
    #[serde(default = "default_stream_height")]
    pub height: u32,

    /// Run inference on every n-th frame
    #[serde(default = "default_infer_every_n_frames")]
    pub infer_every_n_frames: u32,

    /// Preferred transport; `udp` is tried first and falls back to `tcp`
    #[serde(default)]
    pub transport: Option<Transport>,
}

impl StreamConfig {
    /// Create a stream with default rate, size and sampling stride
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            fps: default_stream_fps(),
            width: default_stream_width(),
            height: default_stream_height(),
            infer_every_n_frames: default_infer_every_n_frames(),
            transport: None,
        }
    }

    /// Spacing between accepted frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000u64 / self.fps.max(1) as u64)
    }

    /// Whether the unreliable transport should be attempted first
    pub fn prefers_unreliable(&self) -> bool {
        self.transport == Some(Transport::Udp)
    }
}

/// Network transport for the video source
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Reliable, ordered
    Tcp,
    /// Unreliable, lower latency
    Udp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp => write!(f, "tcp"),
            Transport::Udp => write!(f, "udp"),
        }
    }
}

/// How to interpret columns beyond the four box parameters and the class scores
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtraColumn {
    /// Drop one trailing column if exactly one extra column is present
    #[default]
    Auto,
    /// An objectness score follows the box; confidence = objectness * class score
    Objectness,
    /// No extra column; a mismatched column count is an error
    None,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InferenceConfig {
    /// Try the hardware accelerator first
    #[serde(default = "default_accelerator_enabled")]
    pub accelerator_enabled: bool,

    /// Compiled model artifact for the accelerator
    #[serde(default = "default_model_path")]
    pub model_path: String,

    /// Accelerator device selector, e.g. a PCIe address (None = auto-select)
    #[serde(default)]
    pub device_id: Option<String>,

    /// Minimum confidence for a detection to be kept (inclusive)
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,

    /// IoU above which overlapping detections are suppressed
    #[serde(default = "default_nms_iou_threshold")]
    pub nms_iou_threshold: f32,

    /// Cap on detections returned per frame
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,

    /// Number of class score columns in the model output
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,

    /// Output column convention
    #[serde(default)]
    pub extra_column: ExtraColumn,

    /// Input resolution used when the artifact does not declare one
    #[serde(default = "default_input_size")]
    pub default_input_size: u32,

    /// Fall back to the software runtime when the accelerator is unavailable
    #[serde(default = "default_software_fallback")]
    pub software_fallback: bool,

    /// Where to download the software model from
    #[serde(default = "default_software_model_url")]
    pub software_model_url: String,

    /// Local cache path for the software model
    #[serde(default = "default_software_model_path")]
    pub software_model_path: String,

    /// Cached models smaller than this are treated as truncated and re-downloaded
    #[serde(default = "default_software_min_model_bytes")]
    pub software_min_model_bytes: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BusConfig {
    /// Store implementation
    #[serde(default)]
    pub backend: BusBackend,

    /// Connection URL for the redis backend
    #[serde(default = "default_bus_url")]
    pub url: String,

    /// Namespace prefix for every key
    #[serde(default = "default_bus_prefix")]
    pub prefix: String,

    /// Time-to-live applied to every write
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Maximum entries kept in each log list
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

impl BusConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// JPEG quality for raw frames
    #[serde(default = "default_raw_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Log a warning every n consecutive read failures
    #[serde(default = "default_warn_every_failures")]
    pub warn_every_failures: u32,

    /// Reopen the source after this many consecutive read failures
    #[serde(default = "default_reopen_after_failures")]
    pub reopen_after_failures: u32,

    /// Pause between releasing and reopening the source
    #[serde(default = "default_reopen_backoff_ms")]
    pub reopen_backoff_ms: u64,

    /// Pause after each failed read
    #[serde(default = "default_failure_backoff_ms")]
    pub failure_backoff_ms: u64,

    /// Reopen attempts before an unreliable-transport stream switches to tcp for good
    #[serde(default = "default_tcp_fallback_after_reopens")]
    pub tcp_fallback_after_reopens: u32,
}

impl IngestConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reopen_backoff(&self) -> Duration {
        Duration::from_millis(self.reopen_backoff_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnnotationConfig {
    /// JPEG quality for annotated frames
    #[serde(default = "default_annotated_jpeg_quality")]
    pub jpeg_quality: u8,

    /// TrueType font for track labels
    #[serde(default = "default_font_path")]
    pub font_path: String,

    #[serde(default = "default_font_size")]
    pub font_size: f32,

    /// Pause when no raw frame is available yet
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,

    /// Pause after an undecodable raw frame
    #[serde(default = "default_undecodable_backoff_ms")]
    pub undecodable_backoff_ms: u64,
}

impl AnnotationConfig {
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn undecodable_backoff(&self) -> Duration {
        Duration::from_millis(self.undecodable_backoff_ms)
    }
}

impl AppConfig {
    /// Load configuration from `edgewatch.toml` and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("edgewatch.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("inference.accelerator_enabled", default_accelerator_enabled())?
            .set_default("inference.model_path", default_model_path())?
            .set_default("inference.score_threshold", default_score_threshold() as f64)?
            .set_default(
                "inference.nms_iou_threshold",
                default_nms_iou_threshold() as f64,
            )?
            .set_default("inference.max_detections", default_max_detections() as i64)?
            .set_default("inference.num_classes", default_num_classes() as i64)?
            .set_default("inference.default_input_size", default_input_size())?
            .set_default("inference.software_fallback", default_software_fallback())?
            .set_default("bus.url", default_bus_url())?
            .set_default("bus.prefix", default_bus_prefix())?
            .set_default("bus.ttl_seconds", default_ttl_seconds())?
            .set_default("bus.log_capacity", default_log_capacity() as i64)?
            .set_default("ingest.read_timeout_ms", default_read_timeout_ms())?
            .set_default("ingest.open_timeout_ms", default_open_timeout_ms())?
            .set_default("ingest.reopen_after_failures", default_reopen_after_failures())?
            .set_default("annotation.jpeg_quality", default_annotated_jpeg_quality() as i64)?
            .set_default("annotation.font_path", default_font_path())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // EDGEWATCH_BUS__URL, EDGEWATCH_INFERENCE__SCORE_THRESHOLD, ...
            .add_source(
                Environment::with_prefix("EDGEWATCH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;

        info!(
            "Configuration loaded successfully ({} streams)",
            config.streams.len()
        );
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Parse configuration from a TOML string, without file or environment layers
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|e| ConfigError::Message(e.to_string()))
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Message(e.to_string()))
    }

    /// Resolve a stream by name
    pub fn stream(&self, name: &str) -> Option<&StreamConfig> {
        self.streams.iter().find(|s| s.name == name)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.streams.is_empty() {
            return Err(ConfigError::Message(
                "At least one stream must be configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for stream in &self.streams {
            if stream.name.is_empty() {
                return Err(ConfigError::Message(
                    "Stream name must not be empty".to_string(),
                ));
            }
            if !names.insert(stream.name.as_str()) {
                return Err(ConfigError::Message(format!(
                    "Duplicate stream name '{}'",
                    stream.name
                )));
            }
            if stream.fps == 0 {
                return Err(ConfigError::Message(format!(
                    "Stream '{}' fps must be greater than 0",
                    stream.name
                )));
            }
            if stream.width == 0 || stream.height == 0 {
                return Err(ConfigError::Message(format!(
                    "Stream '{}' resolution must be greater than 0",
                    stream.name
                )));
            }
            if stream.infer_every_n_frames == 0 {
                return Err(ConfigError::Message(format!(
                    "Stream '{}' infer_every_n_frames must be at least 1",
                    stream.name
                )));
            }
        }

        let unit = 0.0..=1.0;
        if !unit.contains(&self.inference.score_threshold) {
            return Err(ConfigError::Message(
                "Inference score_threshold must be within [0, 1]".to_string(),
            ));
        }
        if !unit.contains(&self.inference.nms_iou_threshold) {
            return Err(ConfigError::Message(
                "Inference nms_iou_threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.inference.num_classes == 0 {
            return Err(ConfigError::Message(
                "Inference num_classes must be greater than 0".to_string(),
            ));
        }
        if self.inference.default_input_size == 0 {
            return Err(ConfigError::Message(
                "Inference default_input_size must be greater than 0".to_string(),
            ));
        }

        if self.bus.ttl_seconds == 0 {
            return Err(ConfigError::Message(
                "Bus ttl_seconds must be greater than 0".to_string(),
            ));
        }
        if self.bus.log_capacity == 0 {
            return Err(ConfigError::Message(
                "Bus log_capacity must be greater than 0".to_string(),
            ));
        }

        if self.ingest.reopen_after_failures == 0 {
            return Err(ConfigError::Message(
                "Ingest reopen_after_failures must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            streams: default_streams(),
            inference: InferenceConfig::default(),
            bus: BusConfig::default(),
            ingest: IngestConfig::default(),
            annotation: AnnotationConfig::default(),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            accelerator_enabled: default_accelerator_enabled(),
            model_path: default_model_path(),
            device_id: None,
            score_threshold: default_score_threshold(),
            nms_iou_threshold: default_nms_iou_threshold(),
            max_detections: default_max_detections(),
            num_classes: default_num_classes(),
            extra_column: ExtraColumn::default(),
            default_input_size: default_input_size(),
            software_fallback: default_software_fallback(),
            software_model_url: default_software_model_url(),
            software_model_path: default_software_model_path(),
            software_min_model_bytes: default_software_min_model_bytes(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::default(),
            url: default_bus_url(),
            prefix: default_bus_prefix(),
            ttl_seconds: default_ttl_seconds(),
            log_capacity: default_log_capacity(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            open_timeout_ms: default_open_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            jpeg_quality: default_raw_jpeg_quality(),
            warn_every_failures: default_warn_every_failures(),
            reopen_after_failures: default_reopen_after_failures(),
            reopen_backoff_ms: default_reopen_backoff_ms(),
            failure_backoff_ms: default_failure_backoff_ms(),
            tcp_fallback_after_reopens: default_tcp_fallback_after_reopens(),
        }
    }
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_annotated_jpeg_quality(),
            font_path: default_font_path(),
            font_size: default_font_size(),
            idle_backoff_ms: default_idle_backoff_ms(),
            undecodable_backoff_ms: default_undecodable_backoff_ms(),
        }
    }
}

// Default value functions
fn default_streams() -> Vec<StreamConfig> {
    vec![StreamConfig::new("cam1", "stub://cam1")]
}
fn default_stream_fps() -> u32 {
    15
}
fn default_stream_width() -> u32 {
    1280
}
fn default_stream_height() -> u32 {
    720
}
fn default_infer_every_n_frames() -> u32 {
    1
}

fn default_accelerator_enabled() -> bool {
    true
}
fn default_model_path() -> String {
    "/opt/hailo/models/yolov8s.hef".to_string()
}
fn default_score_threshold() -> f32 {
    0.3
}
fn default_nms_iou_threshold() -> f32 {
    0.45
}
fn default_max_detections() -> usize {
    200
}
fn default_num_classes() -> usize {
    80
}
fn default_input_size() -> u32 {
    640
}
fn default_software_fallback() -> bool {
    true
}
fn default_software_model_url() -> String {
    "https://github.com/ultralytics/assets/releases/download/v8.2.0/yolov8n.onnx".to_string()
}
fn default_software_model_path() -> String {
    "./models/yolov8n.onnx".to_string()
}
fn default_software_min_model_bytes() -> u64 {
    1_000_000
}

fn default_bus_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}
fn default_bus_prefix() -> String {
    "pi-live".to_string()
}
fn default_ttl_seconds() -> u64 {
    30
}
fn default_log_capacity() -> usize {
    500
}

fn default_open_timeout_ms() -> u64 {
    5000
}
fn default_read_timeout_ms() -> u64 {
    5000
}
fn default_raw_jpeg_quality() -> u8 {
    95
}
fn default_warn_every_failures() -> u32 {
    10
}
fn default_reopen_after_failures() -> u32 {
    12
}
fn default_reopen_backoff_ms() -> u64 {
    1000
}
fn default_failure_backoff_ms() -> u64 {
    250
}
fn default_tcp_fallback_after_reopens() -> u32 {
    2
}

fn default_annotated_jpeg_quality() -> u8 {
    80
}
fn default_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}
fn default_font_size() -> f32 {
    14.0
}
fn default_idle_backoff_ms() -> u64 {
    50
}
fn default_undecodable_backoff_ms() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bus.ttl_seconds, 30);
        assert_eq!(config.inference.max_detections, 200);
        assert_eq!(config.ingest.reopen_after_failures, 12);
    }

    #[test]
    fn test_stream_defaults_from_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            [[streams]]
            name = "door"
            url = "rtsp://10.0.0.5/live"
            transport = "udp"
            infer_every_n_frames = 3
            "#,
        )
        .unwrap();

        let door = config.stream("door").unwrap();
        assert_eq!(door.fps, 15);
        assert_eq!((door.width, door.height), (1280, 720));
        assert_eq!(door.infer_every_n_frames, 3);
        assert!(door.prefers_unreliable());
        assert!(config.stream("garage").is_none());
        assert_eq!(config.inference.extra_column, ExtraColumn::Auto);
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.streams[0].infer_every_n_frames = 0;
        assert!(config.validate().is_err());

        config.streams[0].infer_every_n_frames = 2;
        assert!(config.validate().is_ok());

        config.streams.push(config.streams[0].clone());
        assert!(config.validate().is_err());

        config.streams.pop();
        config.inference.score_threshold = 1.5;
        assert!(config.validate().is_err());

        config.inference.score_threshold = 0.25;
        config.bus.ttl_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [[streams]]
            name = "yard"
            url = "stub://yard"
            fps = 5

            [bus]
            backend = "memory"
            ttl_seconds = 7
            "#
        )
        .unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.streams.len(), 1);
        assert_eq!(config.streams[0].fps, 5);
        assert_eq!(config.bus.backend, BusBackend::Memory);
        assert_eq!(config.bus.ttl(), Duration::from_secs(7));
        assert_eq!(config.bus.prefix, "pi-live");
    }

    #[test]
    fn test_frame_interval() {
        let stream = StreamConfig {
            fps: 20,
            ..StreamConfig::new("a", "stub://a")
        };
        assert_eq!(stream.frame_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_print_round_trip() {
        let config = AppConfig::default();
        let rendered = config.to_toml_string().unwrap();
        let parsed = AppConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed.streams, config.streams);
    }
}
