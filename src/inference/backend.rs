use super::accelerator::{open_accelerator, AcceleratorRuntime};
#[cfg(feature = "software-inference")]
use super::software::SoftwareRuntime;
use crate::config::InferenceConfig;
use crate::error::InferenceError;
use image::RgbImage;
#[cfg(feature = "software-inference")]
use tracing::error;
use tracing::{info, warn};

/// First output tensor of a backend run, flattened in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// The inference path chosen at construction
pub enum Backend {
    Accelerator {
        runtime: Box<dyn AcceleratorRuntime>,
        input: (u32, u32),
    },
    #[cfg(feature = "software-inference")]
    Software(SoftwareRuntime),
}

impl Backend {
    /// Wrap an accelerator, falling back to a square default when the model
    /// does not declare its input shape
    pub fn accelerator(runtime: Box<dyn AcceleratorRuntime>, default_size: u32) -> Self {
        let input = runtime
            .input_shape()
            .unwrap_or((default_size, default_size));
        Backend::Accelerator { runtime, input }
    }

    /// Try the accelerator, then the software runtime. `None` when neither
    /// comes up.
    pub fn select(config: &InferenceConfig) -> Option<Self> {
        if config.accelerator_enabled {
            match open_accelerator(config) {
                Ok(runtime) => {
                    let backend = Self::accelerator(runtime, config.default_input_size);
                    let (w, h) = backend.input_size();
                    info!("Accelerator ready ({}x{} input)", w, h);
                    return Some(backend);
                }
                Err(e) => warn!("Accelerator unavailable: {}", e),
            }
        } else {
            info!("Accelerator disabled by configuration");
        }

        if !config.software_fallback {
            warn!("Software fallback disabled; frames will get no detections");
            return None;
        }

        Self::software(config)
    }

    #[cfg(feature = "software-inference")]
    fn software(config: &InferenceConfig) -> Option<Self> {
        match SoftwareRuntime::load(config) {
            Ok(runtime) => {
                info!(
                    "Software inference ready ({})",
                    config.software_model_path
                );
                Some(Backend::Software(runtime))
            }
            Err(e) => {
                error!("Software inference unavailable: {}", e);
                None
            }
        }
    }

    #[cfg(not(feature = "software-inference"))]
    fn software(_config: &InferenceConfig) -> Option<Self> {
        warn!("Software inference is not compiled in; frames will get no detections");
        None
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Accelerator { .. } => "accelerator",
            #[cfg(feature = "software-inference")]
            Backend::Software(_) => "software",
        }
    }

    /// Model input (width, height)
    pub fn input_size(&self) -> (u32, u32) {
        match self {
            Backend::Accelerator { input, .. } => *input,
            #[cfg(feature = "software-inference")]
            Backend::Software(runtime) => runtime.input_size(),
        }
    }

    pub fn run(&mut self, input: &RgbImage) -> Result<RawOutput, InferenceError> {
        match self {
            Backend::Accelerator { runtime, .. } => runtime.run(input),
            #[cfg(feature = "software-inference")]
            Backend::Software(runtime) => runtime.run(input),
        }
    }
}
